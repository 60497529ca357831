//! Encryption schema declaration and collection provisioning.
//!
//! A [`CollectionSchema`] declares, once per collection, which fields
//! are encrypted, their type, and which support equality queries. The
//! declaration is immutable after provisioning; changing it requires a
//! destructive re-provision.

use crate::codec::{EncryptionMode, FieldMap};
use crate::document::paths;
use crate::error::Error;
use crate::store::{timed, DocumentStore, KeyVaultStore};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Declared type of an encrypted field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// UTF-8 string
    String,
    /// Raw bytes
    Binary,
    /// Timestamp
    DateTime,
    /// Nested document
    Object,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Binary => "binary",
            Self::DateTime => "dateTime",
            Self::Object => "object",
        };
        f.write_str(name)
    }
}

/// Query capability of an encrypted field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryCapability {
    /// No server-side queries; the field is encrypted with a randomized
    /// cipher for maximum confidentiality.
    None,
    /// Equality queries; the field is encrypted deterministically,
    /// which leaks equality patterns by design.
    Equality,
}

impl fmt::Display for QueryCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Equality => "equality",
        };
        f.write_str(name)
    }
}

/// Declaration of one encrypted field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedFieldSpec {
    /// Field path within the document.
    pub path: String,
    /// Declared type.
    pub field_type: FieldType,
    /// Supported query capability.
    pub query: QueryCapability,
}

impl EncryptedFieldSpec {
    /// Declares a field with no query capability.
    #[must_use]
    pub fn new(path: impl Into<String>, field_type: FieldType) -> Self {
        Self { path: path.into(), field_type, query: QueryCapability::None }
    }

    /// Declares a field supporting equality queries.
    #[must_use]
    pub fn equality(path: impl Into<String>, field_type: FieldType) -> Self {
        Self { path: path.into(), field_type, query: QueryCapability::Equality }
    }

    /// Returns the encryption mode implied by the query capability.
    #[must_use]
    pub const fn mode(&self) -> EncryptionMode {
        match self.query {
            QueryCapability::Equality => EncryptionMode::Deterministic,
            QueryCapability::None => EncryptionMode::Randomized,
        }
    }
}

/// Encryption schema of one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSchema {
    collection: String,
    fields: Vec<EncryptedFieldSpec>,
}

impl CollectionSchema {
    /// Creates a schema for `collection` with the given field specs.
    #[must_use]
    pub fn new(collection: impl Into<String>, fields: Vec<EncryptedFieldSpec>) -> Self {
        Self { collection: collection.into(), fields }
    }

    /// The invoice collection schema: an equality-queryable token field
    /// plus randomized payload, content type, timestamp, and file name.
    #[must_use]
    pub fn invoice_default(collection: impl Into<String>) -> Self {
        Self::new(
            collection,
            vec![
                EncryptedFieldSpec::equality(paths::SSN, FieldType::String),
                EncryptedFieldSpec::new(paths::XML, FieldType::Binary),
                EncryptedFieldSpec::new(paths::CONTENT_TYPE, FieldType::String),
                EncryptedFieldSpec::new(paths::CREATION_TIME, FieldType::DateTime),
                EncryptedFieldSpec::new(paths::FILE_NAME, FieldType::String),
            ],
        )
    }

    /// Returns the collection name.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns the declared field specs.
    #[must_use]
    pub fn fields(&self) -> &[EncryptedFieldSpec] {
        &self.fields
    }

    /// Returns the spec for `path`, if declared.
    #[must_use]
    pub fn field(&self, path: &str) -> Option<&EncryptedFieldSpec> {
        self.fields.iter().find(|f| f.path == path)
    }

    /// Derives the field map matching this schema exactly.
    #[must_use]
    pub fn field_map(&self) -> FieldMap {
        let mut map = FieldMap::new();
        for field in &self.fields {
            map = map.with_field(&field.path, field.mode());
        }
        map
    }
}

/// How to treat a pre-existing collection during provisioning.
///
/// The source design this store descends from dropped any existing
/// collection on every provisioning call. That destructive behavior is
/// kept available but gated behind an explicit mode, so normal startup
/// can never silently destroy data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionMode {
    /// Create the collection only if it does not exist yet. Never
    /// destroys data; the safe choice for startup paths.
    EnsureExists,
    /// Drop the collection and the key vault first, then recreate.
    /// One-time setup and test scenarios only: all existing records and
    /// every data key become unrecoverable.
    ResetDestructive,
}

/// Provisions encrypted collections against the document store.
///
/// Not safe to run concurrently with itself or with readers/writers of
/// the target collection; provisioning is a single-pass setup step.
pub struct SchemaProvisioner {
    documents: Arc<dyn DocumentStore>,
    key_vault: Arc<dyn KeyVaultStore>,
    op_timeout: Duration,
}

impl SchemaProvisioner {
    /// Creates a provisioner over the document and key vault stores.
    #[must_use]
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        key_vault: Arc<dyn KeyVaultStore>,
        op_timeout: Duration,
    ) -> Self {
        Self { documents, key_vault, op_timeout }
    }

    /// Creates `schema`'s collection with its enforced encryption schema.
    ///
    /// With [`ProvisionMode::EnsureExists`], an already-provisioned
    /// collection is left untouched. With
    /// [`ProvisionMode::ResetDestructive`], the collection and the key
    /// vault are dropped first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Provisioning`] if the store rejects the schema
    /// (no partial schema is left usable), or [`Error::Store`] for
    /// other store failures.
    pub async fn provision(
        &self,
        schema: &CollectionSchema,
        mode: ProvisionMode,
    ) -> Result<(), Error> {
        let collection = schema.collection();

        match mode {
            ProvisionMode::EnsureExists => {
                if timed(self.op_timeout, self.documents.collection_exists(collection)).await? {
                    tracing::debug!(collection, "collection already provisioned");
                    return Ok(());
                }
            }
            ProvisionMode::ResetDestructive => {
                tracing::warn!(collection, "destructive reset: dropping collection and key vault");
                timed(self.op_timeout, self.documents.drop_collection(collection)).await?;
                timed(self.op_timeout, self.key_vault.drop_vault()).await?;
            }
        }

        timed(self.op_timeout, self.documents.create_collection(schema.clone()))
            .await
            .map_err(Error::Provisioning)?;

        tracing::info!(collection, fields = schema.fields().len(), "provisioned encrypted collection");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoice_default_schema() {
        let schema = CollectionSchema::invoice_default("invoiceXml");
        assert_eq!(schema.collection(), "invoiceXml");
        assert_eq!(schema.fields().len(), 5);

        let ssn = schema.field(paths::SSN).unwrap();
        assert_eq!(ssn.query, QueryCapability::Equality);
        assert_eq!(ssn.mode(), EncryptionMode::Deterministic);

        let xml = schema.field(paths::XML).unwrap();
        assert_eq!(xml.query, QueryCapability::None);
        assert_eq!(xml.mode(), EncryptionMode::Randomized);
    }

    #[test]
    fn test_field_map_matches_schema() {
        let schema = CollectionSchema::invoice_default("invoiceXml");
        let map = schema.field_map();
        assert_eq!(map.get(paths::SSN), Some(EncryptionMode::Deterministic));
        assert_eq!(map.get(paths::XML), Some(EncryptionMode::Randomized));
        assert_eq!(map.get("unknown"), None);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(FieldType::String.to_string(), "string");
        assert_eq!(FieldType::Object.to_string(), "object");
        assert_eq!(QueryCapability::Equality.to_string(), "equality");
        assert_eq!(QueryCapability::None.to_string(), "none");
    }
}
