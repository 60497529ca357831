//! Immutable runtime configuration.
//!
//! A [`Config`] is constructed once at process start and passed by
//! reference to every component that needs it. Nothing re-reads
//! configuration at call time and nothing mutates it after startup.

use crate::error::Error;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// A `database.collection` pair naming one logical collection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Namespace {
    database: String,
    collection: String,
}

impl Namespace {
    /// Creates a namespace from its two components.
    #[must_use]
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self { database: database.into(), collection: collection.into() }
    }

    /// Parses a namespace from its `database.collection` form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidNamespace`] if the string does not contain
    /// exactly one `.` separating two non-empty parts.
    pub fn from_full_name(full_name: &str) -> Result<Self, Error> {
        match full_name.split_once('.') {
            Some((db, coll)) if !db.is_empty() && !coll.is_empty() && !coll.contains('.') => {
                Ok(Self::new(db, coll))
            }
            _ => Err(Error::InvalidNamespace(full_name.to_string())),
        }
    }

    /// Returns the database name.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Returns the collection name.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

impl FromStr for Namespace {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_full_name(s)
    }
}

impl TryFrom<String> for Namespace {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_full_name(&value)
    }
}

fn default_kms_provider() -> String {
    "local".to_string()
}

fn default_key_vault_namespace() -> Namespace {
    Namespace::new("encryption", "__keyVault")
}

fn default_encrypted_namespace() -> Namespace {
    Namespace::new("invoice", "invoiceXml")
}

fn default_index_namespace() -> Namespace {
    Namespace::new("invoice", "invoiceSsn")
}

fn default_op_timeout_ms() -> u64 {
    5_000
}

fn default_file_name_template() -> String {
    "invoice-{token}.xml".to_string()
}

/// Runtime configuration for the encrypted invoice store.
///
/// # Example
///
/// ```
/// use kasadb::config::Config;
///
/// let config: Config = toml::from_str(
///     r#"
///     kms_provider = "local"
///     encrypted_namespace = "invoice.invoiceXml"
///     index_namespace = "invoice.invoiceSsn"
///     op_timeout_ms = 2000
///     "#,
/// ).unwrap();
/// assert_eq!(config.kms_provider(), "local");
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// KMS provider name used to protect data keys.
    #[serde(default = "default_kms_provider")]
    kms_provider: String,
    /// Collection holding data encryption key records.
    #[serde(default = "default_key_vault_namespace")]
    key_vault_namespace: Namespace,
    /// Collection holding encrypted invoice records.
    #[serde(default = "default_encrypted_namespace")]
    encrypted_namespace: Namespace,
    /// Plaintext collection mapping correlation tokens to record ids.
    #[serde(default = "default_index_namespace")]
    index_namespace: Namespace,
    /// Per-round-trip store timeout, in milliseconds.
    #[serde(default = "default_op_timeout_ms")]
    op_timeout_ms: u64,
    /// File name template for inserted invoices; `{token}` is replaced
    /// with the record's correlation token.
    #[serde(default = "default_file_name_template")]
    file_name_template: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kms_provider: default_kms_provider(),
            key_vault_namespace: default_key_vault_namespace(),
            encrypted_namespace: default_encrypted_namespace(),
            index_namespace: default_index_namespace(),
            op_timeout_ms: default_op_timeout_ms(),
            file_name_template: default_file_name_template(),
        }
    }
}

impl Config {
    /// Sets the KMS provider name.
    #[must_use]
    pub fn with_kms_provider(mut self, name: impl Into<String>) -> Self {
        self.kms_provider = name.into();
        self
    }

    /// Sets the key vault namespace.
    #[must_use]
    pub fn with_key_vault_namespace(mut self, ns: Namespace) -> Self {
        self.key_vault_namespace = ns;
        self
    }

    /// Sets the encrypted collection namespace.
    #[must_use]
    pub fn with_encrypted_namespace(mut self, ns: Namespace) -> Self {
        self.encrypted_namespace = ns;
        self
    }

    /// Sets the index collection namespace.
    #[must_use]
    pub fn with_index_namespace(mut self, ns: Namespace) -> Self {
        self.index_namespace = ns;
        self
    }

    /// Sets the per-round-trip store timeout.
    #[must_use]
    pub const fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the file name template.
    #[must_use]
    pub fn with_file_name_template(mut self, template: impl Into<String>) -> Self {
        self.file_name_template = template.into();
        self
    }

    /// Returns the KMS provider name.
    #[must_use]
    pub fn kms_provider(&self) -> &str {
        &self.kms_provider
    }

    /// Returns the key vault namespace.
    #[must_use]
    pub fn key_vault_namespace(&self) -> &Namespace {
        &self.key_vault_namespace
    }

    /// Returns the encrypted collection namespace.
    #[must_use]
    pub fn encrypted_namespace(&self) -> &Namespace {
        &self.encrypted_namespace
    }

    /// Returns the index collection namespace.
    #[must_use]
    pub fn index_namespace(&self) -> &Namespace {
        &self.index_namespace
    }

    /// Returns the per-round-trip store timeout.
    #[must_use]
    pub const fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    /// Returns the file name template.
    #[must_use]
    pub fn file_name_template(&self) -> &str {
        &self.file_name_template
    }

    /// Renders a file name for the given correlation token.
    #[must_use]
    pub fn render_file_name(&self, token: &crate::document::CorrelationToken) -> String {
        self.file_name_template.replace("{token}", &token.to_string())
    }
}
