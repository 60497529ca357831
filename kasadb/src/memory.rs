//! In-memory store backends.
//!
//! These back the integration tests and the CLI demo, and pin down the
//! contract a real backend has to meet: schema validation is atomic on
//! collection creation, index entries keep insertion order, and nothing
//! enforces token uniqueness on the index side.

use crate::document::{
    CorrelationToken, DocumentId, EncryptedInvoiceFields, EncryptedInvoiceRecord, IndexEntry,
    IndexEntryId,
};
use crate::key_vault::{DataKeyRecord, DekId};
use crate::schema::{CollectionSchema, FieldType, QueryCapability};
use crate::store::{DocumentStore, IndexStore, KeyVaultStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

struct Collection {
    schema: CollectionSchema,
    records: Vec<EncryptedInvoiceRecord>,
}

/// In-memory document store with schema enforcement.
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryDocumentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn validate_schema(schema: &CollectionSchema) -> Result<(), StoreError> {
        let mut seen = Vec::new();
        for field in schema.fields() {
            if seen.contains(&field.path.as_str()) {
                return Err(StoreError::SchemaRejected(format!(
                    "duplicate field path `{}`",
                    field.path
                )));
            }
            seen.push(&field.path);

            if field.query == QueryCapability::Equality && field.field_type == FieldType::Object {
                return Err(StoreError::SchemaRejected(format!(
                    "equality query not supported on {} field `{}`",
                    field.field_type, field.path
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create_collection(&self, schema: CollectionSchema) -> Result<(), StoreError> {
        // Validate before touching the map so rejection leaves no
        // partial schema behind.
        Self::validate_schema(&schema)?;

        let mut collections = self.collections.write().await;
        if collections.contains_key(schema.collection()) {
            return Err(StoreError::WriteRejected(format!(
                "collection `{}` already exists",
                schema.collection()
            )));
        }
        collections.insert(
            schema.collection().to_string(),
            Collection { schema, records: Vec::new() },
        );
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> Result<(), StoreError> {
        self.collections.write().await.remove(collection);
        Ok(())
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool, StoreError> {
        Ok(self.collections.read().await.contains_key(collection))
    }

    async fn insert_document(
        &self,
        collection: &str,
        fields: EncryptedInvoiceFields,
    ) -> Result<DocumentId, StoreError> {
        let mut collections = self.collections.write().await;
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::MissingCollection(collection.to_string()))?;

        let id = DocumentId::new();
        coll.records.push(EncryptedInvoiceRecord { id, fields });
        Ok(id)
    }

    async fn find_document(
        &self,
        collection: &str,
        id: DocumentId,
    ) -> Result<Option<EncryptedInvoiceRecord>, StoreError> {
        let collections = self.collections.read().await;
        let coll = collections
            .get(collection)
            .ok_or_else(|| StoreError::MissingCollection(collection.to_string()))?;

        Ok(coll.records.iter().find(|r| r.id == id).cloned())
    }

    async fn find_document_eq(
        &self,
        collection: &str,
        path: &str,
        value: &[u8],
    ) -> Result<Option<EncryptedInvoiceRecord>, StoreError> {
        let collections = self.collections.read().await;
        let coll = collections
            .get(collection)
            .ok_or_else(|| StoreError::MissingCollection(collection.to_string()))?;

        Ok(coll
            .records
            .iter()
            .find(|r| r.fields.field(path) == Some(value))
            .cloned())
    }
}

/// In-memory index store. Entries keep insertion order.
#[derive(Default)]
pub struct MemoryIndexStore {
    entries: RwLock<Vec<IndexEntry>>,
}

impl MemoryIndexStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Checks whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl IndexStore for MemoryIndexStore {
    async fn insert_entry(
        &self,
        token: CorrelationToken,
        document_id: DocumentId,
    ) -> Result<IndexEntryId, StoreError> {
        let id = IndexEntryId::new();
        self.entries
            .write()
            .await
            .push(IndexEntry { id, correlation_token: token, document_id });
        Ok(id)
    }

    async fn find_by_token(
        &self,
        token: &CorrelationToken,
    ) -> Result<Vec<IndexEntry>, StoreError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| e.correlation_token == *token)
            .cloned()
            .collect())
    }
}

/// In-memory key vault store.
#[derive(Default)]
pub struct MemoryKeyVaultStore {
    records: RwLock<Vec<DataKeyRecord>>,
}

impl MemoryKeyVaultStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyVaultStore for MemoryKeyVaultStore {
    async fn insert_data_key(&self, record: DataKeyRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.id == record.id) {
            return Err(StoreError::WriteRejected(format!(
                "data key `{}` already exists",
                record.id
            )));
        }
        records.push(record);
        Ok(())
    }

    async fn find_data_key(&self, id: DekId) -> Result<Option<DataKeyRecord>, StoreError> {
        Ok(self.records.read().await.iter().find(|r| r.id == id).cloned())
    }

    async fn find_data_key_by_alt_name(
        &self,
        alt_name: &str,
    ) -> Result<Option<DataKeyRecord>, StoreError> {
        Ok(self.records.read().await.iter().find(|r| r.alt_name == alt_name).cloned())
    }

    async fn drop_vault(&self) -> Result<(), StoreError> {
        self.records.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EncryptedFieldSpec;

    fn invoice_fields(tag: u8) -> EncryptedInvoiceFields {
        EncryptedInvoiceFields {
            ssn: vec![tag],
            xml: vec![tag, 1],
            content_type: vec![tag, 2],
            creation_time: vec![tag, 3],
            file_name: vec![tag, 4],
        }
    }

    #[tokio::test]
    async fn test_create_collection_rejects_equality_on_object() {
        let store = MemoryDocumentStore::new();
        let schema = CollectionSchema::new(
            "invoices",
            vec![EncryptedFieldSpec::equality("billing", FieldType::Object)],
        );

        let result = store.create_collection(schema).await;
        assert!(matches!(result, Err(StoreError::SchemaRejected(_))));
        // No partial schema usable after rejection.
        assert!(!store.collection_exists("invoices").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_collection_rejects_duplicate_paths() {
        let store = MemoryDocumentStore::new();
        let schema = CollectionSchema::new(
            "invoices",
            vec![
                EncryptedFieldSpec::new("ssn", FieldType::String),
                EncryptedFieldSpec::new("ssn", FieldType::String),
            ],
        );

        let result = store.create_collection(schema).await;
        assert!(matches!(result, Err(StoreError::SchemaRejected(_))));
    }

    #[tokio::test]
    async fn test_create_collection_rejects_existing() {
        let store = MemoryDocumentStore::new();
        let schema = CollectionSchema::invoice_default("invoiceXml");

        store.create_collection(schema.clone()).await.unwrap();
        let result = store.create_collection(schema).await;
        assert!(matches!(result, Err(StoreError::WriteRejected(_))));
    }

    #[tokio::test]
    async fn test_insert_requires_provisioned_collection() {
        let store = MemoryDocumentStore::new();
        let result = store.insert_document("invoiceXml", invoice_fields(1)).await;
        assert!(matches!(result, Err(StoreError::MissingCollection(_))));
    }

    #[tokio::test]
    async fn test_insert_and_find_by_id() {
        let store = MemoryDocumentStore::new();
        store
            .create_collection(CollectionSchema::invoice_default("invoiceXml"))
            .await
            .unwrap();

        let id = store.insert_document("invoiceXml", invoice_fields(1)).await.unwrap();
        let found = store.find_document("invoiceXml", id).await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.fields, invoice_fields(1));

        let missing = store.find_document("invoiceXml", DocumentId::new()).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_find_by_equality_field() {
        let store = MemoryDocumentStore::new();
        store
            .create_collection(CollectionSchema::invoice_default("invoiceXml"))
            .await
            .unwrap();

        let id1 = store.insert_document("invoiceXml", invoice_fields(1)).await.unwrap();
        store.insert_document("invoiceXml", invoice_fields(2)).await.unwrap();

        let found = store.find_document_eq("invoiceXml", "ssn", &[1]).await.unwrap().unwrap();
        assert_eq!(found.id, id1);

        let none = store.find_document_eq("invoiceXml", "ssn", &[9]).await.unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_index_entries_keep_insertion_order() {
        let store = MemoryIndexStore::new();
        let token = CorrelationToken::generate();
        let first_doc = DocumentId::new();
        let second_doc = DocumentId::new();

        store.insert_entry(token, first_doc).await.unwrap();
        store.insert_entry(token, second_doc).await.unwrap();

        let entries = store.find_by_token(&token).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].document_id, first_doc);
        assert_eq!(entries[1].document_id, second_doc);
    }

    #[tokio::test]
    async fn test_index_has_no_uniqueness_constraint() {
        let store = MemoryIndexStore::new();
        let token = CorrelationToken::generate();

        // Two writes with the same token both succeed; uniqueness is the
        // coordinator's job.
        store.insert_entry(token, DocumentId::new()).await.unwrap();
        store.insert_entry(token, DocumentId::new()).await.unwrap();
        assert_eq!(store.len().await, 2);
    }
}
