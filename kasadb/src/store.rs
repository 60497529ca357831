//! Store abstractions for the three logical collections.
//!
//! The system talks to three independently-failable stores: the
//! encrypted document collection, the plaintext index collection, and
//! the key vault collection. Only the logical separation matters here;
//! whether two traits are backed by the same physical deployment is a
//! backend concern. Every round trip is individually timeout-bound via
//! [`timed`], and a timeout is treated identically to a failure of that
//! round trip.

use crate::document::{
    CorrelationToken, DocumentId, EncryptedInvoiceFields, EncryptedInvoiceRecord, IndexEntry,
    IndexEntryId,
};
use crate::key_vault::{DataKeyRecord, DekId};
use crate::schema::CollectionSchema;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Errors surfaced by store backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Store unreachable or refusing connections
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Round trip exceeded the configured timeout
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    /// Target collection has not been provisioned
    #[error("collection `{0}` does not exist")]
    MissingCollection(String),

    /// Store rejected the declared encryption schema
    #[error("schema rejected: {0}")]
    SchemaRejected(String),

    /// Store rejected a write
    #[error("write rejected: {0}")]
    WriteRejected(String),
}

/// Runs a store round trip under a timeout.
///
/// # Errors
///
/// Returns [`StoreError::Timeout`] if the future does not complete in
/// time, or the future's own error otherwise.
pub async fn timed<T, F>(timeout: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(timeout, fut).await.map_err(|_| StoreError::Timeout(timeout))?
}

/// Store holding encrypted invoice records.
///
/// Equality filters operate over ciphertext: for a field provisioned
/// with equality support, deterministic encryption makes ciphertext
/// comparison equivalent to plaintext comparison.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Creates a collection with an enforced encryption schema.
    ///
    /// Validation is atomic: on rejection no partial schema may be left
    /// in a usable state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SchemaRejected`] if the schema is invalid,
    /// or [`StoreError::WriteRejected`] if the collection already exists.
    async fn create_collection(&self, schema: CollectionSchema) -> Result<(), StoreError>;

    /// Drops a collection and all of its records. Missing collections
    /// are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    async fn drop_collection(&self, collection: &str) -> Result<(), StoreError>;

    /// Checks whether a collection has been provisioned.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    async fn collection_exists(&self, collection: &str) -> Result<bool, StoreError>;

    /// Inserts one encrypted record, returning its server-generated id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingCollection`] if the collection has
    /// not been provisioned.
    async fn insert_document(
        &self,
        collection: &str,
        fields: EncryptedInvoiceFields,
    ) -> Result<DocumentId, StoreError>;

    /// Fetches one encrypted record by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingCollection`] if the collection has
    /// not been provisioned.
    async fn find_document(
        &self,
        collection: &str,
        id: DocumentId,
    ) -> Result<Option<EncryptedInvoiceRecord>, StoreError>;

    /// Finds the first record whose ciphertext at `path` equals `value`.
    ///
    /// Only meaningful for fields encrypted deterministically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingCollection`] if the collection has
    /// not been provisioned.
    async fn find_document_eq(
        &self,
        collection: &str,
        path: &str,
        value: &[u8],
    ) -> Result<Option<EncryptedInvoiceRecord>, StoreError>;
}

/// Plaintext store mapping correlation tokens to encrypted record ids.
///
/// May live on a physically distinct deployment from the document store;
/// the coordinator only relies on the logical separation.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Inserts one index entry, returning its server-generated id.
    ///
    /// The store enforces no uniqueness constraint on tokens; uniqueness
    /// is guaranteed by token generation.
    ///
    /// # Errors
    ///
    /// Returns an error if the write is rejected or the store cannot be
    /// reached.
    async fn insert_entry(
        &self,
        token: CorrelationToken,
        document_id: DocumentId,
    ) -> Result<IndexEntryId, StoreError>;

    /// Returns all entries for a token, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    async fn find_by_token(&self, token: &CorrelationToken)
        -> Result<Vec<IndexEntry>, StoreError>;
}

/// Store holding wrapped data encryption key records.
#[async_trait]
pub trait KeyVaultStore: Send + Sync {
    /// Persists one data key record.
    ///
    /// # Errors
    ///
    /// Returns an error if the write is rejected or the store cannot be
    /// reached.
    async fn insert_data_key(&self, record: DataKeyRecord) -> Result<(), StoreError>;

    /// Fetches a data key record by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    async fn find_data_key(&self, id: DekId) -> Result<Option<DataKeyRecord>, StoreError>;

    /// Fetches a data key record by its stable alternate name.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    async fn find_data_key_by_alt_name(
        &self,
        alt_name: &str,
    ) -> Result<Option<DataKeyRecord>, StoreError>;

    /// Drops the whole key vault collection.
    ///
    /// Reset scenarios only: every ciphertext encrypted under a dropped
    /// key becomes permanently unreadable.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    async fn drop_vault(&self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timed_passes_through_success() {
        let result: Result<u32, StoreError> =
            timed(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_timed_passes_through_error() {
        let result: Result<u32, StoreError> = timed(Duration::from_secs(1), async {
            Err(StoreError::Unavailable("down".to_string()))
        })
        .await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_maps_elapse_to_timeout() {
        let timeout = Duration::from_millis(10);
        let result: Result<u32, StoreError> = timed(timeout, async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(1)
        })
        .await;
        assert!(matches!(result, Err(StoreError::Timeout(t)) if t == timeout));
    }
}
