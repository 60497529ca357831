//! Dual-write coordination across the encrypted and index stores.
//!
//! An insert is a two-step saga: the encrypted record is written first,
//! then the plaintext index entry. The two stores are independent, so a
//! failure between the steps leaves an orphaned encrypted record with
//! no index entry. That window is part of the contract; see
//! [`DualWriteCoordinator::insert`] for the exact semantics.

use crate::codec::EncryptionCodec;
use crate::config::Config;
use crate::document::{CorrelationToken, DocumentId, IndexEntryId, InvoiceRecord};
use crate::error::Error;
use crate::store::{timed, DocumentStore, IndexStore};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of one successful insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertReceipt {
    /// Caller-facing lookup token, unique by construction.
    pub correlation_token: CorrelationToken,
    /// Server-generated id of the encrypted record.
    pub document_id: DocumentId,
    /// Server-generated id of the index entry.
    pub index_entry_id: IndexEntryId,
    /// File name stored alongside the record.
    pub file_name: String,
}

/// Aggregated outcome of a bulk insert.
///
/// Partial success is the normal case under faults: each record is
/// independently subject to the single-insert failure semantics, and
/// the batch is never treated as all-or-nothing.
#[derive(Debug, Default)]
pub struct BulkOutcome {
    /// Receipts of the records that committed fully.
    pub receipts: Vec<InsertReceipt>,
    /// Errors of the records that failed, in submission order.
    pub failures: Vec<Error>,
}

impl BulkOutcome {
    /// Number of records that committed fully.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.receipts.len()
    }

    /// Number of records that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Writes encrypted records and their index entries as a two-step saga.
pub struct DualWriteCoordinator {
    codec: Arc<EncryptionCodec>,
    documents: Arc<dyn DocumentStore>,
    index: Arc<dyn IndexStore>,
    collection: String,
    file_name_template: String,
    op_timeout: Duration,
}

impl DualWriteCoordinator {
    /// Creates a coordinator over the two stores.
    ///
    /// Collection name, file name template, and per-round-trip timeout
    /// come from `config`; the coordinator never re-reads configuration
    /// after construction.
    #[must_use]
    pub fn new(
        codec: Arc<EncryptionCodec>,
        documents: Arc<dyn DocumentStore>,
        index: Arc<dyn IndexStore>,
        config: &Config,
    ) -> Self {
        Self {
            codec,
            documents,
            index,
            collection: config.encrypted_namespace().collection().to_string(),
            file_name_template: config.file_name_template().to_string(),
            op_timeout: config.op_timeout(),
        }
    }

    /// Inserts one record into the encrypted store and its entry into
    /// the index store.
    ///
    /// The encrypted-record write is strictly ordered before the index
    /// write. If the record write fails, no index entry exists and the
    /// whole operation failed cleanly. If the index write fails after
    /// the record committed, the error is [`Error::IndexWrite`]: the
    /// encrypted record is persisted but unreachable by token. Retrying
    /// is safe only as a fresh insert with a new token; reusing the
    /// failed token would duplicate the encrypted record under another
    /// document id, still unindexed.
    ///
    /// # Errors
    ///
    /// Encryption and record-write errors propagate as-is;
    /// [`Error::IndexWrite`] signals the orphan case above.
    pub async fn insert(
        &self,
        content: Vec<u8>,
        content_type: impl Into<String>,
    ) -> Result<InsertReceipt, Error> {
        let correlation_token = CorrelationToken::generate();
        let file_name = self.file_name_template.replace("{token}", &correlation_token.to_string());

        let record = InvoiceRecord {
            correlation_token,
            content,
            content_type: content_type.into(),
            creation_time: Utc::now(),
            file_name: file_name.clone(),
        };
        let fields = self.codec.encrypt_record(&record).await?;

        let document_id = timed(
            self.op_timeout,
            self.documents.insert_document(&self.collection, fields),
        )
        .await?;

        let index_entry_id = timed(
            self.op_timeout,
            self.index.insert_entry(correlation_token, document_id),
        )
        .await
        .map_err(|source| {
            tracing::error!(
                token = %correlation_token,
                document_id = %document_id,
                "index write failed after record commit; encrypted record is orphaned"
            );
            Error::IndexWrite { token: correlation_token, document_id, source }
        })?;

        tracing::debug!(token = %correlation_token, document_id = %document_id, "record inserted");

        Ok(InsertReceipt { correlation_token, document_id, index_entry_id, file_name })
    }

    /// Inserts `count` records produced by `content`, one at a time.
    ///
    /// Each record is independently subject to [`Self::insert`]'s
    /// failure semantics; failures are collected, never aborting the
    /// rest of the batch.
    pub async fn bulk_insert<F>(&self, count: usize, mut content: F) -> BulkOutcome
    where
        F: FnMut(usize) -> (Vec<u8>, String),
    {
        let mut outcome = BulkOutcome::default();
        for i in 0..count {
            let (bytes, content_type) = content(i);
            match self.insert(bytes, content_type).await {
                Ok(receipt) => outcome.receipts.push(receipt),
                Err(err) => outcome.failures.push(err),
            }
        }
        tracing::info!(
            succeeded = outcome.succeeded(),
            failed = outcome.failed(),
            "bulk insert finished"
        );
        outcome
    }
}
