//! Token-to-document query resolution.
//!
//! The read path of the split-index pattern: look the correlation token
//! up in the plaintext index, fetch the referenced encrypted record,
//! and hand it to the codec for decryption.

use crate::codec::EncryptionCodec;
use crate::config::Config;
use crate::document::{CorrelationToken, DecryptedInvoice};
use crate::error::Error;
use crate::store::{timed, DocumentStore, IndexStore};
use std::sync::Arc;
use std::time::Duration;

/// Resolves correlation tokens to decrypted invoices.
pub struct QueryResolver {
    codec: Arc<EncryptionCodec>,
    documents: Arc<dyn DocumentStore>,
    index: Arc<dyn IndexStore>,
    collection: String,
    op_timeout: Duration,
}

impl QueryResolver {
    /// Creates a resolver over the two stores.
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
            op_timeout: config.op_timeout(),
        }
    }

    /// Finds the invoice for a correlation token, decrypted.
    ///
    /// A lookup miss is `Ok(None)`, never an error. A miss also covers
    /// the orphan case where an encrypted record exists but its index
    /// write failed. Tokens are unique by construction; if a collision
    /// bug ever produces multiple index entries for one token, the first
    /// by insertion order wins, and nothing should rely on that.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] if the record's data key cannot be
    /// resolved, [`Error::AuthenticationFailed`] or
    /// [`Error::DecryptionFailed`] if the record cannot be decrypted in
    /// full, or store errors if either lookup fails. Partially decrypted
    /// output is never returned.
    pub async fn find_by_correlation_token(
        &self,
        token: &CorrelationToken,
    ) -> Result<Option<DecryptedInvoice>, Error> {
        let entries = timed(self.op_timeout, self.index.find_by_token(token)).await?;
        let Some(entry) = entries.first() else {
            tracing::debug!(token = %token, "no index entry for token");
            return Ok(None);
        };
        if entries.len() > 1 {
            tracing::warn!(
                token = %token,
                entries = entries.len(),
                "multiple index entries for one token; using the first"
            );
        }

        let record = timed(
            self.op_timeout,
            self.documents.find_document(&self.collection, entry.document_id),
        )
        .await?;
        let Some(record) = record else {
            // Index entry dangling without its record. The reverse of
            // the orphan window; only reachable through store-level
            // tampering or data loss.
            tracing::warn!(
                token = %token,
                document_id = %entry.document_id,
                "index entry references a missing encrypted record"
            );
            return Ok(None);
        };

        self.codec.decrypt_record(&record).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::DualWriteCoordinator;
    use crate::error::KeyProviderError;
    use crate::key_provider::{MasterKeyCredential, MasterKeyProvider};
    use crate::key_vault::KeyVaultManager;
    use crate::memory::{MemoryDocumentStore, MemoryIndexStore, MemoryKeyVaultStore};
    use crate::schema::{CollectionSchema, ProvisionMode, SchemaProvisioner};
    use async_trait::async_trait;
    use secrecy::{ExposeSecret, SecretVec};

    struct XorProvider;

    #[async_trait]
    impl MasterKeyProvider for XorProvider {
        fn name(&self) -> &str {
            "local"
        }

        async fn ensure_master_key(
            &self,
            _generate_new: bool,
        ) -> Result<MasterKeyCredential, KeyProviderError> {
            Ok(MasterKeyCredential::new("local", "cmk_test"))
        }

        async fn wrap_dek(
            &self,
            _credential: &MasterKeyCredential,
            dek: &SecretVec<u8>,
        ) -> Result<Vec<u8>, KeyProviderError> {
            Ok(dek.expose_secret().iter().map(|b| b ^ 0x77).collect())
        }

        async fn unwrap_dek(
            &self,
            _credential: &MasterKeyCredential,
            wrapped: &[u8],
        ) -> Result<SecretVec<u8>, KeyProviderError> {
            Ok(SecretVec::new(wrapped.iter().map(|b| b ^ 0x77).collect()))
        }
    }

    struct Fixture {
        coordinator: DualWriteCoordinator,
        resolver: QueryResolver,
        vault_store: Arc<MemoryKeyVaultStore>,
    }

    async fn fixture() -> Fixture {
        let config = Config::default();
        let documents: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        let index: Arc<dyn IndexStore> = Arc::new(MemoryIndexStore::new());
        let vault_store = Arc::new(MemoryKeyVaultStore::new());

        let provisioner = SchemaProvisioner::new(
            Arc::clone(&documents),
            Arc::clone(&vault_store) as _,
            config.op_timeout(),
        );
        let schema =
            CollectionSchema::invoice_default(config.encrypted_namespace().collection());
        provisioner.provision(&schema, ProvisionMode::EnsureExists).await.unwrap();

        let manager = Arc::new(
            KeyVaultManager::new(
                Arc::clone(&vault_store) as _,
                config.key_vault_namespace().clone(),
                config.op_timeout(),
            )
            .with_provider(Arc::new(XorProvider)),
        );
        let credential =
            manager.get_or_create_master_key_credential("local", true).await.unwrap();
        let enc_config = manager.auto_encryption_config(&credential);
        let codec = Arc::new(
            EncryptionCodec::for_collection(&manager, &enc_config, &schema, &schema.field_map())
                .await
                .unwrap(),
        );

        Fixture {
            coordinator: DualWriteCoordinator::new(
                Arc::clone(&codec),
                Arc::clone(&documents),
                Arc::clone(&index),
                &config,
            ),
            resolver: QueryResolver::new(codec, documents, index, &config),
            vault_store,
        }
    }

    #[tokio::test]
    async fn test_round_trip_by_token() {
        let fx = fixture().await;
        let receipt =
            fx.coordinator.insert(b"<HDon/>".to_vec(), "application/xml").await.unwrap();

        let found = fx
            .resolver
            .find_by_correlation_token(&receipt.correlation_token)
            .await
            .unwrap()
            .expect("inserted record must resolve");

        assert_eq!(found.id, receipt.document_id);
        assert_eq!(found.record.content, b"<HDon/>");
        assert_eq!(found.record.content_type, "application/xml");
        assert_eq!(found.record.correlation_token, receipt.correlation_token);
    }

    #[tokio::test]
    async fn test_unknown_token_is_a_miss() {
        let fx = fixture().await;
        let found = fx
            .resolver
            .find_by_correlation_token(&CorrelationToken::generate())
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_vault_loss_surfaces_key_not_found() {
        let fx = fixture().await;
        let receipt =
            fx.coordinator.insert(b"payload".to_vec(), "application/xml").await.unwrap();

        use crate::store::KeyVaultStore;
        fx.vault_store.drop_vault().await.unwrap();

        let result =
            fx.resolver.find_by_correlation_token(&receipt.correlation_token).await;
        assert!(matches!(result, Err(Error::KeyNotFound(_))));
    }
}
