//! High-level encrypted invoice store.
//!
//! [`InvoiceStore`] wires provisioning, the key vault, the codec, the
//! dual-write coordinator, and the query resolver into one handle. This
//! is the surface an HTTP layer or CLI talks to.

use crate::codec::EncryptionCodec;
use crate::config::Config;
use crate::coordinator::{BulkOutcome, DualWriteCoordinator, InsertReceipt};
use crate::document::{CorrelationToken, DecryptedInvoice};
use crate::error::Error;
use crate::key_provider::MasterKeyProvider;
use crate::key_vault::KeyVaultManager;
use crate::resolver::QueryResolver;
use crate::schema::{CollectionSchema, ProvisionMode, SchemaProvisioner};
use crate::store::{DocumentStore, IndexStore, KeyVaultStore};
use std::sync::Arc;

/// Handles to the three backing stores.
///
/// The stores are logically independent and may live on physically
/// distinct deployments; nothing in this crate assumes otherwise.
#[derive(Clone)]
pub struct StoreHandles {
    /// Store holding encrypted invoice records.
    pub documents: Arc<dyn DocumentStore>,
    /// Plaintext store mapping tokens to record ids.
    pub index: Arc<dyn IndexStore>,
    /// Store holding wrapped data key records.
    pub key_vault: Arc<dyn KeyVaultStore>,
}

/// Builder for [`InvoiceStore`].
pub struct InvoiceStoreBuilder {
    config: Config,
    handles: StoreHandles,
    providers: Vec<Arc<dyn MasterKeyProvider>>,
    generate_master_key: bool,
}

impl InvoiceStoreBuilder {
    /// Registers a master key provider.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn MasterKeyProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Whether to synthesize fresh master key material instead of
    /// loading existing material. Defaults to false.
    #[must_use]
    pub const fn generate_master_key(mut self, generate: bool) -> Self {
        self.generate_master_key = generate;
        self
    }

    /// Provisions the encrypted collection and opens the store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Provisioning`] if the store rejects the
    /// collection schema, [`Error::KeyProvider`] if the configured
    /// provider is unregistered or its key material is unavailable, or
    /// codec construction errors.
    pub async fn open(self, mode: ProvisionMode) -> Result<InvoiceStore, Error> {
        let config = self.config;
        let schema =
            CollectionSchema::invoice_default(config.encrypted_namespace().collection());

        let provisioner = SchemaProvisioner::new(
            Arc::clone(&self.handles.documents),
            Arc::clone(&self.handles.key_vault),
            config.op_timeout(),
        );
        provisioner.provision(&schema, mode).await?;

        let mut manager = KeyVaultManager::new(
            Arc::clone(&self.handles.key_vault),
            config.key_vault_namespace().clone(),
            config.op_timeout(),
        );
        for provider in self.providers {
            manager = manager.with_provider(provider);
        }
        let manager = Arc::new(manager);

        let credential = manager
            .get_or_create_master_key_credential(config.kms_provider(), self.generate_master_key)
            .await?;
        let enc_config = manager.auto_encryption_config(&credential);
        let codec = Arc::new(
            EncryptionCodec::for_collection(&manager, &enc_config, &schema, &schema.field_map())
                .await?,
        );

        let coordinator = DualWriteCoordinator::new(
            Arc::clone(&codec),
            Arc::clone(&self.handles.documents),
            Arc::clone(&self.handles.index),
            &config,
        );
        let resolver = QueryResolver::new(
            codec,
            self.handles.documents,
            self.handles.index,
            &config,
        );

        tracing::info!(
            collection = %config.encrypted_namespace(),
            index = %config.index_namespace(),
            "invoice store ready"
        );

        Ok(InvoiceStore { coordinator, resolver })
    }
}

/// Encrypted invoice store with split-index lookup.
pub struct InvoiceStore {
    coordinator: DualWriteCoordinator,
    resolver: QueryResolver,
}

impl InvoiceStore {
    /// Starts building a store over the given configuration and stores.
    #[must_use]
    pub fn builder(config: Config, handles: StoreHandles) -> InvoiceStoreBuilder {
        InvoiceStoreBuilder { config, handles, providers: Vec::new(), generate_master_key: false }
    }

    /// Inserts one invoice; see [`DualWriteCoordinator::insert`] for the
    /// dual-write failure semantics.
    ///
    /// # Errors
    ///
    /// See [`DualWriteCoordinator::insert`].
    pub async fn insert(
        &self,
        content: Vec<u8>,
        content_type: impl Into<String>,
    ) -> Result<InsertReceipt, Error> {
        self.coordinator.insert(content, content_type).await
    }

    /// Inserts `count` invoices, collecting per-record outcomes.
    pub async fn bulk_insert<F>(&self, count: usize, content: F) -> BulkOutcome
    where
        F: FnMut(usize) -> (Vec<u8>, String),
    {
        self.coordinator.bulk_insert(count, content).await
    }

    /// Finds the invoice for a correlation token, decrypted.
    ///
    /// # Errors
    ///
    /// See [`QueryResolver::find_by_correlation_token`].
    pub async fn find_by_correlation_token(
        &self,
        token: &CorrelationToken,
    ) -> Result<Option<DecryptedInvoice>, Error> {
        self.resolver.find_by_correlation_token(token).await
    }
}
