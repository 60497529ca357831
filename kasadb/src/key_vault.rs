//! Key vault manager.
//!
//! The manager exclusively owns credential and data-key lifecycle: it
//! holds the registry of master key providers, creates data encryption
//! keys lazily on first use, and resolves them back to plaintext
//! material at read time. Any I/O failure against the key vault store is
//! fatal to the calling operation; nothing here retries.

use crate::codec::AutoEncryptionConfig;
use crate::config::Namespace;
use crate::error::{Error, KeyProviderError};
use crate::kdf::generate_dek_material;
use crate::key_provider::{MasterKeyCredential, MasterKeyProvider};
use crate::store::{timed, KeyVaultStore};
use chrono::{DateTime, Utc};
use secrecy::SecretVec;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Identifier of a data encryption key record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DekId(Uuid);

impl DekId {
    /// Generates a new unique identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the raw 16 identifier bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Reconstructs an identifier from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for DekId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DekId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A data encryption key record as persisted in the key vault.
///
/// The key material is stored wrapped under the master key named by
/// `provider` / `master_key_id`. Records are never deleted while any
/// ciphertext referencing them exists: deleting a record orphans every
/// field value encrypted under it, which is why the manager offers no
/// delete operation at all. Resets go through
/// [`KeyVaultStore::drop_vault`], which destroys the whole vault and is
/// gated behind the destructive provisioning mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataKeyRecord {
    /// Record identifier, referenced by ciphertext headers.
    pub id: DekId,
    /// Stable lookup name, e.g. `invoiceXml.ssn`.
    pub alt_name: String,
    /// Name of the provider whose master key wraps this key.
    pub provider: String,
    /// Provider-scoped master key identifier.
    pub master_key_id: String,
    /// Wrapped key material.
    pub wrapped_key: Vec<u8>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Manages master key credentials and data encryption keys.
pub struct KeyVaultManager {
    store: Arc<dyn KeyVaultStore>,
    providers: HashMap<String, Arc<dyn MasterKeyProvider>>,
    namespace: Namespace,
    op_timeout: Duration,
}

impl KeyVaultManager {
    /// Creates a manager over the given key vault store.
    ///
    /// # Arguments
    ///
    /// * `store` - Key vault store holding wrapped data keys
    /// * `namespace` - Namespace of the key vault collection
    /// * `op_timeout` - Per-round-trip timeout for vault access
    #[must_use]
    pub fn new(store: Arc<dyn KeyVaultStore>, namespace: Namespace, op_timeout: Duration) -> Self {
        Self { store, providers: HashMap::new(), namespace, op_timeout }
    }

    /// Registers a master key provider under its own name.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn MasterKeyProvider>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    /// Returns the key vault namespace.
    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn provider(&self, name: &str) -> Result<&Arc<dyn MasterKeyProvider>, KeyProviderError> {
        self.providers
            .get(name)
            .ok_or_else(|| KeyProviderError::UnknownProvider(name.to_string()))
    }

    /// Loads or creates the master key credential for a provider.
    ///
    /// With `generate_new` set, the provider synthesizes and persists
    /// fresh key material; otherwise existing material is loaded by
    /// provider identity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyProvider`] if the provider name is
    /// unrecognized or persisted material is missing when
    /// `generate_new` is false.
    pub async fn get_or_create_master_key_credential(
        &self,
        provider_name: &str,
        generate_new: bool,
    ) -> Result<MasterKeyCredential, Error> {
        let provider = self.provider(provider_name)?;
        let credential = provider.ensure_master_key(generate_new).await?;
        tracing::debug!(
            provider = provider_name,
            key_id = credential.key_id(),
            "master key credential ready"
        );
        Ok(credential)
    }

    /// Builds the configuration consumed by the encryption codec.
    ///
    /// Pure; no side effects.
    #[must_use]
    pub fn auto_encryption_config(&self, credential: &MasterKeyCredential) -> AutoEncryptionConfig {
        AutoEncryptionConfig::new(self.namespace.clone(), credential.clone())
    }

    /// Binds this manager and a credential into a context for explicit
    /// key operations.
    #[must_use]
    pub fn client_encryption_context(
        self: &Arc<Self>,
        credential: MasterKeyCredential,
    ) -> ClientEncryptionContext {
        ClientEncryptionContext { manager: Arc::clone(self), credential }
    }

    /// Creates a new data key wrapped under `credential` and persists it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyProvider`] if wrapping fails or the
    /// credential's provider is unregistered, or [`Error::Store`] if the
    /// vault write fails.
    pub async fn create_data_key(
        &self,
        credential: &MasterKeyCredential,
        alt_name: &str,
    ) -> Result<DekId, Error> {
        let provider = self.provider(credential.provider())?;

        let material = generate_dek_material();
        let wrapped_key = provider.wrap_dek(credential, &material).await?;

        let record = DataKeyRecord {
            id: DekId::new(),
            alt_name: alt_name.to_string(),
            provider: credential.provider().to_string(),
            master_key_id: credential.key_id().to_string(),
            wrapped_key,
            created_at: Utc::now(),
        };
        let id = record.id;

        timed(self.op_timeout, self.store.insert_data_key(record)).await?;
        tracing::info!(%id, alt_name, "created data encryption key");
        Ok(id)
    }

    /// Looks up a data key by alternate name, creating it on first use.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::create_data_key`].
    pub async fn get_or_create_data_key(
        &self,
        credential: &MasterKeyCredential,
        alt_name: &str,
    ) -> Result<DekId, Error> {
        let existing = timed(self.op_timeout, self.store.find_data_key_by_alt_name(alt_name))
            .await?;
        match existing {
            Some(record) => Ok(record.id),
            None => self.create_data_key(credential, alt_name).await,
        }
    }

    /// Resolves a data key id to its unwrapped material.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] if no record exists for `id` (the
    /// designed failure mode after rotation or vault loss), or
    /// [`Error::KeyProvider`] if the record's provider is unregistered
    /// or unwrapping fails.
    pub async fn resolve_data_key(&self, id: DekId) -> Result<SecretVec<u8>, Error> {
        let record = timed(self.op_timeout, self.store.find_data_key(id))
            .await?
            .ok_or_else(|| Error::KeyNotFound(id.to_string()))?;

        let provider = self.provider(&record.provider)?;
        let credential = MasterKeyCredential::new(&record.provider, &record.master_key_id);
        let material = provider.unwrap_dek(&credential, &record.wrapped_key).await?;
        Ok(material)
    }
}

/// Context for explicit key operations, bound to one credential.
///
/// Obtained from [`KeyVaultManager::client_encryption_context`]; used by
/// the codec to create per-field data keys at construction and resolve
/// them at read time.
#[derive(Clone)]
pub struct ClientEncryptionContext {
    manager: Arc<KeyVaultManager>,
    credential: MasterKeyCredential,
}

impl ClientEncryptionContext {
    /// Returns the bound credential.
    #[must_use]
    pub fn credential(&self) -> &MasterKeyCredential {
        &self.credential
    }

    /// Looks up a data key by alternate name, creating it on first use.
    ///
    /// # Errors
    ///
    /// See [`KeyVaultManager::get_or_create_data_key`].
    pub async fn get_or_create_data_key(&self, alt_name: &str) -> Result<DekId, Error> {
        self.manager.get_or_create_data_key(&self.credential, alt_name).await
    }

    /// Resolves a data key id to its unwrapped material.
    ///
    /// # Errors
    ///
    /// See [`KeyVaultManager::resolve_data_key`].
    pub async fn resolve_data_key(&self, id: DekId) -> Result<SecretVec<u8>, Error> {
        self.manager.resolve_data_key(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKeyVaultStore;
    use async_trait::async_trait;
    use secrecy::ExposeSecret;

    // Mock provider that XORs key material with a fixed master key.
    struct XorProvider;

    const MASTER: u8 = 0x5A;

    #[async_trait]
    impl MasterKeyProvider for XorProvider {
        fn name(&self) -> &str {
            "local"
        }

        async fn ensure_master_key(
            &self,
            generate_new: bool,
        ) -> Result<MasterKeyCredential, KeyProviderError> {
            if generate_new {
                Ok(MasterKeyCredential::new("local", "cmk_test"))
            } else {
                Err(KeyProviderError::MissingKeyMaterial("no persisted key".to_string()))
            }
        }

        async fn wrap_dek(
            &self,
            _credential: &MasterKeyCredential,
            dek: &SecretVec<u8>,
        ) -> Result<Vec<u8>, KeyProviderError> {
            Ok(dek.expose_secret().iter().map(|b| b ^ MASTER).collect())
        }

        async fn unwrap_dek(
            &self,
            _credential: &MasterKeyCredential,
            wrapped: &[u8],
        ) -> Result<SecretVec<u8>, KeyProviderError> {
            Ok(SecretVec::new(wrapped.iter().map(|b| b ^ MASTER).collect()))
        }
    }

    fn manager() -> Arc<KeyVaultManager> {
        Arc::new(
            KeyVaultManager::new(
                Arc::new(MemoryKeyVaultStore::new()),
                Namespace::new("encryption", "__keyVault"),
                Duration::from_secs(1),
            )
            .with_provider(Arc::new(XorProvider)),
        )
    }

    #[tokio::test]
    async fn test_unknown_provider_is_rejected() {
        let manager = manager();
        let result = manager.get_or_create_master_key_credential("gcp", true).await;
        assert!(matches!(
            result,
            Err(Error::KeyProvider(KeyProviderError::UnknownProvider(_)))
        ));
    }

    #[tokio::test]
    async fn test_missing_material_without_generate_new() {
        let manager = manager();
        let result = manager.get_or_create_master_key_credential("local", false).await;
        assert!(matches!(
            result,
            Err(Error::KeyProvider(KeyProviderError::MissingKeyMaterial(_)))
        ));
    }

    #[tokio::test]
    async fn test_data_key_created_lazily_then_reused() {
        let manager = manager();
        let credential =
            manager.get_or_create_master_key_credential("local", true).await.unwrap();

        let first = manager.get_or_create_data_key(&credential, "invoiceXml.ssn").await.unwrap();
        let second = manager.get_or_create_data_key(&credential, "invoiceXml.ssn").await.unwrap();
        assert_eq!(first, second);

        let other = manager.get_or_create_data_key(&credential, "invoiceXml.xml").await.unwrap();
        assert_ne!(first, other);
    }

    #[tokio::test]
    async fn test_resolve_round_trips_material() {
        let manager = manager();
        let credential =
            manager.get_or_create_master_key_credential("local", true).await.unwrap();

        let id = manager.create_data_key(&credential, "invoiceXml.ssn").await.unwrap();
        let material = manager.resolve_data_key(id).await.unwrap();
        assert_eq!(material.expose_secret().len(), crate::kdf::DEK_MATERIAL_SIZE);
    }

    #[tokio::test]
    async fn test_resolve_unknown_key_fails() {
        let manager = manager();
        let result = manager.resolve_data_key(DekId::new()).await;
        assert!(matches!(result, Err(Error::KeyNotFound(_))));
    }

    #[tokio::test]
    async fn test_client_encryption_context_binds_credential() {
        let manager = manager();
        let credential =
            manager.get_or_create_master_key_credential("local", true).await.unwrap();
        let ctx = manager.client_encryption_context(credential.clone());

        assert_eq!(ctx.credential(), &credential);
        let id = ctx.get_or_create_data_key("invoiceXml.fileName").await.unwrap();
        assert!(ctx.resolve_data_key(id).await.is_ok());
    }
}
