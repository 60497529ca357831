//! Master key provider abstraction.

use crate::error::KeyProviderError;
use async_trait::async_trait;
use secrecy::SecretVec;

/// Opaque reference to customer master key material held by a provider.
///
/// Credentials are write-once: rotation means creating a new credential
/// and re-wrapping affected data keys under it, never mutating an
/// existing one. Several credentials may be active at a time, one per
/// provider configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterKeyCredential {
    provider: String,
    key_id: String,
}

impl MasterKeyCredential {
    /// Creates a credential for the given provider and key identifier.
    #[must_use]
    pub fn new(provider: impl Into<String>, key_id: impl Into<String>) -> Self {
        Self { provider: provider.into(), key_id: key_id.into() }
    }

    /// Returns the provider name (e.g. `"local"`).
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Returns the provider-scoped key identifier.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }
}

/// Provides master key operations for data key protection.
///
/// Implementations must be thread-safe (`Send + Sync`) to support
/// concurrent encryption operations. I/O failures are surfaced to the
/// caller, never retried locally.
#[async_trait]
pub trait MasterKeyProvider: Send + Sync {
    /// Returns the provider name this implementation registers under.
    fn name(&self) -> &str;

    /// Loads the active master key credential, creating fresh key
    /// material first when `generate_new` is true.
    ///
    /// # Errors
    ///
    /// Returns [`KeyProviderError::MissingKeyMaterial`] if no persisted
    /// material exists and `generate_new` is false, or
    /// [`KeyProviderError::CreationFailed`] if key creation fails.
    async fn ensure_master_key(
        &self,
        generate_new: bool,
    ) -> Result<MasterKeyCredential, KeyProviderError>;

    /// Wraps (encrypts) DEK material under the credential's master key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyProviderError::WrapFailed`] if wrapping fails.
    async fn wrap_dek(
        &self,
        credential: &MasterKeyCredential,
        dek: &SecretVec<u8>,
    ) -> Result<Vec<u8>, KeyProviderError>;

    /// Unwraps (decrypts) DEK material using the credential's master key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyProviderError::UnwrapFailed`] if unwrapping fails.
    async fn unwrap_dek(
        &self,
        credential: &MasterKeyCredential,
        wrapped: &[u8],
    ) -> Result<SecretVec<u8>, KeyProviderError>;
}
