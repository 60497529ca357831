//! File-based master key provider for `KasaDB`.
//!
//! Stores master key material in the filesystem, suitable for
//! development and testing environments. Production deployments should
//! use a real KMS-backed provider instead.

#![warn(clippy::pedantic, clippy::nursery)]

use chacha20poly1305::{
    aead::{rand_core::RngCore as AeadRngCore, Aead, KeyInit, OsRng},
    ChaCha20Poly1305, Nonce,
};
use async_trait::async_trait;
use kasadb::error::KeyProviderError;
use kasadb::key_provider::{MasterKeyCredential, MasterKeyProvider};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretVec};
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// Size of one master key file in bytes.
pub const MASTER_KEY_SIZE: usize = 96;

/// Portion of the master key used for DEK wrapping.
const WRAP_KEY_SIZE: usize = 32;

const NONCE_SIZE: usize = 12;

const PROVIDER_NAME: &str = "local";

/// File-based master key provider for development and testing.
///
/// Keys are stored in the filesystem with the following structure:
/// ```text
/// keys/
/// ├── cmk_1f0a9c44.key   (96 bytes, 0600 permissions)
/// ├── cmk_7be2d011.key   (96 bytes, 0600 permissions)
/// └── current            (name of the active master key)
/// ```
///
/// Old key files are kept when a new master key is generated, so data
/// keys wrapped under a previous master key stay unwrappable.
pub struct LocalMasterKeyProvider {
    key_dir: PathBuf,
}

impl LocalMasterKeyProvider {
    /// Creates a provider over an existing key directory.
    ///
    /// # Errors
    ///
    /// Returns [`KeyProviderError::CreationFailed`] if the directory does
    /// not exist.
    pub fn new(key_dir: impl Into<PathBuf>) -> Result<Self, KeyProviderError> {
        let key_dir = key_dir.into();
        if !key_dir.is_dir() {
            return Err(KeyProviderError::CreationFailed(format!(
                "key directory does not exist: {}",
                key_dir.display()
            )));
        }
        Ok(Self { key_dir })
    }

    /// Creates the key directory if needed and returns a provider over it.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub async fn init(key_dir: impl Into<PathBuf>) -> Result<Self, KeyProviderError> {
        let key_dir = key_dir.into();
        tokio::fs::create_dir_all(&key_dir).await?;
        Ok(Self { key_dir })
    }

    fn key_path(&self, key_id: &str) -> PathBuf {
        self.key_dir.join(format!("{key_id}.key"))
    }

    fn current_path(&self) -> PathBuf {
        self.key_dir.join("current")
    }

    async fn read_master_key(&self, key_id: &str) -> Result<SecretVec<u8>, KeyProviderError> {
        let path = self.key_path(key_id);
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                KeyProviderError::MissingKeyMaterial(format!(
                    "no key file for `{key_id}` in {}",
                    self.key_dir.display()
                ))
            } else {
                KeyProviderError::Io(e)
            }
        })?;
        if bytes.len() != MASTER_KEY_SIZE {
            return Err(KeyProviderError::MissingKeyMaterial(format!(
                "key file {} has {} bytes, expected {MASTER_KEY_SIZE}",
                path.display(),
                bytes.len()
            )));
        }
        Ok(SecretVec::new(bytes))
    }

    async fn write_master_key(&self, key_id: &str, material: &[u8]) -> Result<(), KeyProviderError> {
        let path = self.key_path(key_id);
        tokio::fs::write(&path, material).await?;
        restrict_permissions(&path).await?;
        tokio::fs::write(self.current_path(), key_id).await?;
        Ok(())
    }

    async fn current_key_id(&self) -> Result<String, KeyProviderError> {
        let bytes = tokio::fs::read(self.current_path()).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                KeyProviderError::MissingKeyMaterial(format!(
                    "no active master key in {}; generate one first",
                    self.key_dir.display()
                ))
            } else {
                KeyProviderError::Io(e)
            }
        })?;
        String::from_utf8(bytes)
            .map(|s| s.trim().to_string())
            .map_err(|_| {
                KeyProviderError::MissingKeyMaterial("current-key marker is not UTF-8".to_string())
            })
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> Result<(), KeyProviderError> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> Result<(), KeyProviderError> {
    Ok(())
}

#[async_trait]
impl MasterKeyProvider for LocalMasterKeyProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn ensure_master_key(
        &self,
        generate_new: bool,
    ) -> Result<MasterKeyCredential, KeyProviderError> {
        if generate_new {
            let mut material = Zeroizing::new(vec![0u8; MASTER_KEY_SIZE]);
            rand::rngs::OsRng.fill_bytes(&mut material);

            let mut suffix = [0u8; 4];
            rand::rngs::OsRng.fill_bytes(&mut suffix);
            let key_id = format!("cmk_{}", hex::encode(suffix));

            self.write_master_key(&key_id, &material).await?;
            return Ok(MasterKeyCredential::new(PROVIDER_NAME, key_id));
        }

        let key_id = self.current_key_id().await?;
        // Fail now rather than at first wrap if the file is unreadable.
        self.read_master_key(&key_id).await?;
        Ok(MasterKeyCredential::new(PROVIDER_NAME, key_id))
    }

    async fn wrap_dek(
        &self,
        credential: &MasterKeyCredential,
        dek: &SecretVec<u8>,
    ) -> Result<Vec<u8>, KeyProviderError> {
        let master = self.read_master_key(credential.key_id()).await?;
        let cipher = ChaCha20Poly1305::new_from_slice(&master.expose_secret()[..WRAP_KEY_SIZE])
            .map_err(|e| KeyProviderError::WrapFailed(format!("invalid wrap key: {e}")))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from(nonce_bytes);

        let ciphertext = cipher
            .encrypt(&nonce, dek.expose_secret().as_slice())
            .map_err(|e| KeyProviderError::WrapFailed(e.to_string()))?;

        let mut wrapped = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        wrapped.extend_from_slice(&nonce_bytes);
        wrapped.extend_from_slice(&ciphertext);
        Ok(wrapped)
    }

    async fn unwrap_dek(
        &self,
        credential: &MasterKeyCredential,
        wrapped: &[u8],
    ) -> Result<SecretVec<u8>, KeyProviderError> {
        if wrapped.len() < NONCE_SIZE {
            return Err(KeyProviderError::UnwrapFailed(
                "wrapped key shorter than nonce".to_string(),
            ));
        }
        let master = self.read_master_key(credential.key_id()).await?;
        let cipher = ChaCha20Poly1305::new_from_slice(&master.expose_secret()[..WRAP_KEY_SIZE])
            .map_err(|e| KeyProviderError::UnwrapFailed(format!("invalid wrap key: {e}")))?;

        let nonce_bytes: [u8; NONCE_SIZE] = wrapped[..NONCE_SIZE]
            .try_into()
            .map_err(|_| KeyProviderError::UnwrapFailed("invalid nonce".to_string()))?;
        let nonce = Nonce::from(nonce_bytes);

        let plaintext = cipher
            .decrypt(&nonce, &wrapped[NONCE_SIZE..])
            .map_err(|_| {
                KeyProviderError::UnwrapFailed(
                    "authentication failed; wrong master key or corrupted data".to_string(),
                )
            })?;
        Ok(SecretVec::new(plaintext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn provider() -> (tempfile::TempDir, LocalMasterKeyProvider) {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalMasterKeyProvider::init(dir.path()).await.unwrap();
        (dir, provider)
    }

    #[tokio::test]
    async fn test_new_requires_existing_directory() {
        let result = LocalMasterKeyProvider::new("/nonexistent/keys");
        assert!(matches!(result, Err(KeyProviderError::CreationFailed(_))));
    }

    #[tokio::test]
    async fn test_missing_material_without_generate_new() {
        let (_dir, provider) = provider().await;
        let result = provider.ensure_master_key(false).await;
        assert!(matches!(result, Err(KeyProviderError::MissingKeyMaterial(_))));
    }

    #[tokio::test]
    async fn test_generate_then_load() {
        let (_dir, provider) = provider().await;

        let created = provider.ensure_master_key(true).await.unwrap();
        assert_eq!(created.provider(), "local");
        assert!(created.key_id().starts_with("cmk_"));

        let loaded = provider.ensure_master_key(false).await.unwrap();
        assert_eq!(loaded, created);
    }

    #[tokio::test]
    async fn test_wrap_unwrap_round_trip() {
        let (_dir, provider) = provider().await;
        let credential = provider.ensure_master_key(true).await.unwrap();

        let dek = SecretVec::new(vec![0x42u8; 64]);
        let wrapped = provider.wrap_dek(&credential, &dek).await.unwrap();
        assert_ne!(wrapped.as_slice(), dek.expose_secret().as_slice());

        let unwrapped = provider.unwrap_dek(&credential, &wrapped).await.unwrap();
        assert_eq!(unwrapped.expose_secret(), dek.expose_secret());
    }

    #[tokio::test]
    async fn test_unwrap_rejects_tampered_data() {
        let (_dir, provider) = provider().await;
        let credential = provider.ensure_master_key(true).await.unwrap();

        let dek = SecretVec::new(vec![0x42u8; 64]);
        let mut wrapped = provider.wrap_dek(&credential, &dek).await.unwrap();
        let len = wrapped.len();
        wrapped[len - 1] ^= 0xFF;

        let result = provider.unwrap_dek(&credential, &wrapped).await;
        assert!(matches!(result, Err(KeyProviderError::UnwrapFailed(_))));
    }

    #[tokio::test]
    async fn test_old_master_key_stays_usable_after_rotation() {
        let (_dir, provider) = provider().await;
        let first = provider.ensure_master_key(true).await.unwrap();

        let dek = SecretVec::new(vec![0x42u8; 64]);
        let wrapped = provider.wrap_dek(&first, &dek).await.unwrap();

        let second = provider.ensure_master_key(true).await.unwrap();
        assert_ne!(first.key_id(), second.key_id());

        // The active key changed but the old file remains unwrappable.
        let current = provider.ensure_master_key(false).await.unwrap();
        assert_eq!(current, second);
        let unwrapped = provider.unwrap_dek(&first, &wrapped).await.unwrap();
        assert_eq!(unwrapped.expose_secret(), dek.expose_secret());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_key_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let (dir, provider) = provider().await;
        let credential = provider.ensure_master_key(true).await.unwrap();

        let path = dir.path().join(format!("{}.key", credential.key_id()));
        let mode = std::fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
