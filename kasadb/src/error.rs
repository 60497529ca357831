//! Error types for `KasaDB` operations.

use crate::document::{CorrelationToken, DocumentId};
use crate::store::StoreError;
use std::fmt;

/// Main error type for `KasaDB` operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Key provider operation failed (fatal, requires operator intervention)
    #[error("key provider error: {0}")]
    KeyProvider(#[from] KeyProviderError),

    /// Field mode disagreement between caller and provisioned schema
    /// (fatal, configuration bug)
    #[error("schema mismatch on field `{path}`: provisioned as {declared}, requested as {requested}")]
    SchemaMismatch {
        /// Field path the disagreement was detected on
        path: String,
        /// Mode declared at provisioning time
        declared: String,
        /// Mode requested by the caller
        requested: String,
    },

    /// Schema creation rejected by the store (fatal, surfaced to operator)
    #[error("provisioning failed: {0}")]
    Provisioning(#[source] StoreError),

    /// Encryption operation failed
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption operation failed
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Data key referenced by a ciphertext could not be resolved.
    ///
    /// This is the designed failure mode when key material has been
    /// rotated away or is missing; surfaced per record, never per batch.
    #[error("data key not found: {0}")]
    KeyNotFound(String),

    /// Authentication tag verification failed (data may be corrupted or tampered)
    #[error("authentication failed: ciphertext may be corrupted or tampered")]
    AuthenticationFailed,

    /// Ciphertext header parsing failed
    #[error("invalid ciphertext header: {0}")]
    InvalidHeader(String),

    /// Unsupported ciphertext format version
    #[error("unsupported version: {version} (supported: {supported})")]
    UnsupportedVersion {
        /// The version found in the ciphertext
        version: u8,
        /// Supported versions
        supported: String,
    },

    /// Index write failed after the encrypted record was persisted.
    ///
    /// The outcome is uncertain: the encrypted record identified by
    /// `document_id` exists but is unindexed. Retrying is safe only with
    /// a freshly generated token; reusing `token` risks a duplicate
    /// encrypted record under a new id, still unindexed.
    #[error("index write failed for token {token} (encrypted record {document_id} persisted but unindexed): {source}")]
    IndexWrite {
        /// Token of the failed insert
        token: CorrelationToken,
        /// Identifier of the now-orphaned encrypted record
        document_id: DocumentId,
        /// Underlying index store failure
        #[source]
        source: StoreError,
    },

    /// Namespace string was not of the form `database.collection`
    #[error("invalid namespace `{0}`: expected `database.collection`")]
    InvalidNamespace(String),

    /// Store operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors specific to key provider operations.
#[derive(Debug)]
pub enum KeyProviderError {
    /// Provider name not registered with the key vault manager
    UnknownProvider(String),

    /// Persisted master key material missing and `generate_new` not requested
    MissingKeyMaterial(String),

    /// Master key creation failed
    CreationFailed(String),

    /// DEK wrapping failed
    WrapFailed(String),

    /// DEK unwrapping failed
    UnwrapFailed(String),

    /// I/O operation failed
    Io(std::io::Error),
}

impl fmt::Display for KeyProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownProvider(name) => write!(f, "unknown KMS provider: {name}"),
            Self::MissingKeyMaterial(msg) => write!(f, "master key material missing: {msg}"),
            Self::CreationFailed(msg) => write!(f, "master key creation failed: {msg}"),
            Self::WrapFailed(msg) => write!(f, "DEK wrap failed: {msg}"),
            Self::UnwrapFailed(msg) => write!(f, "DEK unwrap failed: {msg}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for KeyProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for KeyProviderError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
