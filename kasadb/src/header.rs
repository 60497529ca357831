//! Ciphertext header format.
//!
//! Every encrypted field value is prefixed with a small header carrying
//! the metadata needed for decryption:
//! - Format version
//! - Identifier of the data key the field was encrypted under
//! - Flags (deterministic vs randomized mode)
//! - Nonce (empty in deterministic mode)
//!
//! The wrapped key material itself lives in the key vault collection; the
//! header only references it by id, so rotating or losing a data key
//! surfaces as a key-resolution failure at read time rather than silent
//! corruption.

use crate::error::Error;
use crate::key_vault::DekId;

/// Format version for field ciphertexts.
pub const FORMAT_VERSION: u8 = 1;

/// Header flags for encryption options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderFlags(u8);

impl HeaderFlags {
    /// Creates empty flags.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Checks if deterministic mode is enabled.
    #[must_use]
    pub const fn is_deterministic(self) -> bool {
        (self.0 & 0x01) != 0
    }

    /// Sets the deterministic mode flag.
    #[must_use]
    pub const fn with_deterministic(mut self) -> Self {
        self.0 |= 0x01;
        self
    }

    /// Returns the raw flags value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// Creates flags from a raw value.
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        Self(value)
    }
}

/// Ciphertext header containing metadata for decryption.
///
/// Format:
/// ```text
/// [version:1][dek_id:16][flags:1][nonce_len:1][nonce:N]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiphertextHeader {
    version: u8,
    dek_id: DekId,
    flags: HeaderFlags,
    nonce: Vec<u8>,
}

impl CiphertextHeader {
    /// Creates a new header for the current format version.
    #[must_use]
    pub fn new(dek_id: DekId, flags: HeaderFlags, nonce: Vec<u8>) -> Self {
        Self { version: FORMAT_VERSION, dek_id, flags, nonce }
    }

    /// Returns the format version.
    #[must_use]
    pub const fn version(&self) -> u8 {
        self.version
    }

    /// Returns the data key identifier.
    #[must_use]
    pub const fn dek_id(&self) -> DekId {
        self.dek_id
    }

    /// Returns the header flags.
    #[must_use]
    pub const fn flags(&self) -> HeaderFlags {
        self.flags
    }

    /// Returns the nonce.
    #[must_use]
    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }

    /// Serializes the header to bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeader`] if the nonce is longer than 255 bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        if self.nonce.len() > 255 {
            return Err(Error::InvalidHeader(format!(
                "nonce too long: {} bytes (max: 255)",
                self.nonce.len()
            )));
        }

        let mut bytes = Vec::with_capacity(19 + self.nonce.len());
        bytes.push(self.version);
        bytes.extend_from_slice(self.dek_id.as_bytes());
        bytes.push(self.flags.as_u8());
        // Safe cast: length validated above (max 255)
        #[allow(clippy::cast_possible_truncation)]
        let nonce_len = self.nonce.len() as u8;
        bytes.push(nonce_len);
        bytes.extend_from_slice(&self.nonce);

        Ok(bytes)
    }

    /// Deserializes a header from bytes, returning the header and the
    /// number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The data is too short
    /// - The version is not supported
    pub fn from_bytes(data: &[u8]) -> Result<(Self, usize), Error> {
        if data.is_empty() {
            return Err(Error::InvalidHeader("empty ciphertext".to_string()));
        }

        let version = data[0];
        if version != FORMAT_VERSION {
            return Err(Error::UnsupportedVersion {
                version,
                supported: FORMAT_VERSION.to_string(),
            });
        }

        let mut pos = 1;

        if pos + 16 > data.len() {
            return Err(Error::InvalidHeader("data key id truncated".to_string()));
        }
        let mut dek_bytes = [0u8; 16];
        dek_bytes.copy_from_slice(&data[pos..pos + 16]);
        let dek_id = DekId::from_bytes(dek_bytes);
        pos += 16;

        if pos >= data.len() {
            return Err(Error::InvalidHeader("missing flags".to_string()));
        }
        let flags = HeaderFlags::from_u8(data[pos]);
        pos += 1;

        if pos >= data.len() {
            return Err(Error::InvalidHeader("missing nonce length".to_string()));
        }
        let nonce_len = data[pos] as usize;
        pos += 1;

        if pos + nonce_len > data.len() {
            return Err(Error::InvalidHeader("nonce truncated".to_string()));
        }
        let nonce = data[pos..pos + nonce_len].to_vec();
        pos += nonce_len;

        Ok((Self { version, dek_id, flags, nonce }, pos))
    }
}
