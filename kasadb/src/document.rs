//! Record types for the encrypted invoice store.
//!
//! Two physical shapes exist for every invoice: the plaintext
//! [`InvoiceRecord`] seen by callers, and the [`EncryptedInvoiceRecord`]
//! persisted in the encrypted collection, where every sensitive field has
//! been replaced by its ciphertext. The plaintext index collection holds
//! [`IndexEntry`] rows joining a correlation token to the encrypted record.

use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Field paths of the invoice collection.
pub mod paths {
    /// Correlation token field (deterministic, equality-queryable).
    pub const SSN: &str = "ssn";
    /// Invoice payload field (randomized).
    pub const XML: &str = "xml";
    /// Content type field (randomized).
    pub const CONTENT_TYPE: &str = "contentType";
    /// Creation timestamp field (randomized).
    pub const CREATION_TIME: &str = "creationTime";
    /// Generated file name field (randomized).
    pub const FILE_NAME: &str = "fileName";
}

/// Size of a correlation token in bytes (128 bits).
pub const TOKEN_SIZE: usize = 16;

/// Opaque, caller-visible token joining the plaintext index to the
/// encrypted record.
///
/// Tokens are generated from the OS random source and never derived from
/// record content. 128 bits of entropy make collisions across any
/// realistic record count negligible, which is what lets the coordinator
/// guarantee application-level uniqueness by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationToken([u8; TOKEN_SIZE]);

impl CorrelationToken {
    /// Generates a fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Returns the raw token bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; TOKEN_SIZE] {
        &self.0
    }

    /// Reconstructs a token from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; TOKEN_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for CorrelationToken {
    type Err = TokenParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded = hex::decode(s).map_err(|_| TokenParseError)?;
        let bytes: [u8; TOKEN_SIZE] = decoded.try_into().map_err(|_| TokenParseError)?;
        Ok(Self(bytes))
    }
}

/// Error returned when a correlation token string is not 32 hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid correlation token: expected 32 hex characters")]
pub struct TokenParseError;

/// Server-generated identifier of an encrypted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// Generates a new unique identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Server-generated identifier of an index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexEntryId(Uuid);

impl IndexEntryId {
    /// Generates a new unique identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for IndexEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IndexEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Plaintext shape of an invoice, as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceRecord {
    /// Correlation token joining this record to its index entry.
    pub correlation_token: CorrelationToken,
    /// Invoice payload bytes.
    pub content: Vec<u8>,
    /// MIME type of the payload.
    pub content_type: String,
    /// Creation timestamp, set by the coordinator at insert time.
    pub creation_time: DateTime<Utc>,
    /// Generated file name for the payload.
    pub file_name: String,
}

/// Per-field ciphertexts of an invoice, before an id is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedInvoiceFields {
    /// Deterministic ciphertext of the correlation token.
    pub ssn: Vec<u8>,
    /// Randomized ciphertext of the payload.
    pub xml: Vec<u8>,
    /// Randomized ciphertext of the content type.
    pub content_type: Vec<u8>,
    /// Randomized ciphertext of the creation timestamp.
    pub creation_time: Vec<u8>,
    /// Randomized ciphertext of the file name.
    pub file_name: Vec<u8>,
}

impl EncryptedInvoiceFields {
    /// Returns the ciphertext stored at `path`, if the path is known.
    #[must_use]
    pub fn field(&self, path: &str) -> Option<&[u8]> {
        match path {
            paths::SSN => Some(&self.ssn),
            paths::XML => Some(&self.xml),
            paths::CONTENT_TYPE => Some(&self.content_type),
            paths::CREATION_TIME => Some(&self.creation_time),
            paths::FILE_NAME => Some(&self.file_name),
            _ => None,
        }
    }
}

/// An invoice as persisted in the encrypted collection.
///
/// Records are write-once: the id never changes and no field is updated
/// in place after insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedInvoiceRecord {
    /// Server-generated identifier.
    pub id: DocumentId,
    /// Per-field ciphertexts.
    pub fields: EncryptedInvoiceFields,
}

/// A row of the plaintext index collection.
///
/// For every committed encrypted record there is eventually exactly one
/// entry referencing it. The entry is written after the encrypted record,
/// so a lookup miss for a token whose insert reported an index-write
/// failure means the encrypted record is orphaned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Server-generated identifier.
    pub id: IndexEntryId,
    /// Token joining this entry to the encrypted record.
    pub correlation_token: CorrelationToken,
    /// Identifier of the encrypted record.
    pub document_id: DocumentId,
}

/// A fully decrypted invoice returned by the query resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedInvoice {
    /// Identifier of the encrypted record this invoice was read from.
    pub id: DocumentId,
    /// Decrypted record contents.
    pub record: InvoiceRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_display_is_32_hex_chars() {
        let token = CorrelationToken::generate();
        let rendered = token.to_string();
        assert_eq!(rendered.len(), 32);
        assert!(rendered.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_token_round_trip_via_str() {
        let token = CorrelationToken::generate();
        let parsed: CorrelationToken = token.to_string().parse().unwrap();
        assert_eq!(token, parsed);
    }

    #[test]
    fn test_token_parse_rejects_bad_input() {
        assert!("not-hex".parse::<CorrelationToken>().is_err());
        assert!("abcd".parse::<CorrelationToken>().is_err());
        // 34 hex chars, one byte too long
        assert!("00112233445566778899aabbccddeeff00".parse::<CorrelationToken>().is_err());
    }

    #[test]
    fn test_tokens_are_distinct() {
        let a = CorrelationToken::generate();
        let b = CorrelationToken::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_field_accessor_covers_all_paths() {
        let fields = EncryptedInvoiceFields {
            ssn: vec![1],
            xml: vec![2],
            content_type: vec![3],
            creation_time: vec![4],
            file_name: vec![5],
        };

        assert_eq!(fields.field(paths::SSN), Some(&[1u8][..]));
        assert_eq!(fields.field(paths::XML), Some(&[2u8][..]));
        assert_eq!(fields.field(paths::CONTENT_TYPE), Some(&[3u8][..]));
        assert_eq!(fields.field(paths::CREATION_TIME), Some(&[4u8][..]));
        assert_eq!(fields.field(paths::FILE_NAME), Some(&[5u8][..]));
        assert_eq!(fields.field("unknown"), None);
    }
}
