//! Field-level encryption codec.
//!
//! The codec transparently encrypts designated fields on write and
//! decrypts them on read. Exactly two modes exist per field:
//!
//! - **Deterministic** (AES-256-SIV, empty nonce): the same plaintext in
//!   the same field always yields the same ciphertext, enabling equality
//!   queries over ciphertext at the cost of leaking equality patterns.
//! - **Randomized** (ChaCha20-Poly1305, random nonce): no server-side
//!   queries, stronger confidentiality.
//!
//! Every ciphertext carries a [`CiphertextHeader`] referencing the data
//! key it was produced under, so reads resolve keys through the vault
//! and fail with a key-not-found error when material has been rotated
//! away, never with silent corruption.

use crate::context::FieldContext;
use crate::document::{
    paths, DecryptedInvoice, EncryptedInvoiceFields, EncryptedInvoiceRecord, InvoiceRecord,
};
use crate::error::Error;
use crate::header::{CiphertextHeader, HeaderFlags};
use crate::kdf::{derive_field_key, AEAD_KEY_SIZE, SIV_KEY_SIZE};
use crate::key_provider::MasterKeyCredential;
use crate::key_vault::{ClientEncryptionContext, KeyVaultManager};
use crate::schema::CollectionSchema;
use aes_siv::{
    aead::Payload,
    Aes256SivAead,
};
use chacha20poly1305::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    ChaCha20Poly1305, Nonce,
};
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::config::Namespace;
use crate::key_vault::DekId;

/// Nonce size for ChaCha20-Poly1305 (96 bits).
const NONCE_SIZE: usize = 12;

/// Encryption mode of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMode {
    /// Deterministic encryption; supports equality queries.
    Deterministic,
    /// Randomized encryption; no query support.
    Randomized,
}

impl fmt::Display for EncryptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Deterministic => "deterministic",
            Self::Randomized => "randomized",
        };
        f.write_str(name)
    }
}

/// Caller-declared map of field path to encryption mode.
///
/// Must agree with the provisioned schema exactly; the codec refuses to
/// build otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    entries: BTreeMap<String, EncryptionMode>,
}

impl FieldMap {
    /// Creates an empty field map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field declaration.
    #[must_use]
    pub fn with_field(mut self, path: impl Into<String>, mode: EncryptionMode) -> Self {
        self.entries.insert(path.into(), mode);
        self
    }

    /// Returns the declared mode for `path`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<EncryptionMode> {
        self.entries.get(path).copied()
    }

    /// Iterates over declared `(path, mode)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, EncryptionMode)> {
        self.entries.iter().map(|(p, m)| (p.as_str(), *m))
    }
}

/// Configuration consumed by the codec, produced by
/// [`KeyVaultManager::auto_encryption_config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoEncryptionConfig {
    key_vault_namespace: Namespace,
    credential: MasterKeyCredential,
}

impl AutoEncryptionConfig {
    /// Creates a config binding the key vault namespace and credential.
    #[must_use]
    pub const fn new(key_vault_namespace: Namespace, credential: MasterKeyCredential) -> Self {
        Self { key_vault_namespace, credential }
    }

    /// Returns the key vault namespace.
    #[must_use]
    pub const fn key_vault_namespace(&self) -> &Namespace {
        &self.key_vault_namespace
    }

    /// Returns the master key credential.
    #[must_use]
    pub const fn credential(&self) -> &MasterKeyCredential {
        &self.credential
    }
}

#[derive(Debug, Clone, Copy)]
struct FieldBinding {
    mode: EncryptionMode,
    dek_id: DekId,
}

/// Encrypts and decrypts designated fields of invoice records.
pub struct EncryptionCodec {
    ctx: ClientEncryptionContext,
    collection: String,
    bindings: HashMap<String, FieldBinding>,
}

impl EncryptionCodec {
    /// Builds a codec for one collection, binding each declared field to
    /// a data key (created lazily on first use).
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`] if `fields` disagrees with the
    /// provisioned `schema` on any path or mode, or key vault errors if
    /// data key creation fails.
    pub async fn for_collection(
        manager: &Arc<KeyVaultManager>,
        config: &AutoEncryptionConfig,
        schema: &CollectionSchema,
        fields: &FieldMap,
    ) -> Result<Self, Error> {
        for spec in schema.fields() {
            let requested = fields.get(&spec.path).ok_or_else(|| Error::SchemaMismatch {
                path: spec.path.clone(),
                declared: spec.mode().to_string(),
                requested: "undeclared".to_string(),
            })?;
            if requested != spec.mode() {
                return Err(Error::SchemaMismatch {
                    path: spec.path.clone(),
                    declared: spec.mode().to_string(),
                    requested: requested.to_string(),
                });
            }
        }
        for (path, mode) in fields.iter() {
            if schema.field(path).is_none() {
                return Err(Error::SchemaMismatch {
                    path: path.to_string(),
                    declared: "unencrypted".to_string(),
                    requested: mode.to_string(),
                });
            }
        }

        let ctx = manager.client_encryption_context(config.credential().clone());
        let collection = schema.collection().to_string();

        let mut bindings = HashMap::new();
        for spec in schema.fields() {
            let alt_name = format!("{collection}.{}", spec.path);
            let dek_id = ctx.get_or_create_data_key(&alt_name).await?;
            bindings.insert(spec.path.clone(), FieldBinding { mode: spec.mode(), dek_id });
        }

        Ok(Self { ctx, collection, bindings })
    }

    fn binding(&self, path: &str) -> Result<FieldBinding, Error> {
        self.bindings.get(path).copied().ok_or_else(|| Error::SchemaMismatch {
            path: path.to_string(),
            declared: "unencrypted".to_string(),
            requested: "encrypted".to_string(),
        })
    }

    /// Encrypts one field value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`] for an undeclared path, key
    /// vault errors if the bound data key cannot be resolved, or
    /// [`Error::EncryptionFailed`] if the cipher rejects the input.
    pub async fn encrypt_field(&self, path: &str, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        let binding = self.binding(path)?;
        let material = self.ctx.resolve_data_key(binding.dek_id).await?;
        let context = FieldContext::new(&self.collection, path);
        let aad = Zeroizing::new(context.to_string().into_bytes());

        let (ciphertext, flags, nonce) = match binding.mode {
            EncryptionMode::Deterministic => {
                let key = derive_field_key(&material, &context, "siv", SIV_KEY_SIZE)?;
                let cipher = Aes256SivAead::new_from_slice(key.expose_secret())
                    .map_err(|e| Error::EncryptionFailed(format!("invalid SIV key: {e}")))?;

                // AES-SIV is deterministic with an empty nonce.
                let ciphertext = cipher
                    .encrypt(&Default::default(), Payload { msg: plaintext, aad: &aad })
                    .map_err(|e| {
                        Error::EncryptionFailed(format!("AES-SIV encryption failed: {e}"))
                    })?;
                (ciphertext, HeaderFlags::empty().with_deterministic(), Vec::new())
            }
            EncryptionMode::Randomized => {
                let key = derive_field_key(&material, &context, "aead", AEAD_KEY_SIZE)?;
                let cipher = ChaCha20Poly1305::new_from_slice(key.expose_secret())
                    .map_err(|e| Error::EncryptionFailed(format!("invalid AEAD key: {e}")))?;

                let mut nonce_bytes = [0u8; NONCE_SIZE];
                OsRng.fill_bytes(&mut nonce_bytes);
                let nonce = Nonce::from(nonce_bytes);

                let ciphertext = cipher
                    .encrypt(
                        &nonce,
                        chacha20poly1305::aead::Payload { msg: plaintext, aad: &aad },
                    )
                    .map_err(|e| {
                        Error::EncryptionFailed(format!(
                            "ChaCha20-Poly1305 encryption failed: {e}"
                        ))
                    })?;
                (ciphertext, HeaderFlags::empty(), nonce_bytes.to_vec())
            }
        };

        let header = CiphertextHeader::new(binding.dek_id, flags, nonce);
        let header_bytes = header.to_bytes()?;

        let mut result = Vec::with_capacity(header_bytes.len() + ciphertext.len());
        result.extend_from_slice(&header_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    /// Decrypts one field value.
    ///
    /// The data key is resolved by the id in the ciphertext header, not
    /// by the current binding, so values encrypted under an older key of
    /// the same field still decrypt as long as the key record exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`] if the ciphertext mode disagrees
    /// with the declared mode, [`Error::KeyNotFound`] if the referenced
    /// data key is unresolvable, or [`Error::AuthenticationFailed`] if
    /// verification fails.
    pub async fn decrypt_field(&self, path: &str, data: &[u8]) -> Result<Vec<u8>, Error> {
        let binding = self.binding(path)?;
        let (header, header_len) = CiphertextHeader::from_bytes(data)?;
        let encrypted = &data[header_len..];

        let header_mode = if header.flags().is_deterministic() {
            EncryptionMode::Deterministic
        } else {
            EncryptionMode::Randomized
        };
        if header_mode != binding.mode {
            return Err(Error::SchemaMismatch {
                path: path.to_string(),
                declared: binding.mode.to_string(),
                requested: header_mode.to_string(),
            });
        }

        let material = self.ctx.resolve_data_key(header.dek_id()).await?;
        let context = FieldContext::new(&self.collection, path);
        let aad = Zeroizing::new(context.to_string().into_bytes());

        match binding.mode {
            EncryptionMode::Deterministic => {
                let key = derive_field_key(&material, &context, "siv", SIV_KEY_SIZE)?;
                let cipher = Aes256SivAead::new_from_slice(key.expose_secret())
                    .map_err(|e| Error::DecryptionFailed(format!("invalid SIV key: {e}")))?;

                cipher
                    .decrypt(&Default::default(), Payload { msg: encrypted, aad: &aad })
                    .map_err(|_| Error::AuthenticationFailed)
            }
            EncryptionMode::Randomized => {
                let key = derive_field_key(&material, &context, "aead", AEAD_KEY_SIZE)?;
                let cipher = ChaCha20Poly1305::new_from_slice(key.expose_secret())
                    .map_err(|e| Error::DecryptionFailed(format!("invalid AEAD key: {e}")))?;

                let nonce_bytes: [u8; NONCE_SIZE] = header
                    .nonce()
                    .try_into()
                    .map_err(|_| Error::DecryptionFailed("invalid nonce size".to_string()))?;
                let nonce = Nonce::from(nonce_bytes);

                cipher
                    .decrypt(
                        &nonce,
                        chacha20poly1305::aead::Payload { msg: encrypted, aad: &aad },
                    )
                    .map_err(|_| Error::AuthenticationFailed)
            }
        }
    }

    /// Encrypts every designated field of an invoice.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::encrypt_field`].
    pub async fn encrypt_record(
        &self,
        record: &InvoiceRecord,
    ) -> Result<EncryptedInvoiceFields, Error> {
        let token = record.correlation_token.to_string();
        Ok(EncryptedInvoiceFields {
            ssn: self.encrypt_field(paths::SSN, token.as_bytes()).await?,
            xml: self.encrypt_field(paths::XML, &record.content).await?,
            content_type: self
                .encrypt_field(paths::CONTENT_TYPE, record.content_type.as_bytes())
                .await?,
            creation_time: self
                .encrypt_field(paths::CREATION_TIME, record.creation_time.to_rfc3339().as_bytes())
                .await?,
            file_name: self.encrypt_field(paths::FILE_NAME, record.file_name.as_bytes()).await?,
        })
    }

    /// Decrypts every designated field of a stored record.
    ///
    /// All-or-nothing: any field failure fails the whole record, so a
    /// partially decrypted invoice is never returned.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::decrypt_field`], plus
    /// [`Error::DecryptionFailed`] if a decrypted field does not parse
    /// back into its declared type.
    pub async fn decrypt_record(
        &self,
        record: &EncryptedInvoiceRecord,
    ) -> Result<DecryptedInvoice, Error> {
        let token_bytes = self.decrypt_field(paths::SSN, &record.fields.ssn).await?;
        let content = self.decrypt_field(paths::XML, &record.fields.xml).await?;
        let content_type_bytes =
            self.decrypt_field(paths::CONTENT_TYPE, &record.fields.content_type).await?;
        let creation_time_bytes =
            self.decrypt_field(paths::CREATION_TIME, &record.fields.creation_time).await?;
        let file_name_bytes =
            self.decrypt_field(paths::FILE_NAME, &record.fields.file_name).await?;

        let correlation_token = String::from_utf8(token_bytes)
            .map_err(|_| Error::DecryptionFailed("token field is not UTF-8".to_string()))?
            .parse()
            .map_err(|_| Error::DecryptionFailed("token field is malformed".to_string()))?;
        let content_type = String::from_utf8(content_type_bytes)
            .map_err(|_| Error::DecryptionFailed("content type is not UTF-8".to_string()))?;
        let file_name = String::from_utf8(file_name_bytes)
            .map_err(|_| Error::DecryptionFailed("file name is not UTF-8".to_string()))?;
        let creation_time = String::from_utf8(creation_time_bytes)
            .ok()
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| Error::DecryptionFailed("creation time is malformed".to_string()))?;

        Ok(DecryptedInvoice {
            id: record.id,
            record: InvoiceRecord {
                correlation_token,
                content,
                content_type,
                creation_time,
                file_name,
            },
        })
    }
}
