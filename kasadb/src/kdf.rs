//! Key derivation for per-field cipher keys.
//!
//! Each data encryption key (DEK) record holds 64 bytes of random
//! material. The codec never feeds that material to a cipher directly;
//! it derives a per-field subkey with HKDF-SHA256, using the field
//! context and cipher label as the `info` input. Deterministic and
//! randomized mode therefore use unrelated subkeys even when a field map
//! binds them to the same DEK.

use crate::context::FieldContext;
use crate::error::Error;
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretVec};
use sha2::Sha256;

/// Size of raw DEK material in bytes (512 bits).
///
/// Sized for the largest consumer: AES-256-SIV needs a 64-byte key.
pub const DEK_MATERIAL_SIZE: usize = 64;

/// Key size for the randomized AEAD cipher (ChaCha20-Poly1305).
pub const AEAD_KEY_SIZE: usize = 32;

/// Key size for the deterministic cipher (AES-256-SIV).
pub const SIV_KEY_SIZE: usize = 64;

/// Generates fresh random DEK material.
///
/// The material must be wrapped by a master key provider before storage.
#[must_use]
pub fn generate_dek_material() -> SecretVec<u8> {
    let mut material = vec![0u8; DEK_MATERIAL_SIZE];
    OsRng.fill_bytes(&mut material);
    SecretVec::new(material)
}

/// Derives a cipher subkey from DEK material for one field.
///
/// The `info` input is `collection|path|label`, so the same DEK yields
/// different subkeys per field and per cipher label.
///
/// # Arguments
///
/// * `dek` - Unwrapped DEK material
/// * `context` - Field context for domain separation
/// * `label` - Cipher label (`"aead"` or `"siv"`)
/// * `len` - Desired subkey length in bytes
///
/// # Errors
///
/// Returns [`Error::EncryptionFailed`] if HKDF expansion fails for the
/// requested length.
pub fn derive_field_key(
    dek: &SecretVec<u8>,
    context: &FieldContext,
    label: &str,
    len: usize,
) -> Result<SecretVec<u8>, Error> {
    let hkdf = Hkdf::<Sha256>::new(None, dek.expose_secret());

    let info = format!("{context}|{label}");
    let mut key = vec![0u8; len];
    hkdf.expand(info.as_bytes(), &mut key)
        .map_err(|_| Error::EncryptionFailed(format!("key derivation failed for `{info}`")))?;

    Ok(SecretVec::new(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_field_key_deterministic() {
        let dek = SecretVec::new(vec![1u8; DEK_MATERIAL_SIZE]);
        let context = FieldContext::new("invoiceXml", "ssn");

        let key1 = derive_field_key(&dek, &context, "siv", SIV_KEY_SIZE).unwrap();
        let key2 = derive_field_key(&dek, &context, "siv", SIV_KEY_SIZE).unwrap();

        assert_eq!(key1.expose_secret(), key2.expose_secret());
    }

    #[test]
    fn test_derive_field_key_different_paths() {
        let dek = SecretVec::new(vec![1u8; DEK_MATERIAL_SIZE]);
        let ctx1 = FieldContext::new("invoiceXml", "ssn");
        let ctx2 = FieldContext::new("invoiceXml", "xml");

        let key1 = derive_field_key(&dek, &ctx1, "aead", AEAD_KEY_SIZE).unwrap();
        let key2 = derive_field_key(&dek, &ctx2, "aead", AEAD_KEY_SIZE).unwrap();

        assert_ne!(key1.expose_secret(), key2.expose_secret());
    }

    #[test]
    fn test_derive_field_key_different_labels() {
        let dek = SecretVec::new(vec![1u8; DEK_MATERIAL_SIZE]);
        let context = FieldContext::new("invoiceXml", "ssn");

        let aead = derive_field_key(&dek, &context, "aead", AEAD_KEY_SIZE).unwrap();
        let siv = derive_field_key(&dek, &context, "siv", AEAD_KEY_SIZE).unwrap();

        assert_ne!(aead.expose_secret(), siv.expose_secret());
    }

    #[test]
    fn test_derive_field_key_lengths() {
        let dek = SecretVec::new(vec![7u8; DEK_MATERIAL_SIZE]);
        let context = FieldContext::new("invoiceXml", "xml");

        let aead = derive_field_key(&dek, &context, "aead", AEAD_KEY_SIZE).unwrap();
        let siv = derive_field_key(&dek, &context, "siv", SIV_KEY_SIZE).unwrap();

        assert_eq!(aead.expose_secret().len(), AEAD_KEY_SIZE);
        assert_eq!(siv.expose_secret().len(), SIV_KEY_SIZE);
    }

    #[test]
    fn test_generate_dek_material() {
        let m1 = generate_dek_material();
        let m2 = generate_dek_material();

        assert_eq!(m1.expose_secret().len(), DEK_MATERIAL_SIZE);
        assert_eq!(m2.expose_secret().len(), DEK_MATERIAL_SIZE);
        assert_ne!(m1.expose_secret(), m2.expose_secret());
    }
}
