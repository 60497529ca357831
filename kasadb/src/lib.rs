//! Encrypted document store with split-index lookup.
//!
//! Sensitive invoice payloads are stored with their fields encrypted at
//! rest, per field either deterministically (equality-queryable) or
//! randomized. A separate plaintext index collection maps an opaque
//! correlation token to the encrypted record's id, so readers can
//! resolve a token fast without holding decryption keys for the lookup
//! itself.
//!
//! The pieces, leaf first:
//!
//! - [`key_vault`]: master key credentials and data encryption keys,
//!   wrapped at rest via a [`key_provider::MasterKeyProvider`].
//! - [`codec`]: encrypts and decrypts designated fields, binding each
//!   field to a data key and an encryption mode.
//! - [`schema`]: declares which fields are encrypted and provisions the
//!   collection; destructive re-provisioning is an explicit opt-in.
//! - [`coordinator`]: the dual-write saga inserting the encrypted
//!   record and then its index entry, with a documented orphan window.
//! - [`resolver`]: the read path from token to decrypted document.
//! - [`invoices`]: the facade wiring all of the above to three
//!   [`store`] backends.
//!
//! In-memory backends live in [`memory`]; a file-based master key
//! provider ships separately in `kasadb-key-file`.

#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod codec;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod document;
pub mod error;
pub mod header;
pub mod invoices;
pub mod kdf;
pub mod key_provider;
pub mod key_vault;
pub mod memory;
pub mod resolver;
pub mod schema;
pub mod store;

pub use codec::{AutoEncryptionConfig, EncryptionCodec, EncryptionMode, FieldMap};
pub use config::{Config, Namespace};
pub use coordinator::{BulkOutcome, DualWriteCoordinator, InsertReceipt};
pub use document::{CorrelationToken, DecryptedInvoice, DocumentId, InvoiceRecord};
pub use error::{Error, KeyProviderError};
pub use invoices::{InvoiceStore, InvoiceStoreBuilder, StoreHandles};
pub use key_provider::{MasterKeyCredential, MasterKeyProvider};
pub use key_vault::{DataKeyRecord, DekId, KeyVaultManager};
pub use resolver::QueryResolver;
pub use schema::{
    CollectionSchema, EncryptedFieldSpec, FieldType, ProvisionMode, QueryCapability,
    SchemaProvisioner,
};
pub use store::{DocumentStore, IndexStore, KeyVaultStore, StoreError};
