//! Basic usage example for `KasaDB`.

use kasadb::memory::{MemoryDocumentStore, MemoryIndexStore, MemoryKeyVaultStore};
use kasadb::{Config, InvoiceStore, ProvisionMode, StoreHandles};
use kasadb_key_file::LocalMasterKeyProvider;
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("KasaDB Basic Usage Example");
    println!("==========================\n");

    // Setup: a local key directory and in-memory store backends
    let key_dir = PathBuf::from("./example_keys");
    let generate_new = !key_dir.exists();
    let provider = LocalMasterKeyProvider::init(&key_dir).await?;
    println!("✓ LocalMasterKeyProvider ready at {}\n", key_dir.display());

    let handles = StoreHandles {
        documents: Arc::new(MemoryDocumentStore::new()),
        index: Arc::new(MemoryIndexStore::new()),
        key_vault: Arc::new(MemoryKeyVaultStore::new()),
    };

    // Provision the encrypted collection and open the store
    let store = InvoiceStore::builder(Config::default(), handles)
        .with_provider(Arc::new(provider))
        .generate_master_key(generate_new)
        .open(ProvisionMode::EnsureExists)
        .await?;
    println!("✓ Invoice store provisioned and opened\n");

    // Insert one invoice; designated fields are encrypted in flight
    let receipt = store.insert(b"<HDon/>".to_vec(), "application/xml").await?;
    println!("✓ Inserted encrypted invoice");
    println!("  - Document id: {}", receipt.document_id);
    println!("  - Token:       {}", receipt.correlation_token);
    println!("  - File name:   {}\n", receipt.file_name);

    // Resolve the token back to the decrypted invoice
    let found = store
        .find_by_correlation_token(&receipt.correlation_token)
        .await?
        .expect("inserted invoice must resolve");
    println!("✓ Resolved token to decrypted invoice");
    println!("  - Content:      {}", String::from_utf8_lossy(&found.record.content));
    println!("  - Content type: {}\n", found.record.content_type);

    assert_eq!(found.record.content, b"<HDon/>");
    println!("✓ Round-trip verification successful");

    Ok(())
}
