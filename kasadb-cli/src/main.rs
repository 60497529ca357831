//! `KasaDB` CLI for key management and an end-to-end demo.

#![warn(clippy::pedantic, clippy::nursery)]

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use kasadb::memory::{MemoryDocumentStore, MemoryIndexStore, MemoryKeyVaultStore};
use kasadb::{Config, InvoiceStore, MasterKeyProvider, ProvisionMode, StoreHandles};
use kasadb_key_file::LocalMasterKeyProvider;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kasadb")]
#[command(about = "KasaDB encrypted invoice store CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new master key
    Keygen {
        /// Output directory for key files
        #[arg(short, long, default_value = "./keys")]
        output: PathBuf,
    },
    /// Run a provision / insert / lookup round trip over in-memory stores
    Demo {
        /// Directory holding master key files
        #[arg(short, long, default_value = "./keys")]
        keys: PathBuf,
        /// Number of records for the bulk insert
        #[arg(short = 'n', long, default_value_t = 3)]
        count: usize,
        /// Optional TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Drop and recreate the collection and key vault first
        #[arg(long)]
        reset: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Keygen { output } => keygen(&output).await,
        Commands::Demo { keys, count, config, reset } => {
            let config = load_config(config.as_deref())?;
            demo(&keys, count, &config, reset).await
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("parsing config file {}", path.display()))
        }
        None => Ok(Config::default()),
    }
}

async fn keygen(output: &Path) -> anyhow::Result<()> {
    let provider = LocalMasterKeyProvider::init(output).await?;
    let credential = provider.ensure_master_key(true).await?;
    println!("Generated master key `{}` in {}", credential.key_id(), output.display());
    Ok(())
}

async fn demo(keys: &Path, count: usize, config: &Config, reset: bool) -> anyhow::Result<()> {
    let provider = LocalMasterKeyProvider::init(keys).await?;
    let have_key = provider.ensure_master_key(false).await.is_ok();

    let handles = StoreHandles {
        documents: Arc::new(MemoryDocumentStore::new()),
        index: Arc::new(MemoryIndexStore::new()),
        key_vault: Arc::new(MemoryKeyVaultStore::new()),
    };
    let mode = if reset { ProvisionMode::ResetDestructive } else { ProvisionMode::EnsureExists };

    let store = InvoiceStore::builder(config.clone(), handles)
        .with_provider(Arc::new(provider))
        .generate_master_key(!have_key)
        .open(mode)
        .await?;

    let receipt = store
        .insert(b"<HDon/>".to_vec(), "application/xml")
        .await
        .context("inserting demo record")?;
    println!("Inserted document {}", receipt.document_id);
    println!("  token:     {}", receipt.correlation_token);
    println!("  file name: {}", receipt.file_name);

    let outcome = store
        .bulk_insert(count, |i| {
            (format!("<HDon seq=\"{i}\"/>").into_bytes(), "application/xml".to_string())
        })
        .await;
    println!("Bulk insert: {} succeeded, {} failed", outcome.succeeded(), outcome.failed());

    let found = store
        .find_by_correlation_token(&receipt.correlation_token)
        .await?
        .context("inserted record did not resolve")?;
    println!(
        "Lookup by token returned {} byte(s) of {}",
        found.record.content.len(),
        found.record.content_type
    );

    Ok(())
}
