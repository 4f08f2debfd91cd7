//! # docdex CLI
//!
//! The `docdex` binary is the bundled host for the indexing pipeline.
//!
//! ```bash
//! docdex --config ./docdex.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docdex init` | Create the store (SQLite file + schema); idempotent |
//! | `docdex index` | Run one indexing pass over the knowledge-base root |
//! | `docdex lookup <path>` | Show the stored records for one source path |
//! | `docdex status` | Store totals: sources, chunks, embedding dims |
//! | `docdex reset` | Drop every indexed record |

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use docdex::config::{load_config, Config};
use docdex::embed;
use docdex::ident;
use docdex::pipeline::Pipeline;
use docdex::store::{IndexStore, SqliteStore};

/// docdex — incremental document indexing for office/PDF knowledge bases.
#[derive(Parser)]
#[command(
    name = "docdex",
    about = "Incremental document indexing pipeline for office/PDF knowledge bases",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./docdex.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store file and schema. Idempotent.
    Init,

    /// Scan the knowledge base and index changed documents.
    Index {
        /// Override the configured scan root.
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Show stored records for one source path (as reported by `index`).
    Lookup { path: PathBuf },

    /// Report store totals.
    Status,

    /// Remove every indexed record from the store.
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("docdex=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    match cli.command {
        Commands::Init => run_init(&config).await,
        Commands::Index { root } => run_index(&config, root).await,
        Commands::Lookup { path } => run_lookup(&config, &path).await,
        Commands::Status => run_status(&config).await,
        Commands::Reset => run_reset(&config).await,
    }
}

async fn run_init(config: &Config) -> Result<()> {
    let store = SqliteStore::connect(&config.store.path).await?;
    store.close().await;
    println!("initialized store at {}", config.store.path.display());
    Ok(())
}

async fn run_index(config: &Config, root_override: Option<PathBuf>) -> Result<()> {
    let root = root_override.unwrap_or_else(|| config.scan.root.clone());

    let store: Arc<dyn IndexStore> = Arc::new(SqliteStore::connect(&config.store.path).await?);
    let embedder: Arc<dyn embed::EmbeddingProvider> =
        embed::create_provider(&config.embedding)?.into();

    let pipeline = Pipeline::new(config, store.clone(), embedder)?;
    let summary = pipeline.run(&root).await?;

    println!("index {}", root.display());
    println!("  processed: {}", summary.processed);
    println!("  skipped: {}", summary.skipped);
    println!("  failed: {}", summary.failed.len());
    for path in &summary.failed {
        println!("    {}", path.display());
    }
    println!("  chunks written: {}", summary.chunks_written);
    if summary.fail_open > 0 {
        println!("  fail-open lookups: {}", summary.fail_open);
    }
    if let Some(dims) = store.probe_dims().await? {
        println!("  embedding dims: {}", dims);
    }
    println!("ok");
    Ok(())
}

async fn run_lookup(config: &Config, path: &Path) -> Result<()> {
    let store = SqliteStore::connect(&config.store.path).await?;
    let source = ident::normalize(path);
    let records = store.get_by_source(&source).await?;

    if records.is_empty() {
        println!("no records for {}", source);
        store.close().await;
        return Ok(());
    }

    println!("{} — {} chunk(s)", source, records.len());
    for record in &records {
        let chunk = &record.chunk;
        let page = chunk
            .kind
            .page()
            .map(|p| format!(" page {}", p))
            .unwrap_or_default();
        let preview: String = chunk.text.chars().take(80).collect();
        println!(
            "  [{}/{}{}] hash {} — {}",
            chunk.chunk_index + 1,
            chunk.total_chunks,
            page,
            &chunk.content_hash[..12.min(chunk.content_hash.len())],
            preview
        );
    }
    store.close().await;
    Ok(())
}

async fn run_status(config: &Config) -> Result<()> {
    let store = SqliteStore::connect(&config.store.path).await?;
    println!("store {}", config.store.path.display());
    println!("  sources: {}", store.count_sources().await?);
    println!("  chunks: {}", store.count_chunks().await?);
    match store.probe_dims().await? {
        Some(dims) => println!("  embedding dims: {}", dims),
        None => println!("  embedding dims: (empty store)"),
    }
    store.close().await;
    Ok(())
}

async fn run_reset(config: &Config) -> Result<()> {
    let store = SqliteStore::connect(&config.store.path).await?;
    store.clear().await?;
    store.close().await;
    println!("store reset");
    Ok(())
}
