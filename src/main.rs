//! # Chunk Silo CLI (`silo`)
//!
//! The `silo` binary drives the ingestion pipeline: store initialization,
//! file and corpus ingestion runs, status reporting, and per-source
//! purges.
//!
//! ## Usage
//!
//! ```bash
//! silo --config ./silo.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `silo init` | Create the SQLite store and all configured collections |
//! | `silo run <env> [pattern]` | Ingest matching files into the environment's collection |
//! | `silo corpus <env>` | Ingest routed JSON corpus files |
//! | `silo status` | Show ledger entries and collection counts |
//! | `silo purge <env> <source-id>` | Delete one source's documents |
//!
//! ## Examples
//!
//! ```bash
//! # First run: everything under data/ is new
//! silo run dev
//!
//! # Re-run: unchanged files are skipped
//! silo run dev
//!
//! # Only markdown, reprocessed from scratch
//! silo run dev '**/*.md' --force
//!
//! # Check counts without an API key or any writes
//! silo run dev --dry-run
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use chunk_silo::config::{self, Settings};
use chunk_silo::corpus;
use chunk_silo::ingest;
use chunk_silo::state::IngestState;
use chunk_silo::store;

/// Chunk Silo CLI — incremental document-to-vector ingestion into
/// SQLite collections.
#[derive(Parser)]
#[command(
    name = "silo",
    about = "Chunk Silo — incremental document-to-vector ingestion into SQLite",
    version,
    long_about = "Chunk Silo walks a data directory, normalizes JSON, Markdown, plain-text, and \
    PDF files, cuts deterministic overlapping chunks, embeds them via the OpenAI API, and \
    upserts the vectors into per-environment SQLite collections. A per-file (hash, mtime) \
    ledger makes re-runs incremental."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "silo.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Create the SQLite store and all configured collections.
    ///
    /// Idempotent: existing collections are left untouched.
    Init,

    /// Ingest source files into an environment's collection.
    ///
    /// Walks the data root for JSON, Markdown, plain-text, and PDF files,
    /// skips files whose (hash, mtime) ledger entry is unchanged, and
    /// chunks, embeds, and upserts the rest. A failing file is logged and
    /// counted; the run continues.
    Run {
        /// Target environment: dev, qa, or prod.
        env: String,

        /// Glob pattern relative to the data root. Defaults to every
        /// supported extension, recursively.
        pattern: Option<String>,

        /// Reprocess every matched file; the ledger is neither consulted
        /// nor updated.
        #[arg(long)]
        force: bool,

        /// Report what would be processed without calling the API or
        /// writing documents.
        #[arg(long)]
        dry_run: bool,
    },

    /// Ingest routed JSON corpus files item by item.
    ///
    /// Corpus files map to collections through the `[routes]` table;
    /// without matching routes, `files.json` (or every top-level JSON
    /// file) goes to the environment's collection.
    Corpus {
        /// Target environment: dev, qa, or prod.
        env: String,

        /// Reprocess every corpus file; the ledger is neither consulted
        /// nor updated.
        #[arg(long)]
        force: bool,
    },

    /// Show ledger entries and per-collection document counts.
    Status,

    /// Delete every document of one source from an environment's
    /// collection.
    ///
    /// The ledger is left untouched; use `run --force` to re-ingest a
    /// purged source.
    Purge {
        /// Target environment: dev, qa, or prod.
        env: String,

        /// Source id (file name or corpus item id) to purge.
        source_id: String,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let settings = config::load_settings(&cli.config)?;

    match cli.command {
        Commands::Init => {
            run_init(&settings).await?;
        }
        Commands::Run {
            env,
            pattern,
            force,
            dry_run,
        } => {
            ingest::run_ingest(&settings, &env, pattern.as_deref(), force, dry_run).await?;
        }
        Commands::Corpus { env, force } => {
            corpus::run_corpus(&settings, &env, force).await?;
        }
        Commands::Status => {
            run_status(&settings).await?;
        }
        Commands::Purge { env, source_id } => {
            run_purge(&settings, &env, &source_id).await?;
        }
    }

    Ok(())
}

async fn run_init(settings: &Settings) -> anyhow::Result<()> {
    let pool = store::connect(&settings.store.path).await?;
    for collection in settings.all_collections() {
        store::ensure_collection(&pool, &collection).await?;
        println!("  collection ready: {collection}");
    }
    pool.close().await;
    println!("Store initialized at {}", settings.store.path.display());
    Ok(())
}

async fn run_status(settings: &Settings) -> anyhow::Result<()> {
    let state = IngestState::load(&settings.ingest.state_file);
    println!("state file: {}", settings.ingest.state_file.display());
    println!("  tracked files: {}", state.files.len());
    for (path, entry) in &state.files {
        let short = entry.content_hash.get(..12).unwrap_or(&entry.content_hash);
        println!("    {short}  {path}");
    }

    let pool = store::connect(&settings.store.path).await?;
    println!("store: {}", settings.store.path.display());
    for collection in settings.all_collections() {
        let count = store::count_documents(&pool, &collection).await?;
        println!("  {collection}: {count} documents");
    }
    pool.close().await;
    Ok(())
}

async fn run_purge(settings: &Settings, env: &str, source_id: &str) -> anyhow::Result<()> {
    let collection = settings.collection_for(env)?;
    let pool = store::connect(&settings.store.path).await?;
    store::ensure_collection(&pool, collection).await?;
    let deleted = store::delete_by_source(&pool, collection, source_id).await?;
    pool.close().await;
    println!("purged {deleted} documents for '{source_id}' from {collection}");
    Ok(())
}
