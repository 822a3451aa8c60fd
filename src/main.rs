//! # Thesis RAG CLI (`trag`)
//!
//! The `trag` binary drives the whole pipeline: database initialization,
//! corpus ingestion, recovery, one-shot retrieval, and the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! trag --config ./config/thesis.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `trag init` | Create the SQLite database and run schema migrations |
//! | `trag ingest` | Index new or changed corpus documents |
//! | `trag recover` | Re-embed manifest documents after a vector store reset |
//! | `trag search "<question>"` | One-shot retrieval from the command line |
//! | `trag serve` | Start the HTTP server (recovery check runs first) |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use thesis_rag::config::load_config;
use thesis_rag::ingest;
use thesis_rag::retrieve;
use thesis_rag::server;
use thesis_rag::store::IndexStore;

/// Thesis RAG CLI — retrieval-augmented question answering over a thesis
/// corpus.
#[derive(Parser)]
#[command(
    name = "trag",
    about = "Thesis RAG — retrieval-augmented question answering for thesis collections",
    version,
    long_about = "Thesis RAG ingests plain-text thesis documents, extracts bibliographic \
    metadata, chunks and embeds the text into a SQLite-backed vector index, and serves \
    cited narrative answers over HTTP."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/thesis.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (documents, passages, passage_vectors, manifest). Idempotent.
    Init,

    /// Index new or changed corpus documents.
    ///
    /// Scans the corpus directory, extracts metadata, chunks and embeds
    /// document text, and stores everything in SQLite. Documents whose
    /// manifest entry matches their modification time are skipped without
    /// re-embedding.
    Ingest {
        /// Ignore the manifest — re-index every corpus document.
        #[arg(long)]
        full: bool,

        /// Show file and passage counts without writing to the database.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of documents to process.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Re-embed manifest documents after a vector store reset.
    ///
    /// When the vector table is empty but the manifest still lists
    /// documents, every listed document still present in the corpus is
    /// re-chunked, re-embedded, and re-indexed.
    Recover,

    /// One-shot retrieval from the command line.
    Search {
        /// The natural-language question to search for.
        question: String,
    },

    /// Start the HTTP server.
    ///
    /// Runs the recovery check first, then serves `POST /search` and
    /// `GET /health` on the configured bind address.
    Serve,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = IndexStore::open(&config).await?;
            store.close().await;
            println!("initialized {}", config.db.path.display());
        }
        Commands::Ingest {
            full,
            dry_run,
            limit,
        } => {
            let store = IndexStore::open(&config).await?;
            ingest::run_ingest(&config, &store, full, dry_run, limit).await?;
            store.close().await;
        }
        Commands::Recover => {
            let store = IndexStore::open(&config).await?;
            let recovered = ingest::run_recovery(&config, &store).await?;
            if recovered == 0 {
                println!("nothing to recover");
            }
            store.close().await;
        }
        Commands::Search { question } => {
            let store = IndexStore::open(&config).await?;
            retrieve::run_search(&config, &store, &question).await?;
            store.close().await;
        }
        Commands::Serve => {
            let store = IndexStore::open(&config).await?;
            if let Err(e) = ingest::run_recovery(&config, &store).await {
                eprintln!("Warning: recovery check failed: {}", e);
            }
            server::run_server(&config, store).await?;
        }
    }

    Ok(())
}
