//! # docsync CLI
//!
//! The `docsync` binary is the primary interface for the synchronization
//! engine. It provides commands for running sync cycles, repairing orphaned
//! vectors, asking questions, inspecting state, and starting the HTTP
//! server.
//!
//! ## Usage
//!
//! ```bash
//! docsync --config ./docsync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docsync sync` | Reconcile the document folder against the vector index |
//! | `docsync cleanup` | Remove vectors for files no longer in the folder |
//! | `docsync ask "<query>"` | Answer a question grounded in indexed documents |
//! | `docsync status` | Show local tracking state (no network calls) |
//! | `docsync stats` | Show vector index statistics |
//! | `docsync serve` | Start the HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use docsync::config;
use docsync::server;
use docsync::sync::SyncEngine;

/// docsync keeps a remote vector index in sync with a local folder of
/// documents and serves grounded Q&A over it.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docsync.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docsync",
    about = "Keeps a remote vector index in sync with a local document folder",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./docsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Run one sync cycle over the document folder.
    ///
    /// Scans the folder, reconciles new/changed/deleted files against the
    /// vector index, and persists the tracking state. Unchanged files are
    /// skipped; per-file failures are reported without aborting the cycle.
    Sync,

    /// Remove vectors for tracked files no longer in the folder.
    ///
    /// Idempotent repair operation: only the deleted-file branch of the
    /// sync policy runs; new and changed files are untouched.
    Cleanup,

    /// Answer a question grounded in the indexed documents.
    Ask {
        /// The question to answer.
        query: String,

        /// Number of nearest chunks to retrieve.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Show local tracking state. Makes no network calls.
    Status,

    /// Show vector index statistics.
    Stats,

    /// Start the HTTP server.
    ///
    /// Exposes sync, cleanup, search, status, stats, and health endpoints.
    Serve {
        /// Run a sync cycle before binding, so the server starts with a
        /// fresh index.
        #[arg(long)]
        sync_on_start: bool,
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
    let cfg = config::load_config(&cli.config)?;
    let engine = Arc::new(SyncEngine::from_config(cfg)?);

    match cli.command {
        Commands::Sync => {
            let report = engine.run_sync().await?;
            println!("sync {}", engine.config().docs.root.display());
            println!("  processed: {}", report.processed);
            println!("  skipped: {}", report.skipped);
            println!("  deleted: {}", report.deleted);
            for failure in &report.errors {
                println!("  error: {}: {}", failure.path, failure.error);
            }
            println!("ok");
        }
        Commands::Cleanup => {
            let removed = engine.cleanup().await?;
            println!("cleanup removed {} vectors", removed);
        }
        Commands::Ask { query, top_k } => {
            let answer = engine.ask(&query, top_k).await?;
            println!("{}", answer.response_text);
            if !answer.matches.is_empty() {
                println!();
                for m in &answer.matches {
                    println!("  [{:.3}] {}: {}", m.score, m.source_path, m.chunk_text);
                }
            }
        }
        Commands::Status => {
            let status = engine.status().await;
            println!("docs root: {}", status.docs_root);
            println!("tracker: {}", status.tracker_path);
            println!("tracked files: {}", status.tracked_files);
            println!("tracked vectors: {}", status.tracked_vectors);
        }
        Commands::Stats => {
            let stats = engine.stats().await?;
            println!("total vectors: {}", stats.total_vectors);
            println!("dimension: {}", stats.dimension);
        }
        Commands::Serve { sync_on_start } => {
            if sync_on_start {
                let report = engine.run_sync().await?;
                println!(
                    "startup sync: {} processed, {} skipped, {} deleted, {} errors",
                    report.processed,
                    report.skipped,
                    report.deleted,
                    report.errors.len()
                );
            }
            server::run_server(engine).await?;
        }
    }

    Ok(())
}
