//! # Build Search CLI (`bsx`)
//!
//! Operator interface for the build search adapter.
//!
//! ## Usage
//!
//! ```bash
//! bsx --config ./config/bsx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `bsx status` | Connection state and indexed document count |
//! | `bsx index <file.json>` | Index one build record from a JSON file |
//! | `bsx remove <job>` | Remove all documents of a job |
//! | `bsx rebuild` | Clean rebuild from the configured history directory |
//! | `bsx search "<query>"` | Search indexed builds |
//! | `bsx serve` | Start the HTTP API and the retry loop |

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use build_search::adapter::SearchAdapter;
use build_search::config::{load_config, Config};
use build_search::events::EventBridge;
use build_search::history::JsonFileHistory;
use build_search::models::BuildRecord;
use build_search::server;

/// Build Search — a search backend adapter for CI build records.
#[derive(Parser)]
#[command(
    name = "bsx",
    about = "Build Search — index CI build records into a search backend and query them",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/bsx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show connection state and the indexed document count.
    Status,

    /// Index one completed build from a JSON record file.
    Index {
        /// Path to a JSON file holding one build record.
        file: PathBuf,
    },

    /// Remove every indexed document of a job.
    Remove {
        /// Job name to purge from the index.
        job: String,
    },

    /// Clean rebuild: clear the index and re-derive it from the history
    /// directory.
    Rebuild,

    /// Search indexed builds.
    ///
    /// Query syntax: bare terms, `field:term` (fields: id, job, status,
    /// content), `"quoted phrase"`, parentheses for grouping.
    Search {
        /// Query string.
        query: String,

        /// Maximum number of results to print.
        #[arg(long, default_value_t = 25)]
        limit: usize,
    },

    /// Start the HTTP API and the background retry loop.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "build_search=info,bsx=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let adapter = Arc::new(SearchAdapter::new(&config.rebuild));
    adapter
        .configure(&config.backend, &config.retry)
        .await
        .context("Failed to configure search backend")?;

    let history = Arc::new(JsonFileHistory::new(&config.history)?);
    let bridge = Arc::new(EventBridge::new(Arc::clone(&adapter), history));

    match cli.command {
        Commands::Status => cmd_status(&bridge).await,
        Commands::Index { file } => cmd_index(&bridge, &file).await,
        Commands::Remove { job } => cmd_remove(&bridge, &job).await,
        Commands::Rebuild => cmd_rebuild(&bridge).await,
        Commands::Search { query, limit } => cmd_search(&bridge, &query, limit).await,
        Commands::Serve => cmd_serve(bridge, &config).await,
    }
}

async fn cmd_status(bridge: &EventBridge) -> Result<()> {
    let adapter = bridge.adapter();
    println!("state: {}", adapter.state());
    match adapter.document_count().await {
        Ok(count) => println!("documents: {}", count),
        Err(e) => println!("documents: unavailable ({})", e),
    }
    println!("pending builds: {}", bridge.pending_len());
    Ok(())
}

async fn cmd_index(bridge: &EventBridge, file: &PathBuf) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read record file: {}", file.display()))?;
    let record: BuildRecord = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse build record: {}", file.display()))?;
    let id = record.doc_id();
    bridge.on_build_completed(record).await?;
    if bridge.pending_len() > 0 {
        println!("queued {} (backend unavailable)", id);
    } else {
        println!("indexed {}", id);
    }
    Ok(())
}

async fn cmd_remove(bridge: &EventBridge, job: &str) -> Result<()> {
    bridge.on_job_deleted(job).await?;
    println!("removed job {}", job);
    Ok(())
}

async fn cmd_rebuild(bridge: &EventBridge) -> Result<()> {
    let written = bridge.on_rebuild_requested().await?;
    println!("rebuild complete: {} documents", written);
    Ok(())
}

async fn cmd_search(bridge: &EventBridge, query: &str, limit: usize) -> Result<()> {
    let mut results = bridge.adapter().search(query)?;
    let hits = results.take(limit).await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        let excerpt: String = hit.doc.content.chars().take(120).collect();
        println!(
            "{}. [{:.2}] {} / build {} ({})",
            i + 1,
            hit.score,
            hit.doc.job,
            hit.doc.number,
            hit.doc.status
        );
        println!("    excerpt: \"{}\"", excerpt.replace('\n', " "));
        println!("    id: {}", hit.doc.id);
        println!();
    }
    Ok(())
}

async fn cmd_serve(bridge: Arc<EventBridge>, config: &Config) -> Result<()> {
    let retry_bridge = Arc::clone(&bridge);
    let base_delay = Duration::from_millis(config.retry.base_backoff_ms);
    tokio::spawn(async move {
        retry_bridge.run_retry_loop(base_delay).await;
    });

    server::run_server(bridge, &config.server.bind).await
}
