//! search-sync
//!
//! Keeps a search engine in step with a content store.
//!
//! # Usage
//!
//! ```bash
//! search-sync run --snapshot FILE [--workers N] [--once]
//! search-sync status
//! search-sync enqueue-resync --snapshot FILE
//! search-sync clear-queue
//! search-sync clear-index [--index NAME]
//! search-sync parked
//! search-sync requeue-parked
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/search-sync/config.toml)
//! 3. Environment variables (SEARCH_SYNC__*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use sync_daemon::{
    clear_index, clear_queue, enqueue_resync, init_logging, load_settings, requeue_parked, run,
    show_parked, show_status, Cli, Commands,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(
        cli.config.as_deref(),
        cli.db_path.as_deref(),
        cli.log_level.as_deref(),
    )?;
    init_logging(&settings)?;

    match cli.command {
        Commands::Run {
            snapshot,
            workers,
            once,
        } => {
            run(&settings, &snapshot, workers, once).await?;
        }
        Commands::Status => {
            show_status(&settings)?;
        }
        Commands::EnqueueResync { snapshot } => {
            enqueue_resync(&settings, &snapshot).await?;
        }
        Commands::ClearQueue => {
            clear_queue(&settings)?;
        }
        Commands::ClearIndex { index } => {
            clear_index(&settings, index.as_deref()).await?;
        }
        Commands::Parked => {
            show_parked(&settings)?;
        }
        Commands::RequeueParked => {
            requeue_parked(&settings)?;
        }
    }

    Ok(())
}
