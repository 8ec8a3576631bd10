//! CLI argument parsing for search-sync.
//!
//! CLI flags override every other configuration source.

use clap::{Parser, Subcommand};

/// Search index synchronisation daemon
///
/// Keeps a search engine in step with a content store through a durable
/// queue of index batches.
#[derive(Parser, Debug)]
#[command(name = "search-sync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/search-sync/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override queue database path
    #[arg(long, global = true)]
    pub db_path: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Daemon commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the drain workers until interrupted
    Run {
        /// Content snapshot (JSON) used to resolve queued entries
        #[arg(short, long)]
        snapshot: String,

        /// Override number of drain workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Drain once and exit instead of running workers
        #[arg(long)]
        once: bool,
    },

    /// Show queue status
    Status,

    /// Queue a STORE of every entity in a content snapshot
    EnqueueResync {
        /// Content snapshot (JSON)
        #[arg(short, long)]
        snapshot: String,
    },

    /// Drop every pending batch (the index is untouched)
    ClearQueue,

    /// Delete documents from the search engine (the queue is untouched)
    ClearIndex {
        /// Index to clear; all indices when omitted
        #[arg(short, long)]
        index: Option<String>,
    },

    /// List parked batches
    Parked,

    /// Move parked batches back onto the queue
    RequeueParked,
}
