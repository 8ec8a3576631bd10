//! search-sync daemon library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands};
pub use commands::{
    clear_index, clear_queue, enqueue_resync, init_logging, load_settings, requeue_parked, run,
    show_parked, show_status,
};
