//! Durable sync queue for search-sync.
//!
//! Provides RocksDB-backed storage with:
//! - Column family isolation for live, indexed and parked batches
//! - Zero-padded sequence keys so iteration order is FIFO order
//! - Atomic writes via WriteBatch
//! - Batch id uniqueness within the live queue

pub mod column_families;
pub mod error;
pub mod keys;
pub mod queue;

pub use error::StorageError;
pub use keys::BatchKey;
pub use queue::{QueueStats, SyncQueue};
