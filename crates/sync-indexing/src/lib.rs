//! # sync-indexing
//!
//! Event dispatch and queue draining for search-sync.
//!
//! Content-store events are routed through an [`EventDispatchTable`] into
//! [`Batch`](sync_types::Batch)es on the durable queue. A
//! [`SyncCoordinator`] drains the queue, builds documents through the
//! transformer and sends them to a [`SearchEngine`](sync_engine::SearchEngine)
//! as bulk requests. [`SyncService`] wires both halves together and runs
//! background [`SyncWorker`]s.

pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod service;
pub mod store;
pub mod worker;

pub use coordinator::{CoordinatorConfig, DrainResult, SyncCoordinator};
pub use dispatch::{
    full_resync, AdminAction, DispatchError, DispatchOutcome, EntityActionHandler, EventDispatchTable,
    EventHandler, SchemaUpdateHandler,
};
pub use error::IndexingError;
pub use service::SyncService;
pub use store::{ContentSnapshot, ContentStore, InMemoryContentStore};
pub use worker::{spawn_workers, SyncWorker};
