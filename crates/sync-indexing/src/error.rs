//! Error types for event dispatch and queue draining.

use std::time::Duration;

use sync_engine::EngineError;
use sync_storage::StorageError;
use sync_transform::TransformError;
use sync_types::SchemaVersionRef;
use thiserror::Error;

use crate::dispatch::DispatchError;

/// Errors that can occur in the sync pipeline
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Queue storage operation failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Document or mapping could not be built
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// Search engine request failed
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Event could not be routed
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Content store read failed
    #[error("Content store error: {0}")]
    ContentStore(String),

    /// Entity references a schema version the store does not know
    #[error("Schema not found: {}@{}", .0.name, .0.version)]
    SchemaNotFound(SchemaVersionRef),

    /// The engine turned items away under load
    #[error("{0} bulk item(s) throttled by the search engine")]
    Throttled(usize),

    /// Bulk request exceeded its deadline
    #[error("Bulk request timed out after {0:?}")]
    Timeout(Duration),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl IndexingError {
    /// Whether the failed step may succeed when retried unchanged.
    pub fn is_transient(&self) -> bool {
        match self {
            IndexingError::Engine(e) => e.is_transient(),
            IndexingError::Timeout(_)
            | IndexingError::Throttled(_)
            | IndexingError::ContentStore(_) => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for IndexingError {
    fn from(err: serde_json::Error) -> Self {
        IndexingError::Serialization(err.to_string())
    }
}
