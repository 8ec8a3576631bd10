//! Search engine client abstraction.

use async_trait::async_trait;
use serde_json::Value;

use crate::bulk::{BulkOperation, BulkResponse};
use crate::error::EngineError;

/// Client side of a search engine.
///
/// Implementations are shared across drain workers behind an `Arc`.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Apply the operations in order.
    ///
    /// A transport-level failure is an `Err`; per-operation failures are
    /// reported in the response items.
    async fn bulk(&self, operations: &[BulkOperation]) -> Result<BulkResponse, EngineError>;

    /// Create the index if needed and register the mapping.
    async fn put_mapping(&self, index: &str, mapping: &Value) -> Result<(), EngineError>;

    /// Make all applied operations visible to searches.
    async fn refresh(&self) -> Result<(), EngineError>;

    /// Drop one index, or every index when `index` is None.
    async fn clear(&self, index: Option<&str>) -> Result<(), EngineError>;

    /// Fetch a stored document by id.
    async fn get_document(&self, index: &str, id: &str) -> Result<Option<Value>, EngineError>;
}
