//! # sync-engine
//!
//! Search engine clients for search-sync.
//!
//! ## Features
//! - [`SearchEngine`] trait: bulk apply, mapping push, refresh, clear
//! - [`TantivyEngine`]: embedded index, one physical index keyed by `{index}/{id}`
//! - [`ElasticsearchClient`]: NDJSON `_bulk` over HTTP

pub mod bulk;
pub mod elasticsearch;
pub mod engine;
pub mod error;
pub mod tantivy_engine;

use std::path::Path;
use std::sync::Arc;

use sync_types::{EngineKind, EngineSettings};

pub use bulk::{BulkItemStatus, BulkOpKind, BulkOperation, BulkResponse};
pub use elasticsearch::{ElasticsearchClient, ElasticsearchConfig};
pub use engine::SearchEngine;
pub use error::EngineError;
pub use tantivy_engine::{TantivyEngine, TantivyEngineConfig};

/// Build the engine client selected by the settings.
pub fn connect(
    settings: &EngineSettings,
    index_path: &Path,
) -> Result<Arc<dyn SearchEngine>, EngineError> {
    match settings.kind {
        EngineKind::Tantivy => {
            let config =
                TantivyEngineConfig::new(index_path).with_memory_mb(settings.writer_memory_mb);
            Ok(Arc::new(TantivyEngine::open_or_create(config)?))
        }
        EngineKind::Elasticsearch => Ok(Arc::new(ElasticsearchClient::new(
            ElasticsearchConfig::new(settings.url.clone()),
        )?)),
    }
}
