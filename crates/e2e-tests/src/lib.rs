//! End-to-end test infrastructure for search-sync.
//!
//! Provides a shared TestHarness wiring a RocksDB queue, an in-memory
//! content store and an on-disk Tantivy index, plus content fixtures.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{TimeZone, Utc};

use sync_engine::{TantivyEngine, TantivyEngineConfig};
use sync_indexing::{CoordinatorConfig, InMemoryContentStore, SyncService};
use sync_storage::SyncQueue;
use sync_types::{Entity, EntityType, FieldType, FieldValue, ListElementType, NamedRef, Schema};

/// Shared test harness for E2E tests.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    pub queue_path: PathBuf,
    pub index_path: PathBuf,
    pub queue: Arc<SyncQueue>,
    pub store: Arc<InMemoryContentStore>,
    pub engine: Arc<TantivyEngine>,
    pub service: SyncService,
}

impl TestHarness {
    /// Create a harness with the default retry policy.
    pub fn new() -> Self {
        Self::with_config(CoordinatorConfig::default())
    }

    pub fn with_config(config: CoordinatorConfig) -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let queue_path = temp_dir.path().join("queue");
        let index_path = temp_dir.path().join("index");

        let queue = Arc::new(SyncQueue::open(&queue_path).expect("Failed to open queue"));
        let store = Arc::new(InMemoryContentStore::new());
        let engine = Arc::new(
            TantivyEngine::open_or_create(TantivyEngineConfig::new(&index_path))
                .expect("Failed to open index"),
        );
        let service = SyncService::new(queue.clone(), store.clone(), engine.clone(), config);

        Self {
            _temp_dir: temp_dir,
            queue_path,
            index_path,
            queue,
            store,
            engine,
            service,
        }
    }

    /// Document currently visible in the index.
    pub async fn document(&self, index: &str, id: &str) -> Option<serde_json::Value> {
        use sync_engine::SearchEngine;
        self.engine
            .get_document(index, id)
            .await
            .expect("Failed to read document")
    }

    pub fn count(&self, index: &str) -> usize {
        self.engine.count(Some(index)).expect("Failed to count documents")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Index name used for article nodes in the fixtures.
pub const ARTICLE_INDEX: &str = "node-demo-en";

/// `article` schema with a display title and a list of string tags.
pub fn article_schema(version: u32) -> Schema {
    Schema::new("article", "schema-article", version)
        .with_display_field("title")
        .with_field("title", FieldType::String)
        .with_field("tags", FieldType::List(ListElementType::String))
}

/// Article node with the given title and tags.
pub fn article(uuid: &str, schema: &Schema, title: &str, tags: &[&str]) -> Entity {
    let tags = tags
        .iter()
        .map(|t| FieldValue::String(t.to_string()))
        .collect();
    let edited = Utc
        .with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
        .single()
        .expect("valid timestamp");

    let mut entity = Entity::node(uuid, schema, "en")
        .with_field("title", FieldValue::String(title.to_string()))
        .with_field("tags", FieldValue::List(tags))
        .with_editor("user-editor", edited)
        .with_creator("user-editor", edited);
    entity.project = Some(NamedRef::new("project-demo", Some("demo")));
    entity
}

/// Non-node entity with a name.
pub fn named(entity_type: EntityType, uuid: &str, name: &str) -> Entity {
    Entity::new(entity_type, uuid).with_name(name)
}
