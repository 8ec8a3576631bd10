//! Event to index pipeline E2E tests for search-sync.
//!
//! Each test publishes content-store events, drains the queue and checks
//! what the Tantivy index ends up holding.

use pretty_assertions::assert_eq;
use serde_json::json;

use e2e_tests::{article, article_schema, named, TestHarness, ARTICLE_INDEX};
use sync_types::{EntityRef, EntityType, EventKind, MutationEvent, NamedRef};

fn article_ref(uuid: &str) -> EntityRef {
    EntityRef::new(EntityType::Node, uuid).in_index(ARTICLE_INDEX)
}

#[tokio::test]
async fn test_created_node_is_indexed_with_schema_fields() {
    let harness = TestHarness::new();
    let schema = article_schema(1);
    harness.store.insert_schema(schema.clone()).unwrap();
    harness
        .store
        .insert_entity(article("n-1", &schema, "Hello", &["a", "b"]))
        .unwrap();

    harness
        .service
        .handle_event(&MutationEvent::for_entity(EventKind::EntityCreated, article_ref("n-1")))
        .await
        .unwrap();
    let result = harness.service.drain().await.unwrap();
    assert_eq!(result.applied, 1);
    assert!(result.refreshed);

    let doc = harness.document(ARTICLE_INDEX, "n-1").await.unwrap();
    assert_eq!(doc["fields"], json!({ "title": "Hello", "tags": ["a", "b"] }));
    assert_eq!(doc["displayField"], json!({ "key": "title", "value": "Hello" }));
    assert_eq!(
        doc["schema"],
        json!({ "name": "article", "uuid": "schema-article", "version": 1 })
    );
    assert_eq!(doc["language"], "en");
    assert_eq!(doc["editor"]["uuid"], "user-editor");
    assert_eq!(doc["edited"], "2024-03-01T12:00:00.000Z");
    assert_eq!(doc["project"], json!({ "uuid": "project-demo", "name": "demo" }));

    let mapping = harness.engine.mapping(ARTICLE_INDEX).unwrap();
    assert_eq!(
        mapping["properties"]["fields"]["properties"]["title"],
        json!({ "type": "text", "fields": { "raw": { "type": "keyword" } } })
    );
    assert_eq!(
        mapping["properties"]["fields"]["properties"]["tags"],
        json!({ "type": "nested" })
    );
}

#[tokio::test]
async fn test_update_then_delete() {
    let harness = TestHarness::new();
    let schema = article_schema(1);
    harness.store.insert_schema(schema.clone()).unwrap();
    harness
        .store
        .insert_entity(article("n-1", &schema, "Draft", &[]))
        .unwrap();

    harness
        .service
        .handle_event(&MutationEvent::for_entity(EventKind::EntityCreated, article_ref("n-1")))
        .await
        .unwrap();
    harness.service.drain().await.unwrap();

    harness
        .store
        .insert_entity(article("n-1", &schema, "Final", &["news"]))
        .unwrap();
    harness
        .service
        .handle_event(&MutationEvent::for_entity(EventKind::EntityUpdated, article_ref("n-1")))
        .await
        .unwrap();
    harness.service.drain().await.unwrap();

    let doc = harness.document(ARTICLE_INDEX, "n-1").await.unwrap();
    assert_eq!(doc["fields"]["title"], "Final");
    assert_eq!(doc["fields"]["tags"], json!(["news"]));
    assert_eq!(harness.count(ARTICLE_INDEX), 1);

    harness.store.remove_entity(EntityType::Node, "n-1").unwrap();
    harness
        .service
        .handle_event(&MutationEvent::for_entity(EventKind::EntityDeleted, article_ref("n-1")))
        .await
        .unwrap();
    let result = harness.service.drain().await.unwrap();
    assert_eq!(result.applied, 1);
    assert!(harness.document(ARTICLE_INDEX, "n-1").await.is_none());
    assert_eq!(harness.count(ARTICLE_INDEX), 0);
}

#[tokio::test]
async fn test_update_drops_keys_the_entity_lost() {
    let harness = TestHarness::new();
    let schema = article_schema(1);
    harness.store.insert_schema(schema.clone()).unwrap();
    let mut original = article("n-1", &schema, "Child", &["news"]).with_parent("n-root");
    original.tags = vec![NamedRef::new("t-1", Some("featured"))];
    harness.store.insert_entity(original.clone()).unwrap();

    harness
        .service
        .handle_event(&MutationEvent::for_entity(EventKind::EntityCreated, article_ref("n-1")))
        .await
        .unwrap();
    harness.service.drain().await.unwrap();
    let doc = harness.document(ARTICLE_INDEX, "n-1").await.unwrap();
    assert_eq!(doc["parentNode"], json!({ "uuid": "n-root" }));
    assert_eq!(doc["fields"]["tags"], json!(["news"]));
    assert!(doc.get("tags").is_some());

    // Moved to the root, untagged, tag field cleared.
    let mut moved = original;
    moved.parent = None;
    moved.tags.clear();
    moved.fields.remove("tags");
    harness.store.insert_entity(moved).unwrap();
    harness
        .service
        .handle_event(&MutationEvent::for_entity(EventKind::EntityUpdated, article_ref("n-1")))
        .await
        .unwrap();
    harness.service.drain().await.unwrap();

    let doc = harness.document(ARTICLE_INDEX, "n-1").await.unwrap();
    assert!(doc.get("parentNode").is_none());
    assert!(doc.get("tags").is_none());
    assert_eq!(doc["fields"], json!({ "title": "Child" }));
}

#[tokio::test]
async fn test_delete_of_unindexed_entity_succeeds() {
    let harness = TestHarness::new();
    harness
        .service
        .handle_event(&MutationEvent::for_entity(
            EventKind::EntityDeleted,
            EntityRef::new(EntityType::User, "never-indexed"),
        ))
        .await
        .unwrap();

    let result = harness.service.drain().await.unwrap();
    assert_eq!(result.applied, 1);
    assert_eq!(result.retried, 0);
    assert!(harness.service.parked().unwrap().is_empty());
}

#[tokio::test]
async fn test_related_entities_are_restored() {
    let harness = TestHarness::new();
    harness
        .store
        .insert_entity(named(EntityType::User, "u-1", "joe"))
        .unwrap();
    harness
        .store
        .insert_entity(named(EntityType::Group, "g-1", "editors"))
        .unwrap();
    harness
        .store
        .insert_entity(named(EntityType::Role, "r-1", "writer"))
        .unwrap();

    let event = MutationEvent::for_entity(
        EventKind::EntityUpdated,
        EntityRef::new(EntityType::Group, "g-1"),
    )
    .with_related(vec![
        EntityRef::new(EntityType::User, "u-1"),
        EntityRef::new(EntityType::Role, "r-1"),
    ]);
    harness.service.handle_event(&event).await.unwrap();

    let result = harness.service.drain().await.unwrap();
    assert_eq!(result.applied, 3);
    assert_eq!(harness.document("user", "u-1").await.unwrap()["name"], "joe");
    assert_eq!(harness.document("role", "r-1").await.unwrap()["name"], "writer");
    assert_eq!(harness.document("group", "g-1").await.unwrap()["name"], "editors");
}

#[tokio::test]
async fn test_schema_update_reindexes_affected_nodes() {
    let harness = TestHarness::new();
    let v1 = article_schema(1);
    harness.store.insert_schema(v1.clone()).unwrap();
    harness
        .store
        .insert_entity(article("n-1", &v1, "One", &[]))
        .unwrap();
    harness
        .service
        .handle_event(&MutationEvent::for_entity(EventKind::EntityCreated, article_ref("n-1")))
        .await
        .unwrap();
    harness.service.drain().await.unwrap();

    // Publish v2 and migrate the node onto it.
    let v2 = article_schema(2);
    harness.store.insert_schema(v2.clone()).unwrap();
    harness
        .store
        .insert_entity(article("n-1", &v2, "One", &["migrated"]))
        .unwrap();
    harness
        .store
        .insert_entity(named(EntityType::Schema, "schema-article", "article"))
        .unwrap();

    let event = MutationEvent::for_entity(
        EventKind::SchemaUpdated,
        EntityRef::new(EntityType::Schema, "schema-article"),
    )
    .with_schema_version(v2.version_ref())
    .with_related(vec![article_ref("n-1")]);
    harness.service.handle_event(&event).await.unwrap();

    let result = harness.service.drain().await.unwrap();
    assert_eq!(result.applied, 2);

    let doc = harness.document(ARTICLE_INDEX, "n-1").await.unwrap();
    assert_eq!(doc["schema"]["version"], 2);
    assert_eq!(doc["fields"]["tags"], json!(["migrated"]));
    assert!(harness.document("schema", "schema-article").await.is_some());
}

#[tokio::test]
async fn test_full_resync_indexes_every_collection() {
    let harness = TestHarness::new();
    let schema = article_schema(1);
    harness.store.insert_schema(schema.clone()).unwrap();
    for uuid in ["n-1", "n-2", "n-3"] {
        harness
            .store
            .insert_entity(article(uuid, &schema, uuid, &[]))
            .unwrap();
    }
    harness
        .store
        .insert_entity(named(EntityType::User, "u-1", "joe"))
        .unwrap();
    harness
        .store
        .insert_entity(named(EntityType::Role, "r-1", "admin"))
        .unwrap();

    harness
        .service
        .handle_event(&MutationEvent::admin(EventKind::FullResyncRequested))
        .await
        .unwrap();
    let queued = harness.queue.peek(10).unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].len(), 5);

    let result = harness.service.drain().await.unwrap();
    assert_eq!(result.batches, 1);
    assert_eq!(result.applied, 5);
    // Nodes land in their project language index, as with events.
    assert_eq!(harness.count(ARTICLE_INDEX), 3);
    assert_eq!(harness.count("node"), 0);
    assert_eq!(harness.count("user"), 1);
    assert_eq!(harness.count("role"), 1);
}

#[tokio::test]
async fn test_resync_overwrites_event_indexed_node_in_place() {
    let harness = TestHarness::new();
    let schema = article_schema(1);
    harness.store.insert_schema(schema.clone()).unwrap();
    let node = article("n-1", &schema, "First", &[]);
    assert_eq!(node.index_name(), ARTICLE_INDEX);
    harness.store.insert_entity(node.clone()).unwrap();

    harness
        .service
        .handle_event(&MutationEvent::for_entity(
            EventKind::EntityCreated,
            EntityRef::for_entity(&node),
        ))
        .await
        .unwrap();
    harness.service.drain().await.unwrap();

    harness
        .store
        .insert_entity(article("n-1", &schema, "Second", &[]))
        .unwrap();
    harness.service.trigger_full_resync().await.unwrap();
    harness.service.drain().await.unwrap();

    assert_eq!(harness.count(ARTICLE_INDEX), 1);
    assert!(harness.document("node", "n-1").await.is_none());
    let doc = harness.document(ARTICLE_INDEX, "n-1").await.unwrap();
    assert_eq!(doc["fields"]["title"], "Second");
}

#[tokio::test]
async fn test_store_twice_leaves_single_document() {
    let harness = TestHarness::new();
    harness
        .store
        .insert_entity(named(EntityType::Tag, "t-1", "rust"))
        .unwrap();

    for _ in 0..2 {
        harness.service.trigger_full_resync().await.unwrap();
        harness.service.drain().await.unwrap();
    }
    assert_eq!(harness.count("tag"), 1);
    assert_eq!(harness.document("tag", "t-1").await.unwrap()["name"], "rust");
}
