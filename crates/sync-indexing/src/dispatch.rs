//! Routing of content-store events to index work.
//!
//! Handler selection is a single map lookup on the event kind. There is no
//! fallback: an event without a registered handler is reported as an error.

use std::collections::HashMap;
use std::sync::Arc;

use sync_types::{Batch, EntityRef, EntityType, Entry, EntryAction, EventKind, MutationEvent};
use thiserror::Error;
use tracing::{debug, info};

use crate::error::IndexingError;
use crate::store::ContentStore;

/// Errors raised while routing an event.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("No handler registered for event {0}")]
    NoHandler(EventKind),

    #[error("Handler already registered for event {0}")]
    DuplicateHandler(EventKind),

    #[error("Invalid {kind} event: {reason}")]
    InvalidEvent { kind: EventKind, reason: String },
}

/// Operator action that bypasses the document pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminAction {
    /// Re-store every entity of every root collection
    FullResync,
    /// Drop one index, or all of them
    ClearIndex(Option<String>),
    /// Drain the queue now instead of waiting for the next poll
    RunSync,
}

/// What an event turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Batch(Batch),
    Admin(AdminAction),
}

/// Converts one kind of event into index work.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &MutationEvent) -> Result<DispatchOutcome, DispatchError>;
}

impl<F> EventHandler for F
where
    F: Fn(&MutationEvent) -> Result<DispatchOutcome, DispatchError> + Send + Sync,
{
    fn handle(&self, event: &MutationEvent) -> Result<DispatchOutcome, DispatchError> {
        self(event)
    }
}

fn primary_entity(event: &MutationEvent) -> Result<&EntityRef, DispatchError> {
    event.entity.as_ref().ok_or_else(|| DispatchError::InvalidEvent {
        kind: event.kind,
        reason: "missing entity reference".to_string(),
    })
}

fn entry_for(action: EntryAction, entity: &EntityRef) -> Entry {
    Entry::new(
        action,
        entity.entity_type,
        entity.uuid.clone(),
        entity.index_name(),
    )
}

/// Applies one action to the event's entity and re-stores its dependents.
pub struct EntityActionHandler {
    action: EntryAction,
}

impl EntityActionHandler {
    pub fn new(action: EntryAction) -> Self {
        Self { action }
    }
}

impl EventHandler for EntityActionHandler {
    fn handle(&self, event: &MutationEvent) -> Result<DispatchOutcome, DispatchError> {
        let entity = primary_entity(event)?;
        let mut batch = Batch::new();
        batch.add(entry_for(self.action, entity));
        for related in &event.related {
            batch.add(entry_for(EntryAction::Store, related));
        }
        Ok(DispatchOutcome::Batch(batch))
    }
}

/// Re-stores a schema entity and every node the new version affects.
pub struct SchemaUpdateHandler;

impl EventHandler for SchemaUpdateHandler {
    fn handle(&self, event: &MutationEvent) -> Result<DispatchOutcome, DispatchError> {
        let schema = primary_entity(event)?;
        if !matches!(
            schema.entity_type,
            EntityType::Schema | EntityType::Microschema
        ) {
            return Err(DispatchError::InvalidEvent {
                kind: event.kind,
                reason: format!("expected a schema entity, got {}", schema.entity_type),
            });
        }

        let mut batch = Batch::new();
        batch.add(entry_for(EntryAction::Store, schema));
        for node in &event.related {
            batch.add(entry_for(EntryAction::Store, node));
        }
        Ok(DispatchOutcome::Batch(batch))
    }
}

fn full_resync_requested(_: &MutationEvent) -> Result<DispatchOutcome, DispatchError> {
    Ok(DispatchOutcome::Admin(AdminAction::FullResync))
}

fn index_clear_requested(event: &MutationEvent) -> Result<DispatchOutcome, DispatchError> {
    Ok(DispatchOutcome::Admin(AdminAction::ClearIndex(
        event.index_name.clone(),
    )))
}

fn sync_worker_requested(_: &MutationEvent) -> Result<DispatchOutcome, DispatchError> {
    Ok(DispatchOutcome::Admin(AdminAction::RunSync))
}

/// Map from event kind to handler.
#[derive(Default)]
pub struct EventDispatchTable {
    handlers: HashMap<EventKind, Arc<dyn EventHandler>>,
}

impl EventDispatchTable {
    /// Table with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with a handler for every [`EventKind`].
    pub fn with_default_handlers() -> Self {
        let mut handlers: HashMap<EventKind, Arc<dyn EventHandler>> = HashMap::new();
        handlers.insert(
            EventKind::EntityCreated,
            Arc::new(EntityActionHandler::new(EntryAction::Create)),
        );
        handlers.insert(
            EventKind::EntityUpdated,
            Arc::new(EntityActionHandler::new(EntryAction::Update)),
        );
        handlers.insert(
            EventKind::EntityDeleted,
            Arc::new(EntityActionHandler::new(EntryAction::Delete)),
        );
        handlers.insert(EventKind::SchemaUpdated, Arc::new(SchemaUpdateHandler));
        handlers.insert(EventKind::FullResyncRequested, Arc::new(full_resync_requested));
        handlers.insert(EventKind::IndexClearRequested, Arc::new(index_clear_requested));
        handlers.insert(EventKind::SyncWorkerRequested, Arc::new(sync_worker_requested));
        Self { handlers }
    }

    /// Register the handler for an event kind.
    pub fn register(
        &mut self,
        kind: EventKind,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), DispatchError> {
        if self.handlers.contains_key(&kind) {
            return Err(DispatchError::DuplicateHandler(kind));
        }
        self.handlers.insert(kind, handler);
        Ok(())
    }

    pub fn handles(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Route an event to its handler.
    pub fn dispatch(&self, event: &MutationEvent) -> Result<DispatchOutcome, DispatchError> {
        let handler = self
            .handlers
            .get(&event.kind)
            .ok_or(DispatchError::NoHandler(event.kind))?;
        let outcome = handler.handle(event)?;
        debug!(event = %event.kind, "Dispatched event");
        Ok(outcome)
    }
}

/// One batch holding a STORE entry for every entity of every root collection.
///
/// Each entry targets the index the entity lives in, the same one its
/// mutation events name. This is a full scan of the content store and is
/// meant for explicit operator requests only.
pub async fn full_resync(store: &dyn ContentStore) -> Result<Batch, IndexingError> {
    let mut batch = Batch::new();
    for entity_type in EntityType::ALL {
        let uuids = store.list_uuids(entity_type).await?;
        debug!(entity_type = %entity_type, count = uuids.len(), "Enumerated collection");
        for uuid in uuids {
            let Some(entity) = store.load_entity(entity_type, &uuid).await? else {
                debug!(entity_type = %entity_type, uuid = %uuid, "Entity vanished during resync");
                continue;
            };
            batch.add(entry_for(EntryAction::Store, &EntityRef::for_entity(&entity)));
        }
    }
    info!(batch_id = %batch.id, entries = batch.len(), "Built full resync batch");
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryContentStore;
    use pretty_assertions::assert_eq;
    use sync_types::{Entity, NamedRef, Schema, SchemaVersionRef};

    fn node_ref(uuid: &str) -> EntityRef {
        EntityRef::new(EntityType::Node, uuid).in_index("node-demo-en")
    }

    fn batch_of(outcome: DispatchOutcome) -> Batch {
        match outcome {
            DispatchOutcome::Batch(batch) => batch,
            other => panic!("expected batch, got {:?}", other),
        }
    }

    #[test]
    fn test_default_table_handles_every_kind() {
        let table = EventDispatchTable::with_default_handlers();
        for kind in EventKind::ALL {
            assert!(table.handles(kind), "no handler for {}", kind);
        }
    }

    #[test]
    fn test_entity_events_map_to_actions() {
        let table = EventDispatchTable::with_default_handlers();
        for (kind, action) in [
            (EventKind::EntityCreated, EntryAction::Create),
            (EventKind::EntityUpdated, EntryAction::Update),
            (EventKind::EntityDeleted, EntryAction::Delete),
        ] {
            let event = MutationEvent::for_entity(kind, node_ref("n-1"));
            let batch = batch_of(table.dispatch(&event).unwrap());
            assert_eq!(batch.len(), 1);
            assert_eq!(batch.entries[0].action, action);
            assert_eq!(batch.entries[0].index_name, "node-demo-en");
        }
    }

    #[test]
    fn test_update_restores_related() {
        let table = EventDispatchTable::with_default_handlers();
        let event = MutationEvent::for_entity(
            EventKind::EntityUpdated,
            EntityRef::new(EntityType::Tag, "t-1"),
        )
        .with_related(vec![node_ref("n-1"), node_ref("n-2")]);

        let batch = batch_of(table.dispatch(&event).unwrap());
        let actions: Vec<(EntryAction, &str)> = batch
            .entries
            .iter()
            .map(|e| (e.action, e.entity_uuid.as_str()))
            .collect();
        assert_eq!(
            actions,
            vec![
                (EntryAction::Update, "t-1"),
                (EntryAction::Store, "n-1"),
                (EntryAction::Store, "n-2"),
            ]
        );
        assert_eq!(batch.entries[0].index_name, "tag");
    }

    #[test]
    fn test_schema_update_stores_schema_and_nodes() {
        let table = EventDispatchTable::with_default_handlers();
        let event = MutationEvent::for_entity(
            EventKind::SchemaUpdated,
            EntityRef::new(EntityType::Schema, "s-1"),
        )
        .with_schema_version(SchemaVersionRef::new("article", "s-1", 2))
        .with_related(vec![node_ref("n-1")]);

        let batch = batch_of(table.dispatch(&event).unwrap());
        assert_eq!(batch.len(), 2);
        assert!(batch.entries.iter().all(|e| e.action == EntryAction::Store));
        assert_eq!(batch.entries[0].entity_type, EntityType::Schema);

        let wrong = MutationEvent::for_entity(EventKind::SchemaUpdated, node_ref("n-1"));
        assert!(matches!(
            table.dispatch(&wrong),
            Err(DispatchError::InvalidEvent { .. })
        ));
    }

    #[test]
    fn test_admin_events() {
        let table = EventDispatchTable::with_default_handlers();
        assert_eq!(
            table
                .dispatch(&MutationEvent::admin(EventKind::FullResyncRequested))
                .unwrap(),
            DispatchOutcome::Admin(AdminAction::FullResync)
        );
        assert_eq!(
            table
                .dispatch(
                    &MutationEvent::admin(EventKind::IndexClearRequested).with_index_name("user")
                )
                .unwrap(),
            DispatchOutcome::Admin(AdminAction::ClearIndex(Some("user".to_string())))
        );
        assert_eq!(
            table
                .dispatch(&MutationEvent::admin(EventKind::SyncWorkerRequested))
                .unwrap(),
            DispatchOutcome::Admin(AdminAction::RunSync)
        );
    }

    #[test]
    fn test_missing_handler_is_reported() {
        let table = EventDispatchTable::new();
        let event = MutationEvent::admin(EventKind::SyncWorkerRequested);
        assert!(matches!(
            table.dispatch(&event),
            Err(DispatchError::NoHandler(EventKind::SyncWorkerRequested))
        ));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut table = EventDispatchTable::new();
        let handler: Arc<dyn EventHandler> = Arc::new(SchemaUpdateHandler);
        table
            .register(EventKind::SchemaUpdated, handler.clone())
            .unwrap();
        assert!(matches!(
            table.register(EventKind::SchemaUpdated, handler),
            Err(DispatchError::DuplicateHandler(EventKind::SchemaUpdated))
        ));
    }

    #[test]
    fn test_entity_event_without_entity() {
        let table = EventDispatchTable::with_default_handlers();
        let event = MutationEvent::admin(EventKind::EntityDeleted);
        assert!(matches!(
            table.dispatch(&event),
            Err(DispatchError::InvalidEvent { .. })
        ));
    }

    #[tokio::test]
    async fn test_full_resync_one_batch_of_store_entries() {
        let schema = Schema::new("article", "s-1", 1);
        let store = InMemoryContentStore::new();
        for uuid in ["n-1", "n-2", "n-3"] {
            store.insert_entity(Entity::node(uuid, &schema, "en")).unwrap();
        }
        store.insert_entity(Entity::new(EntityType::User, "u-1")).unwrap();
        store.insert_entity(Entity::new(EntityType::Role, "r-1")).unwrap();

        let batch = full_resync(&store).await.unwrap();
        assert_eq!(batch.len(), 5);
        assert!(batch.entries.iter().all(|e| e.action == EntryAction::Store));

        let mut uuids: Vec<&str> = batch.entries.iter().map(|e| e.entity_uuid.as_str()).collect();
        uuids.sort();
        assert_eq!(uuids, vec!["n-1", "n-2", "n-3", "r-1", "u-1"]);
    }

    #[tokio::test]
    async fn test_full_resync_targets_same_index_as_events() {
        let schema = Schema::new("article", "s-1", 1);
        let store = InMemoryContentStore::new();
        let mut node = Entity::node("n-1", &schema, "en");
        node.project = Some(NamedRef::new("p-1", Some("demo")));
        store.insert_entity(node.clone()).unwrap();
        store.insert_entity(Entity::new(EntityType::Tag, "t-1")).unwrap();

        let batch = full_resync(&store).await.unwrap();
        let index_of = |uuid: &str| {
            batch
                .entries
                .iter()
                .find(|e| e.entity_uuid == uuid)
                .map(|e| e.index_name.clone())
                .unwrap()
        };
        assert_eq!(index_of("n-1"), "node-demo-en");
        assert_eq!(index_of("t-1"), "tag");

        let table = EventDispatchTable::with_default_handlers();
        let event = MutationEvent::for_entity(EventKind::EntityUpdated, EntityRef::for_entity(&node));
        let event_batch = batch_of(table.dispatch(&event).unwrap());
        assert_eq!(event_batch.entries[0].index_name, index_of("n-1"));
    }
}
