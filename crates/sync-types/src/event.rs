//! Mutation events published by the content store.
//!
//! Events are the inbound side of the sync pipeline: each one is routed by
//! its [`EventKind`] to exactly one handler, which turns it into queued
//! index work or an administrative action.

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityType};
use crate::schema::SchemaVersionRef;

/// Identifier of a content-store event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// An entity was created
    EntityCreated,
    /// An entity was updated
    EntityUpdated,
    /// An entity was deleted
    EntityDeleted,
    /// A new schema version was published
    SchemaUpdated,
    /// Operator asked for a full reindex
    FullResyncRequested,
    /// Operator asked to clear one or all indices
    IndexClearRequested,
    /// Operator asked for an immediate queue drain
    SyncWorkerRequested,
}

impl EventKind {
    /// Every event kind the pipeline is expected to handle.
    pub const ALL: [EventKind; 7] = [
        EventKind::EntityCreated,
        EventKind::EntityUpdated,
        EventKind::EntityDeleted,
        EventKind::SchemaUpdated,
        EventKind::FullResyncRequested,
        EventKind::IndexClearRequested,
        EventKind::SyncWorkerRequested,
    ];
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::EntityCreated => write!(f, "entity.created"),
            EventKind::EntityUpdated => write!(f, "entity.updated"),
            EventKind::EntityDeleted => write!(f, "entity.deleted"),
            EventKind::SchemaUpdated => write!(f, "schema.updated"),
            EventKind::FullResyncRequested => write!(f, "index.resync"),
            EventKind::IndexClearRequested => write!(f, "index.clear"),
            EventKind::SyncWorkerRequested => write!(f, "index.sync"),
        }
    }
}

/// Reference to an entity touched by an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: EntityType,
    pub uuid: String,
    /// Target index; the entity type's default index when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,
}

impl EntityRef {
    pub fn new(entity_type: EntityType, uuid: impl Into<String>) -> Self {
        Self {
            entity_type,
            uuid: uuid.into(),
            index_name: None,
        }
    }

    /// Reference to `entity` in the index that holds it.
    pub fn for_entity(entity: &Entity) -> Self {
        Self::new(entity.entity_type, entity.uuid.clone()).in_index(entity.index_name())
    }

    pub fn in_index(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    /// The index this reference resolves to.
    pub fn index_name(&self) -> String {
        self.index_name
            .clone()
            .unwrap_or_else(|| self.entity_type.default_index_name().to_string())
    }
}

/// A mutation event from the content store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationEvent {
    pub kind: EventKind,

    /// Primary entity of the event (absent for administrative events)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityRef>,

    /// Affected schema version, for updates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<SchemaVersionRef>,

    /// Other entities whose index documents depend on the primary entity
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<EntityRef>,

    /// Index to clear; all indices when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,
}

impl MutationEvent {
    /// Event about a single entity.
    pub fn for_entity(kind: EventKind, entity: EntityRef) -> Self {
        Self {
            kind,
            entity: Some(entity),
            schema_version: None,
            related: Vec::new(),
            index_name: None,
        }
    }

    /// Event with no entity payload.
    pub fn admin(kind: EventKind) -> Self {
        Self {
            kind,
            entity: None,
            schema_version: None,
            related: Vec::new(),
            index_name: None,
        }
    }

    pub fn with_related(mut self, related: Vec<EntityRef>) -> Self {
        self.related = related;
        self
    }

    pub fn with_schema_version(mut self, version: SchemaVersionRef) -> Self {
        self.schema_version = Some(version);
        self
    }

    pub fn with_index_name(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }
}
