//! Read access to the authoritative content store.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sync_types::{Entity, EntityType, Schema, SchemaVersionRef};
use tracing::info;

use crate::error::IndexingError;

/// Entities and schemas as published by the content platform.
///
/// The sync pipeline only reads through this trait; it never mutates content.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Current state of an entity, or None if it no longer exists.
    async fn load_entity(
        &self,
        entity_type: EntityType,
        uuid: &str,
    ) -> Result<Option<Entity>, IndexingError>;

    /// A published schema version.
    async fn load_schema(&self, version: &SchemaVersionRef) -> Result<Option<Schema>, IndexingError>;

    /// UUIDs of every entity in a root collection.
    async fn list_uuids(&self, entity_type: EntityType) -> Result<Vec<String>, IndexingError>;
}

/// Serializable dump of a content store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentSnapshot {
    #[serde(default)]
    pub schemas: Vec<Schema>,
    #[serde(default)]
    pub entities: Vec<Entity>,
}

type EntityKey = (EntityType, String);
type SchemaKey = (String, u32);

/// Content store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    entities: RwLock<BTreeMap<EntityKey, Entity>>,
    schemas: RwLock<HashMap<SchemaKey, Schema>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: ContentSnapshot) -> Self {
        let schemas = snapshot
            .schemas
            .into_iter()
            .map(|s| ((s.uuid.clone(), s.version), s))
            .collect();
        let entities = snapshot
            .entities
            .into_iter()
            .map(|e| ((e.entity_type, e.uuid.clone()), e))
            .collect();
        Self {
            entities: RwLock::new(entities),
            schemas: RwLock::new(schemas),
        }
    }

    /// Load a JSON snapshot file.
    pub fn load(path: &Path) -> Result<Self, IndexingError> {
        let bytes = std::fs::read(path)?;
        let snapshot: ContentSnapshot = serde_json::from_slice(&bytes)?;
        info!(
            path = ?path,
            schemas = snapshot.schemas.len(),
            entities = snapshot.entities.len(),
            "Loaded content snapshot"
        );
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn insert_entity(&self, entity: Entity) -> Result<(), IndexingError> {
        self.entities
            .write()
            .map_err(|e| IndexingError::ContentStore(e.to_string()))?
            .insert((entity.entity_type, entity.uuid.clone()), entity);
        Ok(())
    }

    pub fn remove_entity(&self, entity_type: EntityType, uuid: &str) -> Result<bool, IndexingError> {
        Ok(self
            .entities
            .write()
            .map_err(|e| IndexingError::ContentStore(e.to_string()))?
            .remove(&(entity_type, uuid.to_string()))
            .is_some())
    }

    pub fn insert_schema(&self, schema: Schema) -> Result<(), IndexingError> {
        self.schemas
            .write()
            .map_err(|e| IndexingError::ContentStore(e.to_string()))?
            .insert((schema.uuid.clone(), schema.version), schema);
        Ok(())
    }

    /// Number of stored entities.
    pub fn len(&self) -> usize {
        self.entities.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn load_entity(
        &self,
        entity_type: EntityType,
        uuid: &str,
    ) -> Result<Option<Entity>, IndexingError> {
        let entities = self
            .entities
            .read()
            .map_err(|e| IndexingError::ContentStore(e.to_string()))?;
        Ok(entities.get(&(entity_type, uuid.to_string())).cloned())
    }

    async fn load_schema(&self, version: &SchemaVersionRef) -> Result<Option<Schema>, IndexingError> {
        let schemas = self
            .schemas
            .read()
            .map_err(|e| IndexingError::ContentStore(e.to_string()))?;
        Ok(schemas
            .get(&(version.uuid.clone(), version.version))
            .cloned())
    }

    async fn list_uuids(&self, entity_type: EntityType) -> Result<Vec<String>, IndexingError> {
        let entities = self
            .entities
            .read()
            .map_err(|e| IndexingError::ContentStore(e.to_string()))?;
        Ok(entities
            .keys()
            .filter(|(t, _)| *t == entity_type)
            .map(|(_, uuid)| uuid.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_types::{FieldType, FieldValue};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_entity_and_schema() {
        let schema = Schema::new("article", "s-1", 1).with_field("title", FieldType::String);
        let node = Entity::node("n-1", &schema, "en")
            .with_field("title", FieldValue::String("Hello".into()));

        let store = InMemoryContentStore::new();
        store.insert_schema(schema.clone()).unwrap();
        store.insert_entity(node.clone()).unwrap();

        assert_eq!(
            store.load_entity(EntityType::Node, "n-1").await.unwrap(),
            Some(node)
        );
        assert!(store
            .load_entity(EntityType::User, "n-1")
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            store.load_schema(&schema.version_ref()).await.unwrap(),
            Some(schema)
        );
        assert!(store
            .load_schema(&SchemaVersionRef::new("article", "s-1", 2))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_list_uuids_by_type() {
        let store = InMemoryContentStore::new();
        store.insert_entity(Entity::new(EntityType::User, "u-2")).unwrap();
        store.insert_entity(Entity::new(EntityType::User, "u-1")).unwrap();
        store.insert_entity(Entity::new(EntityType::Role, "r-1")).unwrap();

        assert_eq!(
            store.list_uuids(EntityType::User).await.unwrap(),
            vec!["u-1".to_string(), "u-2".to_string()]
        );
        assert!(store.list_uuids(EntityType::Tag).await.unwrap().is_empty());

        assert!(store.remove_entity(EntityType::User, "u-1").unwrap());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_load_snapshot_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("content.json");
        let snapshot = ContentSnapshot {
            schemas: vec![Schema::new("article", "s-1", 1)],
            entities: vec![Entity::new(EntityType::Group, "g-1").with_name("editors")],
        };
        std::fs::write(&path, serde_json::to_vec(&snapshot).unwrap()).unwrap();

        let store = InMemoryContentStore::load(&path).unwrap();
        let group = store
            .load_entity(EntityType::Group, "g-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(group.name.as_deref(), Some("editors"));
    }
}
