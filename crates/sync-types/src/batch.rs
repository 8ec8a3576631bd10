//! Queued units of index work.
//!
//! A [`Batch`] is written to the sync queue when a logical unit of mutation
//! completes in the content store. Each [`Entry`] inside it is one index
//! mutation. Batches are replayed at least once, so every action must be
//! safe to apply repeatedly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::entity::EntityType;

/// Index mutation requested by an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryAction {
    Create,
    Update,
    Delete,
    /// Idempotent upsert
    Store,
}

impl EntryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryAction::Create => "create",
            EntryAction::Update => "update",
            EntryAction::Delete => "delete",
            EntryAction::Store => "store",
        }
    }

    /// Whether applying this action writes a document (as opposed to removing one).
    pub fn writes_document(&self) -> bool {
        !matches!(self, EntryAction::Delete)
    }
}

impl std::fmt::Display for EntryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single index mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entry {
    pub action: EntryAction,
    pub entity_type: EntityType,
    pub entity_uuid: String,
    pub index_name: String,
}

impl Entry {
    pub fn new(
        action: EntryAction,
        entity_type: EntityType,
        entity_uuid: impl Into<String>,
        index_name: impl Into<String>,
    ) -> Self {
        Self {
            action,
            entity_type,
            entity_uuid: entity_uuid.into(),
            index_name: index_name.into(),
        }
    }

    /// Entry targeting the entity type's default index.
    pub fn for_default_index(
        action: EntryAction,
        entity_type: EntityType,
        entity_uuid: impl Into<String>,
    ) -> Self {
        Self::new(
            action,
            entity_type,
            entity_uuid,
            entity_type.default_index_name(),
        )
    }
}

/// An ordered group of entries queued together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// Unique batch identifier
    pub id: String,

    /// Creation time (milliseconds since epoch for JSON compatibility)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,

    /// Number of failed delivery attempts behind this batch
    #[serde(default)]
    pub attempts: u32,

    pub entries: Vec<Entry>,
}

impl Batch {
    /// Create an empty batch with a fresh ULID.
    pub fn new() -> Self {
        Self::with_id(Ulid::new().to_string())
    }

    /// Create an empty batch with an explicit id.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
            attempts: 0,
            entries: Vec::new(),
        }
    }

    /// Create a batch from a list of entries.
    pub fn from_entries(entries: Vec<Entry>) -> Self {
        let mut batch = Self::new();
        batch.entries = entries;
        batch
    }

    /// Batch carrying only the given entries of `self`, for redelivery.
    ///
    /// Gets a fresh id so it can never collide with the original.
    pub fn retry_of(&self, entries: Vec<Entry>) -> Self {
        Self {
            id: Ulid::new().to_string(),
            created_at: Utc::now(),
            attempts: self.attempts + 1,
            entries,
        }
    }

    pub fn add(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_bytes_preserve_entries() {
        let mut batch = Batch::with_id("batch-1");
        batch.add(Entry::for_default_index(
            EntryAction::Store,
            EntityType::User,
            "u-1",
        ));
        batch.add(Entry::new(
            EntryAction::Delete,
            EntityType::Node,
            "n-1",
            "node-project-a",
        ));

        let decoded = Batch::from_bytes(&batch.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.id, "batch-1");
        assert_eq!(decoded.entries, batch.entries);
        assert_eq!(
            decoded.created_at.timestamp_millis(),
            batch.created_at.timestamp_millis()
        );
    }

    #[test]
    fn test_retry_of() {
        let mut batch = Batch::new();
        batch.attempts = 2;
        let entry = Entry::for_default_index(EntryAction::Store, EntityType::Role, "r-1");
        batch.add(entry.clone());
        batch.add(Entry::for_default_index(
            EntryAction::Store,
            EntityType::Role,
            "r-2",
        ));

        let retry = batch.retry_of(vec![entry.clone()]);
        assert_ne!(retry.id, batch.id);
        assert_eq!(retry.attempts, 3);
        assert_eq!(retry.entries, vec![entry]);
    }

    #[test]
    fn test_action_json_format() {
        let json = serde_json::to_string(&EntryAction::Store).unwrap();
        assert_eq!(json, "\"store\"");
        assert!(EntryAction::Update.writes_document());
        assert!(!EntryAction::Delete.writes_document());
    }
}
