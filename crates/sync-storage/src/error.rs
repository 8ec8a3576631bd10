//! Queue storage errors.

use thiserror::Error;

/// Errors raised by the sync queue
#[derive(Error, Debug)]
pub enum StorageError {
    /// Underlying RocksDB call failed
    #[error("Queue database error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// Database is missing one of the queue's column families
    #[error("Missing column family: {0}")]
    ColumnFamilyNotFound(String),

    /// Stored key does not decode to a batch sequence
    #[error("Malformed queue key: {0}")]
    Key(String),

    /// Batch could not be encoded or decoded
    #[error("Batch encoding error: {0}")]
    Serialization(String),

    /// A batch with this id is already queued
    #[error("Batch already queued: {0}")]
    Conflict(String),

    /// Queue lock was poisoned by a panicking holder
    #[error("Queue lock poisoned: {0}")]
    Lock(String),
}

impl StorageError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict(_))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_error_maps_to_serialization() {
        let err: StorageError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, StorageError::Serialization(_)));
        assert!(!err.is_conflict());
        assert!(StorageError::Conflict("b-1".into()).is_conflict());
    }
}
