//! Key encoding and decoding for the queue column families.
//!
//! - batches: `batch:{sequence:020}` (zero-padded so byte order = FIFO order)
//! - batch_ids: `id:{batch_id}`
//! - parked: `parked:{batch_id}`

use crate::error::StorageError;

/// Key for a queued batch
/// Format: batch:{sequence:020}
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BatchKey {
    /// Monotonic enqueue sequence number
    pub sequence: u64,
}

impl BatchKey {
    pub fn new(sequence: u64) -> Self {
        Self { sequence }
    }

    /// Encode key to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("batch:{:020}", self.sequence).into_bytes()
    }

    /// Decode key from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;

        let sequence = s
            .strip_prefix("batch:")
            .ok_or_else(|| StorageError::Key(format!("Invalid batch key format: {}", s)))?
            .parse::<u64>()
            .map_err(|e| StorageError::Key(format!("Invalid sequence: {}", e)))?;

        Ok(Self { sequence })
    }

    /// Encode the sequence as the value stored in the id index
    pub fn sequence_bytes(&self) -> [u8; 8] {
        self.sequence.to_be_bytes()
    }

    /// Decode a sequence stored in the id index
    pub fn from_sequence_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let raw: [u8; 8] = bytes
            .try_into()
            .map_err(|_| StorageError::Key(format!("Invalid sequence length: {}", bytes.len())))?;
        Ok(Self::new(u64::from_be_bytes(raw)))
    }
}

/// Key in the batch id index
/// Format: id:{batch_id}
pub fn batch_id_key(batch_id: &str) -> Vec<u8> {
    format!("id:{}", batch_id).into_bytes()
}

/// Key for a parked batch
/// Format: parked:{batch_id}
pub fn parked_key(batch_id: &str) -> Vec<u8> {
    format!("parked:{}", batch_id).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_key_bytes() {
        let key = BatchKey::new(12345);
        assert_eq!(key.to_bytes(), b"batch:00000000000000012345".to_vec());
        assert_eq!(BatchKey::from_bytes(&key.to_bytes()).unwrap(), key);
    }

    #[test]
    fn test_batch_key_lexicographic_order() {
        let key1 = BatchKey::new(9);
        let key2 = BatchKey::new(10);
        assert!(key1.to_bytes() < key2.to_bytes());
    }

    #[test]
    fn test_batch_key_rejects_foreign_prefix() {
        assert!(BatchKey::from_bytes(b"outbox:001").is_err());
        assert!(BatchKey::from_bytes(b"batch:abc").is_err());
    }

    #[test]
    fn test_sequence_bytes() {
        let key = BatchKey::new(42);
        let decoded = BatchKey::from_sequence_bytes(&key.sequence_bytes()).unwrap();
        assert_eq!(decoded, key);
        assert!(BatchKey::from_sequence_bytes(&[1, 2, 3]).is_err());
    }
}
