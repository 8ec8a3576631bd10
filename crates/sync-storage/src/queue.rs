//! RocksDB-backed sync queue.
//!
//! Provides:
//! - Durable FIFO of batches keyed by enqueue sequence
//! - Atomic take (delete-and-return) under a single critical section
//! - Batch id uniqueness across the live queue
//! - Parking of batches that exhausted their retry budget
//!
//! All mutations hold `state`; `size()` reads an atomic counter and never
//! blocks. The lock only covers this process: running two coordinators
//! against the same directory is not supported (RocksDB refuses the second
//! open anyway).

use rocksdb::{ColumnFamily, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use sync_types::Batch;

use crate::column_families::{
    build_cf_descriptors, ALL_CF_NAMES, CF_BATCHES, CF_BATCH_IDS, CF_PARKED,
};
use crate::error::StorageError;
use crate::keys::{batch_id_key, parked_key, BatchKey};

/// Mutable queue state guarded by the queue lock
struct QueueState {
    next_sequence: u64,
}

/// Queue statistics
#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    pub pending: usize,
    pub parked: usize,
    pub next_sequence: u64,
}

/// Durable, ordered queue of batches.
pub struct SyncQueue {
    db: DB,
    state: Mutex<QueueState>,
    pending: AtomicUsize,
}

impl SyncQueue {
    /// Open the queue at the given path, creating it if necessary.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening sync queue at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(2);

        let db = DB::open_cf_descriptors(&db_opts, path, build_cf_descriptors())?;

        let (next_sequence, pending) = Self::scan_batches(&db)?;
        info!(pending, next_sequence, "Sync queue ready");

        Ok(Self {
            db,
            state: Mutex::new(QueueState { next_sequence }),
            pending: AtomicUsize::new(pending),
        })
    }

    /// Find the next free sequence number and count pending batches.
    fn scan_batches(db: &DB) -> Result<(u64, usize), StorageError> {
        let cf = db
            .cf_handle(CF_BATCHES)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(CF_BATCHES.to_string()))?;

        let next_sequence = match db.iterator_cf(&cf, IteratorMode::End).next() {
            Some(item) => {
                let (key, _) = item?;
                BatchKey::from_bytes(&key)?.sequence + 1
            }
            None => 0,
        };

        let mut pending = 0;
        for item in db.iterator_cf(&cf, IteratorMode::Start) {
            item?;
            pending += 1;
        }

        Ok((next_sequence, pending))
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, QueueState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))
    }

    /// Append a batch to the tail of the queue.
    ///
    /// Fails with [`StorageError::Conflict`] if a batch with the same id is
    /// already queued. Returns the assigned sequence number.
    pub fn enqueue(&self, batch: &Batch) -> Result<u64, StorageError> {
        let batches_cf = self.cf(CF_BATCHES)?;
        let ids_cf = self.cf(CF_BATCH_IDS)?;
        let bytes = batch.to_bytes()?;

        let mut state = self.lock()?;

        if self.db.get_cf(&ids_cf, batch_id_key(&batch.id))?.is_some() {
            return Err(StorageError::Conflict(batch.id.clone()));
        }

        let key = BatchKey::new(state.next_sequence);
        let mut write = WriteBatch::default();
        write.put_cf(&batches_cf, key.to_bytes(), &bytes);
        write.put_cf(&ids_cf, batch_id_key(&batch.id), key.sequence_bytes());
        self.db.write(write)?;

        state.next_sequence += 1;
        self.pending.fetch_add(1, Ordering::SeqCst);

        debug!(
            batch_id = %batch.id,
            sequence = key.sequence,
            entries = batch.len(),
            "Enqueued batch"
        );
        Ok(key.sequence)
    }

    /// Remove and return the oldest pending batch.
    ///
    /// Returns `Ok(None)` when the queue is empty. Two concurrent callers
    /// never receive the same batch.
    pub fn take(&self) -> Result<Option<Batch>, StorageError> {
        let batches_cf = self.cf(CF_BATCHES)?;
        let _state = self.lock()?;

        loop {
            let head = self.db.iterator_cf(&batches_cf, IteratorMode::Start).next();
            let (key, value) = match head {
                Some(item) => item?,
                None => return Ok(None),
            };

            match Batch::from_bytes(&value) {
                Ok(batch) => {
                    self.delete_locked(&key, &batch.id)?;
                    debug!(batch_id = %batch.id, "Took batch");
                    return Ok(Some(batch));
                }
                Err(e) => {
                    // Unreadable head would block the queue forever.
                    self.quarantine_locked(&key, &value, &e.to_string())?;
                }
            }
        }
    }

    /// Remove and return the batch with the given id, if queued.
    pub fn take_by_id(&self, batch_id: &str) -> Result<Option<Batch>, StorageError> {
        let batches_cf = self.cf(CF_BATCHES)?;
        let ids_cf = self.cf(CF_BATCH_IDS)?;
        let _state = self.lock()?;

        let Some(seq_bytes) = self.db.get_cf(&ids_cf, batch_id_key(batch_id))? else {
            return Ok(None);
        };
        let key = BatchKey::from_sequence_bytes(&seq_bytes)?.to_bytes();

        let Some(value) = self.db.get_cf(&batches_cf, &key)? else {
            warn!(batch_id, "Dangling batch id index entry, removing");
            self.db.delete_cf(&ids_cf, batch_id_key(batch_id))?;
            return Ok(None);
        };

        let batch = Batch::from_bytes(&value)?;
        self.delete_locked(&key, batch_id)?;
        debug!(batch_id, "Took batch by id");
        Ok(Some(batch))
    }

    /// Delete a queued batch without returning it. Returns whether it existed.
    pub fn remove(&self, batch_id: &str) -> Result<bool, StorageError> {
        let ids_cf = self.cf(CF_BATCH_IDS)?;
        let _state = self.lock()?;

        let Some(seq_bytes) = self.db.get_cf(&ids_cf, batch_id_key(batch_id))? else {
            return Ok(false);
        };
        let key = BatchKey::from_sequence_bytes(&seq_bytes)?.to_bytes();
        self.delete_locked(&key, batch_id)?;
        debug!(batch_id, "Removed batch");
        Ok(true)
    }

    /// Drop every pending batch. Entries are not applied.
    ///
    /// Returns the number of batches dropped. Parked batches are kept.
    pub fn clear(&self) -> Result<usize, StorageError> {
        let batches_cf = self.cf(CF_BATCHES)?;
        let ids_cf = self.cf(CF_BATCH_IDS)?;
        let _state = self.lock()?;

        let mut write = WriteBatch::default();
        let mut count = 0;
        for item in self.db.iterator_cf(&batches_cf, IteratorMode::Start) {
            let (key, _) = item?;
            write.delete_cf(&batches_cf, &key);
            count += 1;
        }
        for item in self.db.iterator_cf(&ids_cf, IteratorMode::Start) {
            let (key, _) = item?;
            write.delete_cf(&ids_cf, &key);
        }
        self.db.write(write)?;
        self.pending.store(0, Ordering::SeqCst);

        warn!(dropped = count, "Cleared sync queue");
        Ok(count)
    }

    /// Number of pending batches.
    pub fn size(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Pending batches in queue order, without removing them.
    pub fn peek(&self, limit: usize) -> Result<Vec<Batch>, StorageError> {
        let cf = self.cf(CF_BATCHES)?;
        let mut results = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start).take(limit) {
            let (_, value) = item?;
            results.push(Batch::from_bytes(&value)?);
        }
        Ok(results)
    }

    // ==================== Parked Batches ====================

    /// Retain a batch outside the live queue.
    pub fn park(&self, batch: &Batch) -> Result<(), StorageError> {
        let cf = self.cf(CF_PARKED)?;
        self.db.put_cf(&cf, parked_key(&batch.id), batch.to_bytes()?)?;
        warn!(
            batch_id = %batch.id,
            attempts = batch.attempts,
            entries = batch.len(),
            "Parked batch"
        );
        Ok(())
    }

    /// All parked batches, ordered by id.
    pub fn parked(&self) -> Result<Vec<Batch>, StorageError> {
        let cf = self.cf(CF_PARKED)?;
        let mut results = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, value) = item?;
            match Batch::from_bytes(&value) {
                Ok(batch) => results.push(batch),
                Err(e) => warn!(
                    key = %String::from_utf8_lossy(&key),
                    error = %e,
                    "Skipping unreadable parked batch"
                ),
            }
        }
        Ok(results)
    }

    /// Move every parked batch back to the tail of the live queue with a
    /// reset attempt counter. Returns the number requeued.
    pub fn requeue_parked(&self) -> Result<usize, StorageError> {
        let cf = self.cf(CF_PARKED)?;
        let mut count = 0;
        for mut batch in self.parked()? {
            let id = batch.id.clone();
            batch.attempts = 0;
            match self.enqueue(&batch) {
                Ok(_) => {}
                Err(StorageError::Conflict(_)) => {
                    warn!(batch_id = %id, "Parked batch id already queued, keeping it parked");
                    continue;
                }
                Err(e) => return Err(e),
            }
            self.db.delete_cf(&cf, parked_key(&id))?;
            count += 1;
        }
        if count > 0 {
            info!(requeued = count, "Requeued parked batches");
        }
        Ok(count)
    }

    /// Queue statistics for status reporting.
    pub fn stats(&self) -> Result<QueueStats, StorageError> {
        let parked_cf = self.cf(CF_PARKED)?;
        let mut parked = 0;
        for item in self.db.iterator_cf(&parked_cf, IteratorMode::Start) {
            item?;
            parked += 1;
        }
        let next_sequence = self.lock()?.next_sequence;
        Ok(QueueStats {
            pending: self.size(),
            parked,
            next_sequence,
        })
    }

    /// Flush all column families to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.flush_cf(&cf)?;
            }
        }
        Ok(())
    }

    /// Delete a batch and its id index entry. Caller holds the lock.
    fn delete_locked(&self, key: &[u8], batch_id: &str) -> Result<(), StorageError> {
        let batches_cf = self.cf(CF_BATCHES)?;
        let ids_cf = self.cf(CF_BATCH_IDS)?;

        let mut write = WriteBatch::default();
        write.delete_cf(&batches_cf, key);
        write.delete_cf(&ids_cf, batch_id_key(batch_id));
        self.db.write(write)?;
        self.pending.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    /// Move an undecodable queue value to the parked column family as raw
    /// bytes, along with any id index entry still pointing at it. Caller
    /// holds the lock.
    fn quarantine_locked(&self, key: &[u8], value: &[u8], reason: &str) -> Result<(), StorageError> {
        let batches_cf = self.cf(CF_BATCHES)?;
        let ids_cf = self.cf(CF_BATCH_IDS)?;
        let parked_cf = self.cf(CF_PARKED)?;
        let batch_key = BatchKey::from_bytes(key)?;
        let sequence = batch_key.sequence;
        let sequence_bytes = batch_key.sequence_bytes();

        let mut write = WriteBatch::default();
        write.delete_cf(&batches_cf, key);
        write.put_cf(&parked_cf, parked_key(&format!("corrupt-{:020}", sequence)), value);
        // The batch id is unreadable, so find its index entry by sequence.
        for item in self.db.iterator_cf(&ids_cf, IteratorMode::Start) {
            let (id_key, id_sequence) = item?;
            if id_sequence.as_ref() == sequence_bytes.as_slice() {
                write.delete_cf(&ids_cf, &id_key);
            }
        }
        self.db.write(write)?;
        self.pending.fetch_sub(1, Ordering::SeqCst);

        error!(sequence, reason, "Quarantined unreadable batch");
        Ok(())
    }
}
