//! Entry point tying event dispatch, the queue and the drain workers together.

use std::sync::Arc;
use std::time::Duration;

use sync_engine::SearchEngine;
use sync_storage::{QueueStats, SyncQueue};
use sync_types::{Batch, MutationEvent};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::coordinator::{CoordinatorConfig, DrainResult, SyncCoordinator};
use crate::dispatch::{full_resync, AdminAction, DispatchOutcome, EventDispatchTable};
use crate::error::IndexingError;
use crate::store::ContentStore;
use crate::worker;

/// Search index synchronisation service.
///
/// Events are turned into queued batches; workers drain the queue into the
/// search engine in the background.
pub struct SyncService {
    table: EventDispatchTable,
    queue: Arc<SyncQueue>,
    store: Arc<dyn ContentStore>,
    engine: Arc<dyn SearchEngine>,
    coordinator: Arc<SyncCoordinator>,
    notify: Arc<Notify>,
}

impl SyncService {
    pub fn new(
        queue: Arc<SyncQueue>,
        store: Arc<dyn ContentStore>,
        engine: Arc<dyn SearchEngine>,
        config: CoordinatorConfig,
    ) -> Self {
        let coordinator = Arc::new(SyncCoordinator::new(
            queue.clone(),
            store.clone(),
            engine.clone(),
            config,
        ));
        Self {
            table: EventDispatchTable::with_default_handlers(),
            queue,
            store,
            engine,
            coordinator,
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    pub fn queue(&self) -> &Arc<SyncQueue> {
        &self.queue
    }

    /// Dispatch an event and act on the outcome.
    pub async fn handle_event(&self, event: &MutationEvent) -> Result<(), IndexingError> {
        match self.table.dispatch(event)? {
            DispatchOutcome::Batch(batch) => self.submit(batch),
            DispatchOutcome::Admin(AdminAction::FullResync) => {
                self.trigger_full_resync().await.map(|_| ())
            }
            DispatchOutcome::Admin(AdminAction::ClearIndex(index)) => {
                self.clear_index(index.as_deref()).await
            }
            DispatchOutcome::Admin(AdminAction::RunSync) => {
                self.notify.notify_one();
                Ok(())
            }
        }
    }

    /// Queue a batch and wake the workers.
    pub fn submit(&self, batch: Batch) -> Result<(), IndexingError> {
        if batch.is_empty() {
            debug!(batch_id = %batch.id, "Skipping empty batch");
            return Ok(());
        }
        self.queue.enqueue(&batch)?;
        debug!(batch_id = %batch.id, entries = batch.len(), "Queued batch");
        self.notify.notify_one();
        Ok(())
    }

    /// Queue a STORE of every entity. Returns the batch id.
    pub async fn trigger_full_resync(&self) -> Result<String, IndexingError> {
        let batch = full_resync(self.store.as_ref()).await?;
        let id = batch.id.clone();
        self.queue.enqueue(&batch)?;
        info!(batch_id = %id, queue_size = self.queue.size(), "Full resync queued");
        self.notify.notify_one();
        Ok(id)
    }

    /// Drop one index or all of them. The queue is left untouched.
    pub async fn clear_index(&self, index: Option<&str>) -> Result<(), IndexingError> {
        self.engine.clear(index).await?;
        self.coordinator.forget_mappings(index);
        info!(index = index.unwrap_or("*"), "Cleared search index");
        Ok(())
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.size()
    }

    pub fn queue_stats(&self) -> Result<QueueStats, IndexingError> {
        Ok(self.queue.stats()?)
    }

    /// Drop every pending batch. The index is left untouched.
    pub fn clear_queue(&self) -> Result<usize, IndexingError> {
        let removed = self.queue.clear()?;
        info!(removed, "Cleared sync queue");
        Ok(removed)
    }

    pub fn parked(&self) -> Result<Vec<Batch>, IndexingError> {
        Ok(self.queue.parked()?)
    }

    pub fn requeue_parked(&self) -> Result<usize, IndexingError> {
        let moved = self.queue.requeue_parked()?;
        if moved > 0 {
            self.notify.notify_one();
        }
        Ok(moved)
    }

    /// Drain the queue on the current task.
    pub async fn drain(&self) -> Result<DrainResult, IndexingError> {
        self.coordinator.drain().await
    }

    /// Start background workers; they stop when `cancel` fires.
    pub fn spawn_workers(
        &self,
        count: usize,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        worker::spawn_workers(
            self.coordinator.clone(),
            count,
            poll_interval,
            self.notify.clone(),
            cancel,
        )
    }
}
