//! Background drain workers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::coordinator::SyncCoordinator;

/// Drains the queue whenever work is signalled or the poll interval elapses.
pub struct SyncWorker {
    id: usize,
    coordinator: Arc<SyncCoordinator>,
    poll_interval: Duration,
    notify: Arc<Notify>,
    cancel: CancellationToken,
}

impl SyncWorker {
    pub fn new(
        id: usize,
        coordinator: Arc<SyncCoordinator>,
        poll_interval: Duration,
        notify: Arc<Notify>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            coordinator,
            poll_interval,
            notify,
            cancel,
        }
    }

    /// Run until cancelled.
    pub async fn run(self) {
        info!(worker = self.id, "Sync worker started");

        loop {
            match self.coordinator.drain_until(&self.cancel).await {
                Ok(result) if result.has_updates() => {
                    debug!(worker = self.id, batches = result.batches, "Drain finished");
                }
                Ok(_) => {}
                Err(e) => error!(worker = self.id, error = %e, "Drain failed"),
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!(worker = self.id, "Sync worker stopped");
    }
}

/// Spawn `count` workers sharing one coordinator.
pub fn spawn_workers(
    coordinator: Arc<SyncCoordinator>,
    count: usize,
    poll_interval: Duration,
    notify: Arc<Notify>,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    (0..count.max(1))
        .map(|id| {
            let worker = SyncWorker::new(
                id,
                coordinator.clone(),
                poll_interval,
                notify.clone(),
                cancel.clone(),
            );
            tokio::spawn(worker.run())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::CoordinatorConfig;
    use crate::store::InMemoryContentStore;
    use sync_engine::TantivyEngine;
    use sync_storage::SyncQueue;
    use sync_types::{Batch, Entity, EntityType, Entry, EntryAction};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_workers_drain_and_stop() {
        let temp = TempDir::new().unwrap();
        let queue = Arc::new(SyncQueue::open(temp.path()).unwrap());
        let store = Arc::new(InMemoryContentStore::new());
        let engine = Arc::new(TantivyEngine::in_memory().unwrap());
        store
            .insert_entity(Entity::new(EntityType::Role, "r-1").with_name("admin"))
            .unwrap();
        let coordinator = Arc::new(SyncCoordinator::new(
            queue.clone(),
            store,
            engine.clone(),
            CoordinatorConfig::default(),
        ));

        let notify = Arc::new(Notify::new());
        let cancel = CancellationToken::new();
        let handles = spawn_workers(
            coordinator,
            2,
            Duration::from_millis(10),
            notify.clone(),
            cancel.clone(),
        );

        queue
            .enqueue(&Batch::from_entries(vec![Entry::for_default_index(
                EntryAction::Store,
                EntityType::Role,
                "r-1",
            )]))
            .unwrap();
        notify.notify_one();

        for _ in 0..200 {
            if queue.is_empty() && engine.count(Some("role")).unwrap() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(queue.is_empty());
        assert_eq!(engine.count(Some("role")).unwrap(), 1);

        cancel.cancel();
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
