//! Concurrent drain E2E tests for search-sync.
//!
//! Several workers share one queue; every batch must be applied exactly once.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use e2e_tests::{named, TestHarness};
use sync_indexing::SyncCoordinator;
use sync_types::{Batch, EntityType, Entry, EntryAction};

const BATCHES: usize = 40;

fn seed(harness: &TestHarness) {
    for i in 0..BATCHES {
        let uuid = format!("u-{i:03}");
        harness
            .store
            .insert_entity(named(EntityType::User, &uuid, &uuid))
            .unwrap();
        harness
            .service
            .submit(Batch::from_entries(vec![Entry::for_default_index(
                EntryAction::Store,
                EntityType::User,
                uuid,
            )]))
            .unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_drains_apply_each_batch_once() {
    let harness = TestHarness::new();
    seed(&harness);
    assert_eq!(harness.service.queue_depth(), BATCHES);

    let coordinator: Arc<SyncCoordinator> = harness.service.coordinator().clone();
    let mut tasks = Vec::new();
    for _ in 0..4 {
        let coordinator = coordinator.clone();
        tasks.push(tokio::spawn(async move { coordinator.drain().await }));
    }

    let mut batches = 0;
    let mut applied = 0;
    for task in tasks {
        let result = task.await.unwrap().unwrap();
        batches += result.batches;
        applied += result.applied;
    }

    assert_eq!(batches, BATCHES);
    assert_eq!(applied, BATCHES);
    assert_eq!(harness.count("user"), BATCHES);
    assert!(harness.queue.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_background_workers_drain_and_shut_down() {
    let harness = TestHarness::new();
    let cancel = CancellationToken::new();
    let handles = harness
        .service
        .spawn_workers(3, Duration::from_millis(20), cancel.clone());

    seed(&harness);

    for _ in 0..500 {
        if harness.queue.is_empty() && harness.count("user") == BATCHES {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(harness.queue.is_empty());
    assert_eq!(harness.count("user"), BATCHES);

    cancel.cancel();
    for handle in handles {
        handle.await.unwrap();
    }
}
