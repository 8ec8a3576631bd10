//! Command implementations for search-sync.
//!
//! Handles:
//! - run: open queue and engine, drain with background workers
//! - status / parked: inspect the queue
//! - enqueue-resync / clear-queue / clear-index / requeue-parked: admin actions

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use sync_engine::SearchEngine;
use sync_indexing::{full_resync, CoordinatorConfig, InMemoryContentStore, SyncService};
use sync_storage::SyncQueue;
use sync_types::Settings;

/// Load settings and apply CLI overrides (highest precedence).
pub fn load_settings(
    config_path: Option<&str>,
    db_path_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(db_path) = db_path_override {
        settings.db_path = db_path.to_string();
    }
    if let Some(log_level) = log_level_override {
        settings.log_level = log_level.to_string();
    }
    Ok(settings)
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(settings: &Settings) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

fn open_queue(settings: &Settings) -> Result<Arc<SyncQueue>> {
    let db_path = settings.expanded_db_path();
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent).context("Failed to create queue directory")?;
    }
    let queue = SyncQueue::open(&db_path)
        .with_context(|| format!("Failed to open queue at {:?}", db_path))?;
    Ok(Arc::new(queue))
}

fn open_engine(settings: &Settings) -> Result<Arc<dyn SearchEngine>> {
    let index_path = settings.expanded_index_path();
    if let Some(parent) = index_path.parent() {
        fs::create_dir_all(parent).context("Failed to create index directory")?;
    }
    sync_engine::connect(&settings.engine, &index_path).context("Failed to connect search engine")
}

/// Entries resolve against this store; an entity missing from it is
/// deleted from the index, so there is no empty fallback.
fn open_store(snapshot: &str) -> Result<Arc<InMemoryContentStore>> {
    let store = InMemoryContentStore::load(Path::new(snapshot))
        .with_context(|| format!("Failed to load content snapshot {}", snapshot))?;
    Ok(Arc::new(store))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

/// Drain the queue into the search engine.
pub async fn run(
    settings: &Settings,
    snapshot: &str,
    workers_override: Option<usize>,
    once: bool,
) -> Result<()> {
    let workers = workers_override.unwrap_or(settings.sync.workers);

    info!("search-sync starting...");
    info!("  Queue path: {}", settings.db_path);
    info!("  Engine: {:?}", settings.engine.kind);
    info!("  Workers: {}", workers);

    let store = open_store(snapshot)?;
    let queue = open_queue(settings)?;
    let engine = open_engine(settings)?;
    let service = SyncService::new(
        queue.clone(),
        store,
        engine,
        CoordinatorConfig::from(&settings.sync),
    );

    if once {
        let result = service.drain().await.context("Drain failed")?;
        println!(
            "Processed {} batches: {} applied, {} retried, {} requeued, {} parked",
            result.batches, result.applied, result.retried, result.requeued, result.parked
        );
        queue.flush().context("Failed to flush queue")?;
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let handles = service.spawn_workers(
        workers,
        Duration::from_millis(settings.sync.poll_interval_ms),
        cancel.clone(),
    );

    shutdown_signal().await;
    cancel.cancel();
    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "Sync worker panicked");
        }
    }

    queue.flush().context("Failed to flush queue")?;
    info!(pending = queue.size(), "search-sync stopped");
    Ok(())
}

/// Print queue depth and parked batch count.
pub fn show_status(settings: &Settings) -> Result<()> {
    let queue = open_queue(settings)?;
    let stats = queue.stats().context("Failed to read queue stats")?;
    println!("Queue: {:?}", settings.expanded_db_path());
    println!("  Pending batches: {}", stats.pending);
    println!("  Parked batches:  {}", stats.parked);
    println!("  Next sequence:   {}", stats.next_sequence);
    Ok(())
}

/// Queue one batch re-storing every entity of the snapshot. Returns the batch id.
pub async fn enqueue_resync(settings: &Settings, snapshot: &str) -> Result<String> {
    let queue = open_queue(settings)?;
    let store = open_store(snapshot)?;
    let batch = full_resync(store.as_ref())
        .await
        .context("Failed to build resync batch")?;
    queue.enqueue(&batch).context("Failed to enqueue resync batch")?;
    queue.flush().context("Failed to flush queue")?;
    println!(
        "Queued resync batch {} ({} entries, queue size {})",
        batch.id,
        batch.len(),
        queue.size()
    );
    Ok(batch.id)
}

/// Drop every pending batch. Returns how many were removed.
pub fn clear_queue(settings: &Settings) -> Result<usize> {
    let queue = open_queue(settings)?;
    let removed = queue.clear().context("Failed to clear queue")?;
    println!("Removed {} pending batches", removed);
    Ok(removed)
}

/// Delete documents of one index (or all) from the search engine.
pub async fn clear_index(settings: &Settings, index: Option<&str>) -> Result<()> {
    let engine = open_engine(settings)?;
    engine
        .clear(index)
        .await
        .context("Failed to clear search index")?;
    println!("Cleared {}", index.unwrap_or("all indices"));
    Ok(())
}

/// Print every parked batch.
pub fn show_parked(settings: &Settings) -> Result<usize> {
    let queue = open_queue(settings)?;
    let parked = queue.parked().context("Failed to read parked batches")?;
    if parked.is_empty() {
        println!("No parked batches");
    }
    for batch in &parked {
        println!(
            "{}  attempts={}  entries={}  created={}",
            batch.id,
            batch.attempts,
            batch.len(),
            batch.created_at.to_rfc3339()
        );
        for entry in &batch.entries {
            println!(
                "    {} {} {} -> {}",
                entry.action.as_str(),
                entry.entity_type,
                entry.entity_uuid,
                entry.index_name
            );
        }
    }
    Ok(parked.len())
}

/// Move parked batches back onto the live queue.
pub fn requeue_parked(settings: &Settings) -> Result<usize> {
    let queue = open_queue(settings)?;
    let moved = queue
        .requeue_parked()
        .context("Failed to requeue parked batches")?;
    println!("Requeued {} parked batches", moved);
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_types::{Batch, EntityType, Entry, EntryAction};
    use tempfile::TempDir;

    fn settings_in(temp: &TempDir) -> Settings {
        let mut settings = Settings::default();
        settings.db_path = temp.path().join("queue").to_string_lossy().to_string();
        settings.engine.index_path = temp.path().join("index").to_string_lossy().to_string();
        settings
    }

    fn write_snapshot(temp: &TempDir) -> String {
        let path = temp.path().join("content.json");
        let json = r#"{
            "schemas": [],
            "entities": [
                {"uuid": "u-1", "entity_type": "user", "name": "joe"},
                {"uuid": "r-1", "entity_type": "role", "name": "admin"}
            ]
        }"#;
        fs::write(&path, json).unwrap();
        path.to_string_lossy().to_string()
    }

    #[tokio::test]
    async fn test_enqueue_resync_then_clear_queue() {
        let temp = TempDir::new().unwrap();
        let settings = settings_in(&temp);
        let snapshot = write_snapshot(&temp);

        enqueue_resync(&settings, &snapshot).await.unwrap();
        show_status(&settings).unwrap();
        assert_eq!(clear_queue(&settings).unwrap(), 1);
        assert_eq!(clear_queue(&settings).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_once_drains_into_tantivy() {
        let temp = TempDir::new().unwrap();
        let settings = settings_in(&temp);
        let snapshot = write_snapshot(&temp);

        enqueue_resync(&settings, &snapshot).await.unwrap();
        run(&settings, &snapshot, None, true).await.unwrap();

        let queue = open_queue(&settings).unwrap();
        assert!(queue.is_empty());
        clear_index(&settings, Some("user")).await.unwrap();
    }

    #[tokio::test]
    async fn test_run_with_unreadable_snapshot_keeps_queue() {
        let temp = TempDir::new().unwrap();
        let settings = settings_in(&temp);
        let snapshot = write_snapshot(&temp);
        enqueue_resync(&settings, &snapshot).await.unwrap();

        let missing = temp.path().join("missing.json");
        let result = run(&settings, &missing.to_string_lossy(), None, true).await;
        assert!(result.is_err());
        assert_eq!(open_queue(&settings).unwrap().size(), 1);
    }

    #[test]
    fn test_parked_and_requeue() {
        let temp = TempDir::new().unwrap();
        let settings = settings_in(&temp);
        {
            let queue = open_queue(&settings).unwrap();
            let mut batch = Batch::from_entries(vec![Entry::for_default_index(
                EntryAction::Store,
                EntityType::Node,
                "n-1",
            )]);
            batch.attempts = 6;
            queue.park(&batch).unwrap();
        }

        assert_eq!(show_parked(&settings).unwrap(), 1);
        assert_eq!(requeue_parked(&settings).unwrap(), 1);
        assert_eq!(show_parked(&settings).unwrap(), 0);
    }
}
