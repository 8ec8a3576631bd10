//! Queue draining.
//!
//! The coordinator takes batches off the sync queue, resolves each entry
//! against the content store, builds documents and sends one bulk request
//! per batch. Delivery is at-least-once: a batch is only gone once every
//! entry was applied, moved into a retry batch, or parked.
//!
//! Failure policy:
//! - Transient failure (transport, timeout, store unavailable): the batch is
//!   retried in place with exponential backoff up to `max_attempts`. After
//!   that it is requeued at the tail with `attempts + 1` and the drain stops.
//! - Throttled or server-failed items (429, 5xx) in an accepted bulk request
//!   are resent in place like a transient failure. They are never parked.
//! - Other failed items: only those entries go into a retry batch. A retry
//!   batch past `max_attempts` is parked.
//! - Non-transient failure of the whole request: the remaining entries are
//!   parked.
//!
//! Every action that writes a document sends the full document, so fields
//! the entity no longer has disappear from the index.

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use dashmap::DashSet;
use sync_engine::{BulkOperation, BulkResponse, SearchEngine};
use sync_storage::SyncQueue;
use sync_transform::DocumentTransformer;
use sync_types::{Batch, Entry, Schema, SyncSettings};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::IndexingError;
use crate::store::ContentStore;

/// Drain and retry policy.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Upper bound for awaiting one bulk acknowledgment
    pub bulk_timeout: Duration,
    /// Delivery attempts per batch before escalating
    pub max_attempts: u32,
    /// First backoff delay after a transient failure
    pub backoff_initial: Duration,
    /// Total time spent retrying one batch in place
    pub backoff_max_elapsed: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::from(&SyncSettings::default())
    }
}

impl From<&SyncSettings> for CoordinatorConfig {
    fn from(settings: &SyncSettings) -> Self {
        Self {
            bulk_timeout: Duration::from_secs(settings.bulk_timeout_secs),
            max_attempts: settings.max_attempts,
            backoff_initial: Duration::from_millis(settings.backoff_initial_ms),
            backoff_max_elapsed: Duration::from_secs(settings.backoff_max_elapsed_secs),
        }
    }
}

impl CoordinatorConfig {
    pub fn with_bulk_timeout(mut self, timeout: Duration) -> Self {
        self.bulk_timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max_elapsed: Duration) -> Self {
        self.backoff_initial = initial;
        self.backoff_max_elapsed = max_elapsed;
        self
    }
}

/// Summary of one drain cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainResult {
    /// Batches taken off the queue
    pub batches: usize,
    /// Entries acknowledged by the engine
    pub applied: usize,
    /// Entries moved into requeued retry batches
    pub retried: usize,
    /// Batches requeued after exhausting in-place retries
    pub requeued: usize,
    /// Batches parked for operator attention
    pub parked: usize,
    /// Batches with no entries
    pub empty: usize,
    /// Whether a refresh was issued at the end
    pub refreshed: bool,
    /// Whether the cycle ended before the queue was empty
    pub stopped_early: bool,
}

impl DrainResult {
    pub fn has_updates(&self) -> bool {
        self.batches > 0
    }
}

/// Entries accounted for while delivering one batch.
#[derive(Debug, Default)]
struct Progress {
    applied: usize,
    /// Entries that failed for a non-transient reason
    failed: Vec<Entry>,
}

/// Result of sending one bulk request.
#[derive(Debug, Default)]
struct Delivery {
    progress: Progress,
    /// Entries the engine turned away for a transient reason
    throttled: Vec<Entry>,
}

/// How one batch ended.
#[derive(Debug)]
enum BatchOutcome {
    Empty,
    Delivered(Progress),
    /// Transient failures outlasted the retry budget; `remaining` was not applied
    Exhausted {
        error: IndexingError,
        progress: Progress,
        remaining: Batch,
    },
    /// The engine refused the whole request for `remaining`
    Rejected {
        error: IndexingError,
        progress: Progress,
        remaining: Batch,
    },
}

/// Identity of a pushed mapping: (index, schema name, schema version).
type MappingKey = (String, Option<(String, u32)>);

/// Drains the sync queue into the search engine.
pub struct SyncCoordinator {
    queue: Arc<SyncQueue>,
    store: Arc<dyn ContentStore>,
    engine: Arc<dyn SearchEngine>,
    transformer: DocumentTransformer,
    pushed_mappings: DashSet<MappingKey>,
    config: CoordinatorConfig,
}

impl SyncCoordinator {
    pub fn new(
        queue: Arc<SyncQueue>,
        store: Arc<dyn ContentStore>,
        engine: Arc<dyn SearchEngine>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            queue,
            store,
            engine,
            transformer: DocumentTransformer::new(),
            pushed_mappings: DashSet::new(),
            config,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Process every pending batch, then refresh the index.
    pub async fn drain(&self) -> Result<DrainResult, IndexingError> {
        self.drain_until(&CancellationToken::new()).await
    }

    /// Like [`drain`](Self::drain), checking `cancel` before each batch.
    ///
    /// An in-flight bulk request is always awaited to completion or timeout.
    pub async fn drain_until(&self, cancel: &CancellationToken) -> Result<DrainResult, IndexingError> {
        let mut result = DrainResult::default();

        loop {
            if cancel.is_cancelled() {
                debug!("Drain cancelled");
                result.stopped_early = true;
                break;
            }

            let Some(batch) = self.queue.take()? else {
                break;
            };
            result.batches += 1;
            let batch_id = batch.id.clone();

            match self.process_batch(&batch).await {
                BatchOutcome::Empty => {
                    debug!(batch_id = %batch_id, "Discarded empty batch");
                    result.empty += 1;
                }
                BatchOutcome::Delivered(progress) => {
                    debug!(batch_id = %batch_id, applied = progress.applied, "Applied batch");
                    self.settle(&batch, progress, &mut result)?;
                }
                BatchOutcome::Exhausted {
                    error,
                    progress,
                    mut remaining,
                } => {
                    self.settle(&batch, progress, &mut result)?;
                    remaining.attempts += 1;
                    error!(
                        batch_id = %batch_id,
                        attempts = remaining.attempts,
                        entries = remaining.len(),
                        error = %error,
                        "Search engine unavailable, requeued batch and stopped drain"
                    );
                    self.requeue(&remaining)?;
                    result.requeued += 1;
                    result.stopped_early = true;
                    break;
                }
                BatchOutcome::Rejected {
                    error,
                    progress,
                    mut remaining,
                } => {
                    self.settle(&batch, progress, &mut result)?;
                    remaining.attempts += 1;
                    error!(batch_id = %batch_id, error = %error, "Bulk request rejected, parking batch");
                    self.park(&remaining)?;
                    result.parked += 1;
                }
            }
        }

        if result.batches > 0 && !result.stopped_early {
            match self.engine.refresh().await {
                Ok(()) => result.refreshed = true,
                Err(e) => warn!(error = %e, "Index refresh failed"),
            }
        }

        if result.has_updates() {
            info!(
                batches = result.batches,
                applied = result.applied,
                retried = result.retried,
                requeued = result.requeued,
                parked = result.parked,
                "Drain cycle complete"
            );
        }
        Ok(result)
    }

    /// Forget which mappings were pushed, so they are sent again.
    pub fn forget_mappings(&self, index: Option<&str>) {
        match index {
            Some(name) => self.pushed_mappings.retain(|(i, _)| i != name),
            None => self.pushed_mappings.clear(),
        }
    }

    /// Account for applied and failed entries of a taken batch.
    ///
    /// Failed entries go into a retry batch, which is parked once it is past
    /// the attempt budget.
    fn settle(
        &self,
        batch: &Batch,
        progress: Progress,
        result: &mut DrainResult,
    ) -> Result<(), IndexingError> {
        result.applied += progress.applied;
        if progress.failed.is_empty() {
            return Ok(());
        }

        let retry = batch.retry_of(progress.failed);
        if retry.attempts > self.config.max_attempts {
            error!(
                batch_id = %retry.id,
                origin = %batch.id,
                attempts = retry.attempts,
                entries = retry.len(),
                "Retry budget exhausted, parking failed entries"
            );
            self.park(&retry)?;
            result.parked += 1;
        } else {
            warn!(
                batch_id = %retry.id,
                origin = %batch.id,
                attempts = retry.attempts,
                entries = retry.len(),
                "Requeued failed entries"
            );
            self.requeue(&retry)?;
            result.retried += retry.len();
        }
        Ok(())
    }

    /// Put a taken batch back on the queue, parking it if that fails.
    fn requeue(&self, batch: &Batch) -> Result<(), IndexingError> {
        let err = match self.queue.enqueue(batch) {
            Ok(_) => return Ok(()),
            Err(e) => e,
        };
        error!(batch_id = %batch.id, error = %err, "Could not requeue batch, parking it");
        self.park(batch)
    }

    /// Park a taken batch. If that fails too the batch only survives in
    /// the log, so its entries are logged in full.
    fn park(&self, batch: &Batch) -> Result<(), IndexingError> {
        self.queue.park(batch).map_err(|e| {
            error!(
                batch_id = %batch.id,
                attempts = batch.attempts,
                entries = ?batch.entries,
                error = %e,
                "Lost batch: could not park it"
            );
            IndexingError::from(e)
        })
    }

    /// Send one batch, retrying transient failures in place.
    ///
    /// A retry after throttled items resends only those items.
    async fn process_batch(&self, batch: &Batch) -> BatchOutcome {
        if batch.is_empty() {
            return BatchOutcome::Empty;
        }

        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.config.backoff_initial)
            .with_max_elapsed_time(Some(self.config.backoff_max_elapsed))
            .build();
        let mut attempts = 0;
        let mut pending = batch.clone();
        let mut progress = Progress::default();

        loop {
            attempts += 1;
            debug!(batch_id = %batch.id, attempt = attempts, entries = pending.len(), "Sending batch");

            let error = match self.send_batch(&pending).await {
                Ok(delivery) => {
                    progress.applied += delivery.progress.applied;
                    progress.failed.extend(delivery.progress.failed);
                    if delivery.throttled.is_empty() {
                        return BatchOutcome::Delivered(progress);
                    }
                    let throttled = delivery.throttled.len();
                    pending.entries = delivery.throttled;
                    IndexingError::Throttled(throttled)
                }
                Err(e) if e.is_transient() => e,
                Err(error) => {
                    return BatchOutcome::Rejected {
                        error,
                        progress,
                        remaining: pending,
                    }
                }
            };

            let delay = if attempts >= self.config.max_attempts {
                None
            } else {
                backoff.next_backoff()
            };
            let Some(delay) = delay else {
                return BatchOutcome::Exhausted {
                    error,
                    progress,
                    remaining: pending,
                };
            };
            warn!(
                batch_id = %batch.id,
                error = %error,
                retry_in_ms = delay.as_millis() as u64,
                "Batch delivery failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Build and send the bulk request for a batch.
    ///
    /// Entries that cannot be turned into an operation for a non-transient
    /// reason join the failed set instead of failing the batch.
    async fn send_batch(&self, batch: &Batch) -> Result<Delivery, IndexingError> {
        let mut operations = Vec::with_capacity(batch.len());
        let mut positions = Vec::with_capacity(batch.len());
        let mut delivery = Delivery::default();

        for (position, entry) in batch.entries.iter().enumerate() {
            match self.build_operation(entry).await {
                Ok(op) => {
                    operations.push(op);
                    positions.push(position);
                }
                Err(e) if e.is_transient() => return Err(e),
                Err(e) => {
                    error!(
                        batch_id = %batch.id,
                        entity_type = %entry.entity_type,
                        uuid = %entry.entity_uuid,
                        error = %e,
                        "Could not build index operation"
                    );
                    delivery.progress.failed.push(entry.clone());
                }
            }
        }

        let response = if operations.is_empty() {
            BulkResponse::default()
        } else {
            tokio::time::timeout(self.config.bulk_timeout, self.engine.bulk(&operations))
                .await
                .map_err(|_| IndexingError::Timeout(self.config.bulk_timeout))??
        };

        for (k, position) in positions.iter().enumerate() {
            let entry = &batch.entries[*position];
            match response.items.get(k) {
                Some(item) if item.is_success() => delivery.progress.applied += 1,
                Some(item) => {
                    warn!(
                        batch_id = %batch.id,
                        index = %item.index,
                        id = %item.id,
                        status = item.status,
                        error = item.error.as_deref().unwrap_or(""),
                        "Bulk item failed"
                    );
                    if item.is_transient() {
                        delivery.throttled.push(entry.clone());
                    } else {
                        delivery.progress.failed.push(entry.clone());
                    }
                }
                None => delivery.progress.failed.push(entry.clone()),
            }
        }
        Ok(delivery)
    }

    /// Resolve an entry into a bulk operation.
    async fn build_operation(&self, entry: &Entry) -> Result<BulkOperation, IndexingError> {
        let index = &entry.index_name;
        let id = &entry.entity_uuid;

        if !entry.action.writes_document() {
            return Ok(BulkOperation::delete(index, id));
        }

        let Some(entity) = self.store.load_entity(entry.entity_type, id).await? else {
            debug!(entity_type = %entry.entity_type, uuid = %id, "Entity gone, deleting document");
            return Ok(BulkOperation::delete(index, id));
        };

        let schema = match &entity.schema {
            Some(version) => Some(
                self.store
                    .load_schema(version)
                    .await?
                    .ok_or_else(|| IndexingError::SchemaNotFound(version.clone()))?,
            ),
            None => None,
        };

        self.ensure_mapping(index, schema.as_ref()).await?;
        let body = self.transformer.document(&entity, schema.as_ref())?;
        Ok(BulkOperation::index(index, id, body))
    }

    /// Push the mapping for (index, schema version) unless already pushed.
    async fn ensure_mapping(&self, index: &str, schema: Option<&Schema>) -> Result<(), IndexingError> {
        let key: MappingKey = (
            index.to_string(),
            schema.map(|s| (s.name.clone(), s.version)),
        );
        if self.pushed_mappings.contains(&key) {
            return Ok(());
        }

        let mapping = self.transformer.mapping(schema);
        tokio::time::timeout(
            self.config.bulk_timeout,
            self.engine.put_mapping(index, &mapping.body),
        )
        .await
        .map_err(|_| IndexingError::Timeout(self.config.bulk_timeout))??;

        info!(
            index,
            schema = schema.map(|s| s.name.as_str()).unwrap_or("-"),
            version = schema.map(|s| s.version).unwrap_or(0),
            "Pushed mapping"
        );
        self.pushed_mappings.insert(key);
        Ok(())
    }
}
