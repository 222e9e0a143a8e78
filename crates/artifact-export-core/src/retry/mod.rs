// Retry coordinator
//
// Owns the shared retry queue and a single background drain loop. Every
// pass polls a bounded batch from each non-empty index queue and re-sends
// it; whatever fails again goes back on the queue (subject to capacity).
// Failures are isolated per index, so one unreachable index never blocks
// the others.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace};

use artifact_export_config::RetryConfig;

use crate::document::Document;
use crate::error::ExportError;
use crate::index::IndexNaming;
use crate::indexer::BulkIndexer;
use crate::stats::ExportStats;
use crate::switches::ExportSwitches;

mod queue;

pub use queue::RetryQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    pub drain_interval: Duration,
    pub drain_batch_size: usize,
}

impl From<&RetryConfig> for RetrySettings {
    fn from(config: &RetryConfig) -> Self {
        Self {
            drain_interval: config.drain_interval(),
            drain_batch_size: config.drain_batch_size,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

/// What one drain pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub indexes: usize,
    pub attempted: usize,
    pub delivered: usize,
    pub requeued: usize,
    pub dropped: usize,
}

pub struct RetryCoordinator {
    queue: Arc<RetryQueue>,
    indexer: Arc<dyn BulkIndexer>,
    switches: Arc<ExportSwitches>,
    stats: Arc<ExportStats>,
    naming: IndexNaming,
    settings: RetrySettings,
    started: AtomicBool,
    stopping: AtomicBool,
    wake: Notify,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl RetryCoordinator {
    pub fn new(
        queue: Arc<RetryQueue>,
        indexer: Arc<dyn BulkIndexer>,
        switches: Arc<ExportSwitches>,
        stats: Arc<ExportStats>,
        naming: IndexNaming,
        settings: RetrySettings,
    ) -> Self {
        Self {
            queue,
            indexer,
            switches,
            stats,
            naming,
            settings,
            started: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            wake: Notify::new(),
            thread: Mutex::new(None),
        }
    }

    pub fn queue(&self) -> &Arc<RetryQueue> {
        &self.queue
    }

    /// Queues documents that failed to index; returns how many were accepted.
    pub fn enqueue_failed(&self, index: &str, documents: Vec<Document>) -> usize {
        let offered = documents.len();
        let accepted = self.queue.offer_all(index, documents);
        if accepted < offered {
            debug!(
                index,
                dropped = offered - accepted,
                queued = self.queue.size(index),
                "Retry queue full; dropped failed documents"
            );
        }
        accepted
    }

    /// Starts the drain loop. Only the first call spawns it; later calls return `Ok(false)`.
    pub fn start(self: &Arc<Self>) -> Result<bool, ExportError> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(false);
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| ExportError::spawn("retry-drain", e))?;

        let coordinator = Arc::clone(self);
        let thread = std::thread::Builder::new()
            .name("artifact-export-retry-drain".to_string())
            .spawn(move || runtime.block_on(coordinator.drain_loop()))
            .map_err(|e| ExportError::spawn("retry-drain", e))?;

        *self.thread.lock() = Some(thread);
        debug!(
            interval_ms = self.settings.drain_interval.as_millis() as u64,
            batch_size = self.settings.drain_batch_size,
            "Retry drain loop started"
        );
        Ok(true)
    }

    /// Stops the drain loop and waits for the current pass to finish.
    /// Queued documents stay in memory but are no longer retried.
    ///
    /// The drain thread keeps the coordinator alive, so a started
    /// coordinator only shuts down through this call.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::Release);
        self.wake.notify_one();
        if let Some(thread) = self.thread.lock().take() {
            let _ = thread.join();
        }
    }

    async fn drain_loop(self: Arc<Self>) {
        let period = self.settings.drain_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.wake.notified() => {}
            }
            if self.stopping.load(Ordering::Acquire) {
                break;
            }
            self.drain_once().await;
        }
        debug!("Retry drain loop stopped");
    }

    /// One pass over every non-empty index queue.
    ///
    /// Does nothing while export is stopped or no base URL is set; the
    /// base URL is read fresh each pass.
    pub async fn drain_once(&self) -> DrainSummary {
        let mut summary = DrainSummary::default();
        let base_url = match self.switches.destination() {
            Ok(base_url) => base_url,
            Err(reason) => {
                trace!(?reason, queued = self.queue.total_size(), "Retry pass skipped");
                return summary;
            }
        };

        for index in self.queue.pending_indexes() {
            let batch = self.queue.poll_batch(&index, self.settings.drain_batch_size);
            if batch.is_empty() {
                continue;
            }
            summary.indexes += 1;
            summary.attempted += batch.len();

            let retry: Vec<Document> = match self.indexer.push_bulk(&base_url, &index, &batch).await {
                Ok(outcome) => {
                    let failed = outcome.failed_positions(batch.len());
                    let delivered = batch.len() - failed.len();
                    summary.delivered += delivered;
                    if let Some(kind) = self.naming.kind_for(&index) {
                        self.stats.record_success(kind, delivered as u64);
                    }
                    failed.into_iter().map(|pos| batch[pos].clone()).collect()
                }
                Err(e) => {
                    debug!(index = %index, error = %e, "Retry bulk request failed");
                    batch
                }
            };

            if !retry.is_empty() {
                let offered = retry.len();
                let accepted = self.enqueue_failed(&index, retry);
                summary.requeued += accepted;
                summary.dropped += offered - accepted;
            }
        }

        if summary.attempted > 0 {
            debug!(
                indexes = summary.indexes,
                attempted = summary.attempted,
                delivered = summary.delivered,
                requeued = summary.requeued,
                remaining = self.queue.total_size(),
                "Retry pass finished"
            );
        }
        summary
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexKind;
    use crate::testing::{Harness, MockResponse};
    use serde_json::json;

    fn docs(n: usize) -> Vec<Document> {
        (0..n).map(|i| json!({ "n": i })).collect()
    }

    #[tokio::test]
    async fn drain_delivers_and_counts_success() {
        let harness = Harness::new();
        let index = harness.index(IndexKind::Traffic);
        harness.retry.enqueue_failed(&index, docs(3));

        let summary = harness.retry.drain_once().await;
        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.delivered, 3);
        assert!(harness.queue.all_empty());
        assert_eq!(harness.stats.success_count(IndexKind::Traffic), 3);
        assert_eq!(harness.indexer.bulk_calls()[0].index, index);
    }

    #[tokio::test]
    async fn drain_polls_bounded_batches() {
        let harness = Harness::with_retry(RetrySettings {
            drain_interval: Duration::from_secs(60),
            drain_batch_size: 2,
        });
        let index = harness.index(IndexKind::Findings);
        harness.retry.enqueue_failed(&index, docs(5));

        harness.retry.drain_once().await;
        assert_eq!(harness.indexer.bulk_sizes(), vec![2]);
        assert_eq!(harness.queue.size(&index), 3);
    }

    #[tokio::test]
    async fn failed_subset_is_requeued() {
        let harness = Harness::new();
        let index = harness.index(IndexKind::Sitemap);
        harness.retry.enqueue_failed(&index, docs(4));
        harness.indexer.respond(MockResponse::Reject(vec![1, 3]));

        let summary = harness.retry.drain_once().await;
        assert_eq!(summary.delivered, 2);
        assert_eq!(summary.requeued, 2);
        assert_eq!(harness.queue.poll_batch(&index, 10), vec![json!({"n": 1}), json!({"n": 3})]);
    }

    #[tokio::test]
    async fn total_failure_requeues_whole_batch() {
        let harness = Harness::new();
        let index = harness.index(IndexKind::Traffic);
        harness.retry.enqueue_failed(&index, docs(2));
        harness.indexer.respond(MockResponse::Fail("connection refused".to_string()));

        let summary = harness.retry.drain_once().await;
        assert_eq!(summary.delivered, 0);
        assert_eq!(summary.requeued, 2);
        assert_eq!(harness.queue.size(&index), 2);
        assert_eq!(harness.stats.success_count(IndexKind::Traffic), 0);
    }

    #[tokio::test]
    async fn one_failing_index_does_not_block_others() {
        let harness = Harness::new();
        let findings = harness.index(IndexKind::Findings);
        let traffic = harness.index(IndexKind::Traffic);
        harness.retry.enqueue_failed(&findings, docs(1));
        harness.retry.enqueue_failed(&traffic, docs(1));
        // Pending indexes are drained in name order: findings first.
        harness.indexer.respond(MockResponse::Fail("boom".to_string()));

        let summary = harness.retry.drain_once().await;
        assert_eq!(summary.indexes, 2);
        assert_eq!(harness.queue.size(&findings), 1);
        assert!(harness.queue.is_empty(&traffic));
    }

    #[tokio::test]
    async fn drain_skips_while_stopped() {
        let harness = Harness::new();
        let index = harness.index(IndexKind::Traffic);
        harness.retry.enqueue_failed(&index, docs(1));
        harness.switches.set_running(false);

        assert_eq!(harness.retry.drain_once().await, DrainSummary::default());
        assert_eq!(harness.indexer.bulk_call_count(), 0);
        assert_eq!(harness.queue.size(&index), 1);
    }

    #[test]
    fn enqueue_reports_capacity_drops() {
        let harness = Harness::with_capacity(2);
        assert_eq!(harness.retry.enqueue_failed("idx", docs(3)), 2);
        assert_eq!(harness.queue.size("idx"), 2);
    }

    #[test]
    fn start_is_idempotent() {
        let harness = Harness::with_retry(RetrySettings {
            drain_interval: Duration::from_millis(5),
            drain_batch_size: 100,
        });
        assert!(harness.retry.start().unwrap());
        assert!(!harness.retry.start().unwrap());

        let index = harness.index(IndexKind::Traffic);
        harness.retry.enqueue_failed(&index, docs(2));
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !harness.queue.all_empty() {
            assert!(std::time::Instant::now() < deadline, "queue was not drained");
            std::thread::sleep(Duration::from_millis(2));
        }
        harness.retry.stop();
        assert_eq!(harness.stats.success_count(IndexKind::Traffic), 2);
    }

    #[test]
    fn stop_releases_the_drain_thread() {
        let harness = Harness::with_retry(RetrySettings {
            drain_interval: Duration::from_secs(3600),
            drain_batch_size: 10,
        });
        let owners = Arc::strong_count(&harness.retry);

        harness.retry.start().unwrap();
        assert_eq!(Arc::strong_count(&harness.retry), owners + 1);

        harness.retry.stop();
        assert_eq!(Arc::strong_count(&harness.retry), owners);
    }
}
