// Export stats - per-index health counters
//
// Counters only grow; last-push duration and last error are overwritten.
// Queue depth is read live from the shared retry queue.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::index::{IndexKind, IndexNaming};
use crate::retry::RetryQueue;

const LAST_ERROR_MAX_CHARS: usize = 200;
const UNKNOWN_DURATION: i64 = -1;
const INDEX_COUNT: usize = IndexKind::ALL.len();

#[derive(Debug)]
struct IndexCounters {
    success: AtomicU64,
    failure: AtomicU64,
    last_push_ms: AtomicI64,
    last_error: Mutex<Option<String>>,
}

impl Default for IndexCounters {
    fn default() -> Self {
        Self {
            success: AtomicU64::new(0),
            failure: AtomicU64::new(0),
            last_push_ms: AtomicI64::new(UNKNOWN_DURATION),
            last_error: Mutex::new(None),
        }
    }
}

#[derive(Debug)]
pub struct ExportStats {
    naming: IndexNaming,
    queue: Arc<RetryQueue>,
    counters: [IndexCounters; INDEX_COUNT],
    started_at: Instant,
}

impl ExportStats {
    pub fn new(naming: IndexNaming, queue: Arc<RetryQueue>) -> Self {
        Self {
            naming,
            queue,
            counters: Default::default(),
            started_at: Instant::now(),
        }
    }

    fn counters(&self, kind: IndexKind) -> &IndexCounters {
        &self.counters[kind as usize]
    }

    pub fn record_success(&self, kind: IndexKind, count: u64) {
        if count > 0 {
            self.counters(kind).success.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub fn record_failure(&self, kind: IndexKind, count: u64) {
        if count > 0 {
            self.counters(kind).failure.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub fn record_last_push(&self, kind: IndexKind, duration: Duration) {
        let ms = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        self.counters(kind).last_push_ms.store(ms, Ordering::Relaxed);
    }

    /// Stores `message` (truncated to 200 characters); an empty message clears it.
    pub fn record_last_error(&self, kind: IndexKind, message: &str) {
        let value = if message.is_empty() {
            None
        } else {
            Some(truncate_error(message))
        };
        *self.counters(kind).last_error.lock() = value;
    }

    pub fn clear_last_error(&self, kind: IndexKind) {
        *self.counters(kind).last_error.lock() = None;
    }

    pub fn success_count(&self, kind: IndexKind) -> u64 {
        self.counters(kind).success.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self, kind: IndexKind) -> u64 {
        self.counters(kind).failure.load(Ordering::Relaxed)
    }

    /// `None` until the first push for this index has been timed.
    pub fn last_push_duration_ms(&self, kind: IndexKind) -> Option<u64> {
        u64::try_from(self.counters(kind).last_push_ms.load(Ordering::Relaxed)).ok()
    }

    pub fn last_error(&self, kind: IndexKind) -> Option<String> {
        self.counters(kind).last_error.lock().clone()
    }

    pub fn queue_size(&self, kind: IndexKind) -> usize {
        self.queue.size(&self.naming.index_name(kind))
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let indexes: Vec<IndexSnapshot> = IndexKind::ALL
            .into_iter()
            .map(|kind| IndexSnapshot {
                kind,
                index_name: self.naming.index_name(kind),
                success_count: self.success_count(kind),
                failure_count: self.failure_count(kind),
                last_push_duration_ms: self.last_push_duration_ms(kind),
                last_error: self.last_error(kind),
                queue_size: self.queue_size(kind),
            })
            .collect();

        StatsSnapshot {
            total_success: indexes.iter().map(|i| i.success_count).sum(),
            total_failure: indexes.iter().map(|i| i.failure_count).sum(),
            total_queued: self.queue.total_size(),
            uptime_ms: u64::try_from(self.uptime().as_millis()).unwrap_or(u64::MAX),
            indexes,
        }
    }
}

fn truncate_error(message: &str) -> String {
    match message.char_indices().nth(LAST_ERROR_MAX_CHARS) {
        Some((idx, _)) => format!("{}...", &message[..idx]),
        None => message.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexSnapshot {
    pub kind: IndexKind,
    pub index_name: String,
    pub success_count: u64,
    pub failure_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_push_duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub queue_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub indexes: Vec<IndexSnapshot>,
    pub total_success: u64,
    pub total_failure: u64,
    pub total_queued: usize,
    pub uptime_ms: u64,
}

impl StatsSnapshot {
    pub fn index(&self, kind: IndexKind) -> Option<&IndexSnapshot> {
        self.indexes.iter().find(|i| i.kind == kind)
    }
}
