// Tool-index log forwarding
//
// `ToolLogLayer` turns tracing events into log documents and parks them in a
// bounded buffer (oldest dropped first). A `LogForwarder` worker drains the
// buffer into the tool index, but only while export is running with a base
// URL; otherwise buffered events are discarded. Sends are fire-and-forget.

use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::document::{now_rfc3339, Document, EXTENSION_VERSION};
use crate::error::ExportError;
use crate::index::{IndexKind, IndexNaming};
use crate::indexer::BulkIndexer;
use crate::switches::ExportSwitches;

pub const LOG_BUFFER_CAPACITY: usize = 1000;
const DRAIN_BATCH: usize = 100;
const DRAIN_INTERVAL: Duration = Duration::from_secs(1);
const LOG_SOURCE: &str = "artifact-export";

/// Targets whose events are never forwarded: anything that runs while
/// pushing to the tool index.
const EXCLUDED_TARGETS: [&str; 4] = [
    "artifact_export_core::log_forwarder",
    "artifact_export_core::retry",
    "artifact_export_core::reporter::tool_stats",
    "artifact_export_core::reporter::config_snapshot",
];

/// Bounded drop-oldest buffer of pending log documents.
#[derive(Debug)]
pub struct LogBuffer {
    entries: Mutex<VecDeque<Document>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(LOG_BUFFER_CAPACITY)
    }
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(LOG_BUFFER_CAPACITY))),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn push(&self, document: Document) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        entries.push_back(document);
    }

    /// Removes up to `max` documents, oldest first.
    pub fn drain(&self, max: usize) -> Vec<Document> {
        let mut entries = self.entries.lock();
        let n = max.min(entries.len());
        entries.drain(..n).collect()
    }

    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let n = entries.len();
        entries.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Documents evicted because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Tracing layer that buffers events at or above `min_level`.
#[derive(Debug, Clone)]
pub struct ToolLogLayer {
    buffer: Arc<LogBuffer>,
    min_level: Level,
}

impl ToolLogLayer {
    pub fn new(buffer: Arc<LogBuffer>, min_level: Level) -> Self {
        Self { buffer, min_level }
    }

    fn forwards(&self, level: &Level, target: &str) -> bool {
        *level <= self.min_level && !EXCLUDED_TARGETS.iter().any(|t| target.starts_with(t))
    }
}

impl<S: Subscriber> Layer<S> for ToolLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if !self.forwards(metadata.level(), metadata.target()) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.buffer.push(json!({
            "timestamp": now_rfc3339(),
            "level": metadata.level().to_string(),
            "event_type": "log",
            "message_text": visitor.finish(),
            "target": metadata.target(),
            "source": LOG_SOURCE,
            "extension_version": EXTENSION_VERSION,
        }));
    }
}

/// Collects the `message` field followed by `key=value` pairs.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }

    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={}", name, value);
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push_field(field.name(), format_args!("{}", value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.push_field(field.name(), format_args!("{:?}", value));
        }
    }
}

/// Drains a [`LogBuffer`] into the tool index.
pub struct LogForwarder {
    buffer: Arc<LogBuffer>,
    indexer: Arc<dyn BulkIndexer>,
    switches: Arc<ExportSwitches>,
    index: String,
}

impl LogForwarder {
    pub fn new(
        buffer: Arc<LogBuffer>,
        indexer: Arc<dyn BulkIndexer>,
        switches: Arc<ExportSwitches>,
        naming: &IndexNaming,
    ) -> Self {
        Self {
            buffer,
            indexer,
            switches,
            index: naming.index_name(IndexKind::Tool),
        }
    }

    /// Sends one batch; returns how many documents were sent. While export
    /// is stopped or has no base URL the buffer is emptied instead.
    pub async fn forward_once(&self) -> usize {
        let base_url = match self.switches.destination() {
            Ok(base_url) => base_url,
            Err(_) => {
                self.buffer.clear();
                return 0;
            }
        };
        let documents = self.buffer.drain(DRAIN_BATCH);
        if documents.is_empty() {
            return 0;
        }
        let _ = self
            .indexer
            .push_bulk(&base_url, &self.index, &documents)
            .await;
        documents.len()
    }

    /// Runs the drain loop on its own thread.
    pub fn spawn(self) -> Result<ForwarderHandle, ExportError> {
        let stopping = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| ExportError::spawn("log-forwarder", e))?;

        let worker_stopping = Arc::clone(&stopping);
        let worker_wake = Arc::clone(&wake);
        let thread = std::thread::Builder::new()
            .name("artifact-export-log-forwarder".to_string())
            .spawn(move || runtime.block_on(self.run(worker_stopping, worker_wake)))
            .map_err(|e| ExportError::spawn("log-forwarder", e))?;

        Ok(ForwarderHandle {
            stopping,
            wake,
            thread: Some(thread),
        })
    }

    async fn run(self, stopping: Arc<AtomicBool>, wake: Arc<Notify>) {
        let mut ticker = interval_at(Instant::now() + DRAIN_INTERVAL, DRAIN_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = wake.notified() => {}
            }
            if stopping.load(Ordering::Acquire) {
                break;
            }
            while self.forward_once().await == DRAIN_BATCH {}
        }
    }
}

/// Stops the forwarder thread when shut down or dropped.
#[derive(Debug)]
pub struct ForwarderHandle {
    stopping: Arc<AtomicBool>,
    wake: Arc<Notify>,
    thread: Option<JoinHandle<()>>,
}

impl ForwarderHandle {
    pub fn shutdown(mut self) {
        self.signal();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    fn signal(&self) {
        self.stopping.store(true, Ordering::Release);
        self.wake.notify_one();
    }
}

impl Drop for ForwarderHandle {
    fn drop(&mut self) {
        self.signal();
    }
}
