// Source reporters and their scheduling
//
// Each reporter runs on its own named thread with a current-thread runtime.
// Timer ticks and manual triggers arrive on the same loop, so cycles of one
// reporter never overlap; the single-flight guard turns any trigger that
// arrives mid-cycle into a no-op.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use artifact_export_batch::BatchLimits;

use crate::error::ExportError;
use crate::index::IndexNaming;
use crate::indexer::BulkIndexer;
use crate::retry::RetryCoordinator;
use crate::stats::ExportStats;
use crate::switches::ExportSwitches;

mod config_snapshot;
mod flush;
mod incremental;
mod proxy_history;
mod settings;
mod tool_stats;

pub use config_snapshot::ConfigSnapshotReporter;
pub use incremental::{FindingsReporter, IncrementalReporter, SitemapReporter};
pub use proxy_history::ProxyHistoryReporter;
pub use settings::SettingsReporter;
pub use tool_stats::ToolStatsReporter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Every current item is a candidate.
    PushAll,
    /// Only items not yet delivered this session.
    Incremental,
}

/// Why a cycle did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ExportStopped,
    NoBaseUrl,
    SourceNotSelected,
    /// Another cycle of the same reporter holds the guard.
    InProgress,
    /// Content matches what was last delivered.
    Unchanged,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub fetched: usize,
    pub candidates: usize,
    pub flushes: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Failed documents accepted by the retry queue.
    pub queued: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Skipped(SkipReason),
    Completed(CycleSummary),
}

pub type CycleResult = Result<CycleOutcome, ExportError>;

/// Shared collaborators handed to every reporter.
#[derive(Clone)]
pub struct ReporterDeps {
    pub indexer: Arc<dyn BulkIndexer>,
    pub stats: Arc<ExportStats>,
    pub switches: Arc<ExportSwitches>,
    pub retry: Arc<RetryCoordinator>,
    pub naming: IndexNaming,
    pub limits: BatchLimits,
}

/// One pass over a data source.
#[async_trait]
pub trait Reporter: Send + 'static {
    fn name(&self) -> &'static str;

    /// Reporters writing to the tool index log their own outcomes under a
    /// target the log forwarder ignores, so the scheduler stays quiet for them.
    fn writes_tool_index(&self) -> bool {
        false
    }

    async fn run_cycle(&mut self, mode: RunMode) -> CycleResult;
}

/// "Run in progress" flag shared by a reporter's handle and its worker.
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    running: Arc<AtomicBool>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the flag, or `None` if a cycle is already running.
    pub fn try_acquire(&self) -> Option<FlightPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightPermit {
                running: Arc::clone(&self.running),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Releases the single-flight flag when dropped.
#[derive(Debug)]
pub struct FlightPermit {
    running: Arc<AtomicBool>,
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Runs one cycle under `guard`; a held guard yields `Skipped(InProgress)`.
pub async fn run_guarded<R>(reporter: &mut R, guard: &SingleFlight, mode: RunMode) -> CycleResult
where
    R: Reporter + ?Sized,
{
    let Some(_permit) = guard.try_acquire() else {
        return Ok(CycleOutcome::Skipped(SkipReason::InProgress));
    };
    reporter.run_cycle(mode).await
}

/// [`run_guarded`], then logs the result unless the reporter writes to the
/// tool index.
pub async fn run_logged<R>(reporter: &mut R, guard: &SingleFlight, mode: RunMode) -> CycleResult
where
    R: Reporter + ?Sized,
{
    let result = run_guarded(reporter, guard, mode).await;
    if !reporter.writes_tool_index() {
        log_cycle(reporter.name(), mode, &result);
    }
    result
}

/// Control side of a spawned reporter. Dropping it stops the worker loop.
#[derive(Debug)]
pub struct ReporterHandle {
    name: &'static str,
    triggers: mpsc::Sender<RunMode>,
    guard: SingleFlight,
    thread: Option<JoinHandle<()>>,
}

impl ReporterHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_running()
    }

    /// Requests a cycle. Returns `false` (and does nothing) if a cycle is
    /// running, one is already pending, or the worker has exited.
    ///
    /// Best-effort: a cycle finishing between the running check and the send
    /// can leave one extra trigger queued, which then runs as a normal cycle.
    pub fn trigger(&self, mode: RunMode) -> bool {
        if self.guard.is_running() {
            return false;
        }
        self.triggers.try_send(mode).is_ok()
    }

    /// Closes the trigger channel and waits for the in-flight cycle to finish.
    pub fn shutdown(mut self) {
        let thread = self.thread.take();
        drop(self);
        if let Some(thread) = thread {
            let _ = thread.join();
        }
    }
}

/// Starts `reporter` on a dedicated thread.
///
/// With an `interval`, an incremental cycle runs every period (first tick one
/// period after start); without one, cycles only run when triggered.
pub fn spawn<R: Reporter>(
    mut reporter: R,
    interval: Option<Duration>,
) -> Result<ReporterHandle, ExportError> {
    let name = reporter.name();
    let (triggers, mut rx) = mpsc::channel(1);
    let guard = SingleFlight::new();
    let worker_guard = guard.clone();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| ExportError::spawn(name, e))?;

    let thread = std::thread::Builder::new()
        .name(format!("artifact-export-{}", name))
        .spawn(move || {
            runtime.block_on(drive(&mut reporter, &worker_guard, &mut rx, interval));
            debug!(reporter = name, "Reporter stopped");
        })
        .map_err(|e| ExportError::spawn(name, e))?;

    Ok(ReporterHandle {
        name,
        triggers,
        guard,
        thread: Some(thread),
    })
}

async fn drive<R: Reporter>(
    reporter: &mut R,
    guard: &SingleFlight,
    rx: &mut mpsc::Receiver<RunMode>,
    interval: Option<Duration>,
) {
    let mut ticker = interval.map(|period| {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    });

    loop {
        let mode = match ticker.as_mut() {
            Some(ticker) => tokio::select! {
                trigger = rx.recv() => match trigger {
                    Some(mode) => mode,
                    None => break,
                },
                _ = ticker.tick() => RunMode::Incremental,
            },
            None => match rx.recv().await {
                Some(mode) => mode,
                None => break,
            },
        };

        let _ = run_logged(reporter, guard, mode).await;
    }
}

fn log_cycle(name: &'static str, mode: RunMode, result: &CycleResult) {
    match result {
        Ok(CycleOutcome::Skipped(reason)) => {
            debug!(reporter = name, ?mode, ?reason, "Cycle skipped");
        }
        Ok(CycleOutcome::Completed(summary)) if summary.failed > 0 => {
            warn!(
                reporter = name,
                ?mode,
                candidates = summary.candidates,
                succeeded = summary.succeeded,
                failed = summary.failed,
                queued = summary.queued,
                "Cycle completed with failures"
            );
        }
        Ok(CycleOutcome::Completed(summary)) if summary.candidates > 0 => {
            info!(
                reporter = name,
                ?mode,
                candidates = summary.candidates,
                flushes = summary.flushes,
                succeeded = summary.succeeded,
                "Cycle completed"
            );
        }
        Ok(CycleOutcome::Completed(_)) => {
            debug!(reporter = name, ?mode, "Cycle completed; nothing new");
        }
        Err(e) => {
            warn!(reporter = name, ?mode, error = %e, "Cycle aborted");
        }
    }
}
