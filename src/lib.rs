// artifact-export - Wiring for the artifact export pipeline
//
// `Exporter` assembles the shared pieces (switches, stats, retry
// coordinator) from a `RuntimeConfig`, owns one scheduler thread per
// reporter and exposes the start / stop / push-now controls. Sources and the
// indexing client are supplied by the embedding tool.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

use artifact_export_batch::BatchLimits;
use artifact_export_config::{DataSource, RuntimeConfig};
use artifact_export_core::{
    reporter, ArtifactSource, BulkIndexer, ConfigSnapshotReporter, ExportStats, ExportSwitches,
    Finding, FindingsReporter, ForwarderHandle, IndexNaming, LogBuffer, LogForwarder,
    ProxyHistoryReporter, ReporterDeps, ReporterHandle, RetryCoordinator, RetryQueue,
    RetrySettings, RunMode, SettingsReporter, SettingsSource, SitemapEntry, SitemapReporter,
    StatsSnapshot, ToolLogLayer, ToolStatsReporter, TrafficRecord, TrafficSink,
};

mod init;

pub use init::{forward_level, init_tracing};

/// Collects the indexer and sources for an [`Exporter`].
pub struct ExporterBuilder {
    config: RuntimeConfig,
    indexer: Option<Arc<dyn BulkIndexer>>,
    settings: Option<Arc<dyn SettingsSource>>,
    sitemap: Option<Arc<dyn ArtifactSource<SitemapEntry>>>,
    findings: Option<Arc<dyn ArtifactSource<Finding>>>,
    proxy_history: Option<Arc<dyn ArtifactSource<TrafficRecord>>>,
}

impl ExporterBuilder {
    pub fn indexer(mut self, indexer: Arc<dyn BulkIndexer>) -> Self {
        self.indexer = Some(indexer);
        self
    }

    pub fn settings(mut self, source: Arc<dyn SettingsSource>) -> Self {
        self.settings = Some(source);
        self
    }

    pub fn sitemap(mut self, source: Arc<dyn ArtifactSource<SitemapEntry>>) -> Self {
        self.sitemap = Some(source);
        self
    }

    pub fn findings(mut self, source: Arc<dyn ArtifactSource<Finding>>) -> Self {
        self.findings = Some(source);
        self
    }

    pub fn proxy_history(mut self, source: Arc<dyn ArtifactSource<TrafficRecord>>) -> Self {
        self.proxy_history = Some(source);
        self
    }

    pub fn build(self) -> Result<Exporter> {
        let config = self.config;
        config.validate()?;
        let indexer = self.indexer.context("An indexer is required to build an exporter")?;

        let naming = IndexNaming::new(config.index.prefix.clone());
        let queue = Arc::new(RetryQueue::new(config.retry.queue_capacity));
        let stats = Arc::new(ExportStats::new(naming.clone(), Arc::clone(&queue)));
        let switches = Arc::new(ExportSwitches::from_config(&config));
        let retry = Arc::new(RetryCoordinator::new(
            queue,
            Arc::clone(&indexer),
            Arc::clone(&switches),
            Arc::clone(&stats),
            naming.clone(),
            RetrySettings::from(&config.retry),
        ));
        let deps = ReporterDeps {
            indexer,
            stats,
            switches,
            retry,
            naming,
            limits: BatchLimits {
                max_docs: config.batch.max_docs,
                max_bytes: config.batch.max_bytes,
            },
        };

        Ok(Exporter {
            traffic: TrafficSink::new(deps.clone()),
            log_buffer: Arc::new(LogBuffer::default()),
            sources: Sources {
                settings: self.settings,
                sitemap: self.sitemap,
                findings: self.findings,
                proxy_history: self.proxy_history,
            },
            workers: Mutex::new(None),
            config,
            deps,
        })
    }
}

struct Sources {
    settings: Option<Arc<dyn SettingsSource>>,
    sitemap: Option<Arc<dyn ArtifactSource<SitemapEntry>>>,
    findings: Option<Arc<dyn ArtifactSource<Finding>>>,
    proxy_history: Option<Arc<dyn ArtifactSource<TrafficRecord>>>,
}

/// Threads started on the first `start()`.
struct Workers {
    reporters: Vec<ReporterHandle>,
    config_snapshot: ReporterHandle,
    forwarder: Option<ForwarderHandle>,
}

pub struct Exporter {
    config: RuntimeConfig,
    deps: ReporterDeps,
    sources: Sources,
    traffic: TrafficSink,
    log_buffer: Arc<LogBuffer>,
    workers: Mutex<Option<Workers>>,
}

impl Exporter {
    pub fn builder(config: RuntimeConfig) -> ExporterBuilder {
        ExporterBuilder {
            config,
            indexer: None,
            settings: None,
            sitemap: None,
            findings: None,
            proxy_history: None,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Turns export on, pushes a config snapshot and runs a push-all on
    /// every reporter.
    ///
    /// Scheduler threads and the retry drain loop are spawned on the first
    /// call and reused afterwards.
    pub fn start(&self) -> Result<()> {
        self.deps.switches.set_running(true);
        self.deps.retry.start()?;

        let mut workers = self.workers.lock();
        if workers.is_none() {
            *workers = Some(self.spawn_workers()?);
        }
        let triggered = workers.as_ref().map_or(0, |w| {
            w.config_snapshot.trigger(RunMode::PushAll);
            trigger_all(&w.reporters, RunMode::PushAll)
        });

        info!(
            base_url = self.deps.switches.base_url().as_deref().unwrap_or("<unset>"),
            reporters = triggered,
            "Export started"
        );
        Ok(())
    }

    /// Turns export off. Running cycles finish; later cycles skip.
    pub fn stop(&self) {
        self.deps.switches.set_running(false);
        info!(
            queued = self.deps.retry.queue().total_size(),
            "Export stopped"
        );
    }

    pub fn is_running(&self) -> bool {
        self.deps.switches.is_running()
    }

    /// Requests a push-all from every reporter; returns how many accepted.
    /// Reporters with a cycle in flight ignore the request.
    pub fn push_now(&self) -> usize {
        self.workers
            .lock()
            .as_ref()
            .map_or(0, |w| trigger_all(&w.reporters, RunMode::PushAll))
    }

    /// Pushes a fresh config snapshot to the tool index. Call after changing
    /// the [`switches`](Self::switches) while export runs; returns `false`
    /// when export is stopped or a snapshot is already in flight.
    pub fn config_changed(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.workers
            .lock()
            .as_ref()
            .is_some_and(|w| w.config_snapshot.trigger(RunMode::PushAll))
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.deps.stats.snapshot()
    }

    pub fn switches(&self) -> &ExportSwitches {
        &self.deps.switches
    }

    /// Per-message sink for live traffic.
    pub fn traffic(&self) -> &TrafficSink {
        &self.traffic
    }

    /// Layer feeding this exporter's tool-index log forwarder, for
    /// [`init_tracing`]. `None` unless `log.forward_to_index` is set.
    pub fn log_layer(&self) -> Option<ToolLogLayer> {
        self.config.log.forward_to_index.then(|| {
            ToolLogLayer::new(Arc::clone(&self.log_buffer), forward_level(&self.config.log))
        })
    }

    /// Index names the current source selection writes to.
    pub fn index_names(&self) -> Vec<String> {
        let selected: Vec<DataSource> = DataSource::ALL
            .into_iter()
            .filter(|source| self.deps.switches.is_selected(*source))
            .collect();
        self.deps.naming.index_names(&selected)
    }

    /// Stops export and joins every worker thread.
    pub fn shutdown(self) {
        drop(self);
    }

    fn spawn_workers(&self) -> Result<Workers> {
        let interval = Some(self.config.reporters.interval());
        let deps = &self.deps;
        let mut reporters = Vec::new();

        if let Some(source) = &self.sources.settings {
            reporters.push(reporter::spawn(
                SettingsReporter::new(Arc::clone(source), deps.clone()),
                interval,
            )?);
        }
        if let Some(source) = &self.sources.sitemap {
            reporters.push(reporter::spawn(
                SitemapReporter::new(Arc::clone(source), deps.clone()),
                interval,
            )?);
        }
        if let Some(source) = &self.sources.findings {
            reporters.push(reporter::spawn(
                FindingsReporter::new(Arc::clone(source), deps.clone()),
                interval,
            )?);
        }
        if let Some(source) = &self.sources.proxy_history {
            reporters.push(reporter::spawn(
                ProxyHistoryReporter::new(Arc::clone(source), deps.clone()),
                None,
            )?);
        }
        let config_snapshot = reporter::spawn(ConfigSnapshotReporter::new(deps.clone()), None)?;
        if self.config.reporters.tool_stats_enabled {
            reporters.push(reporter::spawn(ToolStatsReporter::new(deps.clone()), interval)?);
        }

        let forwarder = if self.config.log.forward_to_index {
            let forwarder = LogForwarder::new(
                Arc::clone(&self.log_buffer),
                Arc::clone(&deps.indexer),
                Arc::clone(&deps.switches),
                &deps.naming,
            );
            Some(forwarder.spawn()?)
        } else {
            None
        };

        debug!(
            reporters = reporters.len(),
            log_forwarding = forwarder.is_some(),
            "Export workers spawned"
        );
        Ok(Workers {
            reporters,
            config_snapshot,
            forwarder,
        })
    }
}

impl Drop for Exporter {
    fn drop(&mut self) {
        self.deps.switches.set_running(false);
        if let Some(workers) = self.workers.lock().take() {
            for handle in workers.reporters {
                handle.shutdown();
            }
            workers.config_snapshot.shutdown();
            if let Some(forwarder) = workers.forwarder {
                forwarder.shutdown();
            }
        }
        self.deps.retry.stop();
    }
}

fn trigger_all(reporters: &[ReporterHandle], mode: RunMode) -> usize {
    reporters.iter().filter(|handle| handle.trigger(mode)).count()
}
