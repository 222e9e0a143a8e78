// Tool stats reporter: periodic `stats_snapshot` documents in the tool index

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::document::{document_meta, now_rfc3339, Document, EXTENSION_VERSION};
use crate::index::IndexKind;

use super::{CycleOutcome, CycleResult, CycleSummary, Reporter, ReporterDeps, RunMode};

const PUSH_FAILED: &str = "Tool stats snapshot push failed";

pub struct ToolStatsReporter {
    deps: ReporterDeps,
}

impl ToolStatsReporter {
    pub fn new(deps: ReporterDeps) -> Self {
        Self { deps }
    }

    fn snapshot_document(&self) -> Document {
        let snapshot = self.deps.stats.snapshot();
        let message_text = format!(
            "Export stats: {} indexed, {} failed, {} queued",
            snapshot.total_success, snapshot.total_failure, snapshot.total_queued
        );
        json!({
            "timestamp": now_rfc3339(),
            "level": "INFO",
            "event_type": "stats_snapshot",
            "source": "artifact-export",
            "message": {
                "export_running": self.deps.switches.is_running(),
                "stats": snapshot,
            },
            "message_text": message_text,
            "extension_version": EXTENSION_VERSION,
            "document_meta": document_meta(),
        })
    }
}

#[async_trait]
impl Reporter for ToolStatsReporter {
    fn name(&self) -> &'static str {
        "tool_stats"
    }

    fn writes_tool_index(&self) -> bool {
        true
    }

    async fn run_cycle(&mut self, _mode: RunMode) -> CycleResult {
        let base_url = match self.deps.switches.destination() {
            Ok(base_url) => base_url,
            Err(reason) => return Ok(CycleOutcome::Skipped(reason)),
        };

        let kind = IndexKind::Tool;
        let index = self.deps.naming.index_name(kind);
        let document = self.snapshot_document();
        let stats = Arc::clone(&self.deps.stats);

        let started = Instant::now();
        let result = self
            .deps
            .indexer
            .push_document(&base_url, &index, &document)
            .await;
        stats.record_last_push(kind, started.elapsed());

        let mut summary = CycleSummary {
            fetched: 1,
            candidates: 1,
            flushes: 1,
            ..CycleSummary::default()
        };
        // This module's target is never forwarded to the tool index.
        match result {
            Ok(()) => {
                stats.record_success(kind, 1);
                summary.succeeded = 1;
            }
            Err(e) => {
                debug!(error = %e, "Tool stats snapshot push failed");
                stats.record_failure(kind, 1);
                stats.record_last_error(kind, PUSH_FAILED);
                summary.failed = 1;
            }
        }
        Ok(CycleOutcome::Completed(summary))
    }
}
