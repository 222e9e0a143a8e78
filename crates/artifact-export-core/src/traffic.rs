// Live traffic sink
//
// Called once per proxied message while export runs. Each message is sent as
// a single document; a failed send goes to the retry queue instead of being
// lost.

use std::time::Instant;
use tracing::trace;

use artifact_export_config::DataSource;

use crate::artifacts::{Artifact, TrafficRecord};
use crate::index::IndexKind;
use crate::reporter::{ReporterDeps, SkipReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficOutcome {
    Skipped(SkipReason),
    OutOfScope,
    Indexed,
    /// Send failed; the document is waiting in the retry queue.
    Queued,
    /// Send failed and the retry queue was full.
    Dropped,
}

pub struct TrafficSink {
    deps: ReporterDeps,
}

impl TrafficSink {
    pub fn new(deps: ReporterDeps) -> Self {
        Self { deps }
    }

    pub async fn record(&self, record: &TrafficRecord, host_in_scope: bool) -> TrafficOutcome {
        let base_url = match self.deps.switches.preflight(DataSource::Traffic) {
            Ok(base_url) => base_url,
            Err(reason) => return TrafficOutcome::Skipped(reason),
        };
        if !self.deps.switches.scope().should_export(record.url(), host_in_scope) {
            return TrafficOutcome::OutOfScope;
        }
        let Some(document) = record.to_document() else {
            return TrafficOutcome::OutOfScope;
        };

        let kind = IndexKind::Traffic;
        let index = self.deps.naming.index_name(kind);
        let stats = &self.deps.stats;
        let started = Instant::now();
        let result = self
            .deps
            .indexer
            .push_document(&base_url, &index, &document)
            .await;
        stats.record_last_push(kind, started.elapsed());

        match result {
            Ok(()) => {
                stats.record_success(kind, 1);
                TrafficOutcome::Indexed
            }
            Err(e) => {
                stats.record_failure(kind, 1);
                stats.record_last_error(kind, &e.to_string());
                trace!(id = record.id, error = %e, "Traffic document queued for retry");
                if self.deps.retry.enqueue_failed(&index, vec![document]) > 0 {
                    TrafficOutcome::Queued
                } else {
                    TrafficOutcome::Dropped
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, MockResponse};
    use artifact_export_config::{ScopeConfig, ScopeEntry, ScopeKind};

    fn message(id: u64) -> TrafficRecord {
        let mut record = TrafficRecord::new(id, "https://api.target.test/v1/users", "GET");
        record.host = "api.target.test".to_string();
        record.port = 443;
        record.secure = true;
        record.status = Some(200);
        record
    }

    #[tokio::test]
    async fn indexes_single_message() {
        let harness = Harness::new();
        let sink = TrafficSink::new(harness.deps());

        assert_eq!(sink.record(&message(1), true).await, TrafficOutcome::Indexed);
        let calls = harness.indexer.document_calls();
        assert_eq!(calls[0].index, harness.index(IndexKind::Traffic));
        assert_eq!(calls[0].documents[0]["status"], 200);
        assert_eq!(harness.stats.success_count(IndexKind::Traffic), 1);
    }

    #[tokio::test]
    async fn failed_send_is_queued_then_dropped_when_full() {
        let harness = Harness::with_capacity(1);
        harness.indexer.set_fallback(MockResponse::Fail("refused".to_string()));
        let sink = TrafficSink::new(harness.deps());

        assert_eq!(sink.record(&message(1), true).await, TrafficOutcome::Queued);
        assert_eq!(sink.record(&message(2), true).await, TrafficOutcome::Dropped);
        assert_eq!(harness.queue.size(&harness.index(IndexKind::Traffic)), 1);
        assert_eq!(harness.stats.failure_count(IndexKind::Traffic), 2);
        assert!(harness.stats.last_push_duration_ms(IndexKind::Traffic).is_some());
    }

    #[tokio::test]
    async fn custom_scope_filters_by_host() {
        let harness = Harness::new();
        harness.switches.set_scope(&ScopeConfig {
            kind: ScopeKind::Custom,
            custom: vec![ScopeEntry::string("other.test")],
        });
        let sink = TrafficSink::new(harness.deps());

        assert_eq!(sink.record(&message(1), true).await, TrafficOutcome::OutOfScope);
        assert!(harness.indexer.document_calls().is_empty());
    }

    #[tokio::test]
    async fn nothing_sent_while_stopped() {
        let harness = Harness::new();
        harness.switches.set_running(false);
        let sink = TrafficSink::new(harness.deps());

        assert_eq!(
            sink.record(&message(1), true).await,
            TrafficOutcome::Skipped(SkipReason::ExportStopped)
        );
        assert!(harness.queue.all_empty());
    }
}
