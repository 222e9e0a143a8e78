// Proxy history reporter
//
// A one-shot bulk export of the recorded proxy history into the traffic
// index. No dedup: every run sends the full in-scope history. Documents
// the cluster does not accept are handed to the retry queue.

use async_trait::async_trait;
use std::sync::Arc;

use artifact_export_batch::BatchAssembler;
use artifact_export_config::DataSource;

use crate::artifacts::{Artifact, TrafficRecord};
use crate::document::Document;
use crate::index::IndexKind;
use crate::retry::RetryCoordinator;
use crate::source::ArtifactSource;

use super::flush::{deliver_bulk, FlushTarget};
use super::{CycleOutcome, CycleResult, CycleSummary, Reporter, ReporterDeps, RunMode};

pub struct ProxyHistoryReporter {
    source: Arc<dyn ArtifactSource<TrafficRecord>>,
    deps: ReporterDeps,
}

impl ProxyHistoryReporter {
    pub fn new(source: Arc<dyn ArtifactSource<TrafficRecord>>, deps: ReporterDeps) -> Self {
        Self { source, deps }
    }
}

#[async_trait]
impl Reporter for ProxyHistoryReporter {
    fn name(&self) -> &'static str {
        DataSource::ProxyHistory.as_str()
    }

    /// Both modes send the whole history.
    async fn run_cycle(&mut self, _mode: RunMode) -> CycleResult {
        let base_url = match self.deps.switches.preflight(DataSource::ProxyHistory) {
            Ok(base_url) => base_url,
            Err(reason) => return Ok(CycleOutcome::Skipped(reason)),
        };

        let records = self.source.fetch().await?;
        let scope = self.deps.switches.scope();
        let kind = IndexKind::Traffic;
        let index = self.deps.naming.index_name(kind);
        let target = FlushTarget {
            indexer: self.deps.indexer.as_ref(),
            stats: self.deps.stats.as_ref(),
            base_url: &base_url,
            index: &index,
            kind,
        };

        let mut summary = CycleSummary {
            fetched: records.len(),
            ..CycleSummary::default()
        };
        let mut assembler = BatchAssembler::new(self.deps.limits);

        for record in &records {
            if !scope.should_export(record.url(), self.source.host_in_scope(record.url())) {
                continue;
            }
            let Some(document) = record.to_document() else {
                continue;
            };
            summary.candidates += 1;

            for batch in assembler.push((), document) {
                let (_, documents) = batch.into_parts();
                flush(&target, &self.deps.retry, &documents, &mut summary).await;
            }
        }
        if let Some(batch) = assembler.finish() {
            let (_, documents) = batch.into_parts();
            flush(&target, &self.deps.retry, &documents, &mut summary).await;
        }

        Ok(CycleOutcome::Completed(summary))
    }
}

async fn flush(
    target: &FlushTarget<'_>,
    retry: &RetryCoordinator,
    documents: &[Document],
    summary: &mut CycleSummary,
) {
    let delivery = deliver_bulk(target, documents).await;
    summary.flushes += 1;
    summary.succeeded += delivery.succeeded;
    summary.failed += delivery.failed.len();
    if !delivery.is_complete() {
        summary.queued += retry.enqueue_failed(target.index, delivery.failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::SkipReason;
    use crate::testing::{Harness, MockResponse, StaticSource};
    use artifact_export_batch::BatchLimits;

    fn history(n: u64) -> Vec<TrafficRecord> {
        (1..=n)
            .map(|id| TrafficRecord::new(id, format!("https://app.test/api/{}", id), "GET"))
            .collect()
    }

    fn summary_of(result: CycleResult) -> CycleSummary {
        match result.unwrap() {
            CycleOutcome::Completed(summary) => summary,
            other => panic!("expected a completed cycle, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn exports_history_to_traffic_index() {
        let harness = Harness::new();
        let source = Arc::new(StaticSource::new(DataSource::ProxyHistory, history(3)));
        let mut reporter = ProxyHistoryReporter::new(source, harness.deps());

        let summary = summary_of(reporter.run_cycle(RunMode::PushAll).await);
        assert_eq!(summary.succeeded, 3);
        let calls = harness.indexer.bulk_calls();
        assert_eq!(calls[0].index, harness.index(IndexKind::Traffic));
        assert_eq!(calls[0].index, "test-traffic");
        assert_eq!(harness.stats.success_count(IndexKind::Traffic), 3);
    }

    #[tokio::test]
    async fn every_run_resends_everything() {
        let harness = Harness::new();
        let source = Arc::new(StaticSource::new(DataSource::ProxyHistory, history(2)));
        let mut reporter = ProxyHistoryReporter::new(source, harness.deps());

        summary_of(reporter.run_cycle(RunMode::PushAll).await);
        summary_of(reporter.run_cycle(RunMode::Incremental).await);
        assert_eq!(harness.indexer.bulk_sizes(), vec![2, 2]);
    }

    #[tokio::test]
    async fn rejected_documents_go_to_retry_queue() {
        let harness = Harness::new();
        let source = Arc::new(StaticSource::new(DataSource::ProxyHistory, history(5)));
        let mut reporter = ProxyHistoryReporter::new(
            source,
            harness.deps_with(BatchLimits {
                max_docs: 3,
                ..BatchLimits::default()
            }),
        );
        harness.indexer.respond(MockResponse::Reject(vec![0]));
        harness.indexer.respond(MockResponse::Fail("connection reset".to_string()));

        let summary = summary_of(reporter.run_cycle(RunMode::PushAll).await);
        assert_eq!(harness.indexer.bulk_sizes(), vec![3, 2]);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 3);
        assert_eq!(summary.queued, 3);

        let index = harness.index(IndexKind::Traffic);
        let queued = harness.queue.poll_batch(&index, 10);
        let ids: Vec<&str> = queued.iter().filter_map(|doc| doc["url"].as_str()).collect();
        assert_eq!(
            ids,
            vec!["https://app.test/api/1", "https://app.test/api/4", "https://app.test/api/5"]
        );
    }

    #[tokio::test]
    async fn skipped_when_not_selected() {
        let harness = Harness::new();
        harness.switches.set_selected(vec![DataSource::Traffic]);
        let source = Arc::new(StaticSource::new(DataSource::ProxyHistory, history(1)));
        let mut reporter = ProxyHistoryReporter::new(source.clone(), harness.deps());

        assert_eq!(
            reporter.run_cycle(RunMode::PushAll).await.unwrap(),
            CycleOutcome::Skipped(SkipReason::SourceNotSelected)
        );
        assert_eq!(source.fetch_count(), 0);
    }
}
