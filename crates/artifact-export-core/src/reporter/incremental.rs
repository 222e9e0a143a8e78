// Incremental reporter for keyed sources (site map, findings)
//
// Each cycle fetches the whole source, filters by scope and (in incremental
// mode) by the session dedup set, and streams documents through the batch
// assembler. Keys are marked delivered only when their whole batch was
// accepted; anything else is offered again on the next cycle.

use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;

use artifact_export_batch::{BatchAssembler, PendingBatch};

use crate::artifacts::{Artifact, Finding, SitemapEntry};
use crate::dedup::DedupSet;
use crate::document::PushKey;
use crate::source::ArtifactSource;

use super::flush::{deliver_bulk, FlushTarget};
use super::{CycleOutcome, CycleResult, CycleSummary, Reporter, ReporterDeps, RunMode};

pub type SitemapReporter = IncrementalReporter<SitemapEntry>;
pub type FindingsReporter = IncrementalReporter<Finding>;

pub struct IncrementalReporter<T: Artifact> {
    source: Arc<dyn ArtifactSource<T>>,
    deps: ReporterDeps,
    dedup: DedupSet,
    _artifact: PhantomData<fn() -> T>,
}

impl<T: Artifact> IncrementalReporter<T> {
    pub fn new(source: Arc<dyn ArtifactSource<T>>, deps: ReporterDeps) -> Self {
        Self {
            source,
            deps,
            dedup: DedupSet::new(),
            _artifact: PhantomData,
        }
    }

    /// Keys delivered so far this session.
    pub fn dedup(&self) -> &DedupSet {
        &self.dedup
    }
}

#[async_trait]
impl<T: Artifact> Reporter for IncrementalReporter<T> {
    fn name(&self) -> &'static str {
        T::SOURCE.as_str()
    }

    async fn run_cycle(&mut self, mode: RunMode) -> CycleResult {
        let base_url = match self.deps.switches.preflight(T::SOURCE) {
            Ok(base_url) => base_url,
            Err(reason) => return Ok(CycleOutcome::Skipped(reason)),
        };

        let items = self.source.fetch().await?;
        let scope = self.deps.switches.scope();
        let kind = T::index_kind();
        let index = self.deps.naming.index_name(kind);
        let target = FlushTarget {
            indexer: self.deps.indexer.as_ref(),
            stats: self.deps.stats.as_ref(),
            base_url: &base_url,
            index: &index,
            kind,
        };

        let mut summary = CycleSummary {
            fetched: items.len(),
            ..CycleSummary::default()
        };
        let mut assembler = BatchAssembler::new(self.deps.limits);

        for item in &items {
            let url = item.url();
            if !scope.should_export(url, self.source.host_in_scope(url)) {
                continue;
            }
            let key = item.push_key();
            if mode == RunMode::Incremental && self.dedup.contains(&key) {
                continue;
            }
            let Some(document) = item.to_document() else {
                continue;
            };
            summary.candidates += 1;

            for batch in assembler.push(key, document) {
                flush(&target, &mut self.dedup, batch, &mut summary).await;
            }
        }
        if let Some(batch) = assembler.finish() {
            flush(&target, &mut self.dedup, batch, &mut summary).await;
        }

        Ok(CycleOutcome::Completed(summary))
    }
}

async fn flush(
    target: &FlushTarget<'_>,
    dedup: &mut DedupSet,
    batch: PendingBatch<PushKey>,
    summary: &mut CycleSummary,
) {
    let (keys, documents) = batch.into_parts();
    let delivery = deliver_bulk(target, &documents).await;

    summary.flushes += 1;
    summary.succeeded += delivery.succeeded;
    summary.failed += delivery.failed.len();
    if delivery.is_complete() {
        dedup.mark_all(keys);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexKind;
    use crate::reporter::SkipReason;
    use crate::testing::{Harness, MockResponse, StaticSource, TEST_BASE_URL};
    use artifact_export_config::{DataSource, ScopeConfig, ScopeKind};

    fn entries(n: usize) -> Vec<SitemapEntry> {
        (0..n)
            .map(|i| SitemapEntry::new(format!("https://app.test/page/{}", i), "GET"))
            .collect()
    }

    fn sitemap(harness: &Harness, items: Vec<SitemapEntry>) -> (SitemapReporter, Arc<StaticSource<SitemapEntry>>) {
        let source = Arc::new(StaticSource::new(DataSource::Sitemap, items));
        (SitemapReporter::new(source.clone(), harness.deps()), source)
    }

    fn completed(result: CycleResult) -> CycleSummary {
        match result.unwrap() {
            CycleOutcome::Completed(summary) => summary,
            other => panic!("expected a completed cycle, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn push_all_then_incremental_sends_nothing_new() {
        let harness = Harness::new();
        let (mut reporter, _) = sitemap(&harness, entries(3));

        let summary = completed(reporter.run_cycle(RunMode::PushAll).await);
        assert_eq!(summary.candidates, 3);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(reporter.dedup().len(), 3);

        let summary = completed(reporter.run_cycle(RunMode::Incremental).await);
        assert_eq!(summary.fetched, 3);
        assert_eq!(summary.candidates, 0);
        assert_eq!(harness.indexer.bulk_call_count(), 1);

        let call = &harness.indexer.bulk_calls()[0];
        assert_eq!(call.base_url, TEST_BASE_URL);
        assert_eq!(call.index, harness.index(IndexKind::Sitemap));
    }

    #[tokio::test]
    async fn incremental_sends_only_new_items() {
        let harness = Harness::new();
        let (mut reporter, source) = sitemap(&harness, entries(2));
        completed(reporter.run_cycle(RunMode::Incremental).await);

        source.push_item(SitemapEntry::new("https://app.test/new", "POST"));
        let summary = completed(reporter.run_cycle(RunMode::Incremental).await);
        assert_eq!(summary.candidates, 1);
        assert_eq!(harness.indexer.bulk_sizes(), vec![2, 1]);
        assert_eq!(harness.indexer.bulk_calls()[1].documents[0]["method"], "POST");
    }

    #[tokio::test]
    async fn push_all_resends_delivered_items() {
        let harness = Harness::new();
        let (mut reporter, _) = sitemap(&harness, entries(2));
        completed(reporter.run_cycle(RunMode::Incremental).await);
        completed(reporter.run_cycle(RunMode::PushAll).await);
        assert_eq!(harness.indexer.bulk_sizes(), vec![2, 2]);
    }

    #[tokio::test]
    async fn partial_failure_keeps_batch_unmarked() {
        let harness = Harness::new();
        let (mut reporter, _) = sitemap(&harness, entries(4));
        harness.indexer.respond(MockResponse::Reject(vec![2]));

        let summary = completed(reporter.run_cycle(RunMode::Incremental).await);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failed, 1);
        assert!(reporter.dedup().is_empty());
        assert_eq!(harness.stats.last_error(IndexKind::Sitemap).as_deref(), Some("Bulk had 1 failure(s)"));

        // The whole batch is offered again.
        let summary = completed(reporter.run_cycle(RunMode::Incremental).await);
        assert_eq!(summary.candidates, 4);
        assert_eq!(reporter.dedup().len(), 4);
        assert!(harness.queue.all_empty());
    }

    #[tokio::test]
    async fn unreachable_index_counts_failures() {
        let harness = Harness::new();
        let (mut reporter, _) = sitemap(&harness, entries(2));
        harness.indexer.respond(MockResponse::Fail("connection refused".to_string()));

        let summary = completed(reporter.run_cycle(RunMode::Incremental).await);
        assert_eq!(summary.failed, 2);
        assert_eq!(harness.stats.failure_count(IndexKind::Sitemap), 2);
        assert!(harness
            .stats
            .last_error(IndexKind::Sitemap)
            .unwrap()
            .contains("connection refused"));
        assert!(reporter.dedup().is_empty());
    }

    #[tokio::test]
    async fn batches_split_at_document_limit() {
        let harness = Harness::new();
        let (mut reporter, _) = sitemap(&harness, entries(250));

        let summary = completed(reporter.run_cycle(RunMode::PushAll).await);
        assert_eq!(summary.flushes, 3);
        assert_eq!(harness.indexer.bulk_sizes(), vec![100, 100, 50]);
        assert_eq!(harness.stats.success_count(IndexKind::Sitemap), 250);
        assert!(harness.stats.last_push_duration_ms(IndexKind::Sitemap).is_some());
    }

    #[tokio::test]
    async fn fetch_failure_aborts_cycle() {
        let harness = Harness::new();
        let (mut reporter, source) = sitemap(&harness, entries(2));
        source.set_failing(true);

        assert!(reporter.run_cycle(RunMode::Incremental).await.is_err());
        assert_eq!(harness.indexer.bulk_call_count(), 0);
        assert!(reporter.dedup().is_empty());
    }

    #[tokio::test]
    async fn skipped_without_fetch_when_stopped_or_unselected() {
        let harness = Harness::new();
        let (mut reporter, source) = sitemap(&harness, entries(1));

        harness.switches.set_running(false);
        assert_eq!(
            reporter.run_cycle(RunMode::PushAll).await.unwrap(),
            CycleOutcome::Skipped(SkipReason::ExportStopped)
        );

        harness.switches.set_running(true);
        harness.switches.set_selected(vec![DataSource::Findings]);
        assert_eq!(
            reporter.run_cycle(RunMode::PushAll).await.unwrap(),
            CycleOutcome::Skipped(SkipReason::SourceNotSelected)
        );
        assert_eq!(source.fetch_count(), 0);
    }

    #[tokio::test]
    async fn out_of_scope_items_are_not_sent() {
        let harness = Harness::new();
        harness.switches.set_scope(&ScopeConfig {
            kind: ScopeKind::Burp,
            custom: Vec::new(),
        });
        let (mut reporter, source) = sitemap(&harness, entries(3));
        source.set_in_scope(false);

        let summary = completed(reporter.run_cycle(RunMode::PushAll).await);
        assert_eq!(summary.fetched, 3);
        assert_eq!(summary.candidates, 0);
        assert_eq!(harness.indexer.bulk_call_count(), 0);
    }

    #[tokio::test]
    async fn findings_go_to_findings_index() {
        let harness = Harness::new();
        let finding = Finding {
            name: "Cleartext submission of password".to_string(),
            severity: "HIGH".to_string(),
            confidence: "CERTAIN".to_string(),
            base_url: "http://app.test/login".to_string(),
            host: "app.test".to_string(),
            port: 80,
            secure: false,
            detail: "The page submits a password over HTTP.".to_string(),
            remediation: String::new(),
            evidence: Vec::new(),
        };
        let source = Arc::new(StaticSource::new(DataSource::Findings, vec![finding]));
        let mut reporter = FindingsReporter::new(source, harness.deps());
        assert_eq!(reporter.name(), "findings");

        completed(reporter.run_cycle(RunMode::Incremental).await);
        let call = &harness.indexer.bulk_calls()[0];
        assert_eq!(call.index, harness.index(IndexKind::Findings));
        assert_eq!(call.documents[0]["protocol_transport"], "http");
    }
}
