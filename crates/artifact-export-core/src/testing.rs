//! In-memory collaborators for tests

use artifact_export_batch::BatchLimits;
use artifact_export_config::{DataSource, RuntimeConfig, SettingsPart};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::document::Document;
use crate::error::{IndexError, SourceError};
use crate::index::{IndexKind, IndexNaming};
use crate::indexer::{BulkIndexer, BulkOutcome};
use crate::reporter::ReporterDeps;
use crate::retry::{RetryCoordinator, RetryQueue, RetrySettings};
use crate::source::{ArtifactSource, SettingsSource};
use crate::stats::ExportStats;
use crate::switches::ExportSwitches;

pub const TEST_BASE_URL: &str = "http://search.test:9200";
pub const TEST_PREFIX: &str = "test";

/// A running export wired to a [`MockIndexer`]: all sources selected,
/// scope `all`, base URL [`TEST_BASE_URL`] and index prefix [`TEST_PREFIX`].
pub struct Harness {
    pub indexer: Arc<MockIndexer>,
    pub queue: Arc<RetryQueue>,
    pub stats: Arc<ExportStats>,
    pub switches: Arc<ExportSwitches>,
    pub retry: Arc<RetryCoordinator>,
    pub naming: IndexNaming,
}

impl Default for Harness {
    fn default() -> Self {
        Self::build(10_000, RetrySettings::default())
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(queue_capacity: usize) -> Self {
        Self::build(queue_capacity, RetrySettings::default())
    }

    pub fn with_retry(settings: RetrySettings) -> Self {
        Self::build(10_000, settings)
    }

    fn build(queue_capacity: usize, settings: RetrySettings) -> Self {
        let mut config = RuntimeConfig::default();
        config.index.base_url = Some(TEST_BASE_URL.to_string());
        config.sources.selected = DataSource::ALL.to_vec();

        let naming = IndexNaming::new(TEST_PREFIX);
        let indexer = Arc::new(MockIndexer::new());
        let queue = Arc::new(RetryQueue::new(queue_capacity));
        let stats = Arc::new(ExportStats::new(naming.clone(), Arc::clone(&queue)));
        let switches = Arc::new(ExportSwitches::from_config(&config));
        switches.set_running(true);
        let retry = Arc::new(RetryCoordinator::new(
            Arc::clone(&queue),
            indexer.clone(),
            Arc::clone(&switches),
            Arc::clone(&stats),
            naming.clone(),
            settings,
        ));
        Self {
            indexer,
            queue,
            stats,
            switches,
            retry,
            naming,
        }
    }

    pub fn index(&self, kind: IndexKind) -> String {
        self.naming.index_name(kind)
    }

    pub fn deps(&self) -> ReporterDeps {
        self.deps_with(BatchLimits::default())
    }

    pub fn deps_with(&self, limits: BatchLimits) -> ReporterDeps {
        ReporterDeps {
            indexer: self.indexer.clone(),
            stats: Arc::clone(&self.stats),
            switches: Arc::clone(&self.switches),
            retry: Arc::clone(&self.retry),
            naming: self.naming.clone(),
            limits,
        }
    }
}

/// Scripted reply for the next indexer call.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Succeed,
    /// Reject the documents at these positions.
    Reject(Vec<usize>),
    /// Accept only the first `n` documents without naming the failures.
    AcceptFirst(usize),
    Fail(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub base_url: String,
    pub index: String,
    pub documents: Vec<Document>,
}

/// Records every request and answers from a script, then from a default.
#[derive(Debug)]
pub struct MockIndexer {
    script: Mutex<VecDeque<MockResponse>>,
    fallback: Mutex<MockResponse>,
    bulk_calls: Mutex<Vec<RecordedCall>>,
    document_calls: Mutex<Vec<RecordedCall>>,
}

impl Default for MockIndexer {
    fn default() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(MockResponse::Succeed),
            bulk_calls: Mutex::new(Vec::new()),
            document_calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a reply for the next call (bulk or single).
    pub fn respond(&self, response: MockResponse) {
        self.script.lock().push_back(response);
    }

    /// Reply used once the script is exhausted.
    pub fn set_fallback(&self, response: MockResponse) {
        *self.fallback.lock() = response;
    }

    pub fn bulk_calls(&self) -> Vec<RecordedCall> {
        self.bulk_calls.lock().clone()
    }

    pub fn document_calls(&self) -> Vec<RecordedCall> {
        self.document_calls.lock().clone()
    }

    pub fn bulk_call_count(&self) -> usize {
        self.bulk_calls.lock().len()
    }

    /// Sizes of each bulk request, in call order.
    pub fn bulk_sizes(&self) -> Vec<usize> {
        self.bulk_calls.lock().iter().map(|c| c.documents.len()).collect()
    }

    fn next_response(&self) -> MockResponse {
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.lock().clone())
    }
}

#[async_trait]
impl BulkIndexer for MockIndexer {
    async fn push_bulk(
        &self,
        base_url: &str,
        index: &str,
        documents: &[Document],
    ) -> Result<BulkOutcome, IndexError> {
        self.bulk_calls.lock().push(RecordedCall {
            base_url: base_url.to_string(),
            index: index.to_string(),
            documents: documents.to_vec(),
        });
        match self.next_response() {
            MockResponse::Succeed => Ok(BulkOutcome::all_succeeded(documents.len())),
            MockResponse::Reject(positions) => {
                let rejected = positions.iter().filter(|&&p| p < documents.len()).count();
                Ok(BulkOutcome::partial(
                    documents.len() - rejected,
                    positions,
                    format!("Bulk had {} failure(s)", rejected),
                ))
            }
            MockResponse::AcceptFirst(n) => Ok(BulkOutcome {
                succeeded: n.min(documents.len()),
                ..BulkOutcome::default()
            }),
            MockResponse::Fail(reason) => Err(IndexError::unreachable(base_url, reason)),
        }
    }

    async fn push_document(
        &self,
        base_url: &str,
        index: &str,
        document: &Document,
    ) -> Result<(), IndexError> {
        self.document_calls.lock().push(RecordedCall {
            base_url: base_url.to_string(),
            index: index.to_string(),
            documents: vec![document.clone()],
        });
        match self.next_response() {
            MockResponse::Succeed => Ok(()),
            MockResponse::AcceptFirst(n) if n > 0 => Ok(()),
            MockResponse::Reject(_) | MockResponse::AcceptFirst(_) => {
                Err(IndexError::rejected(index, "document rejected"))
            }
            MockResponse::Fail(reason) => Err(IndexError::unreachable(base_url, reason)),
        }
    }
}

/// Fixed item list with a switchable failure and in-scope flag.
#[derive(Debug)]
pub struct StaticSource<T> {
    data_source: DataSource,
    items: Mutex<Vec<T>>,
    failing: AtomicBool,
    in_scope: AtomicBool,
    fetches: AtomicUsize,
}

impl<T: Clone> StaticSource<T> {
    pub fn new(data_source: DataSource, items: Vec<T>) -> Self {
        Self {
            data_source,
            items: Mutex::new(items),
            failing: AtomicBool::new(false),
            in_scope: AtomicBool::new(true),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn set_items(&self, items: Vec<T>) {
        *self.items.lock() = items;
    }

    pub fn push_item(&self, item: T) {
        self.items.lock().push(item);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_in_scope(&self, in_scope: bool) {
        self.in_scope.store(in_scope, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> ArtifactSource<T> for StaticSource<T> {
    async fn fetch(&self) -> Result<Vec<T>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::unavailable(self.data_source, "source offline"));
        }
        Ok(self.items.lock().clone())
    }

    fn host_in_scope(&self, _url: &str) -> bool {
        self.in_scope.load(Ordering::SeqCst)
    }
}

/// Settings export backed by two editable JSON strings.
#[derive(Debug)]
pub struct StaticSettings {
    project: Mutex<String>,
    user: Mutex<String>,
    failing: AtomicBool,
}

impl StaticSettings {
    pub fn new(project: &str, user: &str) -> Self {
        Self {
            project: Mutex::new(project.to_string()),
            user: Mutex::new(user.to_string()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set(&self, part: SettingsPart, json: &str) {
        let slot = match part {
            SettingsPart::Project => &self.project,
            SettingsPart::User => &self.user,
        };
        *slot.lock() = json.to_string();
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl SettingsSource for StaticSettings {
    async fn project_id(&self) -> Result<String, SourceError> {
        Ok("test-project".to_string())
    }

    async fn export_settings(&self, part: SettingsPart) -> Result<String, SourceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::unavailable(DataSource::Settings, "settings export failed"));
        }
        Ok(match part {
            SettingsPart::Project => self.project.lock().clone(),
            SettingsPart::User => self.user.lock().clone(),
        })
    }
}
