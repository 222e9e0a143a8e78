// artifact-export-core - Ingestion pipeline for security-testing artifacts
//
// Source reporters read artifacts from the host tool, turn them into JSON
// documents and ship them to a search index through a `BulkIndexer`. This
// crate owns everything between the source and the indexer: content keys
// and dedup, scope filtering, bulk batching, single-flight scheduling, the
// retry queue and per-index health stats. The HTTP client and the host tool
// itself stay behind traits.

pub mod artifacts;
pub mod dedup;
pub mod document;
pub mod error;
pub mod index;
pub mod indexer;
pub mod log_forwarder;
pub mod reporter;
pub mod retry;
pub mod scope;
pub mod source;
pub mod stats;
pub mod switches;
pub mod traffic;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use artifacts::{Artifact, Finding, SitemapEntry, TrafficRecord};
pub use dedup::DedupSet;
pub use document::{document_meta, Document, PushKey, EXTENSION_VERSION, SCHEMA_VERSION};
pub use error::{ExportError, IndexError, SourceError};
pub use index::{IndexKind, IndexNaming};
pub use indexer::{BulkIndexer, BulkOutcome};
pub use log_forwarder::{ForwarderHandle, LogBuffer, LogForwarder, ToolLogLayer};
pub use reporter::{
    ConfigSnapshotReporter, CycleOutcome, CycleResult, CycleSummary, FindingsReporter,
    ProxyHistoryReporter, Reporter, ReporterDeps, ReporterHandle, RunMode, SettingsReporter,
    SitemapReporter, SkipReason, ToolStatsReporter,
};
pub use retry::{DrainSummary, RetryCoordinator, RetryQueue, RetrySettings};
pub use scope::ScopeFilter;
pub use source::{ArtifactSource, SettingsSource};
pub use stats::{ExportStats, IndexSnapshot, StatsSnapshot};
pub use switches::ExportSwitches;
pub use traffic::{TrafficOutcome, TrafficSink};
