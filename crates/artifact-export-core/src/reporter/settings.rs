// Settings reporter
//
// Exports the enabled settings parts as a single document. The combined
// export is hashed; an incremental cycle whose hash matches the last
// successful push sends nothing.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use artifact_export_config::{DataSource, SettingsPart};

use crate::document::document_meta;
use crate::index::IndexKind;
use crate::source::SettingsSource;

use super::{CycleOutcome, CycleResult, CycleSummary, Reporter, ReporterDeps, RunMode, SkipReason};

const PARTS: [SettingsPart; 2] = [SettingsPart::Project, SettingsPart::User];
const PUSH_FAILED: &str = "Settings index push failed";

pub struct SettingsReporter {
    source: Arc<dyn SettingsSource>,
    deps: ReporterDeps,
    last_pushed: Option<blake3::Hash>,
}

impl SettingsReporter {
    pub fn new(source: Arc<dyn SettingsSource>, deps: ReporterDeps) -> Self {
        Self {
            source,
            deps,
            last_pushed: None,
        }
    }
}

/// Parsed JSON when the export is valid, otherwise the raw text.
fn settings_value(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

#[async_trait]
impl Reporter for SettingsReporter {
    fn name(&self) -> &'static str {
        DataSource::Settings.as_str()
    }

    async fn run_cycle(&mut self, mode: RunMode) -> CycleResult {
        let base_url = match self.deps.switches.preflight(DataSource::Settings) {
            Ok(base_url) => base_url,
            Err(reason) => return Ok(CycleOutcome::Skipped(reason)),
        };
        let enabled = self.deps.switches.settings_parts();
        let parts: Vec<SettingsPart> = PARTS.into_iter().filter(|p| enabled.contains(p)).collect();
        if parts.is_empty() {
            return Ok(CycleOutcome::Skipped(SkipReason::SourceNotSelected));
        }

        let mut exported = Vec::with_capacity(parts.len());
        for part in parts {
            exported.push((part, self.source.export_settings(part).await?));
        }
        let combined = exported
            .iter()
            .map(|(_, raw)| raw.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let hash = blake3::hash(combined.as_bytes());
        if mode == RunMode::Incremental && self.last_pushed == Some(hash) {
            return Ok(CycleOutcome::Skipped(SkipReason::Unchanged));
        }

        let mut document = Map::new();
        document.insert(
            "project_id".to_string(),
            Value::String(self.source.project_id().await?),
        );
        for (part, raw) in exported {
            document.insert(format!("settings_{}", part), settings_value(raw));
        }
        document.insert("document_meta".to_string(), document_meta());
        let document = Value::Object(document);

        let kind = IndexKind::Settings;
        let index = self.deps.naming.index_name(kind);
        let stats = &self.deps.stats;
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
        match result {
            Ok(()) => {
                stats.record_success(kind, 1);
                self.last_pushed = Some(hash);
                summary.succeeded = 1;
            }
            Err(e) => {
                debug!(index = %index, error = %e, "Settings push failed");
                stats.record_failure(kind, 1);
                stats.record_last_error(kind, PUSH_FAILED);
                summary.failed = 1;
            }
        }
        Ok(CycleOutcome::Completed(summary))
    }
}
