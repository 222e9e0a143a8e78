// artifact-export-config - Runtime configuration for the exporter
//
// Supports configuration from multiple sources:
// 1. Environment variables (highest priority)
// 2. Config file path from ARTIFACT_EXPORT_CONFIG env var
// 3. Config file contents from ARTIFACT_EXPORT_CONFIG_CONTENT env var
// 4. Default config file location (./artifact-export.toml)
// 5. Built-in defaults (lowest priority)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

mod env_overrides;
mod sources;
mod validation;

pub use env_overrides::{EnvSource, ENV_PREFIX};
pub use sources::{load_config, load_from_file_path, load_or_default, StdEnvSource};

pub const DEFAULT_INDEX_PREFIX: &str = "attackframework-tool-burp";

/// Main runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub reporters: ReporterConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub scope: ScopeConfig,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub log: LogConfig,
}

/// Destination index settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Search cluster URL; exporting is skipped while unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub prefix: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            prefix: DEFAULT_INDEX_PREFIX.to_string(),
        }
    }
}

/// Bulk request thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub max_docs: usize,
    pub max_bytes: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_docs: 100,
            max_bytes: 5 * 1024 * 1024,
        }
    }
}

/// Periodic reporter scheduling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    pub interval_secs: u64,
    pub tool_stats_enabled: bool,
}

impl ReporterConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            tool_stats_enabled: true,
        }
    }
}

/// Retry queue sizing and drain cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub queue_capacity: usize,
    pub drain_interval_secs: u64,
    pub drain_batch_size: usize,
}

impl RetryConfig {
    pub fn drain_interval(&self) -> Duration {
        Duration::from_secs(self.drain_interval_secs)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            drain_interval_secs: 5,
            drain_batch_size: 100,
        }
    }
}

/// Which URLs are eligible for export
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    pub kind: ScopeKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub custom: Vec<ScopeEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    /// Every URL is exported.
    #[default]
    All,
    /// Defer to the host tool's own target scope.
    Burp,
    /// Match against the `custom` entries.
    Custom,
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKind::All => write!(f, "all"),
            ScopeKind::Burp => write!(f, "burp"),
            ScopeKind::Custom => write!(f, "custom"),
        }
    }
}

impl FromStr for ScopeKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(ScopeKind::All),
            "burp" => Ok(ScopeKind::Burp),
            "custom" => Ok(ScopeKind::Custom),
            _ => anyhow::bail!("Unsupported scope: {}. Supported: all, burp, custom", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeEntry {
    pub kind: EntryKind,
    pub value: String,
}

impl ScopeEntry {
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::String,
            value: value.into(),
        }
    }

    pub fn regex(value: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Regex,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    String,
    Regex,
}

/// Artifact families the user chose to export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub selected: Vec<DataSource>,
    pub settings_parts: Vec<SettingsPart>,
}

impl SourcesConfig {
    pub fn is_selected(&self, source: DataSource) -> bool {
        self.selected.contains(&source)
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            selected: DataSource::ALL.to_vec(),
            settings_parts: vec![SettingsPart::Project, SettingsPart::User],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Settings,
    Sitemap,
    Findings,
    ProxyHistory,
    Traffic,
}

impl DataSource {
    pub const ALL: [DataSource; 5] = [
        DataSource::Settings,
        DataSource::Sitemap,
        DataSource::Findings,
        DataSource::ProxyHistory,
        DataSource::Traffic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Settings => "settings",
            DataSource::Sitemap => "sitemap",
            DataSource::Findings => "findings",
            DataSource::ProxyHistory => "proxy_history",
            DataSource::Traffic => "traffic",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "settings" => Ok(DataSource::Settings),
            "sitemap" => Ok(DataSource::Sitemap),
            "findings" | "issues" => Ok(DataSource::Findings),
            "proxy_history" | "proxyhistory" => Ok(DataSource::ProxyHistory),
            "traffic" => Ok(DataSource::Traffic),
            _ => anyhow::bail!(
                "Unsupported data source: {}. Supported: settings, sitemap, findings, proxy_history, traffic",
                s
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingsPart {
    Project,
    User,
}

impl fmt::Display for SettingsPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsPart::Project => write!(f, "project"),
            SettingsPart::User => write!(f, "user"),
        }
    }
}

impl FromStr for SettingsPart {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "project" => Ok(SettingsPart::Project),
            "user" => Ok(SettingsPart::User),
            _ => anyhow::bail!("Unsupported settings part: {}. Supported: project, user", s),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
    /// Mirror log events into the tool index.
    pub forward_to_index: bool,
    pub forward_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            forward_to_index: false,
            forward_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl RuntimeConfig {
    /// Load configuration from all sources with priority
    pub fn load() -> Result<Self> {
        sources::load_config()
    }

    /// Parse inline TOML, then apply overrides from `env` and validate.
    /// Useful where neither files nor the process environment should be consulted.
    pub fn load_with_env<E: EnvSource>(inline_config: Option<&str>, env: &E) -> Result<Self> {
        let mut config = match inline_config {
            Some(inline) => Self::from_toml(inline).context("Failed to parse inline config content")?,
            None => RuntimeConfig::default(),
        };

        config.apply_env_overrides_from(env)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment overrides from a custom source.
    pub fn apply_env_overrides_from<E: EnvSource>(&mut self, env: &E) -> Result<()> {
        env_overrides::apply_env_overrides(self, env)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

#[cfg(test)]
pub(crate) mod test_env {
    use super::EnvSource;
    use std::collections::HashMap;

    /// In-memory environment keyed by the unprefixed variable name.
    #[derive(Default)]
    pub struct MapEnv(pub HashMap<String, String>);

    impl MapEnv {
        pub fn with(mut self, key: &str, value: &str) -> Self {
            self.0.insert(key.to_string(), value.to_string());
            self
        }
    }

    impl EnvSource for MapEnv {
        fn get(&self, key: &str) -> Option<String> {
            self.0.get(key).cloned()
        }
    }
}
