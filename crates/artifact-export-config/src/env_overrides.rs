use super::{DataSource, LogFormat, RuntimeConfig, ScopeKind, SettingsPart};
use anyhow::{anyhow, Context, Result};
use std::str::FromStr;

pub const ENV_PREFIX: &str = "ARTIFACT_EXPORT_";

/// Abstraction over environment-variable lookups so callers (and tests) can
/// supply their own source of overrides.
pub trait EnvSource {
    /// Get a variable by its name without the ARTIFACT_EXPORT_ prefix.
    fn get(&self, key: &str) -> Option<String>;
}

/// Apply environment-variable overrides (highest priority) to the runtime config.
pub fn apply_env_overrides<E: EnvSource>(config: &mut RuntimeConfig, env: &E) -> Result<()> {
    // Index destination; an empty value clears the base URL
    if let Some(url) = get_env_string(env, "INDEX_BASE_URL")? {
        let url = url.trim().to_string();
        config.index.base_url = if url.is_empty() { None } else { Some(url) };
    }
    if let Some(prefix) = get_env_string(env, "INDEX_PREFIX")? {
        config.index.prefix = prefix;
    }

    // Batch configuration
    if let Some(val) = get_env_usize(env, "BATCH_MAX_DOCS")? {
        config.batch.max_docs = val;
    }
    if let Some(val) = get_env_u64(env, "BATCH_MAX_BYTES")? {
        config.batch.max_bytes = val;
    }

    // Reporter scheduling
    if let Some(val) = get_env_u64(env, "REPORTER_INTERVAL_SECS")? {
        config.reporters.interval_secs = val;
    }
    if let Some(val) = get_env_bool(env, "TOOL_STATS_ENABLED")? {
        config.reporters.tool_stats_enabled = val;
    }

    // Retry queue
    if let Some(val) = get_env_usize(env, "RETRY_QUEUE_CAPACITY")? {
        config.retry.queue_capacity = val;
    }
    if let Some(val) = get_env_u64(env, "RETRY_DRAIN_INTERVAL_SECS")? {
        config.retry.drain_interval_secs = val;
    }
    if let Some(val) = get_env_usize(env, "RETRY_DRAIN_BATCH_SIZE")? {
        config.retry.drain_batch_size = val;
    }

    // Scope and sources
    if let Some(scope) = get_env_string(env, "SCOPE")? {
        config.scope.kind = scope
            .parse::<ScopeKind>()
            .context("Invalid ARTIFACT_EXPORT_SCOPE value")?;
    }
    if let Some(selected) = get_env_list::<_, DataSource>(env, "SOURCES")? {
        config.sources.selected = selected;
    }
    if let Some(parts) = get_env_list::<_, SettingsPart>(env, "SETTINGS_PARTS")? {
        config.sources.settings_parts = parts;
    }

    // Logging
    if let Some(level) = get_env_string(env, "LOG_LEVEL")? {
        config.log.level = level;
    }
    if let Some(format) = get_env_string(env, "LOG_FORMAT")? {
        config.log.format = match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };
    }
    if let Some(val) = get_env_bool(env, "LOG_FORWARD")? {
        config.log.forward_to_index = val;
    }
    if let Some(level) = get_env_string(env, "LOG_FORWARD_LEVEL")? {
        config.log.forward_level = level;
    }

    Ok(())
}

fn get_env_string<E: EnvSource>(env: &E, key: &str) -> Result<Option<String>> {
    Ok(env.get(key))
}

fn get_env_usize<E: EnvSource>(env: &E, key: &str) -> Result<Option<usize>> {
    match get_env_string(env, key)? {
        Some(val) => {
            let parsed = val
                .trim()
                .parse::<usize>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_u64<E: EnvSource>(env: &E, key: &str) -> Result<Option<u64>> {
    match get_env_string(env, key)? {
        Some(val) => {
            let parsed = val
                .trim()
                .parse::<u64>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_bool<E: EnvSource>(env: &E, key: &str) -> Result<Option<bool>> {
    match get_env_string(env, key)? {
        Some(val) => {
            let parsed = val.trim().parse::<bool>().map_err(|e| {
                anyhow!(
                    "Failed to parse {}{} (expected bool): {}",
                    ENV_PREFIX,
                    key,
                    e
                )
            })?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Comma-separated list; blank items are ignored.
fn get_env_list<E, T>(env: &E, key: &str) -> Result<Option<Vec<T>>>
where
    E: EnvSource,
    T: FromStr<Err = anyhow::Error>,
{
    match get_env_string(env, key)? {
        Some(val) => {
            let parsed = val
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| item.parse::<T>())
                .collect::<Result<Vec<_>>>()
                .with_context(|| format!("Failed to parse {}{}", ENV_PREFIX, key))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_env::MapEnv;

    #[test]
    fn test_numeric_and_bool_overrides() {
        let env = MapEnv::default()
            .with("BATCH_MAX_DOCS", "25")
            .with("BATCH_MAX_BYTES", "2048")
            .with("REPORTER_INTERVAL_SECS", "60")
            .with("TOOL_STATS_ENABLED", "false")
            .with("RETRY_QUEUE_CAPACITY", "500")
            .with("RETRY_DRAIN_INTERVAL_SECS", "2")
            .with("RETRY_DRAIN_BATCH_SIZE", " 10 ");
        let mut config = RuntimeConfig::default();
        apply_env_overrides(&mut config, &env).unwrap();

        assert_eq!(config.batch.max_docs, 25);
        assert_eq!(config.batch.max_bytes, 2048);
        assert_eq!(config.reporters.interval_secs, 60);
        assert!(!config.reporters.tool_stats_enabled);
        assert_eq!(config.retry.queue_capacity, 500);
        assert_eq!(config.retry.drain_interval_secs, 2);
        assert_eq!(config.retry.drain_batch_size, 10);
    }

    #[test]
    fn test_invalid_number_names_variable() {
        let env = MapEnv::default().with("BATCH_MAX_DOCS", "lots");
        let mut config = RuntimeConfig::default();
        let err = apply_env_overrides(&mut config, &env).unwrap_err();
        assert!(err.to_string().contains("ARTIFACT_EXPORT_BATCH_MAX_DOCS"));
    }

    #[test]
    fn test_empty_base_url_clears_destination() {
        let mut config = RuntimeConfig::default();
        config.index.base_url = Some("http://old:9200".to_string());
        apply_env_overrides(&mut config, &MapEnv::default().with("INDEX_BASE_URL", " ")).unwrap();
        assert!(config.index.base_url.is_none());
    }

    #[test]
    fn test_list_overrides() {
        let env = MapEnv::default()
            .with("SOURCES", "findings, sitemap,,traffic")
            .with("SETTINGS_PARTS", "user")
            .with("SCOPE", "burp");
        let mut config = RuntimeConfig::default();
        apply_env_overrides(&mut config, &env).unwrap();

        assert_eq!(
            config.sources.selected,
            vec![DataSource::Findings, DataSource::Sitemap, DataSource::Traffic]
        );
        assert_eq!(config.sources.settings_parts, vec![SettingsPart::User]);
        assert_eq!(config.scope.kind, ScopeKind::Burp);
    }

    #[test]
    fn test_invalid_list_item_is_error() {
        let env = MapEnv::default().with("SOURCES", "findings,intruder");
        let mut config = RuntimeConfig::default();
        let err = apply_env_overrides(&mut config, &env).unwrap_err();
        assert!(err.to_string().contains("ARTIFACT_EXPORT_SOURCES"));
    }

    #[test]
    fn test_log_overrides() {
        let env = MapEnv::default()
            .with("LOG_LEVEL", "debug")
            .with("LOG_FORMAT", "JSON")
            .with("LOG_FORWARD", "true")
            .with("LOG_FORWARD_LEVEL", "warn");
        let mut config = RuntimeConfig::default();
        apply_env_overrides(&mut config, &env).unwrap();

        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, LogFormat::Json);
        assert!(config.log.forward_to_index);
        assert_eq!(config.log.forward_level, "warn");
    }
}
