// Configuration source loading
//
// Priority order:
// 1. Environment variables (ARTIFACT_EXPORT_* prefix)
// 2. Config file path from ARTIFACT_EXPORT_CONFIG
// 3. Inline config content from ARTIFACT_EXPORT_CONFIG_CONTENT
// 4. Default config file (./artifact-export.toml)
// 5. Built-in defaults

use crate::env_overrides::{self, EnvSource, ENV_PREFIX};
use crate::RuntimeConfig;
use anyhow::{Context, Result};
use std::env;
use std::path::Path;

const DEFAULT_CONFIG_PATHS: &[&str] = &["./artifact-export.toml"];

/// Load configuration using the process environment and default file locations.
pub fn load_config() -> Result<RuntimeConfig> {
    load_with(&StdEnvSource, DEFAULT_CONFIG_PATHS)
}

fn load_with<E: EnvSource>(env: &E, default_paths: &[&str]) -> Result<RuntimeConfig> {
    let mut config = load_from_file(env, default_paths)?.unwrap_or_default();
    env_overrides::apply_env_overrides(&mut config, env)?;
    config.validate()?;
    Ok(config)
}

fn load_from_file<E: EnvSource>(env: &E, default_paths: &[&str]) -> Result<Option<RuntimeConfig>> {
    if let Some(path) = env.get("CONFIG") {
        return read_file(Path::new(&path)).map(Some);
    }

    if let Some(content) = env.get("CONFIG_CONTENT") {
        let config = RuntimeConfig::from_toml(&content)
            .context("Failed to parse inline config from ARTIFACT_EXPORT_CONFIG_CONTENT")?;
        return Ok(Some(config));
    }

    for path in default_paths {
        let path = Path::new(path);
        if path.exists() {
            return read_file(path).map(Some);
        }
    }

    Ok(None)
}

fn read_file(path: &Path) -> Result<RuntimeConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    RuntimeConfig::from_toml(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Load configuration from a specific file path.
/// Returns error if file doesn't exist or can't be parsed.
/// Environment overrides still apply on top of the file.
pub fn load_from_file_path(path: impl AsRef<Path>) -> Result<RuntimeConfig> {
    let mut config = read_file(path.as_ref())?;
    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration with graceful fallback to defaults when no file is
/// found or a file fails to parse.
pub fn load_or_default() -> Result<RuntimeConfig> {
    let env = StdEnvSource;
    let mut config = match load_from_file(&env, DEFAULT_CONFIG_PATHS) {
        Ok(Some(file_config)) => file_config,
        Ok(None) => RuntimeConfig::default(),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring unreadable config file; using defaults");
            RuntimeConfig::default()
        }
    };

    env_overrides::apply_env_overrides(&mut config, &env)?;
    config.validate()?;
    Ok(config)
}

/// Reads `ARTIFACT_EXPORT_*` variables from the process environment.
pub struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }
}
