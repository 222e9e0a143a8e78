// Configuration validation
//
// Validates that required fields are present and values are sensible

use crate::*;
use anyhow::{bail, Context, Result};
use tracing::warn;

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    validate_index_config(&config.index)?;
    validate_batch_config(&config.batch)?;
    validate_reporter_config(&config.reporters)?;
    validate_retry_config(&config.retry)?;
    validate_scope_config(&config.scope)?;

    Ok(())
}

fn validate_index_config(config: &IndexConfig) -> Result<()> {
    if config.prefix.trim().is_empty() {
        bail!("index.prefix must not be empty");
    }

    if let Some(ref base_url) = config.base_url {
        let parsed = url::Url::parse(base_url)
            .with_context(|| format!("index.base_url is not a valid URL: {}", base_url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!(
                "index.base_url must use http or https, got '{}'",
                parsed.scheme()
            );
        }
    }

    Ok(())
}

fn validate_batch_config(config: &BatchConfig) -> Result<()> {
    if config.max_docs == 0 {
        bail!("batch.max_docs must be greater than 0");
    }

    if config.max_bytes == 0 {
        bail!("batch.max_bytes must be greater than 0");
    }

    if config.max_docs > 10_000 {
        warn!(
            max_docs = config.max_docs,
            "batch.max_docs is very large; bulk requests may be rejected"
        );
    }

    if config.max_bytes > 100 * 1024 * 1024 {
        // 100 MB
        warn!(
            max_bytes = config.max_bytes,
            "batch.max_bytes is very large; bulk requests may be rejected"
        );
    }

    Ok(())
}

fn validate_reporter_config(config: &ReporterConfig) -> Result<()> {
    if config.interval_secs == 0 {
        bail!("reporters.interval_secs must be greater than 0");
    }

    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<()> {
    if config.queue_capacity == 0 {
        bail!("retry.queue_capacity must be greater than 0");
    }

    if config.drain_interval_secs == 0 {
        bail!("retry.drain_interval_secs must be greater than 0");
    }

    if config.drain_batch_size == 0 {
        bail!("retry.drain_batch_size must be greater than 0");
    }

    if config.queue_capacity > 1_000_000 {
        warn!(
            queue_capacity = config.queue_capacity,
            "retry.queue_capacity is very large; may cause memory issues"
        );
    }

    Ok(())
}

fn validate_scope_config(config: &ScopeConfig) -> Result<()> {
    for entry in &config.custom {
        if entry.kind == EntryKind::Regex {
            regex::Regex::new(&entry.value)
                .with_context(|| format!("scope.custom has an invalid regex: {}", entry.value))?;
        }
    }

    if config.kind == ScopeKind::Custom && config.custom.is_empty() {
        warn!("scope.kind is custom but no scope.custom entries are configured; nothing will be exported");
    }

    Ok(())
}
