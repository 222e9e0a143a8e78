// Logging/tracing setup

use artifact_export_config::{LogConfig, LogFormat};
use artifact_export_core::ToolLogLayer;
use tracing::Level;

/// Minimum level mirrored into the tool index, `INFO` when unparseable.
pub fn forward_level(config: &LogConfig) -> Level {
    config.forward_level.parse().unwrap_or(Level::INFO)
}

/// Initialize tracing/logging from LogConfig
///
/// `forward` adds the tool-index forwarding layer. The level filter applies
/// to every layer, so forwarding never sees events below `log.level`.
pub fn init_tracing(config: &LogConfig, forward: Option<ToolLogLayer>) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // Parse log level from config
    let env_filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter).with(forward);

    // Try to set the global subscriber; ignore error if already set (idempotent)
    let _ = match config.format {
        LogFormat::Json => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().json()))
        }
        LogFormat::Text => tracing::subscriber::set_global_default(registry.with(fmt::layer())),
    };
}
