//! Error types for the export pipeline

use artifact_export_config::DataSource;
use thiserror::Error;

/// Failure reported by a bulk or single-document index request.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The cluster could not be reached at all
    #[error("Search cluster unreachable at '{base_url}': {reason}")]
    Unreachable { base_url: String, reason: String },

    /// The request reached the cluster but was refused
    #[error("Index request to '{index}' rejected: {reason}")]
    Rejected { index: String, reason: String },
}

impl IndexError {
    pub fn unreachable(base_url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unreachable {
            base_url: base_url.into(),
            reason: reason.into(),
        }
    }

    pub fn rejected(index: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            index: index.into(),
            reason: reason.into(),
        }
    }
}

/// Failure while reading artifacts from the host tool.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to read {data_source}: {reason}")]
    Unavailable {
        data_source: DataSource,
        reason: String,
    },
}

impl SourceError {
    pub fn unavailable(data_source: DataSource, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            data_source,
            reason: reason.into(),
        }
    }
}

/// Errors that abort a reporter cycle or prevent a worker from starting.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Failed to start worker '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl ExportError {
    pub fn spawn(name: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            name: name.into(),
            source,
        }
    }
}
