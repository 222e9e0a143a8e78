// Host tool boundary: where artifacts come from

use artifact_export_config::SettingsPart;
use async_trait::async_trait;

use crate::error::SourceError;

/// Supplies the current items of one artifact family.
#[async_trait]
pub trait ArtifactSource<T>: Send + Sync {
    /// Every item currently known to the host tool, in its order.
    async fn fetch(&self) -> Result<Vec<T>, SourceError>;

    /// Whether the host tool's own target scope includes `url`.
    fn host_in_scope(&self, url: &str) -> bool;
}

/// Supplies the host tool's exported settings.
#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn project_id(&self) -> Result<String, SourceError>;

    /// Raw JSON export of one settings part.
    async fn export_settings(&self, part: SettingsPart) -> Result<String, SourceError>;
}
