// Index naming
//
// Every artifact family lands in `<prefix>-<kind>`; the tool index (logs and
// stats snapshots) is the bare prefix.

use artifact_export_config::{DataSource, DEFAULT_INDEX_PREFIX};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Traffic,
    Tool,
    Settings,
    Sitemap,
    Findings,
}

impl IndexKind {
    pub const ALL: [IndexKind; 5] = [
        IndexKind::Traffic,
        IndexKind::Tool,
        IndexKind::Settings,
        IndexKind::Sitemap,
        IndexKind::Findings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Traffic => "traffic",
            IndexKind::Tool => "tool",
            IndexKind::Settings => "settings",
            IndexKind::Sitemap => "sitemap",
            IndexKind::Findings => "findings",
        }
    }

    /// Index that receives documents from `source`. Proxy history shares the traffic index.
    pub fn for_source(source: DataSource) -> Self {
        match source {
            DataSource::Settings => IndexKind::Settings,
            DataSource::Sitemap => IndexKind::Sitemap,
            DataSource::Findings => IndexKind::Findings,
            DataSource::ProxyHistory | DataSource::Traffic => IndexKind::Traffic,
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexNaming {
    prefix: String,
}

impl IndexNaming {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn index_name(&self, kind: IndexKind) -> String {
        match kind {
            IndexKind::Tool => self.prefix.clone(),
            other => format!("{}-{}", self.prefix, other),
        }
    }

    pub fn kind_for(&self, index_name: &str) -> Option<IndexKind> {
        IndexKind::ALL
            .into_iter()
            .find(|kind| self.index_name(*kind) == index_name)
    }

    /// Distinct index names for the selected sources, always ending with the tool index.
    pub fn index_names(&self, selected: &[DataSource]) -> Vec<String> {
        let mut names: Vec<String> = Vec::with_capacity(selected.len() + 1);
        for source in selected {
            let name = self.index_name(IndexKind::for_source(*source));
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names.push(self.index_name(IndexKind::Tool));
        names
    }
}

impl Default for IndexNaming {
    fn default() -> Self {
        Self::new(DEFAULT_INDEX_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_use_prefix() {
        let naming = IndexNaming::default();
        assert_eq!(
            naming.index_name(IndexKind::Findings),
            "attackframework-tool-burp-findings"
        );
        assert_eq!(naming.index_name(IndexKind::Tool), "attackframework-tool-burp");
    }

    #[test]
    fn kind_for_reverses_index_name() {
        let naming = IndexNaming::new("acme");
        for kind in IndexKind::ALL {
            assert_eq!(naming.kind_for(&naming.index_name(kind)), Some(kind));
        }
        assert_eq!(naming.kind_for("acme-unknown"), None);
    }

    #[test]
    fn index_names_dedupe_and_append_tool() {
        let naming = IndexNaming::new("p");
        let names = naming.index_names(&[
            DataSource::Traffic,
            DataSource::Findings,
            DataSource::ProxyHistory,
        ]);
        assert_eq!(names, vec!["p-traffic", "p-findings", "p"]);
    }
}
