// Exported artifact types and their document builders

use artifact_export_config::DataSource;
use serde_json::{json, Map, Value};

use crate::document::{document_meta, Document, PushKey};
use crate::index::IndexKind;

/// An item that can be exported as one document.
pub trait Artifact: Send + Sync + 'static {
    const SOURCE: DataSource;

    /// URL checked against the export scope.
    fn url(&self) -> &str;

    /// Content key used for dedup within a session.
    fn push_key(&self) -> PushKey;

    /// Deterministic document for this item; `None` skips it.
    fn to_document(&self) -> Option<Document>;

    fn index_kind() -> IndexKind {
        IndexKind::for_source(Self::SOURCE)
    }
}

/// One crawled request in the site map.
#[derive(Debug, Clone, PartialEq)]
pub struct SitemapEntry {
    pub url: String,
    pub method: String,
    pub status_code: Option<u16>,
    pub mime_type: Option<String>,
    pub title: Option<String>,
}

impl SitemapEntry {
    pub fn new(url: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            status_code: None,
            mime_type: None,
            title: None,
        }
    }
}

impl Artifact for SitemapEntry {
    const SOURCE: DataSource = DataSource::Sitemap;

    fn url(&self) -> &str {
        &self.url
    }

    fn push_key(&self) -> PushKey {
        PushKey::from_fields(&[self.url.as_str(), self.method.as_str()])
    }

    fn to_document(&self) -> Option<Document> {
        Some(json!({
            "url": self.url,
            "method": self.method,
            "status_code": self.status_code,
            "mime_type": self.mime_type,
            "title": self.title,
            "document_meta": document_meta(),
        }))
    }
}

/// A scanner finding (audit issue).
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub name: String,
    pub severity: String,
    pub confidence: String,
    pub base_url: String,
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub detail: String,
    pub remediation: String,
    /// Request/response evidence, already rendered by the host tool.
    pub evidence: Vec<Value>,
}

impl Artifact for Finding {
    const SOURCE: DataSource = DataSource::Findings;

    fn url(&self) -> &str {
        &self.base_url
    }

    fn push_key(&self) -> PushKey {
        let port = self.port.to_string();
        PushKey::from_fields(&[
            self.name.as_str(),
            self.base_url.as_str(),
            self.host.as_str(),
            port.as_str(),
            self.severity.as_str(),
            self.detail.as_str(),
        ])
    }

    fn to_document(&self) -> Option<Document> {
        Some(json!({
            "name": self.name,
            "severity": self.severity,
            "confidence": self.confidence,
            "host": self.host,
            "port": self.port,
            "protocol_transport": if self.secure { "https" } else { "http" },
            "url": self.base_url,
            "description": self.detail,
            "remediation_detail": self.remediation,
            "request_responses_missing": self.evidence.is_empty(),
            "request_responses": self.evidence,
            "document_meta": document_meta(),
        }))
    }
}

/// One proxied request/response pair.
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficRecord {
    /// Host tool's sequence number for the message.
    pub id: u64,
    pub url: String,
    pub method: String,
    pub host: String,
    pub port: u16,
    pub secure: bool,
    /// Originating tool (proxy, repeater, ...).
    pub tool: String,
    pub status: Option<u16>,
    pub request: Value,
    pub response: Option<Value>,
    pub annotations: Map<String, Value>,
}

impl TrafficRecord {
    pub fn new(id: u64, url: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            method: method.into(),
            host: String::new(),
            port: 0,
            secure: false,
            tool: "proxy".to_string(),
            status: None,
            request: Value::Null,
            response: None,
            annotations: Map::new(),
        }
    }
}

impl Artifact for TrafficRecord {
    const SOURCE: DataSource = DataSource::Traffic;

    fn url(&self) -> &str {
        &self.url
    }

    fn push_key(&self) -> PushKey {
        let id = self.id.to_string();
        PushKey::from_fields(&[id.as_str(), self.url.as_str(), self.method.as_str()])
    }

    fn to_document(&self) -> Option<Document> {
        Some(json!({
            "url": self.url,
            "method": self.method,
            "host": self.host,
            "port": self.port,
            "protocol_transport": if self.secure { "https" } else { "http" },
            "tool": self.tool,
            "status": self.status,
            "request": self.request,
            "response": self.response,
            "annotations": self.annotations,
            "document_meta": document_meta(),
        }))
    }
}
