// Documents and content-derived keys
//
// Documents are plain JSON trees; keys are blake3 digests of the item's
// identifying fields so identical items collapse to one key per session.

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use std::fmt;

/// A JSON document as sent to the index.
pub type Document = Value;

pub const SCHEMA_VERSION: &str = "1";
pub const EXTENSION_VERSION: &str = env!("CARGO_PKG_VERSION");

const FIELD_SEPARATOR: &[u8] = b"|";

/// Stable identifier for a logical item, derived from its identifying fields.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PushKey(blake3::Hash);

impl PushKey {
    /// Hash of the fields joined with `|`.
    pub fn from_fields(fields: &[&str]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                hasher.update(FIELD_SEPARATOR);
            }
            hasher.update(field.as_bytes());
        }
        Self(hasher.finalize())
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }
}

impl fmt::Display for PushKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_hex())
    }
}

impl fmt::Debug for PushKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PushKey({})", &self.0.to_hex()[..16])
    }
}

/// `document_meta` block attached to every exported document.
pub fn document_meta() -> Value {
    json!({
        "schema_version": SCHEMA_VERSION,
        "extension_version": EXTENSION_VERSION,
        "indexed_at": now_rfc3339(),
    })
}

pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_fields_hash_identically() {
        let a = PushKey::from_fields(&["https://a.test/", "GET"]);
        let b = PushKey::from_fields(&["https://a.test/", "GET"]);
        assert_eq!(a, b);
        assert_eq!(a.to_hex(), b.to_string());
        assert_eq!(a.to_hex().len(), 64);
    }

    #[test]
    fn separator_distinguishes_field_boundaries() {
        let joined = PushKey::from_fields(&["ab", "c"]);
        let shifted = PushKey::from_fields(&["a", "bc"]);
        assert_ne!(joined, shifted);
        assert_eq!(
            PushKey::from_fields(&["a", "b"]),
            PushKey(blake3::hash(b"a|b"))
        );
    }

    #[test]
    fn document_meta_has_versions() {
        let meta = document_meta();
        assert_eq!(meta["schema_version"], SCHEMA_VERSION);
        assert_eq!(meta["extension_version"], EXTENSION_VERSION);
        assert!(meta["indexed_at"].as_str().unwrap().ends_with('Z'));
    }
}
