// Export scope filtering

use artifact_export_config::{EntryKind, ScopeConfig, ScopeKind};
use regex::{Regex, RegexBuilder};
use tracing::{debug, trace};

#[derive(Debug)]
enum Matcher {
    Contains(String),
    Pattern(Regex),
}

impl Matcher {
    fn matches(&self, target: &str) -> bool {
        match self {
            Matcher::Contains(value) => target.to_lowercase().contains(value.as_str()),
            Matcher::Pattern(regex) => regex.is_match(target),
        }
    }
}

/// Decides whether an item's URL is eligible for export.
///
/// `All` exports everything and `Burp` defers to the host tool's in-scope
/// flag. `Custom` tests the configured entries against the URL host (the
/// full URL when no host parses); string entries use substring containment,
/// regex entries an unanchored search. Matching ignores case; parsed hosts
/// are already lowercased (and IDNs punycoded) by `url`. Blank entries and
/// invalid patterns are skipped at construction.
#[derive(Debug)]
pub struct ScopeFilter {
    kind: ScopeKind,
    matchers: Vec<Matcher>,
}

impl ScopeFilter {
    pub fn new(config: &ScopeConfig) -> Self {
        let matchers = config
            .custom
            .iter()
            .filter(|entry| !entry.value.trim().is_empty())
            .filter_map(|entry| match entry.kind {
                EntryKind::String => Some(Matcher::Contains(entry.value.to_lowercase())),
                EntryKind::Regex => match RegexBuilder::new(&entry.value)
                    .case_insensitive(true)
                    .build()
                {
                    Ok(regex) => Some(Matcher::Pattern(regex)),
                    Err(e) => {
                        debug!(pattern = %entry.value, error = %e, "Skipping invalid scope regex");
                        None
                    }
                },
            })
            .collect();

        Self {
            kind: config.kind,
            matchers,
        }
    }

    pub fn all() -> Self {
        Self {
            kind: ScopeKind::All,
            matchers: Vec::new(),
        }
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    pub fn should_export(&self, url: &str, host_in_scope: bool) -> bool {
        let result = match self.kind {
            ScopeKind::All => true,
            ScopeKind::Burp => host_in_scope,
            ScopeKind::Custom => self.matches_custom(url),
        };
        trace!(scope = %self.kind, url = truncate_for_log(url, 80), result, "Scope decision");
        result
    }

    fn matches_custom(&self, url: &str) -> bool {
        if self.matchers.is_empty() {
            return false;
        }
        let host = host_from_url(url);
        let target = host.as_deref().unwrap_or(url);
        self.matchers.iter().any(|matcher| matcher.matches(target))
    }
}

impl Default for ScopeFilter {
    fn default() -> Self {
        Self::all()
    }
}

fn host_from_url(url: &str) -> Option<String> {
    if url.trim().is_empty() {
        return None;
    }
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
}

fn truncate_for_log(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
