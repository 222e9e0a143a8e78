// Live export switches
//
// Run flag, destination, selected sources and scope. Reporters read these
// fresh at the start of every cycle, so changes apply on the next tick.

use artifact_export_config::{DataSource, RuntimeConfig, ScopeConfig, SettingsPart};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::reporter::SkipReason;
use crate::scope::ScopeFilter;

#[derive(Debug)]
struct SwitchState {
    base_url: Option<String>,
    selected: Vec<DataSource>,
    settings_parts: Vec<SettingsPart>,
    scope_config: ScopeConfig,
    scope: Arc<ScopeFilter>,
}

#[derive(Debug)]
pub struct ExportSwitches {
    running: AtomicBool,
    state: RwLock<SwitchState>,
}

impl ExportSwitches {
    /// Switches taken from `config`, with export stopped.
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            running: AtomicBool::new(false),
            state: RwLock::new(SwitchState {
                base_url: config.index.base_url.clone(),
                selected: config.sources.selected.clone(),
                settings_parts: config.sources.settings_parts.clone(),
                scope_config: config.scope.clone(),
                scope: Arc::new(ScopeFilter::new(&config.scope)),
            }),
        }
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn set_base_url(&self, base_url: Option<String>) {
        self.state.write().base_url = base_url;
    }

    /// Configured base URL, `None` when unset or blank.
    pub fn base_url(&self) -> Option<String> {
        self.state
            .read()
            .base_url
            .as_ref()
            .filter(|url| !url.trim().is_empty())
            .cloned()
    }

    pub fn set_selected(&self, selected: Vec<DataSource>) {
        self.state.write().selected = selected;
    }

    pub fn selected(&self) -> Vec<DataSource> {
        self.state.read().selected.clone()
    }

    pub fn is_selected(&self, source: DataSource) -> bool {
        self.state.read().selected.contains(&source)
    }

    pub fn set_settings_parts(&self, parts: Vec<SettingsPart>) {
        self.state.write().settings_parts = parts;
    }

    pub fn settings_parts(&self) -> Vec<SettingsPart> {
        self.state.read().settings_parts.clone()
    }

    pub fn set_scope(&self, scope: &ScopeConfig) {
        let mut state = self.state.write();
        state.scope = Arc::new(ScopeFilter::new(scope));
        state.scope_config = scope.clone();
    }

    /// Scope settings as configured, including entries the filter skipped.
    pub fn scope_config(&self) -> ScopeConfig {
        self.state.read().scope_config.clone()
    }

    pub fn scope(&self) -> Arc<ScopeFilter> {
        Arc::clone(&self.state.read().scope)
    }

    /// Base URL to export to, or why nothing should be exported right now.
    pub fn destination(&self) -> Result<String, SkipReason> {
        if !self.is_running() {
            return Err(SkipReason::ExportStopped);
        }
        self.base_url().ok_or(SkipReason::NoBaseUrl)
    }

    /// Like [`destination`](Self::destination), but also requires `source` to be selected.
    pub fn preflight(&self, source: DataSource) -> Result<String, SkipReason> {
        let base_url = self.destination()?;
        if !self.is_selected(source) {
            return Err(SkipReason::SourceNotSelected);
        }
        Ok(base_url)
    }
}
