//! Plugin-namespaced logger
//!
//! Every plugin gets a logger whose events carry the plugin id, so a
//! `RUST_LOG`-style filter and downstream collectors can attribute lines
//! without the plugin doing anything. Level filtering is whatever the
//! process subscriber is configured with.

use serde_json::Value;
use std::sync::Arc;

/// Logger handed to plugins through registration and call contexts
#[derive(Clone)]
pub struct PluginLogger {
    plugin_id: Arc<str>,
}

impl PluginLogger {
    pub fn new(plugin_id: &str) -> Self {
        Self {
            plugin_id: Arc::from(plugin_id),
        }
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn debug(&self, message: &str) {
        tracing::debug!(plugin = %self.plugin_id, "[{}] {}", self.plugin_id, message);
    }

    pub fn info(&self, message: &str) {
        tracing::info!(plugin = %self.plugin_id, "[{}] {}", self.plugin_id, message);
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(plugin = %self.plugin_id, "[{}] {}", self.plugin_id, message);
    }

    pub fn error(&self, message: &str) {
        tracing::error!(plugin = %self.plugin_id, "[{}] {}", self.plugin_id, message);
    }

    /// Log with a structured detail payload
    pub fn info_with(&self, message: &str, detail: &Value) {
        tracing::info!(plugin = %self.plugin_id, detail = %detail, "[{}] {}", self.plugin_id, message);
    }

    pub fn error_with(&self, message: &str, detail: &Value) {
        tracing::error!(plugin = %self.plugin_id, detail = %detail, "[{}] {}", self.plugin_id, message);
    }
}

impl std::fmt::Debug for PluginLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginLogger")
            .field("plugin_id", &self.plugin_id)
            .finish()
    }
}
