//! Plugin-scoped services: namespaced configuration and prefixed logging.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::Level;

use hookhost_core::AppResult;

use crate::config_store::{ConfigStore, ConfigUpdate};

/// Configuration access bound to one plugin's document.
#[derive(Debug, Clone)]
pub struct ScopedConfig {
    /// Config store.
    store: Arc<ConfigStore>,
    /// Owning plugin.
    plugin: String,
}

impl ScopedConfig {
    /// Creates a config accessor for `plugin`.
    pub fn new(store: Arc<ConfigStore>, plugin: &str) -> Self {
        Self {
            store,
            plugin: plugin.to_string(),
        }
    }

    /// Whole document (`key = None`) or one key's value. `None` when absent.
    pub async fn get(&self, key: Option<&str>) -> Option<Value> {
        self.store.get(&self.plugin, key).await
    }

    /// Sets one key and persists the document.
    pub async fn set(&self, key: &str, value: Value) -> AppResult<Map<String, Value>> {
        self.store
            .set(&self.plugin, ConfigUpdate::Key(key.to_string(), value))
            .await
    }

    /// Shallow-merges `patch` into the document and persists it.
    pub async fn merge(&self, patch: Map<String, Value>) -> AppResult<Map<String, Value>> {
        self.store.set(&self.plugin, ConfigUpdate::Merge(patch)).await
    }
}

/// Logger that prefixes every line with timestamp, plugin name, and level.
#[derive(Debug, Clone)]
pub struct PluginLogger {
    plugin: String,
}

impl PluginLogger {
    /// Creates a logger for `plugin`.
    pub fn new(plugin: &str) -> Self {
        Self {
            plugin: plugin.to_string(),
        }
    }

    /// Formats a line the way it is logged.
    pub fn format(&self, level: Level, message: &str) -> String {
        format!(
            "[{}] [{}] [{}] {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            self.plugin,
            level,
            message
        )
    }

    /// Logs at debug level.
    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(Level::DEBUG, message.as_ref());
    }

    /// Logs at info level.
    pub fn info(&self, message: impl AsRef<str>) {
        self.log(Level::INFO, message.as_ref());
    }

    /// Logs at warn level.
    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(Level::WARN, message.as_ref());
    }

    /// Logs at error level.
    pub fn error(&self, message: impl AsRef<str>) {
        self.log(Level::ERROR, message.as_ref());
    }

    fn log(&self, level: Level, message: &str) {
        let line = self.format(level, message);
        let plugin = self.plugin.as_str();
        match level {
            Level::ERROR => tracing::error!(target: "hookhost::plugin", plugin, "{line}"),
            Level::WARN => tracing::warn!(target: "hookhost::plugin", plugin, "{line}"),
            Level::INFO => tracing::info!(target: "hookhost::plugin", plugin, "{line}"),
            Level::DEBUG => tracing::debug!(target: "hookhost::plugin", plugin, "{line}"),
            _ => tracing::trace!(target: "hookhost::plugin", plugin, "{line}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_prefixes_plugin_and_level() {
        let logger = PluginLogger::new("audit");
        let line = logger.format(Level::WARN, "disk almost full");

        assert!(line.starts_with('['));
        assert!(line.contains("] [audit] [WARN] disk almost full"));
    }

    #[tokio::test]
    async fn test_scoped_config_is_namespaced() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(ConfigStore::new(dir.path()));
        let a = ScopedConfig::new(store.clone(), "a");
        let b = ScopedConfig::new(store, "b");

        a.set("greeting", Value::from("hello")).await.unwrap();

        assert_eq!(a.get(Some("greeting")).await, Some(Value::from("hello")));
        assert_eq!(b.get(Some("greeting")).await, None);
    }
}
