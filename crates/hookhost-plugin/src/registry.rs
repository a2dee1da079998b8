//! Plugin table: the canonical record of every plugin the manager knows about.
//!
//! Only the manager mutates the table. Other components receive it by
//! shared reference (dependency checks, capability lookups).

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::traits::PluginLifecycle;

/// Lifecycle status of a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginStatus {
    /// Admitted and initialized.
    Loaded,
    /// Passed validation but could not be admitted or initialized.
    Failed,
    /// Removed from the table.
    Unloaded,
}

impl fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loaded => write!(f, "loaded"),
            Self::Failed => write!(f, "failed"),
            Self::Unloaded => write!(f, "unloaded"),
        }
    }
}

/// Public metadata about a plugin. Never carries handler references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Unique plugin name.
    pub name: String,
    /// Version string (`1.0.0` when not declared).
    pub version: String,
    /// Plugin description.
    pub description: String,
    /// Author or maintainer.
    pub author: String,
    /// Plugins that must be loaded first.
    pub dependencies: Vec<String>,
    /// Declared capability tags. Informational only.
    pub permissions: Vec<String>,
    /// Hook names declared by the module export.
    pub hooks: Vec<String>,
    /// Where the module was loaded from.
    pub source: PathBuf,
    /// Current status.
    pub status: PluginStatus,
    /// Time of the last successful load.
    pub loaded_at: Option<DateTime<Utc>>,
    /// Last failure reason while `Failed`.
    pub error: Option<String>,
}

impl PluginInfo {
    /// Reduced view handed to other plugins.
    pub fn summary(&self) -> PluginSummary {
        PluginSummary {
            name: self.name.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
            status: self.status,
        }
    }
}

/// Metadata another plugin may look up through its capability object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSummary {
    /// Plugin name.
    pub name: String,
    /// Version string.
    pub version: String,
    /// Plugin description.
    pub description: String,
    /// Current status.
    pub status: PluginStatus,
}

/// A candidate source whose last load cycle failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedLoad {
    /// Source location.
    pub source: PathBuf,
    /// Declared plugin name, when the module got that far.
    pub plugin: Option<String>,
    /// Stage that failed.
    pub stage: String,
    /// Failure description.
    pub message: String,
    /// When the failure was recorded.
    pub failed_at: DateTime<Utc>,
}

/// Table entry: metadata plus the lifecycle hooks of the live module.
pub(crate) struct PluginEntry {
    /// Public metadata.
    pub(crate) info: PluginInfo,
    /// `initialize`/`cleanup` of the module, if it exported any.
    pub(crate) lifecycle: Option<Arc<dyn PluginLifecycle>>,
    /// Load generation, distinguishes a reloaded plugin from its predecessor.
    pub(crate) generation: u64,
}

impl fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginEntry")
            .field("info", &self.info)
            .field("has_lifecycle", &self.lifecycle.is_some())
            .field("generation", &self.generation)
            .finish()
    }
}

/// Active plugins keyed by name, plus the set of failing sources.
#[derive(Debug, Default)]
pub struct PluginTable {
    /// Plugin name → entry.
    plugins: BTreeMap<String, PluginEntry>,
    /// Source location → last failure.
    failures: BTreeMap<PathBuf, FailedLoad>,
}

impl PluginTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the metadata of a plugin.
    pub fn get(&self, name: &str) -> Option<&PluginInfo> {
        self.plugins.get(name).map(|entry| &entry.info)
    }

    /// Whether a plugin with this name is in the `Loaded` state.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.get(name)
            .is_some_and(|info| info.status == PluginStatus::Loaded)
    }

    /// Whether the plugin loaded from `source` is in the `Loaded` state.
    pub fn is_source_loaded(&self, source: &Path) -> bool {
        self.plugins
            .values()
            .any(|entry| entry.info.source == source && entry.info.status == PluginStatus::Loaded)
    }

    /// Name of the plugin loaded from `source`, if any.
    pub fn find_by_source(&self, source: &Path) -> Option<String> {
        self.plugins
            .values()
            .find(|entry| entry.info.source == source)
            .map(|entry| entry.info.name.clone())
    }

    /// All plugin metadata, ordered by name.
    pub fn list(&self) -> Vec<PluginInfo> {
        self.plugins.values().map(|entry| entry.info.clone()).collect()
    }

    /// All plugin names, ordered.
    pub fn names(&self) -> Vec<String> {
        self.plugins.keys().cloned().collect()
    }

    /// Number of entries, whatever their status.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Number of entries with the given status.
    pub fn count_with_status(&self, status: PluginStatus) -> usize {
        self.plugins
            .values()
            .filter(|entry| entry.info.status == status)
            .count()
    }

    /// Currently failing sources.
    pub fn failures(&self) -> Vec<FailedLoad> {
        self.failures.values().cloned().collect()
    }

    /// Number of currently failing sources.
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub(crate) fn entry(&self, name: &str) -> Option<&PluginEntry> {
        self.plugins.get(name)
    }

    pub(crate) fn insert(&mut self, entry: PluginEntry) -> Option<PluginEntry> {
        self.plugins.insert(entry.info.name.clone(), entry)
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<PluginEntry> {
        self.plugins.remove(name)
    }

    pub(crate) fn mark_failed(&mut self, name: &str, reason: &str) {
        if let Some(entry) = self.plugins.get_mut(name) {
            entry.info.status = PluginStatus::Failed;
            entry.info.error = Some(reason.to_string());
        }
    }

    pub(crate) fn record_failure(&mut self, failure: FailedLoad) {
        self.failures.insert(failure.source.clone(), failure);
    }

    pub(crate) fn clear_failure(&mut self, source: &Path) -> bool {
        self.failures.remove(source).is_some()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn info(name: &str, status: PluginStatus) -> PluginInfo {
        PluginInfo {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            description: String::new(),
            author: String::new(),
            dependencies: Vec::new(),
            permissions: Vec::new(),
            hooks: Vec::new(),
            source: PathBuf::from(format!("/plugins/{name}.json")),
            status,
            loaded_at: None,
            error: None,
        }
    }

    pub(crate) fn entry(name: &str, status: PluginStatus) -> PluginEntry {
        PluginEntry {
            info: info(name, status),
            lifecycle: None,
            generation: 1,
        }
    }

    #[test]
    fn test_insert_replaces_same_name() {
        let mut table = PluginTable::new();
        table.insert(entry("a", PluginStatus::Loaded));
        let mut second = entry("a", PluginStatus::Loaded);
        second.info.version = "2.0.0".to_string();
        let previous = table.insert(second);

        assert!(previous.is_some());
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("a").map(|i| i.version.as_str()), Some("2.0.0"));
    }

    #[test]
    fn test_mark_failed_and_counts() {
        let mut table = PluginTable::new();
        table.insert(entry("a", PluginStatus::Loaded));
        table.insert(entry("b", PluginStatus::Loaded));
        table.mark_failed("b", "boom");

        assert!(table.is_loaded("a"));
        assert!(!table.is_loaded("b"));
        assert_eq!(table.count_with_status(PluginStatus::Loaded), 1);
        assert_eq!(table.count_with_status(PluginStatus::Failed), 1);
        assert_eq!(table.get("b").and_then(|i| i.error.clone()), Some("boom".into()));
    }

    #[test]
    fn test_find_by_source() {
        let mut table = PluginTable::new();
        table.insert(entry("a", PluginStatus::Loaded));
        assert_eq!(
            table.find_by_source(Path::new("/plugins/a.json")),
            Some("a".to_string())
        );
        assert!(table.is_source_loaded(Path::new("/plugins/a.json")));
        assert_eq!(table.find_by_source(Path::new("/plugins/b.json")), None);
    }

    #[test]
    fn test_failures_keyed_by_source() {
        let mut table = PluginTable::new();
        let failure = FailedLoad {
            source: PathBuf::from("/plugins/x.json"),
            plugin: None,
            stage: "validation".into(),
            message: "missing name".into(),
            failed_at: Utc::now(),
        };
        table.record_failure(failure.clone());
        table.record_failure(failure);
        assert_eq!(table.failure_count(), 1);
        assert!(table.clear_failure(Path::new("/plugins/x.json")));
        assert_eq!(table.failure_count(), 0);
    }
}
