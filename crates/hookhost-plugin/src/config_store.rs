//! Per-plugin JSON configuration documents.
//!
//! Each plugin owns one `<name>.json` file in the config directory. A
//! missing or corrupt file reads as an empty document; writes replace the
//! file atomically (temporary file + rename).

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use hookhost_core::AppResult;
use hookhost_core::error::AppError;

/// A change to a plugin's config document.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigUpdate {
    /// Set a single key.
    Key(String, Value),
    /// Shallow-merge an object into the document.
    Merge(Map<String, Value>),
}

/// Persists one JSON document per plugin name.
#[derive(Debug)]
pub struct ConfigStore {
    /// Directory holding the documents.
    dir: PathBuf,
    /// Serializes read-modify-write cycles.
    write_lock: Mutex<()>,
}

impl ConfigStore {
    /// Creates a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Directory holding the documents.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document for `plugin`, or `None` if the name is not a safe file name.
    pub fn document_path(&self, plugin: &str) -> Option<PathBuf> {
        is_safe_name(plugin).then(|| self.dir.join(format!("{plugin}.json")))
    }

    /// Returns the whole document (`key = None`) or one key's value.
    ///
    /// Absent documents, empty documents, and absent keys all yield `None`.
    pub async fn get(&self, plugin: &str, key: Option<&str>) -> Option<Value> {
        let doc = self.read_document(plugin).await;
        match key {
            Some(key) => doc.get(key).cloned(),
            None if doc.is_empty() => None,
            None => Some(Value::Object(doc)),
        }
    }

    /// Reads the document for `plugin`, empty when missing or unreadable.
    pub async fn read_document(&self, plugin: &str) -> Map<String, Value> {
        let Some(path) = self.document_path(plugin) else {
            return Map::new();
        };

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Map::new(),
            Err(e) => {
                warn!(plugin = %plugin, path = %path.display(), error = %e, "Failed to read plugin config");
                return Map::new();
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(doc)) => doc,
            Ok(_) => {
                warn!(plugin = %plugin, path = %path.display(), "Plugin config is not a JSON object, ignoring");
                Map::new()
            }
            Err(e) => {
                warn!(plugin = %plugin, path = %path.display(), error = %e, "Corrupt plugin config, ignoring");
                Map::new()
            }
        }
    }

    /// Applies `update` to the document for `plugin`, persists it, and
    /// returns the resulting document.
    pub async fn set(&self, plugin: &str, update: ConfigUpdate) -> AppResult<Map<String, Value>> {
        let path = self.document_path(plugin).ok_or_else(|| {
            AppError::validation(format!("'{plugin}' cannot be used as a config document name"))
        })?;

        let _guard = self.write_lock.lock().await;

        let mut doc = self.read_document(plugin).await;
        match update {
            ConfigUpdate::Key(key, value) => {
                doc.insert(key, value);
            }
            ConfigUpdate::Merge(patch) => doc.extend(patch),
        }

        tokio::fs::create_dir_all(&self.dir).await?;

        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(&Value::Object(doc.clone()))?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(plugin = %plugin, path = %path.display(), "Plugin config saved");
        Ok(doc)
    }
}

fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}
