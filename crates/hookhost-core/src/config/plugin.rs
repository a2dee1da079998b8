//! Plugin runtime configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Plugin runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Directory scanned for extension modules.
    #[serde(default = "default_plugin_directory")]
    pub directory: String,
    /// Directory holding one JSON config document per plugin.
    ///
    /// Defaults to `config/` beside the plugin directory.
    #[serde(default)]
    pub config_directory: Option<String>,
    /// Whether to run a discovery pass on startup.
    #[serde(default = "default_true")]
    pub auto_load: bool,
    /// Whether to watch the plugin directory and reload changed modules.
    #[serde(default = "default_true")]
    pub hot_reload: bool,
    /// Debounce window for filesystem events, in milliseconds.
    #[serde(default = "default_debounce")]
    pub watch_debounce_ms: u64,
    /// Buffer size of the system event stream.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Timeout applied to `command` handlers declared in manifests.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

impl PluginConfig {
    /// Config for a given plugin directory with every other setting at its default.
    pub fn with_directory(directory: impl AsRef<Path>) -> Self {
        Self {
            directory: directory.as_ref().to_string_lossy().into_owned(),
            ..Self::default()
        }
    }

    /// Resolved plugin directory.
    pub fn plugin_dir(&self) -> PathBuf {
        PathBuf::from(&self.directory)
    }

    /// Resolved config directory.
    pub fn config_dir(&self) -> PathBuf {
        match &self.config_directory {
            Some(dir) => PathBuf::from(dir),
            None => {
                let plugin_dir = self.plugin_dir();
                match plugin_dir.parent() {
                    Some(parent) if !parent.as_os_str().is_empty() => parent.join("config"),
                    _ => PathBuf::from("config"),
                }
            }
        }
    }
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            directory: default_plugin_directory(),
            config_directory: None,
            auto_load: true,
            hot_reload: true,
            watch_debounce_ms: default_debounce(),
            event_capacity: default_event_capacity(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

fn default_plugin_directory() -> String {
    "./plugins".to_string()
}

fn default_true() -> bool {
    true
}

fn default_debounce() -> u64 {
    500
}

fn default_event_capacity() -> usize {
    256
}

fn default_command_timeout() -> u64 {
    30
}
