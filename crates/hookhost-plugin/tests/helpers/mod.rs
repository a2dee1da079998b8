//! Shared helpers for manager integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::broadcast;

use hookhost_core::config::PluginConfig;
use hookhost_core::events::{SystemEvent, SystemEventKind};
use hookhost_plugin::PluginManager;

/// A manager over a temporary plugin directory.
pub struct TestHost {
    /// Keeps the directory alive.
    pub dir: TempDir,
    /// Plugin directory.
    pub plugins: PathBuf,
    /// Manager under test.
    pub manager: PluginManager,
}

impl TestHost {
    /// Manager with hot reload disabled.
    pub fn new() -> Self {
        Self::with_settings(|settings| settings.hot_reload = false)
    }

    /// Manager with hot reload enabled and a short debounce window.
    pub fn watching() -> Self {
        Self::with_settings(|settings| {
            settings.hot_reload = true;
            settings.watch_debounce_ms = 50;
        })
    }

    /// Manager with custom settings.
    pub fn with_settings(configure: impl FnOnce(&mut PluginConfig)) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let plugins = dir.path().join("plugins");
        std::fs::create_dir_all(&plugins).expect("Failed to create plugin dir");
        let plugins = plugins.canonicalize().expect("Failed to canonicalize plugin dir");

        let mut settings = PluginConfig::with_directory(&plugins);
        configure(&mut settings);

        Self {
            manager: PluginManager::from_config(&settings),
            dir,
            plugins,
        }
    }

    /// Writes `<file>` under the plugin directory and returns its path.
    pub fn write(&self, file: &str, manifest: &Value) -> PathBuf {
        let path = self.plugins.join(file);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        std::fs::write(&path, serde_json::to_vec_pretty(manifest).expect("serialize"))
            .expect("Failed to write manifest");
        path
    }

    /// Writes raw text under the plugin directory.
    pub fn write_raw(&self, file: &str, body: &str) -> PathBuf {
        let path = self.plugins.join(file);
        std::fs::write(&path, body).expect("Failed to write file");
        path
    }

    /// Removes a file under the plugin directory.
    pub fn remove(&self, file: &str) {
        std::fs::remove_file(self.plugins.join(file)).expect("Failed to remove file");
    }

    /// Config directory the manager uses.
    pub fn config_dir(&self) -> PathBuf {
        self.manager.config_store().dir().to_path_buf()
    }
}

/// Polls `check` until it returns true or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Events currently buffered on `rx`.
pub fn drain(rx: &mut broadcast::Receiver<SystemEvent>) -> Vec<SystemEventKind> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event.kind);
    }
    events
}
