//! Plugin context: the capability object each plugin receives.
//!
//! A context is bound to one plugin name and load generation. It is passed
//! to `initialize` and to every hook handler the plugin owns.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::broadcast;

use hookhost_core::AppResult;
use hookhost_core::error::AppError;
use hookhost_core::events::{SystemEvent, SystemEventKind};

use super::services::{PluginLogger, ScopedConfig};
use crate::hooks::definitions::HookOutcome;
use crate::hooks::registry::HookHandler;
use crate::host::Host;
use crate::registry::PluginSummary;

/// Capability object scoped to one plugin.
#[derive(Clone)]
pub struct PluginContext {
    /// Owning plugin.
    plugin: String,
    /// Load generation the context was issued for.
    generation: u64,
    /// Shared runtime state.
    host: Arc<Host>,
    /// Prefixed logger.
    logger: PluginLogger,
    /// Namespaced config.
    config: ScopedConfig,
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin", &self.plugin)
            .field("generation", &self.generation)
            .finish()
    }
}

impl PluginContext {
    pub(crate) fn new(plugin: &str, generation: u64, host: Arc<Host>) -> Self {
        Self {
            plugin: plugin.to_string(),
            generation,
            logger: PluginLogger::new(plugin),
            config: ScopedConfig::new(host.config.clone(), plugin),
            host,
        }
    }

    /// Name of the plugin this context belongs to.
    pub fn plugin_name(&self) -> &str {
        &self.plugin
    }

    /// Registers `handler` for `hook` under this plugin's name.
    ///
    /// Fails once the plugin has been unloaded or replaced by a reload, so a
    /// stale context cannot leave registrations behind.
    pub async fn register_hook(&self, hook: &str, handler: Arc<dyn HookHandler>) -> AppResult<()> {
        if hook.is_empty() {
            return Err(AppError::validation("hook names must be non-empty"));
        }

        // Hold the table while registering so an unload cannot slip in between.
        let table = self.host.table.read().await;
        let current = table
            .entry(&self.plugin)
            .is_some_and(|entry| entry.generation == self.generation)
            && table.is_loaded(&self.plugin);
        if !current {
            return Err(AppError::plugin(format!(
                "plugin '{}' is no longer loaded",
                self.plugin
            )));
        }

        self.host
            .hooks
            .register(hook, &self.plugin, self.generation, handler)
            .await;
        drop(table);
        Ok(())
    }

    /// Removes this plugin's handlers for `hook`. Other plugins' handlers are
    /// untouched, and so are handlers of a later load of this plugin.
    pub async fn unregister_hook(&self, hook: &str) -> usize {
        self.host
            .hooks
            .unregister(hook, &self.plugin, self.generation)
            .await
    }

    /// Emits a hook to every registered handler, whoever owns it.
    pub async fn emit_hook(&self, hook: &str, args: Vec<Value>) -> Vec<HookOutcome> {
        self.host.emit_hook(hook, &args).await
    }

    /// Public metadata of one plugin.
    pub async fn plugin(&self, name: &str) -> Option<PluginSummary> {
        let table = self.host.table.read().await;
        table.get(name).map(|info| info.summary())
    }

    /// Public metadata of every plugin in the table.
    pub async fn plugins(&self) -> Vec<PluginSummary> {
        let table = self.host.table.read().await;
        table.list().iter().map(|info| info.summary()).collect()
    }

    /// Config document of this plugin.
    pub fn config(&self) -> &ScopedConfig {
        &self.config
    }

    /// Reads this plugin's config: whole document or one key.
    pub async fn config_get(&self, key: Option<&str>) -> Option<Value> {
        self.config.get(key).await
    }

    /// Sets one key of this plugin's config.
    pub async fn config_set(&self, key: &str, value: Value) -> AppResult<Map<String, Value>> {
        self.config.set(key, value).await
    }

    /// Shallow-merges a patch into this plugin's config.
    pub async fn config_merge(&self, patch: Map<String, Value>) -> AppResult<Map<String, Value>> {
        self.config.merge(patch).await
    }

    /// Logger prefixing lines with timestamp, plugin name, and level.
    pub fn logger(&self) -> &PluginLogger {
        &self.logger
    }

    /// Subscribes to the host-wide system event stream.
    pub fn subscribe_system(&self) -> broadcast::Receiver<SystemEvent> {
        self.host.events.subscribe()
    }

    /// Publishes a custom event on the system stream.
    pub fn emit_system(&self, name: &str, data: Value) -> usize {
        self.host.events.publish(SystemEventKind::Custom {
            name: name.to_string(),
            emitter: self.plugin.clone(),
            data,
        })
    }
}
