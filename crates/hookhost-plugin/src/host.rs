//! Shared runtime state reachable from the manager and from capability objects.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tokio::sync::RwLock;

use crate::api::context::PluginContext;
use crate::api::events::SystemEventBus;
use crate::config_store::ConfigStore;
use crate::hooks::definitions::HookOutcome;
use crate::hooks::dispatcher::HookDispatcher;
use crate::hooks::registry::HookRegistry;
use crate::registry::PluginTable;

/// State owned by one manager instance.
#[derive(Debug)]
pub(crate) struct Host {
    /// Canonical plugin table.
    pub(crate) table: RwLock<PluginTable>,
    /// Hook registry.
    pub(crate) hooks: Arc<HookRegistry>,
    /// Hook dispatcher over `hooks`.
    pub(crate) dispatcher: HookDispatcher,
    /// Per-plugin config documents.
    pub(crate) config: Arc<ConfigStore>,
    /// System event stream.
    pub(crate) events: SystemEventBus,
    /// Last issued load generation.
    generations: AtomicU64,
}

impl Host {
    pub(crate) fn new(config_dir: PathBuf, event_capacity: usize) -> Arc<Self> {
        let hooks = Arc::new(HookRegistry::new());
        Arc::new(Self {
            table: RwLock::new(PluginTable::new()),
            dispatcher: HookDispatcher::new(hooks.clone()),
            hooks,
            config: Arc::new(ConfigStore::new(config_dir)),
            events: SystemEventBus::new(event_capacity),
            generations: AtomicU64::new(0),
        })
    }

    pub(crate) fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn context(self: &Arc<Self>, plugin: &str, generation: u64) -> PluginContext {
        PluginContext::new(plugin, generation, Arc::clone(self))
    }

    /// Dispatches `hook`; each handler gets its owner's capability object.
    pub(crate) async fn emit_hook(self: &Arc<Self>, hook: &str, args: &[Value]) -> Vec<HookOutcome> {
        self.dispatcher
            .dispatch(hook, args, |registration| {
                self.context(&registration.owner, registration.generation)
            })
            .await
    }
}
