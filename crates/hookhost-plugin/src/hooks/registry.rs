//! Hook registry: ordered handler lists keyed by hook name.
//!
//! Handlers run in registration order. A plugin that re-registers after a
//! reload is appended at the end of each of its hooks' lists.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::api::context::PluginContext;

/// Trait for hook handler implementations.
#[async_trait]
pub trait HookHandler: Send + Sync + std::fmt::Debug {
    /// Handles one invocation of the hook the handler is registered for.
    async fn handle(&self, ctx: &PluginContext, args: &[Value]) -> Result<Value, String>;
}

/// One registration: `(hook name, owner, handler)`.
#[derive(Debug, Clone)]
pub struct Registration {
    /// Plugin that owns the handler.
    pub owner: String,
    /// Load generation of the owner at registration time.
    pub generation: u64,
    /// The handler.
    pub handler: Arc<dyn HookHandler>,
}

/// Registry of hook handlers organized by hook name.
#[derive(Debug, Default)]
pub struct HookRegistry {
    /// Hook name → handlers in registration order.
    handlers: RwLock<HashMap<String, Vec<Registration>>>,
}

impl HookRegistry {
    /// Creates a new empty hook registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler to the list for `hook`, creating the list if absent.
    pub async fn register(
        &self,
        hook: &str,
        owner: &str,
        generation: u64,
        handler: Arc<dyn HookHandler>,
    ) {
        let mut handlers = self.handlers.write().await;
        handlers
            .entry(hook.to_string())
            .or_default()
            .push(Registration {
                owner: owner.to_string(),
                generation,
                handler,
            });

        debug!(hook = %hook, plugin = %owner, "Hook handler registered");
    }

    /// Removes the handlers `owner` registered for one hook during load
    /// `generation`. Registrations from other loads of the same plugin stay.
    ///
    /// Returns the number of registrations removed.
    pub async fn unregister(&self, hook: &str, owner: &str, generation: u64) -> usize {
        let mut handlers = self.handlers.write().await;
        let Some(entries) = handlers.get_mut(hook) else {
            return 0;
        };

        let before = entries.len();
        entries.retain(|r| r.owner != owner || r.generation != generation);
        let removed = before - entries.len();

        if entries.is_empty() {
            handlers.remove(hook);
        }

        removed
    }

    /// Removes every registration owned by `owner` across all hooks.
    pub async fn unregister_owner(&self, owner: &str) -> usize {
        let mut handlers = self.handlers.write().await;
        let mut removed = 0;

        for entries in handlers.values_mut() {
            let before = entries.len();
            entries.retain(|r| r.owner != owner);
            removed += before - entries.len();
        }

        // Remove empty hook entries
        handlers.retain(|_, entries| !entries.is_empty());

        debug!(plugin = %owner, removed, "All hooks unregistered for plugin");
        removed
    }

    /// Snapshot of the registrations for `hook`, in dispatch order.
    pub async fn registrations(&self, hook: &str) -> Vec<Registration> {
        let handlers = self.handlers.read().await;
        handlers.get(hook).cloned().unwrap_or_default()
    }

    /// Returns the number of handlers registered for a hook.
    pub async fn handler_count(&self, hook: &str) -> usize {
        let handlers = self.handlers.read().await;
        handlers.get(hook).map(Vec::len).unwrap_or(0)
    }

    /// Total number of registrations across all hooks.
    pub async fn total_handlers(&self) -> usize {
        let handlers = self.handlers.read().await;
        handlers.values().map(Vec::len).sum()
    }

    /// Hook names with at least one registration, sorted.
    pub async fn hook_names(&self) -> Vec<String> {
        let handlers = self.handlers.read().await;
        let mut names: Vec<String> = handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Owners registered for `hook`, in dispatch order.
    pub async fn owners(&self, hook: &str) -> Vec<String> {
        let handlers = self.handlers.read().await;
        handlers
            .get(hook)
            .map(|entries| entries.iter().map(|r| r.owner.clone()).collect())
            .unwrap_or_default()
    }
}
