//! Hook dispatcher: runs every handler of a hook and collects the outcomes.
//!
//! - Handlers are awaited one at a time, in registration order.
//! - A failing or panicking handler is recorded and dispatch moves on.
//! - No handler registered means an empty result list.
//!
//! There is no per-handler timeout: a handler that never completes stalls
//! the handlers behind it.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::definitions::HookOutcome;
use super::registry::{HookRegistry, Registration};
use crate::api::context::PluginContext;
use crate::error::HandlerError;
use crate::traits::guard_plugin_call;

/// Dispatches hooks to all registered handlers.
#[derive(Debug, Clone)]
pub struct HookDispatcher {
    /// Hook registry.
    registry: Arc<HookRegistry>,
}

impl HookDispatcher {
    /// Creates a new hook dispatcher.
    pub fn new(registry: Arc<HookRegistry>) -> Self {
        Self { registry }
    }

    /// Dispatches `hook` to a snapshot of its registrations.
    ///
    /// `context_for` builds the capability object handed to each handler.
    /// The registry is not locked while handlers run, so handlers may
    /// register, unregister, or emit hooks themselves.
    pub async fn dispatch<F>(&self, hook: &str, args: &[Value], context_for: F) -> Vec<HookOutcome>
    where
        F: Fn(&Registration) -> PluginContext,
    {
        let registrations = self.registry.registrations(hook).await;

        if registrations.is_empty() {
            return Vec::new();
        }

        debug!(
            hook = %hook,
            handler_count = registrations.len(),
            "Dispatching hook"
        );

        let mut outcomes = Vec::with_capacity(registrations.len());

        for registration in &registrations {
            let ctx = context_for(registration);
            let result = guard_plugin_call(registration.handler.handle(&ctx, args)).await;

            let outcome = match result {
                Ok(value) => HookOutcome::Completed {
                    plugin: registration.owner.clone(),
                    result: value,
                },
                Err(message) => {
                    warn!(
                        hook = %hook,
                        plugin = %registration.owner,
                        error = %message,
                        "Hook handler failed"
                    );
                    HookOutcome::Failed {
                        plugin: registration.owner.clone(),
                        error: HandlerError {
                            plugin: registration.owner.clone(),
                            hook: hook.to_string(),
                            message,
                        },
                    }
                }
            };

            outcomes.push(outcome);
        }

        outcomes
    }
}
