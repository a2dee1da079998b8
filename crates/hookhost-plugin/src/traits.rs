//! Plugin-facing traits and closure adapters.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::api::context::PluginContext;
use crate::hooks::registry::HookHandler;

/// `initialize` / `cleanup` of a plugin module.
///
/// `initialize` runs exactly once per load, after the plugin is admitted.
/// `cleanup` runs exactly once per unload; its failure is logged and does
/// not block removal.
#[async_trait]
pub trait PluginLifecycle: Send + Sync + std::fmt::Debug {
    /// Called once the plugin is admitted to the table.
    async fn initialize(&self, ctx: PluginContext) -> Result<(), String> {
        let _ = ctx;
        Ok(())
    }

    /// Called once when the plugin is unloaded.
    async fn cleanup(&self) -> Result<(), String> {
        Ok(())
    }
}

type HandlerFn = Arc<dyn Fn(PluginContext, Vec<Value>) -> BoxFuture<'static, Result<Value, String>> + Send + Sync>;
type InitializeFn = Arc<dyn Fn(PluginContext) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;
type CleanupFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// A closure-based hook handler.
#[derive(Clone)]
pub struct ClosureHandler {
    handler: HandlerFn,
}

impl std::fmt::Debug for ClosureHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosureHandler")
            .field("handler", &"<closure>")
            .finish()
    }
}

impl ClosureHandler {
    /// Wraps an async closure. The closure receives owned copies of the
    /// capability object and the hook arguments.
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(PluginContext, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |ctx, args| handler(ctx, args).boxed()),
        }
    }

    /// Wraps the closure into an `Arc<dyn HookHandler>`.
    pub fn wrap<F, Fut>(handler: F) -> Arc<dyn HookHandler>
    where
        F: Fn(PluginContext, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        Arc::new(Self::new(handler))
    }
}

#[async_trait]
impl HookHandler for ClosureHandler {
    async fn handle(&self, ctx: &PluginContext, args: &[Value]) -> Result<Value, String> {
        (self.handler)(ctx.clone(), args.to_vec()).await
    }
}

/// Lifecycle built from optional closures.
#[derive(Clone, Default)]
pub struct FnLifecycle {
    initialize: Option<InitializeFn>,
    cleanup: Option<CleanupFn>,
}

impl std::fmt::Debug for FnLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnLifecycle")
            .field("initialize", &self.initialize.is_some())
            .field("cleanup", &self.cleanup.is_some())
            .finish()
    }
}

impl FnLifecycle {
    /// Lifecycle with neither step set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the `initialize` step.
    pub fn on_initialize<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.initialize = Some(Arc::new(move |ctx| f(ctx).boxed()));
        self
    }

    /// Sets the `cleanup` step.
    pub fn on_cleanup<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.cleanup = Some(Arc::new(move || f().boxed()));
        self
    }
}

#[async_trait]
impl PluginLifecycle for FnLifecycle {
    async fn initialize(&self, ctx: PluginContext) -> Result<(), String> {
        match &self.initialize {
            Some(f) => f(ctx).await,
            None => Ok(()),
        }
    }

    async fn cleanup(&self) -> Result<(), String> {
        match &self.cleanup {
            Some(f) => f().await,
            None => Ok(()),
        }
    }
}

/// Runs a call into plugin code, turning a panic into an error message.
pub(crate) async fn guard_plugin_call<T, F>(fut: F) -> Result<T, String>
where
    F: Future<Output = Result<T, String>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(format!("panicked: {}", panic_message(panic.as_ref()))),
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
