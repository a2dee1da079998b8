//! Raw module exports and a builder for in-process modules.
//!
//! A loader turns a source location into a [`ModuleExport`]. Nothing in an
//! export is trusted until the validator has checked it.

use std::future::Future;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::api::context::PluginContext;
use crate::hooks::registry::HookHandler;
use crate::traits::{ClosureHandler, FnLifecycle, PluginLifecycle};

/// One entry of a module's `hooks` mapping.
#[derive(Debug, Clone)]
pub enum HookExport {
    /// A callable handler.
    Handler(Arc<dyn HookHandler>),
    /// Something that is not a function; rejected by validation.
    NotCallable(Value),
}

/// The unvalidated export of an extension module.
#[derive(Debug, Clone, Default)]
pub struct ModuleExport {
    /// Metadata fields (`name`, `version`, `description`, `author`,
    /// `dependencies`, `permissions`). Loosely typed until validated.
    /// A `hooks`, `initialize`, or `cleanup` key left here means the loader
    /// could not interpret it.
    pub metadata: Map<String, Value>,
    /// Hook name → handler, in declaration order.
    pub hooks: Option<Vec<(String, HookExport)>>,
    /// `initialize` / `cleanup`.
    pub lifecycle: Option<Arc<dyn PluginLifecycle>>,
}

impl ModuleExport {
    /// Starts building an in-process module.
    pub fn builder() -> ModuleExportBuilder {
        ModuleExportBuilder::default()
    }

    /// Declared name, if it is a string.
    pub fn declared_name(&self) -> Option<&str> {
        self.metadata.get("name").and_then(Value::as_str)
    }
}

/// Fluent builder for [`ModuleExport`].
#[derive(Debug, Default)]
pub struct ModuleExportBuilder {
    metadata: Map<String, Value>,
    hooks: Vec<(String, HookExport)>,
    lifecycle: Option<Arc<dyn PluginLifecycle>>,
    functions: Option<FnLifecycle>,
}

impl ModuleExportBuilder {
    /// Sets the plugin name.
    pub fn name(self, name: &str) -> Self {
        self.meta("name", Value::from(name))
    }

    /// Sets the version.
    pub fn version(self, version: &str) -> Self {
        self.meta("version", Value::from(version))
    }

    /// Sets the description.
    pub fn description(self, description: &str) -> Self {
        self.meta("description", Value::from(description))
    }

    /// Sets the author.
    pub fn author(self, author: &str) -> Self {
        self.meta("author", Value::from(author))
    }

    /// Adds a dependency.
    pub fn dependency(self, name: &str) -> Self {
        self.push_list("dependencies", name)
    }

    /// Adds a permission tag.
    pub fn permission(self, tag: &str) -> Self {
        self.push_list("permissions", tag)
    }

    /// Sets an arbitrary metadata field.
    pub fn meta(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Declares a hook handler. A later declaration for the same hook replaces it.
    pub fn hook(self, hook: &str, handler: Arc<dyn HookHandler>) -> Self {
        self.hook_export(hook, HookExport::Handler(handler))
    }

    /// Declares a hook handler from an async closure.
    pub fn hook_fn<F, Fut>(self, hook: &str, f: F) -> Self
    where
        F: Fn(PluginContext, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        self.hook(hook, ClosureHandler::wrap(f))
    }

    /// Declares a raw hook entry.
    pub fn hook_export(mut self, hook: &str, export: HookExport) -> Self {
        self.hooks.retain(|(name, _)| name != hook);
        self.hooks.push((hook.to_string(), export));
        self
    }

    /// Sets a lifecycle implementation. Overrides closure-based steps.
    pub fn lifecycle(mut self, lifecycle: Arc<dyn PluginLifecycle>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Sets the `initialize` step from an async closure.
    pub fn on_initialize<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.functions = Some(self.functions.take().unwrap_or_default().on_initialize(f));
        self
    }

    /// Sets the `cleanup` step from an async closure.
    pub fn on_cleanup<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.functions = Some(self.functions.take().unwrap_or_default().on_cleanup(f));
        self
    }

    /// Builds the export.
    pub fn build(self) -> ModuleExport {
        let lifecycle = self.lifecycle.or_else(|| {
            self.functions
                .map(|f| Arc::new(f) as Arc<dyn PluginLifecycle>)
        });

        ModuleExport {
            metadata: self.metadata,
            hooks: (!self.hooks.is_empty()).then_some(self.hooks),
            lifecycle,
        }
    }

    fn push_list(mut self, key: &str, item: &str) -> Self {
        let list = self
            .metadata
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(items) = list {
            items.push(Value::from(item));
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_collects_metadata() {
        let export = ModuleExport::builder()
            .name("audit")
            .version("2.1.0")
            .dependency("storage")
            .dependency("auth")
            .permission("fs:read")
            .build();

        assert_eq!(export.declared_name(), Some("audit"));
        assert_eq!(export.metadata["dependencies"], json!(["storage", "auth"]));
        assert_eq!(export.metadata["permissions"], json!(["fs:read"]));
        assert!(export.hooks.is_none());
        assert!(export.lifecycle.is_none());
    }

    #[test]
    fn test_later_hook_declaration_replaces_earlier() {
        let export = ModuleExport::builder()
            .name("a")
            .hook_fn("ping", |_, _| async { Ok(json!(1)) })
            .hook_export("ping", HookExport::NotCallable(json!(42)))
            .build();

        let hooks = export.hooks.expect("hooks");
        assert_eq!(hooks.len(), 1);
        assert!(matches!(hooks[0].1, HookExport::NotCallable(_)));
    }

    #[test]
    fn test_closure_lifecycle_is_built() {
        let export = ModuleExport::builder()
            .name("a")
            .on_cleanup(|| async { Ok(()) })
            .build();
        assert!(export.lifecycle.is_some());
    }
}
