//! Prelude for convenient imports.

pub use async_trait::async_trait;
pub use serde_json::{Value, json};

pub use crate::api::context::PluginContext;
pub use crate::api::services::{PluginLogger, ScopedConfig};
pub use crate::exports::{HookExport, ModuleExport};
pub use crate::hooks::definitions::HookOutcome;
pub use crate::hooks::registry::HookHandler;
pub use crate::loader::{LoaderSet, ManifestLoader, ModuleLoader, NativeLoader};
pub use crate::manager::PluginManager;
pub use crate::registry::{PluginInfo, PluginStatus, PluginSummary};
pub use crate::traits::{ClosureHandler, FnLifecycle, PluginLifecycle};

pub use crate::{hook_args, plugin_module};
