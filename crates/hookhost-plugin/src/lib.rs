//! # hookhost-plugin
//!
//! In-process extension runtime. Provides:
//!
//! - Discovery of extension modules in a plugin directory
//! - Pluggable loader strategies (JSON manifests, in-process Rust modules,
//!   and shared libraries behind the `dynamic` feature)
//! - Validation and dependency checks before a plugin is admitted
//! - A hook registry with ordered, fault-isolated dispatch
//! - A per-plugin capability object (hooks, lookup, config, logging, system events)
//! - A per-plugin JSON config store
//! - Hot reload driven by filesystem events

pub mod api;
pub mod config_store;
pub mod dependency;
pub mod discovery;
pub mod error;
pub mod exports;
#[cfg(feature = "dynamic")]
pub mod ffi;
pub mod hooks;
mod host;
pub mod loader;
pub mod macros;
pub mod manager;
pub mod prelude;
pub mod registry;
pub mod traits;
pub mod validator;
mod watcher;

pub use api::context::PluginContext;
pub use config_store::{ConfigStore, ConfigUpdate};
pub use error::{
    DependencyError, HandlerError, LoadError, PluginError, PluginNotFoundError, ValidationError,
};
pub use exports::{HookExport, ModuleExport};
pub use hooks::definitions::HookOutcome;
pub use hooks::registry::{HookHandler, HookRegistry};
pub use loader::{LoaderSet, ModuleLoader};
pub use manager::{PluginManager, PluginStats};
pub use registry::{FailedLoad, PluginInfo, PluginStatus, PluginSummary};
pub use traits::PluginLifecycle;

#[doc(hidden)]
pub use serde_json as __serde_json;
