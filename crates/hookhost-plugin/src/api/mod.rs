//! Plugin API: the capability object and the services behind it.

pub mod context;
pub mod events;
pub mod services;

pub use context::PluginContext;
pub use events::SystemEventBus;
pub use services::{PluginLogger, ScopedConfig};
