//! Hook system: definitions, registry, and dispatcher.

pub mod definitions;
pub mod dispatcher;
pub mod registry;

pub use definitions::HookOutcome;
pub use dispatcher::HookDispatcher;
pub use registry::{HookHandler, HookRegistry, Registration};
