//! Host-wide system events.
//!
//! System events travel on their own stream, separate from named hooks.
//! They carry lifecycle signals (ready/shutdown), per-plugin load and
//! unload transitions, load failures, and custom events emitted by plugins.

pub mod system;

pub use system::{SystemEvent, SystemEventKind};
