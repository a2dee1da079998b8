//! System-level event definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Wire name of the ready signal.
pub const SYSTEM_READY: &str = "system:ready";
/// Wire name of the shutdown signal.
pub const SYSTEM_SHUTDOWN: &str = "system:shutdown";
/// Wire name of a plugin failure.
pub const PLUGIN_ERROR: &str = "plugin:error";
/// Wire name emitted before a load cycle starts.
pub const BEFORE_PLUGIN_LOAD: &str = "before:plugin:load";
/// Wire name emitted after a plugin was admitted.
pub const AFTER_PLUGIN_LOAD: &str = "after:plugin:load";
/// Wire name emitted before a plugin is torn down.
pub const BEFORE_PLUGIN_UNLOAD: &str = "before:plugin:unload";
/// Wire name emitted after a plugin was removed.
pub const AFTER_PLUGIN_UNLOAD: &str = "after:plugin:unload";

/// A single event on the system stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemEvent {
    /// Unique event ID.
    pub id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// The event payload.
    pub kind: SystemEventKind,
}

/// Payload of a system event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SystemEventKind {
    /// The manager finished its startup sequence.
    Ready,
    /// The manager is shutting down.
    Shutdown,
    /// A plugin failed to load or initialize.
    PluginError {
        /// Source location of the failing candidate.
        source: String,
        /// Plugin name, when the module got far enough to declare one.
        plugin: Option<String>,
        /// Stage that failed: `load`, `validation`, `dependency`, or `initialize`.
        stage: String,
        /// Failure description.
        message: String,
    },
    /// A load cycle is about to start.
    BeforePluginLoad {
        /// Source location being loaded.
        source: String,
    },
    /// A plugin was admitted to the table.
    AfterPluginLoad {
        /// Plugin name.
        plugin: String,
    },
    /// A plugin is about to be torn down.
    BeforePluginUnload {
        /// Plugin name.
        plugin: String,
    },
    /// A plugin was removed from the table.
    AfterPluginUnload {
        /// Plugin name.
        plugin: String,
    },
    /// An event emitted by a plugin through its capability object.
    Custom {
        /// Event name.
        name: String,
        /// Plugin that emitted it.
        emitter: String,
        /// Arbitrary payload.
        data: Value,
    },
}

impl SystemEvent {
    /// Create a new system event stamped with the current time.
    pub fn new(kind: SystemEventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
        }
    }

    /// Returns the wire name of this event.
    pub fn name(&self) -> &str {
        match &self.kind {
            SystemEventKind::Ready => SYSTEM_READY,
            SystemEventKind::Shutdown => SYSTEM_SHUTDOWN,
            SystemEventKind::PluginError { .. } => PLUGIN_ERROR,
            SystemEventKind::BeforePluginLoad { .. } => BEFORE_PLUGIN_LOAD,
            SystemEventKind::AfterPluginLoad { .. } => AFTER_PLUGIN_LOAD,
            SystemEventKind::BeforePluginUnload { .. } => BEFORE_PLUGIN_UNLOAD,
            SystemEventKind::AfterPluginUnload { .. } => AFTER_PLUGIN_UNLOAD,
            SystemEventKind::Custom { name, .. } => name,
        }
    }
}
