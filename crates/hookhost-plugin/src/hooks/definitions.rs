//! Hook argument and result types.

use serde::Serialize;
use serde_json::Value;

use crate::error::HandlerError;

/// Result of one handler invocation during dispatch.
///
/// Serializes as `{"plugin": .., "result": ..}` or `{"plugin": .., "error": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HookOutcome {
    /// The handler returned a value.
    Completed {
        /// Owner of the handler.
        plugin: String,
        /// Returned value.
        result: Value,
    },
    /// The handler returned an error or panicked.
    Failed {
        /// Owner of the handler.
        plugin: String,
        /// Captured failure.
        error: HandlerError,
    },
}

impl HookOutcome {
    /// Owner of the handler that produced this outcome.
    pub fn plugin(&self) -> &str {
        match self {
            Self::Completed { plugin, .. } | Self::Failed { plugin, .. } => plugin,
        }
    }

    /// Whether the handler succeeded.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Returned value, if the handler succeeded.
    pub fn result(&self) -> Option<&Value> {
        match self {
            Self::Completed { result, .. } => Some(result),
            Self::Failed { .. } => None,
        }
    }

    /// Captured failure, if the handler failed.
    pub fn error(&self) -> Option<&HandlerError> {
        match self {
            Self::Completed { .. } => None,
            Self::Failed { error, .. } => Some(error),
        }
    }
}
