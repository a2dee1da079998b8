//! Error kinds raised while admitting plugins and dispatching hooks.
//!
//! Load, validation, dependency, and initialize failures are caught at the
//! point a single plugin is admitted and reported on the system event
//! stream. Only [`PluginNotFoundError`] reaches callers directly, and
//! [`HandlerError`] travels inline in dispatch results.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use hookhost_core::error::{AppError, ErrorKind};

/// Turning a source location into a module value failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// Nothing exists at the source location.
    #[error("source not found: {}", .location.display())]
    NotFound {
        /// Source location.
        location: PathBuf,
    },
    /// The module could not be evaluated (syntax error, runtime error, bad library).
    #[error("failed to evaluate {}: {message}", .location.display())]
    Evaluation {
        /// Source location.
        location: PathBuf,
        /// Evaluation failure.
        message: String,
    },
    /// Evaluation succeeded but produced nothing usable as a module.
    #[error("{} produced no usable export: {detail}", .location.display())]
    NoExport {
        /// Source location.
        location: PathBuf,
        /// What was wrong with the export.
        detail: String,
    },
    /// No loader strategy handles this kind of source.
    #[error("no loader registered for {}", .location.display())]
    Unsupported {
        /// Source location.
        location: PathBuf,
    },
}

/// A loaded module does not satisfy the plugin contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// `name` is absent, empty, or not a string.
    #[error("plugin module must declare a non-empty name")]
    MissingName,
    /// A hook entry is not callable.
    #[error("hook {0} must be a function")]
    HookNotCallable(String),
    /// A hook entry has an empty name.
    #[error("hook names must be non-empty")]
    EmptyHookName,
    /// A metadata field has the wrong shape.
    #[error("{field} must be {expected}")]
    InvalidField {
        /// Offending field.
        field: String,
        /// Expected shape.
        expected: &'static str,
    },
}

/// A declared dependency is not in the `Loaded` state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("plugin '{plugin}' requires '{missing}', which is not loaded")]
pub struct DependencyError {
    /// Plugin whose admission was refused.
    pub plugin: String,
    /// First dependency found missing.
    pub missing: String,
}

/// An operation referenced a plugin name absent from the active table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("plugin '{0}' not found")]
pub struct PluginNotFoundError(pub String);

/// A hook handler failed (returned an error or panicked) during dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("handler for '{hook}' in plugin '{plugin}' failed: {message}")]
pub struct HandlerError {
    /// Owner of the failing handler.
    pub plugin: String,
    /// Hook being dispatched.
    pub hook: String,
    /// Failure description.
    pub message: String,
}

/// Any failure of a single load cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    /// See [`LoadError`].
    #[error(transparent)]
    Load(#[from] LoadError),
    /// See [`ValidationError`]; carries the declared name when there was one.
    #[error("{error}")]
    Validation {
        /// Declared plugin name, if any.
        plugin: Option<String>,
        /// Contract violation.
        error: ValidationError,
    },
    /// See [`DependencyError`].
    #[error(transparent)]
    Dependency(#[from] DependencyError),
    /// See [`PluginNotFoundError`].
    #[error(transparent)]
    NotFound(#[from] PluginNotFoundError),
    /// See [`HandlerError`].
    #[error(transparent)]
    Handler(#[from] HandlerError),
    /// The plugin's `initialize` call failed.
    #[error("plugin '{plugin}' failed to initialize: {message}")]
    Initialize {
        /// Plugin name.
        plugin: String,
        /// Failure description.
        message: String,
    },
}

impl PluginError {
    /// Stage of the load cycle this error belongs to.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Load(_) => "load",
            Self::Validation { .. } => "validation",
            Self::Dependency(_) => "dependency",
            Self::NotFound(_) => "lookup",
            Self::Handler(_) => "handler",
            Self::Initialize { .. } => "initialize",
        }
    }

    /// Plugin name associated with the failure, when known.
    pub fn plugin_name(&self) -> Option<&str> {
        match self {
            Self::Load(_) => None,
            Self::Validation { plugin, .. } => plugin.as_deref(),
            Self::Dependency(e) => Some(&e.plugin),
            Self::NotFound(e) => Some(&e.0),
            Self::Handler(e) => Some(&e.plugin),
            Self::Initialize { plugin, .. } => Some(plugin),
        }
    }
}

impl From<PluginError> for AppError {
    fn from(err: PluginError) -> Self {
        let kind = match &err {
            PluginError::NotFound(_) => ErrorKind::NotFound,
            PluginError::Validation { .. } | PluginError::Dependency(_) => ErrorKind::Validation,
            _ => ErrorKind::Plugin,
        };
        AppError::with_source(kind, err.to_string(), err)
    }
}

impl From<PluginNotFoundError> for AppError {
    fn from(err: PluginNotFoundError) -> Self {
        AppError::with_source(ErrorKind::NotFound, err.to_string(), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_not_callable_message() {
        let err = ValidationError::HookNotCallable("ping".into());
        assert_eq!(err.to_string(), "hook ping must be a function");
    }

    #[test]
    fn test_stage_and_name() {
        let err: PluginError = DependencyError {
            plugin: "b".into(),
            missing: "a".into(),
        }
        .into();
        assert_eq!(err.stage(), "dependency");
        assert_eq!(err.plugin_name(), Some("b"));

        let err: PluginError = LoadError::NotFound {
            location: PathBuf::from("plugins/x.json"),
        }
        .into();
        assert_eq!(err.stage(), "load");
        assert_eq!(err.plugin_name(), None);
        assert_eq!(err.to_string(), "source not found: plugins/x.json");
    }

    #[test]
    fn test_app_error_mapping() {
        let app: AppError = PluginNotFoundError("ghost".into()).into();
        assert_eq!(app.kind, ErrorKind::NotFound);

        let app: AppError = PluginError::Validation {
            plugin: None,
            error: ValidationError::MissingName,
        }
        .into();
        assert_eq!(app.kind, ErrorKind::Validation);
    }
}
