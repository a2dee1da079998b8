//! Module validation against the plugin contract.
//!
//! Validation only inspects the export. It never calls into plugin code.

use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::exports::{HookExport, ModuleExport};
use crate::hooks::registry::HookHandler;
use crate::registry::{PluginInfo, PluginStatus};
use crate::traits::PluginLifecycle;

/// Version assumed when a module does not declare one.
pub const DEFAULT_VERSION: &str = "1.0.0";

/// Metadata keys that must never remain in the loose metadata map.
const CALLABLE_KEYS: [&str; 3] = ["hooks", "initialize", "cleanup"];

/// An export that passed validation.
#[derive(Debug)]
pub struct ValidatedModule {
    /// Normalized record skeleton (status `Loaded`, not yet admitted).
    pub info: PluginInfo,
    /// Declared handlers, in declaration order.
    pub handlers: Vec<(String, Arc<dyn HookHandler>)>,
    /// `initialize` / `cleanup`, if exported.
    pub lifecycle: Option<Arc<dyn PluginLifecycle>>,
}

/// Checks `export` and produces a normalized record.
pub fn validate(export: ModuleExport, source: &Path) -> Result<ValidatedModule, ValidationError> {
    let ModuleExport {
        metadata,
        hooks,
        lifecycle,
    } = export;

    let name = match metadata.get("name") {
        Some(Value::String(name)) if !name.trim().is_empty() => name.clone(),
        _ => return Err(ValidationError::MissingName),
    };

    if let Some(key) = CALLABLE_KEYS.iter().find(|key| metadata.contains_key(**key)) {
        return Err(ValidationError::InvalidField {
            field: (*key).to_string(),
            expected: if *key == "hooks" {
                "a mapping of hook names to functions"
            } else {
                "a function"
            },
        });
    }

    let version = optional_string(&metadata, "version")?.unwrap_or_else(|| DEFAULT_VERSION.to_string());
    let description = optional_string(&metadata, "description")?.unwrap_or_default();
    let author = optional_string(&metadata, "author")?.unwrap_or_default();
    let dependencies = string_set(&metadata, "dependencies")?;
    let permissions = string_set(&metadata, "permissions")?;

    let mut handlers = Vec::new();
    for (hook, entry) in hooks.unwrap_or_default() {
        if hook.is_empty() {
            return Err(ValidationError::EmptyHookName);
        }
        match entry {
            HookExport::Handler(handler) => handlers.push((hook, handler)),
            HookExport::NotCallable(_) => return Err(ValidationError::HookNotCallable(hook)),
        }
    }

    let info = PluginInfo {
        name,
        version,
        description,
        author,
        dependencies,
        permissions,
        hooks: handlers.iter().map(|(hook, _)| hook.clone()).collect(),
        source: source.to_path_buf(),
        status: PluginStatus::Loaded,
        loaded_at: None,
        error: None,
    };

    Ok(ValidatedModule {
        info,
        handlers,
        lifecycle,
    })
}

fn optional_string(
    metadata: &Map<String, Value>,
    field: &str,
) -> Result<Option<String>, ValidationError> {
    match metadata.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ValidationError::InvalidField {
            field: field.to_string(),
            expected: "a string",
        }),
    }
}

/// Reads a list of strings, keeping the first occurrence of each.
fn string_set(metadata: &Map<String, Value>, field: &str) -> Result<Vec<String>, ValidationError> {
    let invalid = || ValidationError::InvalidField {
        field: field.to_string(),
        expected: "a list of strings",
    };

    let items = match metadata.get(field) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(invalid()),
    };

    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let s = item.as_str().ok_or_else(invalid)?;
        if !out.iter().any(|existing| existing == s) {
            out.push(s.to_string());
        }
    }
    Ok(out)
}
