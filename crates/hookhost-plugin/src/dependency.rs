//! Dependency checks against the active plugin table.
//!
//! Resolution is a containment check. Load order is the caller's concern.

use crate::error::DependencyError;
use crate::registry::{PluginInfo, PluginTable};

/// Passes when every declared dependency is `Loaded`; otherwise names the first missing one.
pub fn resolve(info: &PluginInfo, table: &PluginTable) -> Result<(), DependencyError> {
    match info
        .dependencies
        .iter()
        .find(|dependency| !table.is_loaded(dependency))
    {
        Some(missing) => Err(DependencyError {
            plugin: info.name.clone(),
            missing: missing.clone(),
        }),
        None => Ok(()),
    }
}
