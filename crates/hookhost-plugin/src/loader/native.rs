//! In-process Rust modules.
//!
//! Modules compiled into the host register a factory under a source
//! location ending in `.native`. Each load calls the factory afresh, so
//! replacing a factory and reloading swaps the module.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use super::ModuleLoader;
use crate::error::LoadError;
use crate::exports::ModuleExport;
use crate::traits::panic_message;

/// Produces a fresh module export.
pub type ModuleFactory = Arc<dyn Fn() -> Result<ModuleExport, String> + Send + Sync>;

/// Registry of in-process module factories keyed by source location.
#[derive(Default)]
pub struct NativeLoader {
    factories: RwLock<HashMap<PathBuf, ModuleFactory>>,
}

impl std::fmt::Debug for NativeLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("NativeLoader")
            .field("modules", &factories.len())
            .finish()
    }
}

impl NativeLoader {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the factory for `source`.
    pub fn register<F>(&self, source: impl Into<PathBuf>, factory: F)
    where
        F: Fn() -> Result<ModuleExport, String> + Send + Sync + 'static,
    {
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(source.into(), Arc::new(factory));
    }
}

#[async_trait]
impl ModuleLoader for NativeLoader {
    fn extension(&self) -> &str {
        "native"
    }

    async fn load(&self, source: &Path) -> Result<ModuleExport, LoadError> {
        let factory = {
            let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
            factories.get(source).cloned()
        };
        let factory = factory.ok_or_else(|| LoadError::NotFound {
            location: source.to_path_buf(),
        })?;

        match std::panic::catch_unwind(AssertUnwindSafe(|| factory())) {
            Ok(Ok(export)) => Ok(export),
            Ok(Err(message)) => Err(LoadError::Evaluation {
                location: source.to_path_buf(),
                message,
            }),
            Err(panic) => Err(LoadError::Evaluation {
                location: source.to_path_buf(),
                message: format!("panicked: {}", panic_message(panic.as_ref())),
            }),
        }
    }
}
