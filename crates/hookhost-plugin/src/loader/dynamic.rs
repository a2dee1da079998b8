//! Shared-library modules using `libloading` (feature `dynamic`).
//!
//! Each load copies the library to a unique scratch path before opening it,
//! so a rebuilt library is really re-evaluated instead of being served from
//! the dynamic linker's cache. A library stays open while any of its
//! handlers or lifecycle hooks is alive, and closes once the plugin that
//! loaded it is unloaded.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use libloading::Library;
use serde_json::Value;
use tracing::info;

use super::ModuleLoader;
use crate::api::context::PluginContext;
use crate::error::LoadError;
use crate::exports::{HookExport, ModuleExport};
use crate::ffi::abi::{
    CLEANUP_SYMBOL, FREE_STRING_SYMBOL, FfiFreeStringFn, FfiInvokeFn, FfiLifecycleFn, FfiModuleFn,
    INITIALIZE_SYMBOL, INVOKE_SYMBOL, MODULE_SYMBOL,
};
use crate::ffi::safety::{parse_invoke_result, string_to_c_string, take_library_string};
use crate::hooks::registry::HookHandler;
use crate::traits::PluginLifecycle;

/// Resolved entry points of one opened library.
#[derive(Clone, Copy)]
struct ModuleSymbols {
    module: FfiModuleFn,
    invoke: FfiInvokeFn,
    free: FfiFreeStringFn,
    initialize: Option<FfiLifecycleFn>,
    cleanup: Option<FfiLifecycleFn>,
}

impl ModuleSymbols {
    /// # Safety
    /// The library must follow the hookhost C ABI.
    unsafe fn resolve(library: &Library) -> Result<Self, String> {
        let required = |symbol: &[u8]| {
            String::from_utf8_lossy(symbol.strip_suffix(b"\0").unwrap_or(symbol)).into_owned()
        };
        unsafe {
            Ok(Self {
                module: *library
                    .get::<FfiModuleFn>(MODULE_SYMBOL)
                    .map_err(|e| format!("missing '{}': {e}", required(MODULE_SYMBOL)))?,
                invoke: *library
                    .get::<FfiInvokeFn>(INVOKE_SYMBOL)
                    .map_err(|e| format!("missing '{}': {e}", required(INVOKE_SYMBOL)))?,
                free: *library
                    .get::<FfiFreeStringFn>(FREE_STRING_SYMBOL)
                    .map_err(|e| format!("missing '{}': {e}", required(FREE_STRING_SYMBOL)))?,
                initialize: library.get::<FfiLifecycleFn>(INITIALIZE_SYMBOL).ok().map(|s| *s),
                cleanup: library.get::<FfiLifecycleFn>(CLEANUP_SYMBOL).ok().map(|s| *s),
            })
        }
    }
}

/// Loads modules from shared libraries (.so / .dylib / .dll).
#[derive(Debug)]
pub struct DynamicLoader {
    /// Counter for scratch copy names.
    copies: AtomicU64,
}

impl Default for DynamicLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicLoader {
    /// Creates a new dynamic loader.
    pub fn new() -> Self {
        Self {
            copies: AtomicU64::new(0),
        }
    }

    fn scratch_path(&self, source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("module");
        let n = self.copies.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!(
            "hookhost-{stem}-{}-{n}.{}",
            std::process::id(),
            std::env::consts::DLL_EXTENSION
        ))
    }
}

#[async_trait]
impl ModuleLoader for DynamicLoader {
    fn extension(&self) -> &str {
        std::env::consts::DLL_EXTENSION
    }

    async fn load(&self, source: &Path) -> Result<ModuleExport, LoadError> {
        let evaluation = |message: String| LoadError::Evaluation {
            location: source.to_path_buf(),
            message,
        };

        if !tokio::fs::try_exists(source).await.unwrap_or(false) {
            return Err(LoadError::NotFound {
                location: source.to_path_buf(),
            });
        }

        let scratch = self.scratch_path(source);
        tokio::fs::copy(source, &scratch)
            .await
            .map_err(|e| evaluation(format!("failed to stage library: {e}")))?;

        let (library, symbols, manifest) = tokio::task::spawn_blocking(move || open(&scratch))
            .await
            .map_err(|e| evaluation(e.to_string()))?
            .map_err(evaluation)?;

        let document: Value = serde_json::from_str(&manifest)
            .map_err(|e| evaluation(format!("invalid module manifest: {e}")))?;
        let Value::Object(mut metadata) = document else {
            return Err(LoadError::NoExport {
                location: source.to_path_buf(),
                detail: "module manifest must be a JSON object".to_string(),
            });
        };

        let hooks = match metadata.remove("hooks") {
            None | Some(Value::Null) => None,
            Some(Value::Array(names)) => Some(
                names
                    .into_iter()
                    .map(|entry| match entry {
                        Value::String(hook) => {
                            let handler = DynamicHandler {
                                library: library.clone(),
                                symbols,
                                hook: hook.clone(),
                            };
                            (hook, HookExport::Handler(Arc::new(handler)))
                        }
                        other => (other.to_string(), HookExport::NotCallable(other)),
                    })
                    .collect(),
            ),
            Some(other) => {
                metadata.insert("hooks".to_string(), other);
                None
            }
        };

        let lifecycle = (symbols.initialize.is_some() || symbols.cleanup.is_some()).then(|| {
            Arc::new(DynamicLifecycle {
                library: library.clone(),
                symbols,
            }) as Arc<dyn PluginLifecycle>
        });

        info!(source = %source.display(), "Dynamic module loaded");

        Ok(ModuleExport {
            metadata,
            hooks,
            lifecycle,
        })
    }
}

/// Opens the staged copy and reads its manifest.
fn open(path: &Path) -> Result<(Arc<Library>, ModuleSymbols, String), String> {
    // SAFETY: loading a module runs its initializers; modules run with full host trust.
    let library = unsafe { Library::new(path) };

    #[cfg(unix)]
    let _ = std::fs::remove_file(path);

    let library = library.map_err(|e| e.to_string())?;
    let symbols = unsafe { ModuleSymbols::resolve(&library) }?;
    let manifest = unsafe { take_library_string((symbols.module)(), symbols.free) }
        .ok_or_else(|| "hookhost_module returned no manifest".to_string())?;

    Ok((Arc::new(library), symbols, manifest))
}

/// Handler that forwards to `hookhost_invoke`.
struct DynamicHandler {
    library: Arc<Library>,
    symbols: ModuleSymbols,
    hook: String,
}

impl std::fmt::Debug for DynamicHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicHandler")
            .field("hook", &self.hook)
            .finish()
    }
}

#[async_trait]
impl HookHandler for DynamicHandler {
    async fn handle(&self, _ctx: &PluginContext, args: &[Value]) -> Result<Value, String> {
        let hook = string_to_c_string(&self.hook).ok_or("hook name contains a null byte")?;
        let args = string_to_c_string(&Value::from(args.to_vec()).to_string())
            .ok_or("arguments contain a null byte")?;
        let library = self.library.clone();
        let symbols = self.symbols;

        let raw = tokio::task::spawn_blocking(move || {
            let _library = library;
            // SAFETY: both pointers outlive the call; the result is released by the library.
            unsafe {
                let out = (symbols.invoke)(hook.as_ptr(), args.as_ptr());
                take_library_string(out, symbols.free)
            }
        })
        .await
        .map_err(|e| e.to_string())?
        .ok_or("hookhost_invoke returned no result")?;

        parse_invoke_result(&raw)
    }
}

/// `hookhost_initialize` / `hookhost_cleanup`.
struct DynamicLifecycle {
    library: Arc<Library>,
    symbols: ModuleSymbols,
}

impl std::fmt::Debug for DynamicLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicLifecycle")
            .field("initialize", &self.symbols.initialize.is_some())
            .field("cleanup", &self.symbols.cleanup.is_some())
            .finish()
    }
}

impl DynamicLifecycle {
    async fn call(&self, step: &'static str, f: Option<FfiLifecycleFn>) -> Result<(), String> {
        let Some(f) = f else {
            return Ok(());
        };
        let library = self.library.clone();
        let code = tokio::task::spawn_blocking(move || {
            let _library = library;
            // SAFETY: the symbol belongs to the library kept alive above.
            unsafe { f() }
        })
        .await
        .map_err(|e| e.to_string())?;

        if code == 0 {
            Ok(())
        } else {
            Err(format!("{step} returned {code}"))
        }
    }
}

#[async_trait]
impl PluginLifecycle for DynamicLifecycle {
    async fn initialize(&self, _ctx: PluginContext) -> Result<(), String> {
        self.call("hookhost_initialize", self.symbols.initialize).await
    }

    async fn cleanup(&self) -> Result<(), String> {
        self.call("hookhost_cleanup", self.symbols.cleanup).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_library_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir
            .path()
            .join(format!("a.{}", std::env::consts::DLL_EXTENSION));
        let err = DynamicLoader::new().load(&path).await.unwrap_err();
        assert!(matches!(err, LoadError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_garbage_library_fails_evaluation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir
            .path()
            .join(format!("a.{}", std::env::consts::DLL_EXTENSION));
        std::fs::write(&path, b"not a shared library").unwrap();

        let loader = DynamicLoader::new();
        let err = loader.load(&path).await.unwrap_err();
        assert!(matches!(err, LoadError::Evaluation { .. }));
        assert_ne!(loader.scratch_path(&path), loader.scratch_path(&path));
    }
}
