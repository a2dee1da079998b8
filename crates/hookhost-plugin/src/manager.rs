//! Plugin manager: lifecycle management for all plugins.
//!
//! The manager owns the plugin table and the hook registry. Every table
//! mutation (load, unload, reload, watcher-driven changes, shutdown) runs
//! under one lifecycle lock, so a second change for the same plugin waits
//! for the first to finish. Hook dispatch never takes that lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

use hookhost_core::AppResult;
use hookhost_core::config::PluginConfig;
use hookhost_core::events::{SystemEvent, SystemEventKind};

use crate::config_store::ConfigStore;
use crate::dependency;
use crate::discovery;
use crate::error::{PluginError, PluginNotFoundError};
use crate::hooks::definitions::HookOutcome;
use crate::host::Host;
use crate::loader::LoaderSet;
use crate::registry::{FailedLoad, PluginEntry, PluginInfo, PluginStatus};
use crate::traits::guard_plugin_call;
use crate::validator::{self, ValidatedModule};
use crate::watcher::{ChangeHandler, PluginWatcher};

/// Runtime statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginStats {
    /// Entries in the plugin table, whatever their status.
    pub total_plugins: usize,
    /// Entries in the `Loaded` state.
    pub loaded_plugins: usize,
    /// Sources whose last load cycle failed.
    pub failed_plugins: usize,
    /// Distinct hook names with at least one handler.
    pub hook_count: usize,
    /// Total handler registrations.
    pub handler_count: usize,
    /// Seconds since the manager was created.
    pub uptime_seconds: u64,
}

#[derive(Debug, Default)]
struct ManagerState {
    /// Whether `system:ready` has been emitted.
    initialized: bool,
    /// Running watcher, if hot reload is active.
    watcher: Option<PluginWatcher>,
}

#[derive(Debug)]
struct ManagerInner {
    host: Arc<Host>,
    loaders: LoaderSet,
    settings: PluginConfig,
    /// Serializes every table mutation.
    lifecycle: Mutex<()>,
    /// Startup/shutdown bookkeeping. Acquired before `lifecycle`.
    state: Mutex<ManagerState>,
    started_at: Instant,
}

/// Manages the full lifecycle of plugins: discover, load, initialize, reload, unload.
#[derive(Debug, Clone)]
pub struct PluginManager {
    inner: Arc<ManagerInner>,
}

impl PluginManager {
    /// Creates a manager with explicit loader strategies.
    pub fn new(settings: PluginConfig, loaders: LoaderSet) -> Self {
        let host = Host::new(settings.config_dir(), settings.event_capacity);
        Self {
            inner: Arc::new(ManagerInner {
                host,
                loaders,
                settings,
                lifecycle: Mutex::new(()),
                state: Mutex::new(ManagerState::default()),
                started_at: Instant::now(),
            }),
        }
    }

    /// Creates a manager with the default loader strategies.
    pub fn from_config(settings: &PluginConfig) -> Self {
        Self::new(settings.clone(), LoaderSet::default_for(settings))
    }

    /// Startup sequence: ensure the plugin directory exists, load every
    /// discovered candidate, start the watcher, and signal `system:ready`.
    ///
    /// Calling it again rescans the directory and loads new candidates only.
    pub async fn initialize(&self) -> AppResult<()> {
        let mut state = self.inner.state.lock().await;
        let root = self.prepare_root().await?;

        if self.inner.settings.auto_load {
            let candidates = discovery::discover(&root, &self.inner.loaders.extensions()).await?;
            let _lifecycle = self.inner.lifecycle.lock().await;

            for source in candidates {
                let loaded = {
                    let table = self.inner.host.table.read().await;
                    table.is_source_loaded(&source)
                };
                if loaded {
                    debug!(source = %source.display(), "Plugin already loaded, skipping");
                    continue;
                }
                // Failures are recorded and reported; the pass continues.
                let _ = self.load_locked(&source).await;
            }
        }

        if self.inner.settings.hot_reload && state.watcher.is_none() {
            match self.start_watcher(root.clone()) {
                Ok(watcher) => state.watcher = Some(watcher),
                Err(e) => warn!(
                    dir = %root.display(),
                    error = %e,
                    "Failed to start plugin watcher, hot reload disabled"
                ),
            }
        }

        if !state.initialized {
            state.initialized = true;
            self.inner.host.events.publish(SystemEventKind::Ready);

            let stats = self.get_stats().await;
            info!(
                dir = %root.display(),
                loaded = stats.loaded_plugins,
                failed = stats.failed_plugins,
                "Plugin manager ready"
            );
        }

        Ok(())
    }

    /// Runs one load cycle for `source`.
    ///
    /// Failures are reported on the `plugin:error` system event and in
    /// [`failed_loads`](Self::failed_loads), never returned.
    pub async fn load_plugin(&self, source: impl AsRef<Path>) {
        let _ = self.try_load_plugin(source).await;
    }

    /// Runs one load cycle for `source` and returns the admitted plugin name.
    ///
    /// The failure is also reported exactly as with [`load_plugin`](Self::load_plugin).
    pub async fn try_load_plugin(&self, source: impl AsRef<Path>) -> Result<String, PluginError> {
        let source = normalize(source.as_ref()).await;
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.load_locked(&source).await
    }

    /// Unloads a plugin: removes its handlers, runs `cleanup`, drops the entry.
    ///
    /// Returns the final metadata with status `Unloaded`.
    pub async fn unload_plugin(&self, name: &str) -> Result<PluginInfo, PluginNotFoundError> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.teardown_locked(name)
            .await
            .ok_or_else(|| PluginNotFoundError(name.to_string()))
    }

    /// Unloads a plugin and loads its source again.
    ///
    /// Only an unknown name is an error; a failing load is reported like
    /// [`load_plugin`](Self::load_plugin).
    pub async fn reload_plugin(&self, name: &str) -> Result<(), PluginNotFoundError> {
        let _lifecycle = self.inner.lifecycle.lock().await;

        let source = {
            let table = self.inner.host.table.read().await;
            table.get(name).map(|info| info.source.clone())
        };
        let source = source.ok_or_else(|| PluginNotFoundError(name.to_string()))?;

        info!(plugin = %name, source = %source.display(), "Reloading plugin");
        self.teardown_locked(name).await;
        let _ = self.load_locked(&source).await;
        Ok(())
    }

    /// Emits a hook to every registered handler, in registration order.
    pub async fn emit_hook(&self, hook: &str, args: Vec<Value>) -> Vec<HookOutcome> {
        self.inner.host.emit_hook(hook, &args).await
    }

    /// Metadata of one plugin.
    pub async fn get_plugin(&self, name: &str) -> Option<PluginInfo> {
        let table = self.inner.host.table.read().await;
        table.get(name).cloned()
    }

    /// Metadata of every plugin in the table, ordered by name.
    pub async fn get_all_plugins(&self) -> Vec<PluginInfo> {
        let table = self.inner.host.table.read().await;
        table.list()
    }

    /// Sources whose last load cycle failed.
    pub async fn failed_loads(&self) -> Vec<FailedLoad> {
        let table = self.inner.host.table.read().await;
        table.failures()
    }

    /// Current statistics.
    pub async fn get_stats(&self) -> PluginStats {
        let (total_plugins, loaded_plugins, failed_plugins) = {
            let table = self.inner.host.table.read().await;
            (
                table.len(),
                table.count_with_status(PluginStatus::Loaded),
                table.failure_count(),
            )
        };

        PluginStats {
            total_plugins,
            loaded_plugins,
            failed_plugins,
            hook_count: self.inner.host.hooks.hook_names().await.len(),
            handler_count: self.inner.host.hooks.total_handlers().await,
            uptime_seconds: self.inner.started_at.elapsed().as_secs(),
        }
    }

    /// Stops the watcher, unloads every plugin, and signals `system:shutdown`.
    pub async fn shutdown(&self) {
        let mut state = self.inner.state.lock().await;

        if let Some(watcher) = state.watcher.take() {
            watcher.stop().await;
        }

        let _lifecycle = self.inner.lifecycle.lock().await;
        let names = {
            let table = self.inner.host.table.read().await;
            table.names()
        };
        let count = names.len();
        for name in names {
            self.teardown_locked(&name).await;
        }

        state.initialized = false;
        self.inner.host.events.publish(SystemEventKind::Shutdown);
        info!(unloaded = count, "Plugin manager shut down");
    }

    /// Subscribes to the system event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SystemEvent> {
        self.inner.host.events.subscribe()
    }

    /// Per-plugin config documents.
    pub fn config_store(&self) -> Arc<ConfigStore> {
        self.inner.host.config.clone()
    }

    /// Configured plugin directory.
    pub fn plugin_dir(&self) -> PathBuf {
        self.inner.settings.plugin_dir()
    }

    /// Whether the hot-reload watcher is running.
    pub async fn is_watching(&self) -> bool {
        self.inner.state.lock().await.watcher.is_some()
    }

    /// Applies a filesystem change to one candidate source.
    pub(crate) async fn handle_source_change(&self, source: &Path) {
        let _lifecycle = self.inner.lifecycle.lock().await;

        let exists = tokio::fs::try_exists(source).await.unwrap_or(false);
        let previous = {
            let table = self.inner.host.table.read().await;
            table.find_by_source(source)
        };

        if let Some(name) = &previous {
            info!(plugin = %name, source = %source.display(), "Plugin source changed");
            self.teardown_locked(name).await;
        }

        if exists {
            if previous.is_none() {
                info!(source = %source.display(), "New plugin source detected");
            }
            let _ = self.load_locked(source).await;
        } else {
            let mut table = self.inner.host.table.write().await;
            table.clear_failure(source);
            debug!(source = %source.display(), "Plugin source removed");
        }
    }

    async fn prepare_root(&self) -> AppResult<PathBuf> {
        let dir = self.inner.settings.plugin_dir();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(tokio::fs::canonicalize(&dir).await?)
    }

    fn start_watcher(
        &self,
        root: PathBuf,
    ) -> Result<PluginWatcher, notify_debouncer_full::notify::Error> {
        let weak = Arc::downgrade(&self.inner);
        let on_change: ChangeHandler = Box::new(move |source| {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    PluginManager { inner }.handle_source_change(&source).await;
                }
            }
            .boxed()
        });

        PluginWatcher::start(
            root,
            self.inner.loaders.extensions(),
            Duration::from_millis(self.inner.settings.watch_debounce_ms),
            on_change,
        )
    }

    /// One load cycle. Caller holds the lifecycle lock.
    async fn load_locked(&self, source: &Path) -> Result<String, PluginError> {
        self.inner
            .host
            .events
            .publish(SystemEventKind::BeforePluginLoad {
                source: source.display().to_string(),
            });

        match self.admit(source).await {
            Ok(name) => {
                self.inner
                    .host
                    .events
                    .publish(SystemEventKind::AfterPluginLoad { plugin: name.clone() });
                Ok(name)
            }
            Err(err) => {
                self.record_failure(source, &err).await;
                Err(err)
            }
        }
    }

    async fn admit(&self, source: &Path) -> Result<String, PluginError> {
        let host = &self.inner.host;

        let export = self.inner.loaders.load(source).await?;
        let declared = export.declared_name().map(str::to_string);
        let ValidatedModule {
            mut info,
            handlers,
            lifecycle,
        } = validator::validate(export, source).map_err(|error| PluginError::Validation {
            plugin: declared,
            error,
        })?;
        let name = info.name.clone();

        let resolved = {
            let table = host.table.read().await;
            dependency::resolve(&info, &table)
        };
        if let Err(e) = resolved {
            self.park_failed(info, &e.to_string()).await;
            return Err(e.into());
        }

        let previous = {
            let table = host.table.read().await;
            table.get(&name).map(|existing| existing.source.clone())
        };
        if let Some(previous) = previous {
            if previous != source {
                warn!(
                    plugin = %name,
                    previous = %previous.display(),
                    source = %source.display(),
                    "Plugin name already taken, replacing the previous entry"
                );
            }
            self.teardown_locked(&name).await;
        }

        let generation = host.next_generation();
        info.status = PluginStatus::Loaded;
        info.loaded_at = Some(Utc::now());
        info.error = None;
        let hook_count = handlers.len();
        let version = info.version.clone();

        {
            let mut table = host.table.write().await;
            table.insert(PluginEntry {
                info,
                lifecycle: lifecycle.clone(),
                generation,
            });
            table.clear_failure(source);
        }

        for (hook, handler) in handlers {
            host.hooks.register(&hook, &name, generation, handler).await;
        }

        if let Some(lifecycle) = lifecycle {
            let ctx = host.context(&name, generation);
            if let Err(message) = guard_plugin_call(lifecycle.initialize(ctx)).await {
                host.table.write().await.mark_failed(&name, &message);
                host.hooks.unregister_owner(&name).await;
                return Err(PluginError::Initialize {
                    plugin: name,
                    message,
                });
            }
        }

        info!(
            plugin = %name,
            version = %version,
            source = %source.display(),
            hooks = hook_count,
            "Plugin loaded"
        );
        Ok(name)
    }

    /// Leaves a `Failed` entry for a named plugin that could not be admitted,
    /// unless a loaded plugin already holds the name.
    async fn park_failed(&self, mut info: PluginInfo, reason: &str) {
        let mut table = self.inner.host.table.write().await;
        if table.is_loaded(&info.name) {
            return;
        }
        info.status = PluginStatus::Failed;
        info.loaded_at = None;
        info.error = Some(reason.to_string());
        table.insert(PluginEntry {
            info,
            lifecycle: None,
            generation: 0,
        });
    }

    async fn record_failure(&self, source: &Path, err: &PluginError) {
        let failure = FailedLoad {
            source: source.to_path_buf(),
            plugin: err.plugin_name().map(str::to_string),
            stage: err.stage().to_string(),
            message: err.to_string(),
            failed_at: Utc::now(),
        };

        warn!(
            source = %source.display(),
            plugin = failure.plugin.as_deref().unwrap_or("-"),
            stage = %failure.stage,
            error = %err,
            "Plugin failed to load"
        );

        self.inner
            .host
            .events
            .publish(SystemEventKind::PluginError {
                source: source.display().to_string(),
                plugin: failure.plugin.clone(),
                stage: failure.stage.clone(),
                message: failure.message.clone(),
            });
        self.inner.host.table.write().await.record_failure(failure);
    }

    /// Removes a plugin. Caller holds the lifecycle lock.
    async fn teardown_locked(&self, name: &str) -> Option<PluginInfo> {
        let host = &self.inner.host;

        let present = {
            let table = host.table.read().await;
            table.entry(name).is_some()
        };
        if !present {
            return None;
        }

        host.events.publish(SystemEventKind::BeforePluginUnload {
            plugin: name.to_string(),
        });

        // The entry goes first so stale contexts can no longer register.
        let entry = host.table.write().await.remove(name)?;
        let removed = host.hooks.unregister_owner(name).await;

        if entry.info.status == PluginStatus::Loaded {
            if let Some(lifecycle) = &entry.lifecycle {
                if let Err(e) = guard_plugin_call(lifecycle.cleanup()).await {
                    warn!(plugin = %name, error = %e, "Plugin cleanup returned error");
                }
            }
        }

        host.table.write().await.clear_failure(&entry.info.source);
        self.inner.loaders.invalidate(&entry.info.source);

        host.events.publish(SystemEventKind::AfterPluginUnload {
            plugin: name.to_string(),
        });
        info!(plugin = %name, handlers = removed, "Plugin unloaded");

        let mut info = entry.info;
        info.status = PluginStatus::Unloaded;
        Some(info)
    }
}

/// Canonical form of an existing source; the path as given otherwise.
async fn normalize(source: &Path) -> PathBuf {
    tokio::fs::canonicalize(source)
        .await
        .unwrap_or_else(|_| source.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DependencyError, LoadError, ValidationError};
    use crate::exports::ModuleExport;
    use crate::loader::{ManifestLoader, NativeLoader};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        _dir: tempfile::TempDir,
        native: Arc<NativeLoader>,
        manager: PluginManager,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut settings = PluginConfig::with_directory(dir.path().join("plugins"));
        settings.hot_reload = false;

        let native = Arc::new(NativeLoader::new());
        let loaders = LoaderSet::new()
            .with(Arc::new(ManifestLoader::default()))
            .with(native.clone());

        Fixture {
            _dir: dir,
            native,
            manager: PluginManager::new(settings, loaders),
        }
    }

    fn source(name: &str) -> PathBuf {
        PathBuf::from(format!("/virtual/{name}.native"))
    }

    fn replying(name: &str, hook: &str, reply: Value) -> ModuleExport {
        ModuleExport::builder()
            .name(name)
            .hook_fn(hook, move |_, _| {
                let reply = reply.clone();
                async move { Ok(reply) }
            })
            .build()
    }

    fn drain(rx: &mut broadcast::Receiver<SystemEvent>) -> Vec<SystemEventKind> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event.kind);
        }
        events
    }

    #[tokio::test]
    async fn test_valid_module_is_loaded() {
        let f = fixture();
        f.native
            .register(source("a"), || Ok(replying("a", "ping", json!("pong"))));

        let mut rx = f.manager.subscribe();
        f.manager.load_plugin(source("a")).await;

        let info = f.manager.get_plugin("a").await.expect("plugin");
        assert_eq!(info.status, PluginStatus::Loaded);
        assert_eq!(info.hooks, vec!["ping"]);
        assert!(info.loaded_at.is_some());

        let outcomes = f.manager.emit_hook("ping", vec![]).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].plugin(), "a");
        assert_eq!(outcomes[0].result(), Some(&json!("pong")));

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                SystemEventKind::BeforePluginLoad {
                    source: source("a").display().to_string()
                },
                SystemEventKind::AfterPluginLoad { plugin: "a".into() },
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_name_is_reported_not_admitted() {
        let f = fixture();
        f.native
            .register(source("x"), || Ok(ModuleExport::builder().version("1.0.0").build()));

        let mut rx = f.manager.subscribe();
        let err = f.manager.try_load_plugin(source("x")).await.unwrap_err();

        assert!(matches!(
            err,
            PluginError::Validation {
                error: ValidationError::MissingName,
                ..
            }
        ));
        assert!(f.manager.get_all_plugins().await.is_empty());
        assert!(drain(&mut rx).iter().any(|kind| matches!(
            kind,
            SystemEventKind::PluginError { stage, .. } if stage == "validation"
        )));

        let failed = f.manager.failed_loads().await;
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].source, source("x"));
    }

    #[tokio::test]
    async fn test_load_error_is_reported() {
        let f = fixture();
        let err = f.manager.try_load_plugin(source("ghost")).await.unwrap_err();
        assert!(matches!(err, PluginError::Load(LoadError::NotFound { .. })));
        assert_eq!(f.manager.get_stats().await.failed_plugins, 1);
    }

    #[tokio::test]
    async fn test_dependency_must_be_loaded_first() {
        let f = fixture();
        f.native.register(source("b"), || {
            Ok(ModuleExport::builder().name("b").dependency("a").build())
        });
        f.native
            .register(source("a"), || Ok(ModuleExport::builder().name("a").build()));

        let err = f.manager.try_load_plugin(source("b")).await.unwrap_err();
        assert_eq!(
            err,
            PluginError::Dependency(DependencyError {
                plugin: "b".into(),
                missing: "a".into(),
            })
        );
        let parked = f.manager.get_plugin("b").await.expect("failed entry");
        assert_eq!(parked.status, PluginStatus::Failed);
        assert!(parked.error.is_some_and(|e| e.contains("'a'")));

        f.manager.load_plugin(source("a")).await;
        f.manager.reload_plugin("b").await.unwrap();

        assert_eq!(
            f.manager.get_plugin("b").await.map(|i| i.status),
            Some(PluginStatus::Loaded)
        );
        assert!(f.manager.failed_loads().await.is_empty());
    }

    #[tokio::test]
    async fn test_unload_removes_every_handler() {
        let f = fixture();
        f.native.register(source("a"), || {
            Ok(ModuleExport::builder()
                .name("a")
                .hook_fn("h", |_, _| async { Ok(json!(1)) })
                .hook_fn("other", |_, _| async { Ok(json!(2)) })
                .build())
        });
        f.native
            .register(source("b"), || Ok(replying("b", "h", json!("b"))));
        f.manager.load_plugin(source("a")).await;
        f.manager.load_plugin(source("b")).await;

        let info = f.manager.unload_plugin("a").await.unwrap();
        assert_eq!(info.status, PluginStatus::Unloaded);

        let outcomes = f.manager.emit_hook("h", vec![]).await;
        assert!(outcomes.iter().all(|o| o.plugin() != "a"));
        assert_eq!(outcomes.len(), 1);
        assert!(f.manager.emit_hook("other", vec![]).await.is_empty());
        assert!(f.manager.get_plugin("a").await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_names_are_not_found() {
        let f = fixture();
        assert_eq!(
            f.manager.unload_plugin("ghost").await.unwrap_err(),
            PluginNotFoundError("ghost".into())
        );
        assert_eq!(
            f.manager.reload_plugin("ghost").await.unwrap_err(),
            PluginNotFoundError("ghost".into())
        );
    }

    #[tokio::test]
    async fn test_initialize_failure_marks_failed_and_drops_handlers() {
        let f = fixture();
        f.native.register(source("a"), || {
            Ok(ModuleExport::builder()
                .name("a")
                .hook_fn("h", |_, _| async { Ok(json!(1)) })
                .on_initialize(|ctx| async move {
                    ctx.register_hook("extra", noop_handler()).await.map_err(|e| e.to_string())?;
                    Err("database unreachable".to_string())
                })
                .build())
        });

        let mut rx = f.manager.subscribe();
        let err = f.manager.try_load_plugin(source("a")).await.unwrap_err();

        assert_eq!(err.stage(), "initialize");
        let info = f.manager.get_plugin("a").await.expect("entry");
        assert_eq!(info.status, PluginStatus::Failed);
        assert_eq!(info.error.as_deref(), Some("database unreachable"));
        assert!(f.manager.emit_hook("h", vec![]).await.is_empty());
        assert!(f.manager.emit_hook("extra", vec![]).await.is_empty());
        assert!(!drain(&mut rx)
            .iter()
            .any(|kind| matches!(kind, SystemEventKind::AfterPluginLoad { .. })));
    }

    #[tokio::test]
    async fn test_initialize_panic_is_contained() {
        let f = fixture();
        f.native.register(source("a"), || {
            Ok(ModuleExport::builder()
                .name("a")
                .on_initialize(|_| async {
                    if true {
                        panic!("init exploded");
                    }
                    Ok(())
                })
                .build())
        });

        let err = f.manager.try_load_plugin(source("a")).await.unwrap_err();
        assert!(err.to_string().contains("init exploded"));
        assert_eq!(
            f.manager.get_plugin("a").await.map(|i| i.status),
            Some(PluginStatus::Failed)
        );
    }

    #[tokio::test]
    async fn test_cleanup_runs_once_and_failure_does_not_block() {
        let f = fixture();
        let cleanups = Arc::new(AtomicUsize::new(0));
        let counter = cleanups.clone();
        f.native.register(source("a"), move || {
            let counter = counter.clone();
            Ok(ModuleExport::builder()
                .name("a")
                .on_cleanup(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err("disk full".to_string())
                    }
                })
                .build())
        });

        f.manager.load_plugin(source("a")).await;
        assert!(f.manager.unload_plugin("a").await.is_ok());
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        assert!(f.manager.get_plugin("a").await.is_none());
        assert!(f.manager.unload_plugin("a").await.is_err());
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unloading_failed_entry_skips_cleanup() {
        let f = fixture();
        let cleanups = Arc::new(AtomicUsize::new(0));
        let counter = cleanups.clone();
        f.native.register(source("a"), move || {
            let counter = counter.clone();
            Ok(ModuleExport::builder()
                .name("a")
                .on_initialize(|_| async { Err("nope".to_string()) })
                .on_cleanup(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                })
                .build())
        });

        f.manager.load_plugin(source("a")).await;
        assert!(f.manager.unload_plugin("a").await.is_ok());
        assert_eq!(cleanups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_duplicate_name_replaces_previous_entry() {
        let f = fixture();
        let cleanups = Arc::new(AtomicUsize::new(0));
        let counter = cleanups.clone();
        f.native.register(source("first"), move || {
            let counter = counter.clone();
            Ok(ModuleExport::builder()
                .name("dup")
                .hook_fn("h", |_, _| async { Ok(json!("first")) })
                .on_cleanup(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                })
                .build())
        });
        f.native
            .register(source("second"), || Ok(replying("dup", "h", json!("second"))));

        f.manager.load_plugin(source("first")).await;
        f.manager.load_plugin(source("second")).await;

        let all = f.manager.get_all_plugins().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].source, source("second"));
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);

        let outcomes = f.manager.emit_hook("h", vec![]).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].result(), Some(&json!("second")));
    }

    #[tokio::test]
    async fn test_reload_reappends_and_invalidates_old_context() {
        let f = fixture();
        let contexts = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = contexts.clone();
        f.native.register(source("a"), move || {
            let seen = seen.clone();
            Ok(ModuleExport::builder()
                .name("a")
                .hook_fn("h", |_, _| async { Ok(json!("a")) })
                .on_initialize(move |ctx| {
                    let seen = seen.clone();
                    async move {
                        seen.lock().expect("lock").push(ctx);
                        Ok(())
                    }
                })
                .build())
        });
        f.native
            .register(source("b"), || Ok(replying("b", "h", json!("b"))));

        f.manager.load_plugin(source("a")).await;
        f.manager.load_plugin(source("b")).await;
        f.manager.reload_plugin("a").await.unwrap();

        let order: Vec<String> = f
            .manager
            .emit_hook("h", vec![])
            .await
            .iter()
            .map(|o| o.plugin().to_string())
            .collect();
        assert_eq!(order, vec!["b", "a"]);

        let (stale, current) = {
            let contexts = contexts.lock().expect("lock");
            assert_eq!(contexts.len(), 2);
            (contexts[0].clone(), contexts[1].clone())
        };
        assert!(stale
            .register_hook("late", noop_handler())
            .await
            .is_err());
        assert!(current
            .register_hook("late", noop_handler())
            .await
            .is_ok());
        assert_eq!(f.manager.emit_hook("late", vec![]).await.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reloads_never_expose_two_instances() {
        let f = fixture();
        let initialized = Arc::new(AtomicUsize::new(0));
        let cleaned = Arc::new(AtomicUsize::new(0));
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let counters = (initialized.clone(), cleaned.clone(), live.clone(), peak.clone());
        f.native.register(source("a"), move || {
            let (initialized, cleaned, live, peak) = counters.clone();
            let live_on_cleanup = live.clone();
            Ok(ModuleExport::builder()
                .name("a")
                .hook_fn("h", |_, _| async {
                    tokio::task::yield_now().await;
                    Ok(json!("a"))
                })
                .on_initialize(move |_| {
                    let (initialized, live, peak) =
                        (initialized.clone(), live.clone(), peak.clone());
                    async move {
                        tokio::task::yield_now().await;
                        initialized.fetch_add(1, Ordering::SeqCst);
                        let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        Ok(())
                    }
                })
                .on_cleanup(move || {
                    let (cleaned, live) = (cleaned.clone(), live_on_cleanup.clone());
                    async move {
                        tokio::task::yield_now().await;
                        cleaned.fetch_add(1, Ordering::SeqCst);
                        live.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    }
                })
                .build())
        });
        f.manager.load_plugin(source("a")).await;

        let emits = async {
            let mut per_emit = Vec::new();
            for _ in 0..50 {
                let outcomes = f.manager.emit_hook("h", vec![]).await;
                per_emit.push(outcomes.iter().filter(|o| o.plugin() == "a").count());
                tokio::task::yield_now().await;
            }
            per_emit
        };
        let (first, second, per_emit) = tokio::join!(
            f.manager.reload_plugin("a"),
            f.manager.reload_plugin("a"),
            emits
        );
        first.unwrap();
        second.unwrap();

        assert!(per_emit.iter().all(|&n| n <= 1), "{per_emit:?}");
        assert_eq!(f.manager.emit_hook("h", vec![]).await.len(), 1);
        assert_eq!(initialized.load(Ordering::SeqCst), 3);
        assert_eq!(cleaned.load(Ordering::SeqCst), 2);
        assert_eq!(live.load(Ordering::SeqCst), 1);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_old_context_cannot_unregister_reloaded_handlers() {
        let f = fixture();
        let contexts = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = contexts.clone();
        f.native.register(source("a"), move || {
            let seen = seen.clone();
            Ok(ModuleExport::builder()
                .name("a")
                .hook_fn("h", |_, _| async { Ok(json!("a")) })
                .on_initialize(move |ctx| {
                    let seen = seen.clone();
                    async move {
                        seen.lock().expect("lock").push(ctx);
                        Ok(())
                    }
                })
                .build())
        });

        f.manager.load_plugin(source("a")).await;
        f.manager.reload_plugin("a").await.unwrap();

        let (stale, current) = {
            let contexts = contexts.lock().expect("lock");
            (contexts[0].clone(), contexts[1].clone())
        };

        assert_eq!(stale.unregister_hook("h").await, 0);
        let outcomes = f.manager.emit_hook("h", vec![]).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].result(), Some(&json!("a")));

        assert_eq!(current.unregister_hook("h").await, 1);
        assert!(f.manager.emit_hook("h", vec![]).await.is_empty());
    }

    #[tokio::test]
    async fn test_capability_object_from_initialize() {
        let f = fixture();
        f.native
            .register(source("base"), || Ok(ModuleExport::builder().name("base").version("3.0.0").build()));
        f.native.register(source("a"), || {
            Ok(ModuleExport::builder()
                .name("a")
                .dependency("base")
                .on_initialize(|ctx| async move {
                    let base = ctx.plugin("base").await.ok_or("base missing")?;
                    ctx.config_set("base_version", json!(base.version))
                        .await
                        .map_err(|e| e.to_string())?;
                    ctx.register_hook(
                        "version",
                        crate::traits::ClosureHandler::wrap(|ctx, _| async move {
                            ctx.config_get(Some("base_version"))
                                .await
                                .ok_or_else(|| "unset".to_string())
                        }),
                    )
                    .await
                    .map_err(|e| e.to_string())?;
                    ctx.logger().info("ready");
                    Ok(())
                })
                .build())
        });

        f.manager.load_plugin(source("base")).await;
        f.manager.load_plugin(source("a")).await;

        let outcomes = f.manager.emit_hook("version", vec![]).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].result(), Some(&json!("3.0.0")));
        assert_eq!(
            f.manager.config_store().get("a", Some("base_version")).await,
            Some(json!("3.0.0"))
        );
    }

    #[tokio::test]
    async fn test_stats() {
        let f = fixture();
        f.native.register(source("a"), || {
            Ok(ModuleExport::builder()
                .name("a")
                .hook_fn("h1", |_, _| async { Ok(Value::Null) })
                .hook_fn("h2", |_, _| async { Ok(Value::Null) })
                .build())
        });
        f.native
            .register(source("b"), || Ok(replying("b", "h1", Value::Null)));
        f.native
            .register(source("c"), || Ok(ModuleExport::builder().name("c").dependency("zzz").build()));

        f.manager.load_plugin(source("a")).await;
        f.manager.load_plugin(source("b")).await;
        f.manager.load_plugin(source("c")).await;

        let stats = f.manager.get_stats().await;
        assert_eq!(stats.total_plugins, 3);
        assert_eq!(stats.loaded_plugins, 2);
        assert_eq!(stats.failed_plugins, 1);
        assert_eq!(stats.hook_count, 2);
        assert_eq!(stats.handler_count, 3);
    }

    #[tokio::test]
    async fn test_shutdown_unloads_everything() {
        let f = fixture();
        f.native
            .register(source("a"), || Ok(replying("a", "h", json!(1))));
        f.native
            .register(source("b"), || Ok(replying("b", "h", json!(2))));
        f.manager.initialize().await.unwrap();
        f.manager.load_plugin(source("a")).await;
        f.manager.load_plugin(source("b")).await;

        let mut rx = f.manager.subscribe();
        f.manager.shutdown().await;

        assert!(f.manager.get_all_plugins().await.is_empty());
        assert!(f.manager.emit_hook("h", vec![]).await.is_empty());
        let events = drain(&mut rx);
        assert_eq!(events.last(), Some(&SystemEventKind::Shutdown));
        assert_eq!(
            events
                .iter()
                .filter(|k| matches!(k, SystemEventKind::AfterPluginUnload { .. }))
                .count(),
            2
        );
    }

    fn noop_handler() -> Arc<dyn crate::hooks::registry::HookHandler> {
        crate::traits::ClosureHandler::wrap(|_, _| async { Ok(Value::Null) })
    }
}
