//! Hot-reload watcher using notify-debouncer-full.
//!
//! Filesystem events under the plugin directory are debounced, mapped back
//! to candidate sources, and handed one at a time, in arrival order, to the
//! change handler supplied by the manager.

use std::path::PathBuf;
use std::time::Duration;

use futures::future::BoxFuture;
use notify_debouncer_full::notify::{self, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, Debouncer, RecommendedCache, new_debouncer};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::discovery;

/// Callback invoked for each changed candidate source.
pub(crate) type ChangeHandler = Box<dyn Fn(PathBuf) -> BoxFuture<'static, ()> + Send + Sync>;

/// Watches the plugin directory until stopped.
pub(crate) struct PluginWatcher {
    debouncer: Option<Debouncer<RecommendedWatcher, RecommendedCache>>,
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for PluginWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginWatcher")
            .field("running", &self.task.is_some())
            .finish()
    }
}

impl PluginWatcher {
    /// Starts watching `root` recursively. Must be called inside a Tokio runtime.
    pub(crate) fn start(
        root: PathBuf,
        extensions: Vec<String>,
        debounce: Duration,
        on_change: ChangeHandler,
    ) -> Result<Self, notify::Error> {
        let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();
        let (cancel, mut cancelled) = watch::channel(false);

        let watch_root = root.clone();
        let mut debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    let mut sources: Vec<PathBuf> = Vec::new();
                    for event in &events {
                        for path in &event.paths {
                            if let Some(source) =
                                discovery::candidate_for(&watch_root, path, &extensions)
                            {
                                if !sources.contains(&source) {
                                    sources.push(source);
                                }
                            }
                        }
                    }
                    for source in sources {
                        debug!(source = %source.display(), "Plugin source changed");
                        if tx.send(source).is_err() {
                            return; // receiver dropped
                        }
                    }
                }
                Err(errors) => {
                    for e in errors {
                        warn!(error = %e, "Plugin watcher error");
                    }
                }
            }
        })?;

        debouncer.watch(&root, RecursiveMode::Recursive)?;
        info!(dir = %root.display(), "Hot reload enabled");

        let task = tokio::spawn(async move {
            loop {
                let source = tokio::select! {
                    biased;
                    _ = cancelled.changed() => break,
                    source = rx.recv() => match source {
                        Some(source) => source,
                        None => break,
                    },
                };
                // Handled outside `select!` so a stop never interrupts a reload.
                on_change(source).await;
            }
            debug!("Plugin watcher task finished");
        });

        Ok(Self {
            debouncer: Some(debouncer),
            cancel,
            task: Some(task),
        })
    }

    /// Stops watching and waits for an in-flight change to finish.
    pub(crate) async fn stop(mut self) {
        let _ = self.cancel.send(true);
        drop(self.debouncer.take());

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Plugin watcher task ended abnormally");
            }
        }
        info!("Hot reload stopped");
    }
}
