//! JSON manifest modules.
//!
//! A manifest is a JSON object with the plugin metadata fields. Hooks and
//! the `initialize`/`cleanup` steps are declarative handler specs:
//!
//! ```json
//! {
//!   "name": "greeter",
//!   "dependencies": ["storage"],
//!   "hooks": {
//!     "ping": { "reply": "pong" },
//!     "deploy": { "command": "./deploy.sh", "timeout_secs": 10 },
//!     "legacy": { "error": "no longer supported" }
//!   },
//!   "initialize": { "command": "mkdir -p cache" }
//! }
//! ```
//!
//! Commands run through `sh -c` in the manifest's directory with
//! `HOOK_NAME`, `HOOK_ARGS` (JSON array), and `PLUGIN_NAME` set.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::process::Command;
use tracing::debug;

use super::ModuleLoader;
use crate::api::context::PluginContext;
use crate::error::LoadError;
use crate::exports::{HookExport, ModuleExport};
use crate::hooks::registry::HookHandler;
use crate::traits::PluginLifecycle;

/// Default bound on a single command run.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// A declarative handler.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerSpec {
    /// Returns a fixed value.
    Reply(Value),
    /// Runs a shell command; stdout is the result.
    Command {
        /// Shell command line.
        command: String,
        /// Per-handler override of the loader's timeout.
        timeout: Option<Duration>,
    },
    /// Always fails with the message.
    Error(String),
}

impl HandlerSpec {
    /// Interprets a JSON value as a handler spec.
    pub fn from_value(value: &Value) -> Option<Self> {
        let spec = value.as_object()?;

        if let Some(reply) = spec.get("reply") {
            return Some(Self::Reply(reply.clone()));
        }
        if let Some(command) = spec.get("command").and_then(Value::as_str) {
            let timeout = match spec.get("timeout_secs") {
                None => None,
                Some(secs) => Some(Duration::from_secs(secs.as_u64()?)),
            };
            return Some(Self::Command {
                command: command.to_string(),
                timeout,
            });
        }
        if let Some(message) = spec.get("error").and_then(Value::as_str) {
            return Some(Self::Error(message.to_string()));
        }
        None
    }
}

/// Loads `.json` manifests.
#[derive(Debug, Clone)]
pub struct ManifestLoader {
    timeout: Duration,
}

impl Default for ManifestLoader {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

impl ManifestLoader {
    /// Creates a loader whose commands are bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Builds the export from parsed manifest content.
    pub fn parse(&self, source: &Path, document: Value) -> Result<ModuleExport, LoadError> {
        let Value::Object(mut metadata) = document else {
            return Err(LoadError::NoExport {
                location: source.to_path_buf(),
                detail: "manifest must be a JSON object".to_string(),
            });
        };

        let workdir = source
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let plugin = metadata
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let handler = |step: &str, spec: HandlerSpec| ManifestHandler {
            plugin: plugin.clone(),
            step: step.to_string(),
            spec,
            workdir: workdir.clone(),
            default_timeout: self.timeout,
        };

        // Entries that are not understood stay in the metadata map, where
        // validation reports them.
        let hooks = match metadata.remove("hooks") {
            None | Some(Value::Null) => None,
            Some(Value::Object(entries)) => Some(
                entries
                    .into_iter()
                    .map(|(hook, value)| {
                        let export = match HandlerSpec::from_value(&value) {
                            Some(spec) => HookExport::Handler(Arc::new(handler(&hook, spec))),
                            None => HookExport::NotCallable(value),
                        };
                        (hook, export)
                    })
                    .collect(),
            ),
            Some(other) => {
                metadata.insert("hooks".to_string(), other);
                None
            }
        };

        let initialize = take_spec(&mut metadata, "initialize").map(|s| handler("initialize", s));
        let cleanup = take_spec(&mut metadata, "cleanup").map(|s| handler("cleanup", s));
        let lifecycle = (initialize.is_some() || cleanup.is_some()).then(|| {
            Arc::new(ManifestLifecycle {
                initialize,
                cleanup,
            }) as Arc<dyn PluginLifecycle>
        });

        Ok(ModuleExport {
            metadata,
            hooks,
            lifecycle,
        })
    }
}

#[async_trait]
impl ModuleLoader for ManifestLoader {
    fn extension(&self) -> &str {
        "json"
    }

    async fn load(&self, source: &Path) -> Result<ModuleExport, LoadError> {
        let content = match tokio::fs::read_to_string(source).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LoadError::NotFound {
                    location: source.to_path_buf(),
                });
            }
            Err(e) => {
                return Err(LoadError::Evaluation {
                    location: source.to_path_buf(),
                    message: e.to_string(),
                });
            }
        };

        let document: Value =
            serde_json::from_str(&content).map_err(|e| LoadError::Evaluation {
                location: source.to_path_buf(),
                message: e.to_string(),
            })?;

        debug!(source = %source.display(), "Manifest parsed");
        self.parse(source, document)
    }
}

/// Removes `key` when it holds a valid spec; leaves it otherwise.
fn take_spec(metadata: &mut Map<String, Value>, key: &str) -> Option<HandlerSpec> {
    match metadata.get(key) {
        Some(Value::Null) => {
            metadata.remove(key);
            None
        }
        Some(value) => {
            let spec = HandlerSpec::from_value(value)?;
            metadata.remove(key);
            Some(spec)
        }
        None => None,
    }
}

/// A handler backed by a [`HandlerSpec`].
#[derive(Debug, Clone)]
pub struct ManifestHandler {
    plugin: String,
    step: String,
    spec: HandlerSpec,
    workdir: PathBuf,
    default_timeout: Duration,
}

impl ManifestHandler {
    async fn run(&self, args: &[Value]) -> Result<Value, String> {
        match &self.spec {
            HandlerSpec::Reply(value) => Ok(value.clone()),
            HandlerSpec::Error(message) => Err(message.clone()),
            HandlerSpec::Command { command, timeout } => {
                run_command(
                    command,
                    &self.workdir,
                    &[
                        ("HOOK_NAME", self.step.clone()),
                        ("HOOK_ARGS", Value::from(args.to_vec()).to_string()),
                        ("PLUGIN_NAME", self.plugin.clone()),
                    ],
                    timeout.unwrap_or(self.default_timeout),
                )
                .await
            }
        }
    }
}

#[async_trait]
impl HookHandler for ManifestHandler {
    async fn handle(&self, _ctx: &PluginContext, args: &[Value]) -> Result<Value, String> {
        self.run(args).await
    }
}

/// `initialize` / `cleanup` declared in a manifest.
#[derive(Debug)]
pub struct ManifestLifecycle {
    initialize: Option<ManifestHandler>,
    cleanup: Option<ManifestHandler>,
}

#[async_trait]
impl PluginLifecycle for ManifestLifecycle {
    async fn initialize(&self, _ctx: PluginContext) -> Result<(), String> {
        match &self.initialize {
            Some(handler) => handler.run(&[]).await.map(|_| ()),
            None => Ok(()),
        }
    }

    async fn cleanup(&self) -> Result<(), String> {
        match &self.cleanup {
            Some(handler) => handler.run(&[]).await.map(|_| ()),
            None => Ok(()),
        }
    }
}

async fn run_command(
    command: &str,
    workdir: &Path,
    env: &[(&str, String)],
    timeout: Duration,
) -> Result<Value, String> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in env {
        cmd.env(key, value);
    }

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(format!("failed to run command: {e}")),
        Err(_) => return Err(format!("command timed out after {}s", timeout.as_secs())),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("command exited with {}: {}", output.status, stderr.trim()));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stdout = stdout.trim();
    if stdout.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(stdout).unwrap_or_else(|_| Value::String(stdout.to_string())))
}
