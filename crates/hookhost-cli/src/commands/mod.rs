//! CLI command definitions and dispatch.

pub mod config;
pub mod emit;
pub mod plugins;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;
use hookhost_core::config::AppConfig;
use hookhost_core::error::AppError;
use hookhost_plugin::PluginManager;

/// hookhost: in-process extension runtime
#[derive(Debug, Parser)]
#[command(name = "hookhost", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Inspect plugins in the plugin directory
    Plugins(plugins::PluginsArgs),
    /// Load all plugins and emit one hook
    Emit(emit::EmitArgs),
    /// Read and write per-plugin configuration
    Config(config::ConfigArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        match &self.command {
            Commands::Plugins(args) => plugins::execute(args, &self.config, self.format).await,
            Commands::Emit(args) => emit::execute(args, &self.config, self.format).await,
            Commands::Config(args) => config::execute(args, &self.config, self.format).await,
        }
    }
}

/// Helper: load configuration from file, honouring `HOOKHOST_ENV`
pub fn load_config(config_path: &str) -> Result<AppConfig, AppError> {
    let env = std::env::var("HOOKHOST_ENV").ok();
    AppConfig::load(config_path, env.as_deref())
}

/// Helper: start a manager over the configured directory without watching it
pub async fn start_manager(config: &AppConfig) -> Result<PluginManager, AppError> {
    let mut settings = config.plugins.clone();
    settings.hot_reload = false;

    tracing::debug!(dir = %settings.directory, "Starting plugin manager");
    let manager = PluginManager::from_config(&settings);
    manager.initialize().await?;

    let stats = manager.get_stats().await;
    tracing::debug!(
        loaded = stats.loaded_plugins,
        failed = stats.failed_plugins,
        hooks = stats.hook_count,
        "Plugin manager ready"
    );
    Ok(manager)
}
