//! Plugin configuration commands.

use clap::{Args, Subcommand};
use serde_json::Value;

use crate::output::{self, OutputFormat};
use hookhost_core::error::AppError;
use hookhost_plugin::{ConfigStore, ConfigUpdate};

/// Arguments for config commands
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Read a plugin's config document or one key of it
    Get {
        /// Plugin name
        plugin: String,
        /// Key to read; the whole document when omitted
        key: Option<String>,
    },
    /// Set one key of a plugin's config document
    Set {
        /// Plugin name
        plugin: String,
        /// Key to set
        key: String,
        /// JSON value; anything that does not parse is stored as a string
        value: String,
    },
    /// Show the effective runtime configuration
    Show,
}

/// Execute config commands
pub async fn execute(
    args: &ConfigArgs,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;

    match &args.command {
        ConfigCommand::Get { plugin, key } => {
            let store = ConfigStore::new(config.plugins.config_dir());
            match store.get(plugin, key.as_deref()).await {
                Some(value) => output::print_value(&value, format),
                None => output::print_value(&Value::Null, format),
            }
        }
        ConfigCommand::Set { plugin, key, value } => {
            let store = ConfigStore::new(config.plugins.config_dir());
            let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.clone()));
            store
                .set(plugin, ConfigUpdate::Key(key.clone(), value))
                .await?;
            output::print_success(&format!("Set '{}' for plugin '{}'", key, plugin));
        }
        ConfigCommand::Show => {
            output::print_value(&serde_json::to_value(&config)?, format);
        }
    }

    Ok(())
}
