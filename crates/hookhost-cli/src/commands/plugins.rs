//! Plugin inspection commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use hookhost_core::error::AppError;
use hookhost_plugin::{FailedLoad, PluginInfo};

/// Arguments for plugin commands
#[derive(Debug, Args)]
pub struct PluginsArgs {
    /// Plugin subcommand
    #[command(subcommand)]
    pub command: PluginsCommand,
}

/// Plugin subcommands
#[derive(Debug, Subcommand)]
pub enum PluginsCommand {
    /// Load the plugin directory and list the result
    List,
    /// Show one plugin in detail
    Show {
        /// Plugin name
        name: String,
    },
}

/// Row of the plugin table
#[derive(Debug, Serialize, Tabled)]
struct PluginRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Hooks")]
    hooks: String,
    #[tabled(rename = "Dependencies")]
    dependencies: String,
}

impl From<&PluginInfo> for PluginRow {
    fn from(info: &PluginInfo) -> Self {
        Self {
            name: info.name.clone(),
            version: info.version.clone(),
            status: info.status.to_string(),
            hooks: output::join_or_dash(&info.hooks),
            dependencies: output::join_or_dash(&info.dependencies),
        }
    }
}

/// Row of the failure table
#[derive(Debug, Serialize, Tabled)]
struct FailureRow {
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Stage")]
    stage: String,
    #[tabled(rename = "Error")]
    message: String,
}

impl From<&FailedLoad> for FailureRow {
    fn from(failure: &FailedLoad) -> Self {
        Self {
            source: failure.source.display().to_string(),
            stage: failure.stage.clone(),
            message: failure.message.clone(),
        }
    }
}

/// Execute plugin commands
pub async fn execute(
    args: &PluginsArgs,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;
    let manager = super::start_manager(&config).await?;

    match &args.command {
        PluginsCommand::List => {
            let plugins = manager.get_all_plugins().await;
            let failures = manager.failed_loads().await;

            match format {
                OutputFormat::Json => {
                    let body = serde_json::json!({
                        "plugins": plugins,
                        "failed": failures,
                    });
                    output::print_value(&body, format);
                }
                OutputFormat::Table => {
                    let rows: Vec<PluginRow> = plugins.iter().map(PluginRow::from).collect();
                    output::print_list(&rows, format);

                    if !failures.is_empty() {
                        output::print_warning(&format!("{} source(s) failed to load", failures.len()));
                        let rows: Vec<FailureRow> = failures.iter().map(FailureRow::from).collect();
                        output::print_list(&rows, format);
                    }
                }
            }
        }
        PluginsCommand::Show { name } => {
            let Some(info) = manager.get_plugin(name).await else {
                manager.shutdown().await;
                return Err(AppError::not_found(format!("Plugin '{}' not found", name)));
            };

            match format {
                OutputFormat::Json => {
                    let value = serde_json::to_value(&info)?;
                    output::print_value(&value, format);
                }
                OutputFormat::Table => {
                    println!("{}", info.name);
                    output::print_kv("Version", &info.version);
                    output::print_kv("Status", &info.status.to_string());
                    output::print_kv("Description", &info.description);
                    output::print_kv("Author", &info.author);
                    output::print_kv("Source", &info.source.display().to_string());
                    output::print_kv("Hooks", &output::join_or_dash(&info.hooks));
                    output::print_kv("Dependencies", &output::join_or_dash(&info.dependencies));
                    output::print_kv("Permissions", &output::join_or_dash(&info.permissions));
                    if let Some(loaded_at) = info.loaded_at {
                        output::print_kv("Loaded at", &loaded_at.to_rfc3339());
                    }
                    if let Some(error) = &info.error {
                        output::print_kv("Error", error);
                    }
                }
            }
        }
    }

    manager.shutdown().await;
    Ok(())
}
