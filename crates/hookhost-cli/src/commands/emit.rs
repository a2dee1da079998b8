//! Hook emission command.

use clap::Args;
use serde_json::Value;

use crate::output::{self, OutputFormat};
use hookhost_core::error::AppError;

/// Arguments for the emit command
#[derive(Debug, Args)]
pub struct EmitArgs {
    /// Hook name
    pub hook: String,

    /// Arguments as JSON; anything that does not parse is passed as a string
    pub args: Vec<String>,
}

/// Execute the emit command
pub async fn execute(
    args: &EmitArgs,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;
    let manager = super::start_manager(&config).await?;

    let hook_args: Vec<Value> = args.args.iter().map(|raw| parse_arg(raw)).collect();
    let outcomes = manager.emit_hook(&args.hook, hook_args).await;

    if outcomes.is_empty() && format == OutputFormat::Table {
        output::print_warning(&format!("No handlers registered for '{}'", args.hook));
    } else {
        output::print_value(&serde_json::to_value(&outcomes)?, format);
    }

    manager.shutdown().await;
    Ok(())
}

fn parse_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
