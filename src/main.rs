//! hookhost server: hosts the plugin directory until asked to stop.
//!
//! Loads configuration, starts the plugin manager (discovery, loading, hot
//! reload), and shuts every plugin down cleanly on Ctrl+C or SIGTERM.

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{EnvFilter, fmt};

use hookhost_core::config::AppConfig;
use hookhost_core::events::SystemEventKind;
use hookhost_plugin::PluginManager;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {:#}", e);
        std::process::exit(1);
    }
}

/// Load configuration from file and environment
fn load_configuration() -> anyhow::Result<AppConfig> {
    let config_path =
        std::env::var("HOOKHOST_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());
    let env = std::env::var("HOOKHOST_ENV").ok();

    AppConfig::load(&config_path, env.as_deref())
        .with_context(|| format!("loading '{}'", config_path))
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!("Starting hookhost v{}", env!("CARGO_PKG_VERSION"));

    let manager = PluginManager::from_config(&config.plugins);
    let events = tokio::spawn(log_events(manager.subscribe()));

    manager
        .initialize()
        .await
        .context("plugin manager failed to start")?;

    let stats = manager.get_stats().await;
    tracing::info!(
        dir = %manager.plugin_dir().display(),
        loaded = stats.loaded_plugins,
        failed = stats.failed_plugins,
        hooks = stats.hook_count,
        watching = manager.is_watching().await,
        "hookhost running"
    );

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, unloading plugins...");

    manager.shutdown().await;
    drop(manager);
    let _ = events.await;

    tracing::info!("hookhost shut down gracefully");
    Ok(())
}

/// Mirrors the system event stream into the log.
async fn log_events(mut rx: tokio::sync::broadcast::Receiver<hookhost_core::events::SystemEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                tracing::debug!(event = %event.name(), id = %event.id, "System event");
                if event.kind == SystemEventKind::Shutdown {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "System event log lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
