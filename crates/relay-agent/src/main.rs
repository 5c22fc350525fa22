//! # relay-agent
//!
//! Relay server binary: loads settings, wires the task executor to the room
//! broadcaster, and serves HTTP + WebSocket until SIGINT/SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use relay_logging::LogFormat;
use relay_server::{RelayServer, RoomBroadcaster, RoomNotifier, ServerConfig};
use relay_settings::RelaySettings;
use relay_tasks::handlers::builtin_handlers;
use relay_tasks::{ExecutorConfig, MemoryTaskStore, OllamaClient, TaskExecutor};

/// Relay server.
#[derive(Parser, Debug)]
#[command(name = "relay-agent", about = "Real-time relay server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.relay/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,
}

impl Cli {
    /// Load the settings file, then apply command-line overrides.
    fn resolve_settings(&self) -> Result<RelaySettings> {
        let path = self
            .settings
            .clone()
            .unwrap_or_else(relay_settings::settings_path);
        let mut settings = relay_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.resolve_settings()?;

    let format: LogFormat = settings
        .logging
        .format
        .parse()
        .map_err(anyhow::Error::msg)
        .context("Invalid logging.format")?;
    relay_logging::init_subscriber(&settings.logging.level, format);
    let metrics_handle = relay_server::metrics::install_recorder();

    let task_settings = &settings.tasks;
    let completion = Arc::new(OllamaClient::new(
        task_settings.completion.base_url.clone(),
        task_settings.completion.model.clone(),
    ));
    let rooms = Arc::new(RoomBroadcaster::with_max_drops(
        settings.server.max_client_drops,
    ));
    let store = Arc::new(MemoryTaskStore::new());
    let executor = TaskExecutor::new(
        builtin_handlers(task_settings.workspace_root.clone(), completion),
        store.clone(),
        Arc::new(RoomNotifier::new(Arc::clone(&rooms))),
        ExecutorConfig {
            max_concurrent: task_settings.max_concurrent,
            handler_timeout: task_settings.handler_timeout(),
        },
    );

    let server = RelayServer::new(
        ServerConfig::from(&settings),
        rooms,
        store,
        executor.clone(),
        metrics_handle,
    );
    let (addr, handle) = server
        .listen()
        .await
        .with_context(|| format!("Failed to bind {}", server.config().listen_addr()))?;
    tracing::info!(%addr, "relay agent ready");

    shutdown_signal().await?;

    tracing::info!("Shutting down...");
    let drain = task_settings.drain_timeout();
    let stopped = server
        .shutdown()
        .shutdown_and_wait(vec![handle], drain)
        .await;
    let drained = executor.shutdown(drain).await;

    tracing::info!(stopped, drained, "Shutdown complete");
    Ok(())
}

/// Resolve on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("Failed to listen for ctrl-c")?,
            _ = term.recv() => {}
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for ctrl-c")
    }
}
