//! hangul-keymapd: manages the privileged key-remapping agent
//!
//! Remaps Right Command to F18 through a launchd agent that runs
//! `hidutil` at login. This binary provides:
//! - Install/uninstall of the helper script and agent descriptor behind
//!   a single administrator prompt
//! - Status tracking re-derived from launchd after every change
//! - IPC server for the menu bar app (status, enable, disable, subscribe)
//!
//! Login items, windows and preferences live in the app, not here.

mod config;
mod descriptor;
mod events;
mod ipc;
mod lifecycle;
mod process;
mod service;
mod state;
#[cfg(test)]
mod testing;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::events::LifecycleEvent;
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::process::{OsascriptEscalator, SystemRunner};
use crate::service::{ServiceLifecycleManager, StatusObserver};
use crate::state::{ServiceState, StateStore};

type SystemManager = ServiceLifecycleManager<SystemRunner, OsascriptEscalator<SystemRunner>>;

#[derive(Parser)]
#[command(name = "hangul-keymapd", version, about = "Manage the Hangul key remapping agent")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon and serve IPC requests (default)
    Serve,
    /// Print whether the remapping agent is loaded
    Status,
    /// Install and load the remapping agent
    Enable,
    /// Unload and remove the remapping agent
    Disable,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::load()?;
    info!(label = %config.label, script = ?config.script_path, "configuration loaded");

    let runner = Arc::new(SystemRunner);

    // Manager -> event logger / IPC
    let (event_tx, _event_rx) = broadcast::channel::<LifecycleEvent>(64);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            serve(build_manager(config, runner, event_tx.clone()), event_tx).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Status => {
            // One-shot query, no store to keep in sync
            let registered = StatusObserver::new(runner).is_registered(&config.label).await;
            let state = if registered { ServiceState::Enabled } else { ServiceState::Disabled };
            println!("{}: {}", config.label, state);
            Ok(ExitCode::SUCCESS)
        }
        Command::Enable => {
            let manager = build_manager(config, runner, event_tx);
            Ok(report(manager.enable().await, "enabled"))
        }
        Command::Disable => {
            let manager = build_manager(config, runner, event_tx);
            Ok(report(manager.disable().await, "disabled"))
        }
    }
}

fn build_manager(
    config: Config,
    runner: Arc<SystemRunner>,
    event_tx: broadcast::Sender<LifecycleEvent>,
) -> SystemManager {
    ServiceLifecycleManager::new(
        config,
        StatusObserver::new(Arc::clone(&runner)),
        OsascriptEscalator::new(runner),
        StateStore::new(),
        event_tx,
    )
}

fn report(result: Result<(), service::InstallError>, done: &str) -> ExitCode {
    match result {
        Ok(()) => {
            println!("key mapping {done}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn serve(manager: SystemManager, event_tx: broadcast::Sender<LifecycleEvent>) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "hangul-keymapd starting");

    manager.config().ensure_dirs()?;

    // Leave the Unknown state before any client connects
    let state = manager.query_status().await;
    info!(%state, "initial key mapping status");

    let shutdown = ShutdownSignal::new();
    let socket_path = manager.config().socket_path.clone();
    let server = Server::new(&socket_path, manager)?;

    let mut event_rx = event_tx.subscribe();

    info!("daemon initialized, entering main loop");

    tokio::select! {
        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Log lifecycle events as they happen
        _ = async {
            loop {
                match event_rx.recv().await {
                    Ok(event) => info!(%event, "lifecycle event"),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "lifecycle event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("lifecycle event handler exited");
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    info!("shutting down...");
    server.shutdown().await;
    info!("hangul-keymapd stopped");

    Ok(())
}
