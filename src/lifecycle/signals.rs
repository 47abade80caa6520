//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//! - Trigger appropriate actions (shutdown, reload)
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A second SIGTERM/SIGINT forces immediate exit
//! - SIGHUP triggers config reload, not shutdown

use std::path::PathBuf;

use tokio::sync::mpsc;

#[cfg(unix)]
use crate::config::load_config;
use crate::config::ServerConfig;
use crate::lifecycle::shutdown::Shutdown;

/// Listen for OS signals and translate them to lifecycle events.
///
/// Runs until the process exits. SIGTERM and SIGINT trigger graceful
/// shutdown; a repeat of either forces an immediate exit. SIGHUP reloads
/// the configuration file and pushes the result onto the update channel.
#[cfg(unix)]
pub async fn handle_signals(
    shutdown: Shutdown,
    config_path: Option<PathBuf>,
    updates: mpsc::UnboundedSender<ServerConfig>,
) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sighup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                graceful_or_forced(&shutdown, "SIGTERM");
            }
            _ = sigint.recv() => {
                graceful_or_forced(&shutdown, "SIGINT");
            }
            _ = sighup.recv() => {
                match &config_path {
                    Some(path) => reload_config(path, &updates),
                    None => tracing::warn!("SIGHUP received but no configuration file to reload"),
                }
            }
        }
    }
}

/// Fallback for platforms without Unix signals: Ctrl+C triggers shutdown.
#[cfg(not(unix))]
pub async fn handle_signals(
    shutdown: Shutdown,
    _config_path: Option<PathBuf>,
    _updates: mpsc::UnboundedSender<ServerConfig>,
) {
    loop {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
        graceful_or_forced(&shutdown, "Ctrl+C");
    }
}

fn graceful_or_forced(shutdown: &Shutdown, signal: &str) {
    if shutdown.is_triggered() {
        tracing::warn!(signal = %signal, "second shutdown signal, exiting immediately");
        std::process::exit(1);
    }
    tracing::info!(signal = %signal, "shutdown signal received, draining");
    shutdown.trigger();
}

#[cfg(unix)]
fn reload_config(path: &std::path::Path, updates: &mpsc::UnboundedSender<ServerConfig>) {
    tracing::info!("SIGHUP received, reloading configuration");
    match load_config(path) {
        Ok(new_config) => {
            let _ = updates.send(new_config);
        }
        Err(e) => {
            tracing::error!(
                error = %e,
                "config reload failed; keeping current configuration"
            );
        }
    }
}
