// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! schmuxd — the schmux session daemon.
//!
//! Process entry point: loads configuration, initializes logging, bootstraps
//! C1 through C7, recovers persisted sessions and overlay state after a
//! restart, then waits for a shutdown signal. The HTTP/WebSocket dashboard,
//! the CLI, and git worktree provisioning are external collaborators not
//! implemented here — this binary only owns the core subsystems' lifecycle.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod bootstrap;
mod config;
mod env;
mod overlay_entries;
mod propagate;

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::bootstrap::Daemon;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("schmuxd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("schmuxd {}", env!("CARGO_PKG_VERSION"));
                println!("schmux session daemon — supervises coding-agent sessions.");
                println!();
                println!("USAGE:");
                println!("    schmuxd");
                println!();
                println!("schmuxd is typically started by the schmux dashboard process and");
                println!("should not be invoked directly; it owns only the core subsystems");
                println!("(session tracker, signal detector, overlay compounder, state store).");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: schmuxd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;
    std::fs::create_dir_all(&config.state_dir)?;
    let _log_guard = setup_logging(&config)?;

    info!("starting schmuxd");

    let broadcast = Arc::new(|session_id: schmux_core::SessionId, signal: schmux_core::Signal| {
        info!(session_id = %session_id, state = %signal.state, message = %signal.message, "signal");
    });

    let daemon = match Daemon::bootstrap(config, broadcast, None) {
        Ok(daemon) => daemon,
        Err(e) => {
            error!(error = %e, "schmuxd: bootstrap failed");
            return Err(e.into());
        }
    };

    let cancel = CancellationToken::new();
    daemon.recover(&cancel).await;

    println!("READY");
    info!("schmuxd ready");

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => info!("schmuxd: received SIGTERM"),
        _ = sigint.recv() => info!("schmuxd: received SIGINT"),
    }

    info!("schmuxd shutting down");
    // A fresh, never-cancelled token: this final reconcile pass is the last
    // chance to capture overlay edits before every session is torn down, so
    // it must run to completion rather than be cut short by the shutdown
    // signal that triggered it.
    let shutdown_reconcile = CancellationToken::new();
    for workspace in daemon.store.get_workspaces() {
        daemon.overlay_manager.reconcile(&workspace.id, &shutdown_reconcile).await;
    }
    for session in daemon.store.get_sessions() {
        daemon.stop_session(&session.id);
    }
    daemon.store.save()?;

    Ok(())
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, std::io::Error> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let parent = config
        .log_path
        .parent()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "log path has no parent"))?;
    std::fs::create_dir_all(parent)?;

    let file_name = config
        .log_path
        .file_name()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "log path has no file name"))?;
    let file_appender = tracing_appender::rolling::never(parent, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
