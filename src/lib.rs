// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod interactsh;
pub mod jobs;
pub mod logging;
pub mod service;

use std::path::PathBuf;

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;

use crate::cli::CliArgs;
use crate::config::{ConfigFile, load_and_validate};
use crate::interactsh::InteractshMonitor;
use crate::jobs::JobManager;
use crate::service::Service;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the job manager and its eviction sweep
/// - the interaction monitor
/// - the stdio service boundary
/// - Ctrl-C handling and orderly process reaping on shutdown
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let mut cfg = if config_path.exists() {
        load_and_validate(&config_path)?
    } else {
        info!(path = %config_path.display(), "no config file; using defaults");
        ConfigFile::default()
    };

    if let Some(workspace) = &args.workspace {
        cfg.execution.workspace_dir = PathBuf::from(workspace);
    }

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let manager = JobManager::new(cfg.execution.clone());
    let sweep = manager.spawn_eviction_sweep();
    let monitor = InteractshMonitor::new(cfg.interactsh.clone());

    // Ctrl-C → graceful shutdown of the service loop.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    {
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = shutdown_tx.send(true);
        });
    }

    let service = Service::new(manager.clone(), monitor.clone(), cfg);
    let served = service.serve_stdio(shutdown_rx).await;

    // Reap everything we own before reporting how serving went.
    info!("shutting down: cancelling running jobs and stopping the listener");
    sweep.abort();
    manager.shutdown().await;
    monitor.shutdown().await;

    served?;
    Ok(())
}

/// Simple dry-run output: print the effective configuration.
fn print_dry_run(cfg: &ConfigFile) {
    println!("jobrun dry-run");
    println!(
        "  execution.workspace_dir = {}",
        cfg.execution.workspace_dir.display()
    );
    println!(
        "  execution.sync_threshold_secs = {}",
        cfg.execution.sync_threshold_secs
    );
    println!(
        "  execution.cancel_grace_secs = {}",
        cfg.execution.cancel_grace_secs
    );
    println!("  execution.retention_secs = {}", cfg.execution.retention_secs);
    println!(
        "  execution.sweep_interval_secs = {}",
        cfg.execution.sweep_interval_secs
    );
    println!(
        "  execution.output_cap_bytes = {}",
        cfg.execution.output_cap_bytes
    );
    println!();
    println!("  interactsh.enabled = {}", cfg.interactsh.enabled);
    println!("  interactsh.server = {}", cfg.interactsh.server);
    println!(
        "  interactsh.client_command = {}",
        cfg.interactsh.client_command
    );
    println!(
        "  interactsh.readiness_timeout_secs = {}",
        cfg.interactsh.readiness_timeout_secs
    );
}
