/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use pbs_core::clock::TokioClock;
use pbs_core::config::SchedConfig;
use pbs_core::control::{ControlInterface, ControlServer};
use pbs_core::host::ThreadSpawner;
use pbs_core::runtime::SchedulerRuntime;
use pbs_core::sim::{SimHost, SimLauncher};

// ── CLI argument definition ───────────────────────────────────────────────────

/// PBS daemon: plan-based EDF scheduler over a simulated host.
///
/// Example:
///   pbsd --config demos/pbsd.yaml --listen 127.0.0.1:7878
#[derive(Debug, Parser)]
#[command(
    name = "pbsd",
    about = "PBS plan-based EDF scheduler daemon",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML scheduler configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Control server listen address (overrides the config file).
    #[arg(short = 'l', long = "listen")]
    listen: Option<String>,

    /// Budget-check tick in microseconds, a multiple of 1000 (overrides the
    /// config file).
    #[arg(short = 't', long = "tick-us")]
    tick_us: Option<u64>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=trace).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .init();

    info!("pbsd starting up...");

    let cli = Cli::parse();
    info!(config = ?cli.config, listen = ?cli.listen, tick_us = ?cli.tick_us, "Arguments");

    // ── Load configuration ────────────────────────────────────────────────────
    let mut config = match &cli.config {
        Some(path) => match SchedConfig::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                error!("Failed to load configuration: {:#}", e);
                process::exit(1);
            }
        },
        None => {
            warn!("No configuration file provided, using default settings");
            SchedConfig::default()
        }
    };
    if let Some(listen) = cli.listen {
        config.control.listen_addr = listen;
    }
    if let Some(tick_us) = cli.tick_us {
        config.scheduler.tick_interval_us = tick_us;
    }
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {:#}", e);
        process::exit(1);
    }

    // ── Processors ────────────────────────────────────────────────────────────
    let runtime = Arc::new(SchedulerRuntime::new(
        config.scheduler.clone(),
        Arc::new(TokioClock::new()),
    ));
    let host = SimHost::new();

    let mut active = 0usize;
    for &cpu in &config.scheduler.cpus {
        runtime.attach_run_queue(cpu);
        match runtime.activate(cpu, host.clone(), &ThreadSpawner) {
            Ok(()) => active += 1,
            // Already logged by the runtime; the remaining processors keep going.
            Err(_) => warn!(cpu, "processor left inactive"),
        }
    }
    if active == 0 {
        error!("No processor could be activated");
        process::exit(1);
    }
    info!(active, configured = config.scheduler.cpus.len(), "processors activated");

    // ── Control server ────────────────────────────────────────────────────────
    let launcher = Arc::new(SimLauncher::new(Arc::clone(&runtime), host));
    let control = Arc::new(ControlInterface::new(Arc::clone(&runtime)).with_launcher(launcher));

    let server = match ControlServer::bind(&config.control.listen_addr, control).await {
        Ok(server) => server,
        Err(e) => {
            error!("{:#}", e);
            runtime.shutdown().await;
            process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_task = tokio::spawn(server.serve(shutdown_rx));

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Cannot listen for Ctrl-C: {}", e);
    }
    info!("Shutdown requested");

    let _ = shutdown_tx.send(true);
    match server_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Control server failed: {:#}", e),
        Err(e) => error!("Control server task panicked: {}", e),
    }
    runtime.shutdown().await;

    info!("pbsd stopped");
}
