/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

mod client;
mod workload;

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use pbs_core::control::{LatenessReport, Request, Response};

use client::ControlClient;
use workload::{Summary, Workload};

// ── CLI argument definition ───────────────────────────────────────────────────

/// Drives a running pbsd with a workload and reports per-task lateness.
///
/// Example:
///   pbs-sim --addr 127.0.0.1:7878 --workload demos/workload.yaml
#[derive(Debug, Parser)]
#[command(
    name = "pbs-sim",
    about = "Workload driver for the PBS scheduler daemon",
    long_about = None,
)]
struct Cli {
    /// pbsd control address.
    #[arg(short = 'a', long = "addr", default_value = "127.0.0.1:7878")]
    addr: String,

    /// Path to the workload YAML file.
    #[arg(short = 'w', long = "workload")]
    workload: PathBuf,

    /// Give up waiting for completions after this many milliseconds.
    #[arg(short = 't', long = "timeout-ms", default_value_t = 5_000)]
    timeout_ms: u64,

    /// Lateness poll interval in milliseconds.
    #[arg(long = "poll-ms", default_value_t = 10)]
    poll_ms: u64,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!(addr = %cli.addr, workload = %cli.workload.display(), "pbs-sim starting");

    match run(&cli).await {
        Ok(summary) if summary.all_completed() => {}
        Ok(summary) => {
            error!(pending = ?summary.pending, "timed out waiting for completions");
            process::exit(2);
        }
        Err(e) => {
            error!("{:#}", e);
            process::exit(1);
        }
    }
}

async fn run(cli: &Cli) -> Result<Summary> {
    let workload = Workload::load_from_file(&cli.workload)?;
    let mut client = ControlClient::connect(&cli.addr).await?;

    // ── Submit ────────────────────────────────────────────────────────────────
    let base_us = client.now_us().await?;
    info!(base_us, tasks = workload.tasks.len(), "submitting workload");

    for spec in &workload.tasks {
        client.expect_ok(&spec.plan_request(base_us)).await?;
        client.expect_ok(&spec.launch_request()).await?;
        debug!(task = spec.id, cpu = spec.cpu, "task submitted");
    }

    // ── Poll ──────────────────────────────────────────────────────────────────
    let deadline = Instant::now() + Duration::from_millis(cli.timeout_ms);
    let mut reports: Vec<Option<LatenessReport>> = vec![None; workload.tasks.len()];

    loop {
        for (spec, slot) in workload.tasks.iter().zip(reports.iter_mut()) {
            if slot.is_some() {
                continue;
            }
            match client.request(&Request::Lateness(spec.task())).await? {
                Response::Lateness(r) => *slot = Some(r),
                Response::None => {}
                other => warn!(task = spec.id, reply = ?other, "unexpected lateness reply"),
            }
        }
        if reports.iter().all(Option::is_some) || Instant::now() >= deadline {
            break;
        }
        time::sleep(Duration::from_millis(cli.poll_ms)).await;
    }

    // ── Report ────────────────────────────────────────────────────────────────
    for (spec, report) in workload.tasks.iter().zip(&reports) {
        match report {
            Some(r) => info!(
                task = spec.id,
                cpu = spec.cpu,
                lateness_us = r.lateness_us,
                completion_us = r.completion_us.saturating_sub(base_us),
                deadline_us = r.deadline_us.saturating_sub(base_us),
                missed = r.missed_deadline(),
                "result"
            ),
            None => warn!(task = spec.id, cpu = spec.cpu, "no completion observed"),
        }
    }

    match client.status().await {
        Ok(cpus) => {
            for cpu in cpus {
                debug!(status = %cpu, "processor");
            }
        }
        Err(e) => warn!("STATUS failed: {:#}", e),
    }

    let summary = Summary::from_reports(&workload, &reports);
    info!(
        completed = summary.completed,
        missed = summary.missed.len(),
        worst_lateness_us = ?summary.worst_lateness_us,
        "workload finished"
    );
    Ok(summary)
}
