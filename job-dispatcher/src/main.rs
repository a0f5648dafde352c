/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use job_dispatcher::config::PolicyConfig;
use job_dispatcher::router::EventRouter;
use job_dispatcher::transport;

// ── CLI argument definition ───────────────────────────────────────────────────

/// Adaptive job dispatcher.
///
/// Example:
///   job-dispatcher --port 12345 --config policy.yaml --status-interval-ms 1000
#[derive(Debug, Parser)]
#[command(
    name = "job-dispatcher",
    about = "Adaptive job dispatcher – places file jobs on a worker pool",
    long_about = None,
)]
struct Cli {
    /// Port of the worker pool server.
    #[arg(short = 'p', long = "port")]
    port: u16,

    /// Host of the worker pool server.
    #[arg(long = "host", default_value = "127.0.0.1")]
    host: String,

    /// Path to the YAML placement policy file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Ask the servers to print their status every N milliseconds (0 = never).
    #[arg(long = "status-interval-ms", default_value_t = 0)]
    status_interval_ms: u64,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    info!(
        host = %cli.host,
        port = cli.port,
        config = ?cli.config,
        status_interval_ms = cli.status_interval_ms,
        "Job dispatcher starting up..."
    );

    if let Err(e) = run(cli).await {
        error!("Job dispatcher failed: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // ── Load policy configuration ─────────────────────────────────────────────
    let config = match &cli.config {
        Some(path) => PolicyConfig::load_from_file(path)
            .with_context(|| format!("Failed to load policy from {}", path.display()))?,
        None => {
            warn!("No policy configuration file provided, using default tunables");
            PolicyConfig::default()
        }
    };

    let status_interval =
        (cli.status_interval_ms > 0).then(|| Duration::from_millis(cli.status_interval_ms));
    let addr = format!("{}:{}", cli.host, cli.port);
    let mut router = EventRouter::new(config);

    // ── Serve until the server hangs up or Ctrl-C ─────────────────────────────
    tokio::select! {
        summary = transport::connect_and_run(&addr, &mut router, status_interval) => {
            let summary = summary?;
            info!(
                batches = summary.batches,
                placements = summary.placements,
                completions = summary.completions,
                rejected_lines = summary.rejected_lines,
                "Session finished"
            );
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
        }
    }

    if let Some(d) = router.dispatcher() {
        d.log_status();
    }
    Ok(())
}
