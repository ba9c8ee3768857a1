//! nodehealth - node health agent for camera nodes
//!
//! Subcommands:
//! - `run`: heartbeat + stall watcher for this node until Ctrl-C
//! - `watch`: the isolated stall watcher (launched by `run`)
//! - `status`: platform classification and optional remediation

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nodehealth_agent::config::StallWatcherConfig;
use nodehealth_agent::remediation::LogOnlyRebooter;
use nodehealth_agent::watcher::{ProcCpuTimes, SignalTerminator, ThreadSleeper};
use nodehealth_agent::{
    maybe_reboot, platform, HealthMonitor, NodeConfig, RateLimitedRebooter, RemediationOutcome,
    SendQueue, StallWatcher, WatchOutcome, WatchSettings,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "nodehealth", version, about = "Node health agent for camera nodes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run heartbeats and the stall watcher until Ctrl-C
    Run {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Watch a process for stalls and terminate it when one is detected
    Watch {
        #[arg(long)]
        pid: u32,
        #[arg(long, default_value_t = 10.0)]
        grace_secs: f64,
        #[arg(long, default_value_t = 10.0)]
        interval_secs: f64,
        #[arg(long, default_value_t = 1.0)]
        threshold_secs: f64,
    },
    /// Print the platform classification
    Status {
        #[arg(long)]
        config: Option<PathBuf>,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
        /// Request remediation (rate limited; the reboot itself is a mock)
        #[arg(long)]
        reboot: bool,
    },
}

/// Status report printed by `status`
#[derive(Debug, Serialize)]
struct StatusReport {
    node: String,
    platform: String,
    remediation: Option<RemediationOutcome>,
    remediation_error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("nodehealth=info,nodehealth_agent=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config } => run(config).await,
        Commands::Watch {
            pid,
            grace_secs,
            interval_secs,
            threshold_secs,
        } => watch(pid, grace_secs, interval_secs, threshold_secs).await,
        Commands::Status { config, json, reboot } => status(config, json, reboot),
    }
}

async fn run(config_path: Option<PathBuf>) -> Result<()> {
    info!("📷 nodehealth starting...");

    let config = NodeConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    let queue = Arc::new(SendQueue::from_capacity(config.heartbeat.queue_capacity));

    let mut monitor =
        HealthMonitor::new(config, queue.clone()).context("Failed to create health monitor")?;
    monitor.start().context("Failed to start health monitor")?;

    info!(
        "Node {} running on {} (watcher pid: {:?})",
        monitor.identity().name(),
        monitor.platform(),
        monitor.watcher_pid()
    );

    // Stand-in for the networking layer: drain and log what would be sent
    let drain_queue = queue.clone();
    let drain = tokio::spawn(async move {
        let mut timer = interval(Duration::from_secs(1));
        loop {
            timer.tick().await;
            for event in drain_queue.drain() {
                info!("→ hub: {} ({} byte payload)", event.text, event.payload.data.len());
            }
        }
    });

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    info!("Shutting down");

    drain.abort();
    monitor.shutdown().await;
    Ok(())
}

/// Timings for `watch`, held to the same rules as `[stall_watcher]`
fn watch_settings(grace_secs: f64, interval_secs: f64, threshold_secs: f64) -> Result<WatchSettings> {
    let config = StallWatcherConfig {
        grace_secs,
        interval_secs,
        threshold_secs,
        ..StallWatcherConfig::default()
    };
    config.validate().context("Invalid watch arguments")?;
    Ok(WatchSettings::from(&config))
}

async fn watch(pid: u32, grace_secs: f64, interval_secs: f64, threshold_secs: f64) -> Result<()> {
    let settings = watch_settings(grace_secs, interval_secs, threshold_secs)?;

    let outcome = tokio::task::spawn_blocking(move || {
        StallWatcher::new(pid, settings, ProcCpuTimes::new(), SignalTerminator, ThreadSleeper).run()
    })
    .await
    .context("Stall watcher panicked")?;

    match outcome {
        WatchOutcome::TargetExited => debug!("Watcher exiting: process {} is gone", pid),
        WatchOutcome::Terminated { delta_secs } => {
            info!("Terminated stalled process {} (cpu delta {}s)", pid, delta_secs)
        }
        WatchOutcome::SignalFailed(e) => error!("Watcher exiting without terminating: {}", e),
    }
    Ok(())
}

fn status(config_path: Option<PathBuf>, json: bool, reboot: bool) -> Result<()> {
    let config = NodeConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    let kind = platform::classify().context("Failed to classify platform")?;

    let mut report = StatusReport {
        node: config.node.name.clone(),
        platform: kind.to_string(),
        remediation: None,
        remediation_error: None,
    };

    if reboot {
        let rebooter = RateLimitedRebooter::from_config(LogOnlyRebooter, &config.remediation);
        match maybe_reboot(kind, &rebooter) {
            Ok(outcome) => report.remediation = Some(outcome),
            Err(e) => {
                warn!("Remediation not performed: {}", e);
                report.remediation_error = Some(e.to_string());
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report).context("Failed to serialize status")?);
    } else {
        println!("This computer is {}", report.platform);
        if let Some(outcome) = report.remediation {
            println!("Remediation: {:?}", outcome);
        }
        if let Some(e) = &report.remediation_error {
            println!("Remediation refused: {}", e);
        }
    }

    Ok(())
}
