// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # cohort
//!
//! The `cohort` binary runs one node of a multi-agent experiment.
//!
//! ## Commands
//!
//! - `cohort controller` - white pages and configuration manager
//! - `cohort daemon` - hosts agent queues for the controller
//! - `cohort local FILE` - controller and daemons in one process over in-process pipes
//!
//! Controller and daemon read console commands (`connect`, `load`, `exit`)
//! from stdin.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

use cohort_cli::commands::{self, ControllerArgs, DaemonArgs, LocalArgs};
use cohort_core::domain::node_config::NodeConfigManifest;

/// cohort - run distributed multi-agent experiments
#[derive(Parser)]
#[command(name = "cohort")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "COHORT_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "COHORT_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (compact, json)
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Serve Prometheus metrics on this port
    #[arg(long, global = true, env = "COHORT_METRICS_PORT")]
    metrics_port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller
    Controller(ControllerArgs),

    /// Run a daemon
    Daemon(DaemonArgs),

    /// Run a whole experiment in this process
    Local(LocalArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        NodeConfigManifest::load_or_default(cli.config.clone()).context("Failed to load configuration")?;
    if let Some(level) = cli.log_level {
        config.spec.observability.logging.level = level;
    }
    if let Some(format) = cli.log_format {
        config.spec.observability.logging.format = format;
    }
    if let Some(port) = cli.metrics_port {
        config.spec.observability.metrics.enabled = true;
        config.spec.observability.metrics.port = port;
    }
    config.validate().context("Invalid configuration")?;

    let logging = &config.spec.observability.logging;
    init_logging(&logging.level, &logging.format)?;
    if let Some(path) = &cli.config {
        info!(path = %path.display(), node = %config.spec.node.id, "Configuration loaded");
    }

    let metrics = &config.spec.observability.metrics;
    if metrics.enabled {
        init_metrics(SocketAddr::from(([0, 0, 0, 0], metrics.port)))?;
    }

    match cli.command {
        Commands::Controller(args) => commands::controller::run(args, config).await,
        Commands::Daemon(args) => commands::daemon::run(args, config).await,
        Commands::Local(args) => commands::local::run(args, config).await,
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if format == "json" {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}

fn init_metrics(addr: SocketAddr) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    info!(%addr, "Serving metrics");
    Ok(())
}
