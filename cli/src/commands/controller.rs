// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `cohort controller`

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use cohort_control::application::{spawn_controller, AlgorithmRegistry, ControllerSettings};
use cohort_control::domain::protocol::{self, ExperimentSource};
use cohort_core::domain::node_config::{NodeConfigManifest, NodeRole};
use cohort_core::infrastructure::EventBus;

use crate::console;

#[derive(Args, Debug)]
pub struct ControllerArgs {
    /// Experiment file to load once the controller is listening
    #[arg(short, long, value_name = "FILE")]
    pub experiment: Option<PathBuf>,

    /// Daemons that must register before the first problem is distributed
    #[arg(long, default_value = "1")]
    pub min_daemons: usize,

    /// Stop once every loaded problem is done
    #[arg(long)]
    pub exit_when_done: bool,

    /// Well-known port (default: network.port from config, else 3000)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Give up on a problem after this long unless it sets its own timeout
    #[arg(long, value_name = "MS")]
    pub run_timeout_ms: Option<u64>,
}

pub async fn run(args: ControllerArgs, mut config: NodeConfigManifest) -> Result<()> {
    config.spec.node.role = NodeRole::Controller;
    if let Some(port) = args.port {
        config.spec.network.port = Some(port);
    }

    let runtime = super::tcp_runtime(&config);
    let events = EventBus::with_default_capacity();
    let registry = Arc::new(AlgorithmRegistry::builtin());
    let settings = ControllerSettings {
        min_daemons: args.min_daemons,
        exit_when_done: args.exit_when_done,
        run_timeout: args.run_timeout_ms.map(Duration::from_millis),
        ..Default::default()
    };
    let controller = spawn_controller(&runtime, config.queue_port(), events.clone(), registry, settings)
        .await
        .context("Failed to start controller")?;

    if let Some(address) = runtime.address_of(controller.id()) {
        println!("{}", format!("✓ Controller listening on {}", address).green());
    }
    if let Some(path) = args.experiment {
        info!(path = %path.display(), "Loading experiment");
        controller
            .inject(protocol::load_experiment(&ExperimentSource::Path(path))?)
            .await
            .context("Failed to hand experiment to controller")?;
    }

    let summary = console::run(&controller, &events, true).await?;
    runtime.shutdown().await;
    if let Some(problems) = summary.completed {
        println!(
            "{} problems completed, {} configuration faults, {} timed out",
            problems, summary.faults, summary.timed_out
        );
    }
    Ok(())
}
