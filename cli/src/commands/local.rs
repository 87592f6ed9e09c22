// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `cohort local`: controller and daemons in one process.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use cohort_control::application::{
    spawn_controller, spawn_daemon, AlgorithmRegistry, ControllerSettings,
};
use cohort_control::domain::experiment::Experiment;
use cohort_control::domain::protocol::{self, ExperimentSource};
use cohort_core::application::{Runtime, TransportMode};
use cohort_core::domain::agent::{AgentAddress, AgentId};
use cohort_core::domain::node_config::NodeConfigManifest;
use cohort_core::infrastructure::pipe::TransportSettings;
use cohort_core::infrastructure::EventBus;

use crate::console;

const DAEMON_GRACE: Duration = Duration::from_secs(5);

#[derive(Args, Debug)]
pub struct LocalArgs {
    /// Experiment file
    #[arg(value_name = "FILE")]
    pub experiment: PathBuf,

    /// Number of daemons to spread agents over
    #[arg(short, long, default_value = "1")]
    pub daemons: usize,

    /// Emulated latency per message (default: transport.local_delay_ms)
    #[arg(long, value_name = "MS")]
    pub delay_ms: Option<u64>,

    /// Give up on a problem after this long unless it sets its own timeout
    #[arg(long, value_name = "MS")]
    pub run_timeout_ms: Option<u64>,
}

pub async fn run(args: LocalArgs, config: NodeConfigManifest) -> Result<()> {
    if args.daemons == 0 {
        anyhow::bail!("--daemons must be at least 1");
    }
    let delay = match args.delay_ms {
        Some(0) => None,
        Some(ms) => Some(Duration::from_millis(ms)),
        None => config.spec.transport.local_delay(),
    };
    let runtime = Runtime::new(
        TransportMode::InProcess { delay },
        TransportSettings::from(&config.spec.transport),
    );
    let events = EventBus::with_default_capacity();
    let registry = Arc::new(AlgorithmRegistry::builtin());

    // nothing else would stop the run if the controller rejected the file
    let source = ExperimentSource::Path(args.experiment.clone());
    let experiment = Experiment::load(&source)
        .await
        .with_context(|| format!("Cannot load {}", args.experiment.display()))?;
    experiment
        .check_components(|name| registry.is_algorithm(name) || registry.is_observer(name))
        .with_context(|| format!("Cannot run {}", args.experiment.display()))?;

    let settings = ControllerSettings {
        min_daemons: args.daemons,
        exit_when_done: true,
        run_timeout: args.run_timeout_ms.map(Duration::from_millis),
        ..Default::default()
    };
    let controller = spawn_controller(&runtime, 0, events.clone(), registry.clone(), settings)
        .await
        .context("Failed to start controller")?;

    let mut daemons = Vec::with_capacity(args.daemons);
    for i in 1..=args.daemons {
        let id = AgentId::new(format!("daemon-{}", i));
        let daemon = spawn_daemon(&runtime, id, 0, events.clone(), registry.clone())
            .await
            .context("Failed to start daemon")?;
        daemon
            .inject(protocol::connect_controller(&AgentAddress::Local)?)
            .await
            .context("Failed to connect daemon")?;
        daemons.push(daemon);
    }
    info!(
        daemons = daemons.len(),
        problems = experiment.problems.len(),
        ?delay,
        "Running experiment in-process"
    );
    controller
        .inject(protocol::load_experiment(&source)?)
        .await
        .context("Failed to hand experiment to controller")?;

    let summary = console::run(&controller, &events, false).await?;
    for daemon in &daemons {
        if tokio::time::timeout(DAEMON_GRACE, daemon.stopped()).await.is_err() {
            warn!(daemon = %daemon.id(), "Daemon still running; killing it");
            daemon.kill();
        }
    }
    runtime.shutdown().await;

    match summary.completed {
        Some(problems) if summary.faults == 0 && summary.timed_out == 0 => {
            println!("{}", format!("✓ {} problems completed", problems).green());
            Ok(())
        }
        Some(problems) => {
            println!(
                "{}",
                format!(
                    "⚠ {} problems completed, {} aborted by configuration faults, {} timed out",
                    problems, summary.faults, summary.timed_out
                )
                .yellow()
            );
            Ok(())
        }
        None => anyhow::bail!("experiment did not finish"),
    }
}
