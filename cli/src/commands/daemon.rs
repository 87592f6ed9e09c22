// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `cohort daemon`

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::sync::Arc;

use cohort_control::application::{spawn_daemon, AlgorithmRegistry};
use cohort_control::domain::protocol;
use cohort_core::domain::agent::AgentId;
use cohort_core::domain::node_config::{NodeConfigManifest, NodeRole};
use cohort_core::infrastructure::EventBus;

use crate::console;

#[derive(Args, Debug)]
pub struct DaemonArgs {
    /// Controller endpoint (overrides network.controller_endpoint)
    #[arg(long, value_name = "HOST:PORT")]
    pub controller: Option<String>,

    /// Daemon ID (default: node.id from config, else the hostname)
    #[arg(long)]
    pub id: Option<String>,

    /// Port of the daemon's own queue (default: ephemeral)
    #[arg(short, long)]
    pub port: Option<u16>,
}

pub async fn run(args: DaemonArgs, mut config: NodeConfigManifest) -> Result<()> {
    config.spec.node.role = NodeRole::Daemon;
    if let Some(endpoint) = args.controller {
        config.spec.network.controller_endpoint = Some(endpoint);
    }
    if let Some(id) = args.id {
        config.spec.node.id = id;
    }
    if let Some(port) = args.port {
        config.spec.network.port = Some(port);
    }
    let controller = config.controller_address()?;

    let runtime = super::tcp_runtime(&config);
    let events = EventBus::with_default_capacity();
    let registry = Arc::new(AlgorithmRegistry::builtin());
    let daemon = spawn_daemon(
        &runtime,
        AgentId::new(config.spec.node.id.clone()),
        config.queue_port(),
        events.clone(),
        registry,
    )
    .await
    .context("Failed to start daemon")?;

    if let Some(address) = runtime.address_of(daemon.id()) {
        println!("{}", format!("✓ Daemon {} listening on {}", daemon.id(), address).green());
    }
    match controller {
        Some(controller) => daemon
            .inject(protocol::connect_controller(&controller)?)
            .await
            .context("Failed to connect daemon")?,
        None => println!("{}", "No controller configured; use 'connect <host:port>'".yellow()),
    }

    console::run(&daemon, &events, true).await?;
    runtime.shutdown().await;
    Ok(())
}
