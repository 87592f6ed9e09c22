// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Wiring of controller and daemon queues onto a [`Runtime`].

use std::sync::Arc;

use cohort_core::application::{Listener, QueueHandle, Runtime, RuntimeError};
use cohort_core::domain::agent::AgentId;
use cohort_core::domain::message_type::MessageType;
use cohort_core::infrastructure::EventBus;
use tracing::info;

use crate::application::controller::{Controller, ControllerSettings};
use crate::application::daemon::Daemon;
use crate::application::registry::AlgorithmRegistry;
use crate::domain::protocol::CONTROLLER_ID;

/// Creates and starts the controller queue. `port` is the well-known port in
/// TCP mode.
pub async fn spawn_controller(
    runtime: &Runtime,
    port: u16,
    events: EventBus,
    registry: Arc<AlgorithmRegistry>,
    settings: ControllerSettings,
) -> Result<QueueHandle, RuntimeError> {
    let mut queue = runtime
        .create_queue(AgentId::new(CONTROLLER_ID), port, None)
        .await?;
    info!(address = %queue.address(), min_daemons = settings.min_daemons, "Controller listening");
    let controller = Controller::new(runtime.directory(), events, registry, settings);
    queue.register_listener(MessageType::system(), Listener::incoming(controller));
    Ok(runtime.spawn(queue))
}

/// Creates and starts a daemon queue. It stays idle until it receives
/// `CONNECT_CONTROLLER`.
pub async fn spawn_daemon(
    runtime: &Runtime,
    id: AgentId,
    port: u16,
    events: EventBus,
    registry: Arc<AlgorithmRegistry>,
) -> Result<QueueHandle, RuntimeError> {
    let mut queue = runtime.create_queue(id, port, None).await?;
    info!(daemon = %queue.id(), address = %queue.address(), "Daemon listening");
    let daemon = Daemon::new(runtime.clone(), registry, events, queue.address().clone());
    queue.register_listener(MessageType::system(), Listener::incoming(daemon));
    Ok(runtime.spawn(queue))
}
