// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod algorithms;
pub mod controller;
pub mod daemon;
pub mod node;
pub mod registry;

pub use controller::{Controller, ControllerSettings};
pub use daemon::Daemon;
pub use node::{spawn_controller, spawn_daemon};
pub use registry::{AgentContext, AlgorithmRegistry, OutboxExt, RegistryError};
