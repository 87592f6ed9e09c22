// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Control protocol messages, experiment files and the controller's run state.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types shared by the controller and daemons

pub mod experiment;
pub mod protocol;
pub mod run_state;

pub use experiment::{AgentRole, Experiment, ExperimentError, Problem};
pub use protocol::CONTROLLER_ID;
pub use run_state::{Progress, RunState};
