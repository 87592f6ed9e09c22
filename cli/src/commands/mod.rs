// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the cohort CLI

pub mod controller;
pub mod daemon;
pub mod local;

pub use self::controller::ControllerArgs;
pub use self::daemon::DaemonArgs;
pub use self::local::LocalArgs;

use cohort_core::application::{Runtime, TransportMode};
use cohort_core::domain::node_config::NodeConfigManifest;
use cohort_core::infrastructure::pipe::TransportSettings;

/// Networked runtime bound and advertised as the node config says.
pub(crate) fn tcp_runtime(config: &NodeConfigManifest) -> Runtime {
    let network = &config.spec.network;
    Runtime::new(
        TransportMode::Tcp {
            bind_address: network.bind_address.clone(),
            advertised_host: network.advertised_host.clone(),
        },
        TransportSettings::from(&config.spec.transport),
    )
}
