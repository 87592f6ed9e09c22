// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Controller and daemons in separate runtimes talking over loopback TCP, the
//! way they run on separate hosts.

mod common;

use std::sync::Arc;

use cohort_control::application::{
    spawn_controller, spawn_daemon, AlgorithmRegistry, ControllerSettings,
};
use cohort_control::domain::protocol;
use cohort_core::application::{Runtime, TransportMode};
use cohort_core::domain::agent::{AgentAddress, AgentId};
use cohort_core::domain::events::ControlEvent;
use cohort_core::infrastructure::pipe::TransportSettings;
use cohort_core::infrastructure::EventBus;
use common::*;

fn tcp_runtime() -> Runtime {
    Runtime::new(
        TransportMode::Tcp {
            bind_address: "127.0.0.1".to_string(),
            advertised_host: "127.0.0.1".to_string(),
        },
        TransportSettings::default(),
    )
}

const RING: &str = r#"
problems:
  - name: ring
    agents:
      - agent: R1
        algorithm: token-ring
        params: { next: R2, laps: 2, initiator: true }
      - agent: R2
        algorithm: token-ring
        params: { next: R3, laps: 2 }
      - agent: R3
        algorithm: token-ring
        params: { next: R1, laps: 2 }
"#;

#[tokio::test]
async fn test_duplicate_daemon_id_is_rejected_before_configuration() {
    let events = EventBus::with_default_capacity();
    let mut receiver = events.subscribe();
    let registry = Arc::new(AlgorithmRegistry::builtin());

    let controller_runtime = tcp_runtime();
    let controller = spawn_controller(
        &controller_runtime,
        0,
        events.clone(),
        registry.clone(),
        ControllerSettings {
            min_daemons: 1,
            exit_when_done: true,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let controller_address = controller_runtime.address_of(controller.id()).unwrap();

    let first_runtime = tcp_runtime();
    let first = spawn_daemon(&first_runtime, "D1".into(), 0, events.clone(), registry.clone())
        .await
        .unwrap();
    first
        .inject(protocol::connect_controller(&controller_address).unwrap())
        .await
        .unwrap();
    events_until(&mut receiver, |e| {
        matches!(e, ControlEvent::DaemonRegistered { daemon, .. } if daemon.as_str() == "D1")
    })
    .await;

    // same ID, different host process
    let second_runtime = tcp_runtime();
    let second = spawn_daemon(&second_runtime, "D1".into(), 0, events.clone(), registry.clone())
        .await
        .unwrap();
    second
        .inject(protocol::connect_controller(&controller_address).unwrap())
        .await
        .unwrap();
    events_until(&mut receiver, |e| {
        matches!(e, ControlEvent::RegistrationRejected { agent, .. } if agent.as_str() == "D1")
    })
    .await;
    // the impostor hears about it and stops
    stopped(&second).await;
    assert_eq!(
        controller_runtime.directory().lookup(&AgentId::new("D1")).unwrap(),
        first_runtime.address_of(first.id()).unwrap()
    );

    load(&controller, RING).await;
    let seen = events_until(&mut receiver, is_all_done).await;
    assert!(seen.iter().any(|e| matches!(
        e,
        ControlEvent::ProblemStarted { agents: 3, .. }
    )));
    assert!(!seen
        .iter()
        .any(|e| matches!(e, ControlEvent::ConfigurationFault { .. })));
    assert_eq!(
        seen.last(),
        Some(&ControlEvent::AllProblemsCompleted { problems: 1 })
    );

    stopped(&controller).await;
    stopped(&first).await;
    assert!(first_runtime.live_agents().is_empty());
    first_runtime.shutdown().await;
    second_runtime.shutdown().await;
    controller_runtime.shutdown().await;
}

#[tokio::test]
async fn test_agents_on_different_hosts_reach_each_other() {
    let events = EventBus::with_default_capacity();
    let mut receiver = events.subscribe();
    let registry = Arc::new(AlgorithmRegistry::builtin());

    let controller_runtime = tcp_runtime();
    let controller = spawn_controller(
        &controller_runtime,
        0,
        events.clone(),
        registry.clone(),
        ControllerSettings {
            min_daemons: 2,
            exit_when_done: true,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let controller_address = controller_runtime.address_of(controller.id()).unwrap();
    assert!(matches!(controller_address, AgentAddress::Tcp { .. }));

    let mut hosts = Vec::new();
    for name in ["D1", "D2"] {
        let runtime = tcp_runtime();
        let daemon = spawn_daemon(&runtime, name.into(), 0, events.clone(), registry.clone())
            .await
            .unwrap();
        daemon
            .inject(protocol::connect_controller(&controller_address).unwrap())
            .await
            .unwrap();
        hosts.push((runtime, daemon));
    }

    load(&controller, RING).await;
    let seen = events_until(&mut receiver, is_all_done).await;
    let finished = seen
        .iter()
        .filter(|e| matches!(e, ControlEvent::AgentFinished { .. }))
        .count();
    assert_eq!(finished, 3);

    assert!(seen.contains(&ControlEvent::AgentsStarted { generation: 1 }));

    for (runtime, daemon) in &hosts {
        stopped(daemon).await;
        // remote entries merged for the run are gone with it
        for agent in ["R1", "R2", "R3"] {
            assert!(!runtime.directory().contains(&AgentId::new(agent)));
        }
        runtime.shutdown().await;
    }
    controller_runtime.shutdown().await;
}
