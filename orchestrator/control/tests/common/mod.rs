// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use cohort_control::application::{
    spawn_controller, spawn_daemon, AlgorithmRegistry, ControllerSettings,
};
use cohort_control::domain::protocol::{self, ExperimentSource};
use cohort_core::application::{QueueHandle, Runtime};
use cohort_core::domain::agent::AgentAddress;
use cohort_core::domain::events::ControlEvent;
use cohort_core::infrastructure::{EventBus, EventReceiver};

pub const WAIT: Duration = Duration::from_secs(10);

pub struct System {
    pub runtime: Runtime,
    pub events: EventBus,
    pub registry: Arc<AlgorithmRegistry>,
    pub controller: QueueHandle,
    pub daemons: Vec<QueueHandle>,
}

/// Controller plus `daemons` daemons in one in-process runtime, all connected.
pub async fn in_process_system(daemons: usize) -> (System, EventReceiver) {
    let settings = ControllerSettings {
        min_daemons: daemons,
        exit_when_done: true,
        ..Default::default()
    };
    in_process_system_with(daemons, settings).await
}

pub async fn in_process_system_with(
    daemons: usize,
    settings: ControllerSettings,
) -> (System, EventReceiver) {
    let runtime = Runtime::in_process();
    let events = EventBus::with_default_capacity();
    let receiver = events.subscribe();
    let registry = Arc::new(AlgorithmRegistry::builtin());
    let controller = spawn_controller(&runtime, 0, events.clone(), registry.clone(), settings)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 1..=daemons {
        let daemon = spawn_daemon(
            &runtime,
            format!("D{}", i).into(),
            0,
            events.clone(),
            registry.clone(),
        )
        .await
        .unwrap();
        daemon
            .inject(protocol::connect_controller(&AgentAddress::Local).unwrap())
            .await
            .unwrap();
        handles.push(daemon);
    }

    let system = System {
        runtime,
        events,
        registry,
        controller,
        daemons: handles,
    };
    (system, receiver)
}

pub async fn load(controller: &QueueHandle, yaml: &str) {
    controller
        .inject(protocol::load_experiment(&ExperimentSource::Inline(yaml.to_string())).unwrap())
        .await
        .unwrap();
}

/// Every event up to and including the first one matching `last`.
pub async fn events_until(
    receiver: &mut EventReceiver,
    mut last: impl FnMut(&ControlEvent) -> bool,
) -> Vec<ControlEvent> {
    let mut seen = Vec::new();
    let collect = async {
        loop {
            let record = receiver.recv().await.expect("event bus closed");
            let done = last(&record.event);
            seen.push(record.event);
            if done {
                break;
            }
        }
    };
    if tokio::time::timeout(WAIT, collect).await.is_err() {
        panic!("timed out; events so far: {:#?}", seen);
    }
    seen
}

pub async fn stopped(handle: &QueueHandle) {
    tokio::time::timeout(WAIT, handle.stopped())
        .await
        .unwrap_or_else(|_| panic!("{} did not stop", handle.id()));
}

pub fn is_all_done(event: &ControlEvent) -> bool {
    matches!(event, ControlEvent::AllProblemsCompleted { .. })
}
