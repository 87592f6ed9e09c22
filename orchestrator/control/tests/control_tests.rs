// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Controller and daemons in one process over in-process pipes.

mod common;

use std::time::Duration;

use cohort_control::application::ControllerSettings;
use cohort_control::domain::protocol::{self, FinishedNotice, Reporting};
use cohort_core::domain::agent::{AgentAddress, AgentId};
use cohort_core::domain::events::ControlEvent;
use common::*;

const THREE_FINISH_ON_CONFIG: &str = r#"
problems:
  - name: trivial
    agents:
      - { agent: A1, algorithm: finish-on-config }
      - { agent: A2, algorithm: finish-on-config }
      - { agent: A3, algorithm: finish-on-config, observers: [message-log] }
"#;

#[tokio::test]
async fn test_three_agents_must_all_finish_before_done() {
    let (system, mut events) = in_process_system(3).await;
    load(&system.controller, THREE_FINISH_ON_CONFIG).await;

    let seen = events_until(&mut events, is_all_done).await;

    let registered = seen
        .iter()
        .filter(|e| matches!(e, ControlEvent::DaemonRegistered { .. }))
        .count();
    assert_eq!(registered, 3);

    let finished: Vec<(usize, usize)> = seen
        .iter()
        .filter_map(|e| match e {
            ControlEvent::AgentFinished {
                finished, expected, ..
            } => Some((*finished, *expected)),
            _ => None,
        })
        .collect();
    assert_eq!(finished, vec![(1, 3), (2, 3), (3, 3)]);

    // the problem only completes after the third completion notice
    let third = seen
        .iter()
        .position(|e| matches!(e, ControlEvent::AgentFinished { finished: 3, .. }))
        .unwrap();
    let completed = seen
        .iter()
        .position(|e| matches!(e, ControlEvent::ProblemCompleted { .. }))
        .unwrap();
    assert!(third < completed);
    assert_eq!(
        seen.last(),
        Some(&ControlEvent::AllProblemsCompleted { problems: 1 })
    );

    // done: the controller exits and every daemon is told to shut down
    stopped(&system.controller).await;
    for daemon in &system.daemons {
        stopped(daemon).await;
    }
    assert!(!system.runtime.directory().contains(&"A1".into()));
    system.runtime.shutdown().await;
}

const RING_THEN_TRIVIAL: &str = r#"
problems:
  - name: ring
    agents:
      - agent: R1
        algorithm: token-ring
        params: { next: R2, laps: 3, initiator: true }
        observers: [message-stats]
      - agent: R2
        algorithm: token-ring
        params: { next: R3, laps: 3 }
      - agent: R3
        algorithm: token-ring
        params: { next: R1, laps: 3 }
  - name: trivial
    agents:
      - { agent: T1, algorithm: finish-on-config }
"#;

#[tokio::test]
async fn test_problems_run_one_after_another() {
    let (system, mut events) = in_process_system(2).await;
    load(&system.controller, RING_THEN_TRIVIAL).await;

    let seen = events_until(&mut events, is_all_done).await;
    let order: Vec<String> = seen
        .iter()
        .filter_map(|e| match e {
            ControlEvent::ProblemStarted {
                generation,
                problem,
                ..
            } => Some(format!("start {} {}", generation, problem)),
            ControlEvent::ProblemCompleted {
                generation,
                problem,
                ..
            } => Some(format!("done {} {}", generation, problem)),
            _ => None,
        })
        .collect();
    assert_eq!(
        order,
        vec!["start 1 ring", "done 1 ring", "start 2 trivial", "done 2 trivial"]
    );
    assert!(seen.contains(&ControlEvent::AgentsStarted { generation: 1 }));

    let traffic: Vec<(String, u64, u64, u64)> = seen
        .iter()
        .filter_map(|e| match e {
            ControlEvent::ProblemCompleted {
                problem,
                elapsed_ms,
                messages,
                bytes,
                ..
            } => Some((problem.clone(), *elapsed_ms, *messages, *bytes)),
            _ => None,
        })
        .collect();
    // R1 passes the token three times, then reports to its daemon
    let (_, ring_ms, ring_messages, ring_bytes) = &traffic[0];
    assert_eq!(*ring_messages, 4);
    assert!(*ring_bytes > 0);
    assert!(*ring_ms < WAIT.as_millis() as u64);
    // no observer on the trivial problem
    assert_eq!((traffic[1].2, traffic[1].3), (0, 0));
    assert_eq!(
        seen.last(),
        Some(&ControlEvent::AllProblemsCompleted { problems: 2 })
    );
    system.runtime.shutdown().await;
}

#[tokio::test]
async fn test_waits_for_enough_daemons() {
    let (system, mut events) = in_process_system(2).await;
    events_until(&mut events, |e| {
        matches!(e, ControlEvent::DaemonRegistered { .. })
    })
    .await;
    // min_daemons is 2, so nothing is distributed before the second registration
    load(&system.controller, THREE_FINISH_ON_CONFIG).await;

    let seen = events_until(&mut events, is_all_done).await;
    let started = seen
        .iter()
        .position(|e| matches!(e, ControlEvent::ProblemStarted { .. }))
        .unwrap();
    let registrations_before_start = seen[..started]
        .iter()
        .filter(|e| matches!(e, ControlEvent::DaemonRegistered { .. }))
        .count();
    assert_eq!(registrations_before_start, 1);
    assert!(matches!(
        seen[started],
        ControlEvent::ProblemStarted { agents: 3, .. }
    ));
    system.runtime.shutdown().await;
}

#[tokio::test]
async fn test_unknown_algorithm_is_rejected_before_distribution() {
    let (system, mut events) = in_process_system(1).await;
    load(
        &system.controller,
        "problems:\n  - name: p\n    agents:\n      - { agent: A1, algorithm: dpop }\n",
    )
    .await;

    let seen = events_until(&mut events, |e| {
        matches!(e, ControlEvent::ConfigurationFault { .. })
    })
    .await;
    assert!(!seen
        .iter()
        .any(|e| matches!(e, ControlEvent::ProblemStarted { .. })));
    match seen.last() {
        Some(ControlEvent::ConfigurationFault { reason, .. }) => assert!(reason.contains("dpop")),
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(system.controller.is_alive());
    system.runtime.shutdown().await;
}

#[tokio::test]
async fn test_agent_id_collision_aborts_problem() {
    let (system, mut events) = in_process_system(1).await;
    // "D1" is already taken by the daemon's own queue
    load(
        &system.controller,
        r#"
problems:
  - name: clash
    agents:
      - { agent: D1, algorithm: finish-on-config }
      - { agent: A2, algorithm: finish-on-config }
"#,
    )
    .await;

    let seen = events_until(&mut events, is_all_done).await;
    assert!(seen.iter().any(|e| matches!(
        e,
        ControlEvent::ConfigurationFault { problem, .. } if problem == "clash"
    )));
    assert!(!seen
        .iter()
        .any(|e| matches!(e, ControlEvent::ProblemCompleted { .. })));
    assert_eq!(
        seen.last(),
        Some(&ControlEvent::AllProblemsCompleted { problems: 0 })
    );
    system.runtime.shutdown().await;
}

/// A ring nobody starts: no agent ever finishes on its own.
const IDLE_RING_THEN_TRIVIAL: &str = r#"
problems:
  - name: stuck
    timeout_ms: 300
    agents:
      - { agent: S1, algorithm: token-ring, params: { next: S2 } }
      - { agent: S2, algorithm: token-ring, params: { next: S1 } }
  - name: trivial
    agents:
      - { agent: T1, algorithm: finish-on-config }
"#;

fn quick_teardown(daemons: usize) -> ControllerSettings {
    ControllerSettings {
        min_daemons: daemons,
        exit_when_done: true,
        run_timeout: None,
        kill_grace: Duration::from_millis(200),
    }
}

#[tokio::test]
async fn test_daemon_lost_mid_run_times_out_and_moves_on() {
    let (system, mut events) = in_process_system_with(2, quick_teardown(2)).await;
    load(&system.controller, IDLE_RING_THEN_TRIVIAL).await;
    events_until(&mut events, |e| {
        matches!(e, ControlEvent::AgentsStarted { generation: 1 })
    })
    .await;

    // S2 is hosted on D2
    system.daemons[1].kill();
    stopped(&system.daemons[1]).await;

    let seen = events_until(&mut events, is_all_done).await;
    assert!(seen.contains(&ControlEvent::ProblemTimedOut {
        generation: 1,
        problem: "stuck".into(),
        finished: 0,
        expected: 2,
    }));
    assert!(seen.iter().any(|e| matches!(
        e,
        ControlEvent::PeerUnreachable { agent, .. } if agent.as_str() == "D2"
    )));
    // the next problem only goes to the daemon that is left
    assert!(seen.contains(&ControlEvent::ProblemStarted {
        generation: 2,
        problem: "trivial".into(),
        agents: 1,
    }));
    assert_eq!(
        seen.last(),
        Some(&ControlEvent::AllProblemsCompleted { problems: 1 })
    );
    stopped(&system.controller).await;
    system.runtime.shutdown().await;
}

#[tokio::test]
async fn test_daemon_that_never_acknowledges_the_kill_is_dropped() {
    let (system, mut events) = in_process_system_with(1, quick_teardown(1)).await;
    events_until(&mut events, |e| {
        matches!(e, ControlEvent::DaemonRegistered { daemon, .. } if daemon.as_str() == "D1")
    })
    .await;

    // registers like a daemon, then swallows everything it is sent
    let mute = system
        .runtime
        .create_queue("D9".into(), 0, None)
        .await
        .unwrap();
    let mute = system.runtime.spawn(mute);
    let report = Reporting {
        id: AgentId::new("D9"),
        address: AgentAddress::Local,
        generation: None,
    };
    system
        .controller
        .inject(protocol::daemon_reporting(&report).unwrap())
        .await
        .unwrap();
    load(
        &system.controller,
        r#"
problems:
  - name: half
    timeout_ms: 300
    agents:
      - { agent: M1, algorithm: finish-on-config }
      - { agent: M2, algorithm: finish-on-config }
"#,
    )
    .await;

    let seen = events_until(&mut events, is_all_done).await;
    let timed_out = seen
        .iter()
        .position(|e| matches!(e, ControlEvent::ProblemTimedOut { expected: 2, .. }))
        .unwrap();
    let dropped = seen
        .iter()
        .position(|e| matches!(
            e,
            ControlEvent::PeerUnreachable { agent, reason }
                if agent.as_str() == "D9" && reason.contains("acknowledgement")
        ))
        .unwrap();
    assert!(timed_out < dropped);
    assert_eq!(
        seen.last(),
        Some(&ControlEvent::AllProblemsCompleted { problems: 0 })
    );
    stopped(&system.controller).await;
    mute.kill();
    system.runtime.shutdown().await;
}

#[tokio::test]
async fn test_completion_from_an_agent_outside_the_run_is_ignored() {
    let (system, mut events) = in_process_system(1).await;
    load(
        &system.controller,
        r#"
problems:
  - name: idle
    agents:
      - { agent: S1, algorithm: token-ring, params: { next: S2 } }
      - { agent: S2, algorithm: token-ring, params: { next: S1 } }
"#,
    )
    .await;
    events_until(&mut events, |e| {
        matches!(e, ControlEvent::AgentsStarted { generation: 1 })
    })
    .await;

    for agent in ["X9", "S1", "S2"] {
        let notice = FinishedNotice {
            agent: AgentId::new(agent),
            generation: 1,
        };
        system
            .controller
            .inject(protocol::agent_finished(&notice).unwrap())
            .await
            .unwrap();
    }

    let seen = events_until(&mut events, is_all_done).await;
    let finished: Vec<(String, usize)> = seen
        .iter()
        .filter_map(|e| match e {
            ControlEvent::AgentFinished { agent, finished, .. } => {
                Some((agent.to_string(), *finished))
            }
            _ => None,
        })
        .collect();
    assert_eq!(finished, vec![("S1".to_string(), 1), ("S2".to_string(), 2)]);
    assert_eq!(
        seen.last(),
        Some(&ControlEvent::AllProblemsCompleted { problems: 1 })
    );
    system.runtime.shutdown().await;
}
