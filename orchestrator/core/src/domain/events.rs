// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::{AgentAddress, AgentId};

/// Control-plane events published by the controller and daemons.
///
/// The console prints them; tests await them instead of sleeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControlEvent {
    DaemonRegistered {
        daemon: AgentId,
        address: AgentAddress,
    },
    RegistrationRejected {
        agent: AgentId,
        reason: String,
    },
    ProblemStarted {
        generation: u64,
        problem: String,
        agents: usize,
    },
    AgentsStarted {
        generation: u64,
    },
    AgentFinished {
        generation: u64,
        agent: AgentId,
        finished: usize,
        expected: usize,
    },
    ProblemCompleted {
        generation: u64,
        problem: String,
        /// From distribution to the last completion notice.
        elapsed_ms: u64,
        /// Outgoing traffic reported by the run's message-stats observers.
        messages: u64,
        bytes: u64,
    },
    ProblemTimedOut {
        generation: u64,
        problem: String,
        finished: usize,
        expected: usize,
    },
    ConfigurationFault {
        problem: String,
        reason: String,
    },
    PeerUnreachable {
        agent: AgentId,
        reason: String,
    },
    AllProblemsCompleted {
        problems: usize,
    },
    UserNotification {
        message: String,
    },
}

impl ControlEvent {
    /// One-line human-readable rendering used by the console.
    pub fn summary(&self) -> String {
        match self {
            Self::DaemonRegistered { daemon, address } => {
                format!("daemon {} registered at {}", daemon, address)
            }
            Self::RegistrationRejected { agent, reason } => {
                format!("registration of {} rejected: {}", agent, reason)
            }
            Self::ProblemStarted {
                generation,
                problem,
                agents,
            } => format!(
                "problem '{}' (run {}) configured on {} agents",
                problem, generation, agents
            ),
            Self::AgentsStarted { generation } => format!("run {} started", generation),
            Self::AgentFinished {
                agent,
                finished,
                expected,
                ..
            } => format!("agent {} finished ({}/{})", agent, finished, expected),
            Self::ProblemCompleted {
                problem,
                elapsed_ms,
                messages,
                bytes,
                ..
            } => format!(
                "problem '{}' completed in {} ms ({} messages, {} bytes)",
                problem, elapsed_ms, messages, bytes
            ),
            Self::ProblemTimedOut {
                problem,
                finished,
                expected,
                ..
            } => format!(
                "problem '{}' timed out with {}/{} agents finished",
                problem, finished, expected
            ),
            Self::ConfigurationFault { problem, reason } => {
                format!("configuration fault in '{}': {}", problem, reason)
            }
            Self::PeerUnreachable { agent, reason } => {
                format!("peer unreachable: {} ({})", agent, reason)
            }
            Self::AllProblemsCompleted { problems } => {
                format!("all {} problems completed", problems)
            }
            Self::UserNotification { message } => message.clone(),
        }
    }
}

/// A published event with its publication time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: ControlEvent,
}

impl EventRecord {
    pub fn now(event: ControlEvent) -> Self {
        Self {
            at: Utc::now(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_summary_carries_duration_and_traffic() {
        let event = ControlEvent::ProblemCompleted {
            generation: 2,
            problem: "ring".into(),
            elapsed_ms: 41,
            messages: 9,
            bytes: 1200,
        };
        assert_eq!(
            event.summary(),
            "problem 'ring' completed in 41 ms (9 messages, 1200 bytes)"
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "problem_completed");
        assert_eq!(json["elapsed_ms"], 41);
    }

    #[test]
    fn test_timeout_summary() {
        let event = ControlEvent::ProblemTimedOut {
            generation: 1,
            problem: "ring".into(),
            finished: 1,
            expected: 3,
        };
        assert_eq!(event.summary(), "problem 'ring' timed out with 1/3 agents finished");
    }
}
