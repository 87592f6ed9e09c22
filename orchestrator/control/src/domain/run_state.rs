// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Controller run state.
//!
//! ```text
//! Idle ──load──▶ AwaitingRegistrations ──enough daemons──▶ Running(g)
//!                                                             │ finished == expected
//!                                                             ▼
//!                        Done ◀──no problems left── Advancing(g) ──next problem──▶ Running(g+1)
//! ```
//!
//! Every run carries a generation number. Reports tagged with any other
//! generation are stale and change nothing.

use std::collections::BTreeSet;
use std::fmt;

use cohort_core::domain::agent::AgentId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RunState {
    #[default]
    Idle,
    AwaitingRegistrations,
    Running {
        generation: u64,
        expected: usize,
        reported: BTreeSet<AgentId>,
        finished: BTreeSet<AgentId>,
    },
    Advancing {
        generation: u64,
        pending_acks: BTreeSet<AgentId>,
    },
    Done,
}

/// Result of recording one report against the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Wrong generation or wrong phase.
    Stale,
    Duplicate,
    Pending { count: usize, expected: usize },
    Complete { expected: usize },
}

impl RunState {
    pub fn running(generation: u64, expected: usize) -> Self {
        Self::Running {
            generation,
            expected,
            reported: BTreeSet::new(),
            finished: BTreeSet::new(),
        }
    }

    pub fn advancing(generation: u64, pending_acks: impl IntoIterator<Item = AgentId>) -> Self {
        Self::Advancing {
            generation,
            pending_acks: pending_acks.into_iter().collect(),
        }
    }

    pub fn generation(&self) -> Option<u64> {
        match self {
            Self::Running { generation, .. } | Self::Advancing { generation, .. } => Some(*generation),
            _ => None,
        }
    }

    /// Whether a new problem may be started from this state.
    pub fn is_between_runs(&self) -> bool {
        matches!(self, Self::Idle | Self::AwaitingRegistrations | Self::Done)
    }

    pub fn record_report(&mut self, at: u64, agent: &AgentId) -> Progress {
        match self {
            Self::Running {
                generation,
                expected,
                reported,
                ..
            } if *generation == at => count(reported, agent, *expected),
            _ => Progress::Stale,
        }
    }

    pub fn record_finished(&mut self, at: u64, agent: &AgentId) -> Progress {
        match self {
            Self::Running {
                generation,
                expected,
                finished,
                ..
            } if *generation == at => count(finished, agent, *expected),
            _ => Progress::Stale,
        }
    }

    /// Records a kill acknowledgement from `daemon`.
    pub fn record_ack(&mut self, at: u64, daemon: &AgentId) -> Progress {
        match self {
            Self::Advancing {
                generation,
                pending_acks,
            } if *generation == at => {
                if !pending_acks.remove(daemon) {
                    return Progress::Duplicate;
                }
                if pending_acks.is_empty() {
                    Progress::Complete { expected: 0 }
                } else {
                    Progress::Pending {
                        count: pending_acks.len(),
                        expected: 0,
                    }
                }
            }
            _ => Progress::Stale,
        }
    }

    /// Stops waiting for an acknowledgement from a daemon that went away.
    /// Returns true if that was the last one.
    pub fn forget_daemon(&mut self, daemon: &AgentId) -> bool {
        match self {
            Self::Advancing { pending_acks, .. } => {
                pending_acks.remove(daemon) && pending_acks.is_empty()
            }
            _ => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingRegistrations => "awaiting_registrations",
            Self::Running { .. } => "running",
            Self::Advancing { .. } => "advancing",
            Self::Done => "done",
        }
    }
}

fn count(set: &mut BTreeSet<AgentId>, agent: &AgentId, expected: usize) -> Progress {
    if !set.insert(agent.clone()) {
        return Progress::Duplicate;
    }
    if set.len() >= expected {
        Progress::Complete { expected }
    } else {
        Progress::Pending {
            count: set.len(),
            expected,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running {
                generation,
                expected,
                reported,
                finished,
            } => write!(
                f,
                "running(g={}, reported={}/{}, finished={}/{})",
                generation,
                reported.len(),
                expected,
                finished.len(),
                expected
            ),
            Self::Advancing {
                generation,
                pending_acks,
            } => write!(f, "advancing(g={}, acks pending={})", generation, pending_acks.len()),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<AgentId> {
        names.iter().map(|n| AgentId::new(*n)).collect()
    }

    #[test]
    fn test_finished_must_reach_expected() {
        let mut state = RunState::running(1, 3);
        let agents = ids(&["A1", "A2", "A3"]);
        assert_eq!(
            state.record_finished(1, &agents[0]),
            Progress::Pending { count: 1, expected: 3 }
        );
        assert_eq!(state.record_finished(1, &agents[0]), Progress::Duplicate);
        assert_eq!(
            state.record_finished(1, &agents[1]),
            Progress::Pending { count: 2, expected: 3 }
        );
        assert_eq!(
            state.record_finished(1, &agents[2]),
            Progress::Complete { expected: 3 }
        );
    }

    #[test]
    fn test_stale_generation_is_ignored() {
        let mut state = RunState::running(2, 1);
        let a1 = AgentId::new("A1");
        assert_eq!(state.record_report(1, &a1), Progress::Stale);
        assert_eq!(state.record_finished(3, &a1), Progress::Stale);
        assert_eq!(state, RunState::running(2, 1));
        assert_eq!(RunState::Idle.record_finished(2, &a1), Progress::Stale);
    }

    #[test]
    fn test_duplicate_report_is_detected() {
        let mut state = RunState::running(1, 2);
        let a1 = AgentId::new("A1");
        assert!(matches!(state.record_report(1, &a1), Progress::Pending { .. }));
        assert_eq!(state.record_report(1, &a1), Progress::Duplicate);
    }

    #[test]
    fn test_advancing_waits_for_every_daemon() {
        let daemons = ids(&["D1", "D2"]);
        let mut state = RunState::advancing(5, daemons.clone());
        assert_eq!(state.generation(), Some(5));
        assert!(!state.is_between_runs());
        assert_eq!(state.record_ack(4, &daemons[0]), Progress::Stale);
        assert!(matches!(state.record_ack(5, &daemons[0]), Progress::Pending { count: 1, .. }));
        assert_eq!(state.record_ack(5, &daemons[0]), Progress::Duplicate);
        assert!(state.forget_daemon(&daemons[1]));
    }

    #[test]
    fn test_display() {
        let mut state = RunState::running(1, 2);
        state.record_report(1, &AgentId::new("A1"));
        assert_eq!(state.to_string(), "running(g=1, reported=1/2, finished=0/2)");
        assert_eq!(RunState::Done.to_string(), "done");
        assert!(RunState::Done.is_between_runs());
    }
}
