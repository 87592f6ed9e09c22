// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Algorithm Registry
//!
//! Maps the names used in experiment files to listener constructors. Names
//! are resolved when a daemon configures an agent; the controller only checks
//! that they exist.
//!
//! | Name | Kind | Listeners |
//! |------|------|-----------|
//! | `finish-on-config` | algorithm | reports completion as soon as it is configured |
//! | `token-ring` | algorithm | passes a token around a ring `laps` times |
//! | `message-log` | observer | logs every incoming message |
//! | `message-stats` | observer | counts outgoing traffic per type and destination into the agent's stats handle |

use std::collections::BTreeMap;

use async_trait::async_trait;
use cohort_core::application::stats::{MessageStats, StatsHandle};
use cohort_core::application::{Delivery, Listener, Outbox};
use cohort_core::domain::agent::AgentId;
use cohort_core::domain::error::CommunicationError;
use cohort_core::domain::message_type::MessageType;
use thiserror::Error;

use crate::application::algorithms::{FinishOnConfig, MessageLog, TokenRing};
use crate::domain::experiment::AgentRole;
use crate::domain::protocol::{self, FinishedNotice, ProblemDescription, CONTROLLER_ID};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown algorithm or observer '{0}'")]
    UnknownComponent(String),

    #[error("Bad parameters for '{component}': {reason}")]
    BadParameters { component: String, reason: String },
}

/// Everything a constructor knows about the agent it builds listeners for.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub agent: AgentId,
    pub generation: u64,
    pub problem: ProblemDescription,
    pub role: AgentRole,
    /// Where a `message-stats` observer counts. Stays empty without one.
    pub stats: StatsHandle,
}

/// Listeners to register on one agent queue, with their interest types.
pub type ListenerSet = Vec<(MessageType, Listener)>;

type Constructor = fn(&AgentContext) -> Result<ListenerSet, RegistryError>;

#[derive(Clone)]
pub struct AlgorithmRegistry {
    algorithms: BTreeMap<&'static str, Constructor>,
    observers: BTreeMap<&'static str, Constructor>,
}

impl AlgorithmRegistry {
    pub fn empty() -> Self {
        Self {
            algorithms: BTreeMap::new(),
            observers: BTreeMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register_algorithm("finish-on-config", FinishOnConfig::listeners);
        registry.register_algorithm("token-ring", TokenRing::listeners);
        registry.register_observer("message-log", MessageLog::listeners);
        registry.register_observer("message-stats", message_stats);
        registry
    }

    pub fn register_algorithm(&mut self, name: &'static str, constructor: Constructor) {
        self.algorithms.insert(name, constructor);
    }

    pub fn register_observer(&mut self, name: &'static str, constructor: Constructor) {
        self.observers.insert(name, constructor);
    }

    pub fn is_algorithm(&self, name: &str) -> bool {
        self.algorithms.contains_key(name)
    }

    pub fn is_observer(&self, name: &str) -> bool {
        self.observers.contains_key(name)
    }

    /// Every registered name, algorithms first.
    pub fn names(&self) -> Vec<&'static str> {
        self.algorithms.keys().chain(self.observers.keys()).copied().collect()
    }

    /// Builds the role's algorithm listeners followed by one set per observer.
    pub fn build(&self, context: &AgentContext) -> Result<ListenerSet, RegistryError> {
        let role = &context.role;
        let algorithm = self
            .algorithms
            .get(role.algorithm.as_str())
            .ok_or_else(|| RegistryError::UnknownComponent(role.algorithm.clone()))?;
        let mut listeners = algorithm(context)?;
        for name in &role.observers {
            let observer = self
                .observers
                .get(name.as_str())
                .ok_or_else(|| RegistryError::UnknownComponent(name.clone()))?;
            listeners.extend(observer(context)?);
        }
        Ok(listeners)
    }
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn message_stats(context: &AgentContext) -> Result<ListenerSet, RegistryError> {
    let stats = MessageStats::attach(context.agent.clone(), &context.stats);
    Ok(vec![(MessageType::root(), Listener::outgoing(stats))])
}

/// Control-plane helpers for algorithm listeners.
#[async_trait]
pub trait OutboxExt {
    /// Sends `AGENT_FINISHED` to the agent's supervisor, or straight to the
    /// controller when the agent has none.
    async fn report_finished(&mut self, generation: u64) -> Result<Delivery, CommunicationError>;
}

#[async_trait]
impl OutboxExt for Outbox {
    async fn report_finished(&mut self, generation: u64) -> Result<Delivery, CommunicationError> {
        let to = self
            .supervisor()
            .cloned()
            .unwrap_or_else(|| AgentId::new(CONTROLLER_ID));
        let notice = FinishedNotice {
            agent: self.id().clone(),
            generation,
        };
        self.send(&to, protocol::agent_finished(&notice)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_core::application::OutgoingListener;

    fn context(algorithm: &str, params: serde_json::Value, observers: &[&str]) -> AgentContext {
        AgentContext {
            agent: "A1".into(),
            generation: 1,
            problem: ProblemDescription {
                name: "p".into(),
                body: serde_json::Value::Null,
            },
            role: AgentRole {
                agent: "A1".into(),
                algorithm: algorithm.into(),
                params,
                observers: observers.iter().map(|o| o.to_string()).collect(),
            },
            stats: StatsHandle::default(),
        }
    }

    #[test]
    fn test_builtin_names() {
        let registry = AlgorithmRegistry::builtin();
        assert_eq!(
            registry.names(),
            vec!["finish-on-config", "token-ring", "message-log", "message-stats"]
        );
        assert!(registry.is_algorithm("token-ring"));
        assert!(!registry.is_algorithm("message-log"));
        assert!(registry.is_observer("message-log"));
    }

    #[test]
    fn test_build_adds_observers_after_algorithm() {
        let registry = AlgorithmRegistry::builtin();
        let listeners = registry
            .build(&context(
                "finish-on-config",
                serde_json::Value::Null,
                &["message-log", "message-stats"],
            ))
            .unwrap();
        assert_eq!(listeners.len(), 3);
        assert!(matches!(listeners[0].1, Listener::Incoming(_)));
        assert!(matches!(listeners[2].1, Listener::Outgoing(_)));
    }

    #[test]
    fn test_stats_observer_counts_into_the_context_handle() {
        let registry = AlgorithmRegistry::builtin();
        let context = context("finish-on-config", serde_json::Value::Null, &["message-stats"]);
        let mut listeners = registry.build(&context).unwrap();
        let Some((_, Listener::Outgoing(mut stats))) = listeners.pop() else {
            panic!("expected the stats observer last");
        };
        let a2 = AgentId::new("A2");
        let notice = protocol::agent_finished(&FinishedNotice {
            agent: "A1".into(),
            generation: 1,
        })
        .unwrap();
        stats.on_outgoing(&"A1".into(), &notice, std::slice::from_ref(&a2));
        assert_eq!(context.stats.snapshot().total_messages(), 1);
    }

    #[test]
    fn test_unknown_and_misconfigured_components() {
        let registry = AlgorithmRegistry::builtin();
        assert_eq!(
            registry
                .build(&context("dpop", serde_json::Value::Null, &[]))
                .err(),
            Some(RegistryError::UnknownComponent("dpop".into()))
        );
        assert_eq!(
            registry
                .build(&context("finish-on-config", serde_json::Value::Null, &["gui"]))
                .err(),
            Some(RegistryError::UnknownComponent("gui".into()))
        );
        assert!(matches!(
            registry.build(&context("token-ring", serde_json::json!({"laps": 2}), &[])),
            Err(RegistryError::BadParameters { .. })
        ));
    }
}
