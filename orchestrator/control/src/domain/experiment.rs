// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Experiment Files
//!
//! An experiment is a YAML list of problems, each naming the agents that solve
//! it and the algorithm every agent runs:
//!
//! ```yaml
//! problems:
//!   - name: ring-of-three
//!     description: { variables: 3 }
//!     timeout_ms: 30000
//!     agents:
//!       - agent: A1
//!         algorithm: token-ring
//!         params: { next: A2, laps: 2, initiator: true }
//!         observers: [message-stats]
//!       - agent: A2
//!         algorithm: token-ring
//!         params: { next: A1, laps: 2 }
//! ```
//!
//! Everything is validated on load, so a malformed experiment never reaches
//! a daemon.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use cohort_core::domain::agent::AgentId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::protocol::{ExperimentSource, ProblemDescription};

#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("Failed to read experiment file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid experiment YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Experiment contains no problems")]
    Empty,

    #[error("Problem '{0}' has a zero timeout")]
    ZeroTimeout(String),

    #[error("Problem '{0}' has no agents")]
    NoAgents(String),

    #[error("Problem '{problem}' assigns agent {agent} more than once")]
    DuplicateAgent { problem: String, agent: AgentId },

    #[error("Problem '{problem}': unknown algorithm or observer '{name}' for agent {agent}")]
    UnknownAlgorithm {
        problem: String,
        agent: AgentId,
        name: String,
    },
}

/// What one agent runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRole {
    pub agent: AgentId,
    pub algorithm: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub observers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub name: String,
    #[serde(default)]
    pub description: serde_json::Value,
    /// Wall-clock limit of one run, from distribution to the last report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    pub agents: Vec<AgentRole>,
}

impl Problem {
    pub fn describe(&self) -> ProblemDescription {
        ProblemDescription {
            name: self.name.clone(),
            body: self.description.clone(),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub problems: Vec<Problem>,
}

impl Experiment {
    /// Parses and structurally validates an experiment document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ExperimentError> {
        let experiment: Experiment = serde_yaml::from_str(yaml)?;
        experiment.validate()?;
        Ok(experiment)
    }

    pub async fn load(source: &ExperimentSource) -> Result<Self, ExperimentError> {
        match source {
            ExperimentSource::Inline(yaml) => Self::from_yaml_str(yaml),
            ExperimentSource::Path(path) => {
                let yaml = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| ExperimentError::Io {
                        path: path.clone(),
                        source,
                    })?;
                Self::from_yaml_str(&yaml)
            }
        }
    }

    pub fn validate(&self) -> Result<(), ExperimentError> {
        if self.problems.is_empty() {
            return Err(ExperimentError::Empty);
        }
        for problem in &self.problems {
            if problem.agents.is_empty() {
                return Err(ExperimentError::NoAgents(problem.name.clone()));
            }
            if problem.timeout_ms == Some(0) {
                return Err(ExperimentError::ZeroTimeout(problem.name.clone()));
            }
            let mut seen = HashSet::new();
            for role in &problem.agents {
                if !seen.insert(&role.agent) {
                    return Err(ExperimentError::DuplicateAgent {
                        problem: problem.name.clone(),
                        agent: role.agent.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Checks every algorithm and observer name against `is_known`.
    pub fn check_components(&self, is_known: impl Fn(&str) -> bool) -> Result<(), ExperimentError> {
        for problem in &self.problems {
            for role in &problem.agents {
                let names = std::iter::once(&role.algorithm).chain(role.observers.iter());
                for name in names {
                    if !is_known(name) {
                        return Err(ExperimentError::UnknownAlgorithm {
                            problem: problem.name.clone(),
                            agent: role.agent.clone(),
                            name: name.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn agent_count(&self) -> usize {
        self.problems.iter().map(|p| p.agents.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const RING: &str = r#"
problems:
  - name: ring
    description: { variables: 3 }
    timeout_ms: 30000
    agents:
      - agent: A1
        algorithm: token-ring
        params: { next: A2, laps: 2, initiator: true }
        observers: [message-stats]
      - agent: A2
        algorithm: token-ring
        params: { next: A1, laps: 2 }
  - name: trivial
    agents:
      - agent: B1
        algorithm: finish-on-config
"#;

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(RING.as_bytes()).unwrap();

        let source = ExperimentSource::Path(file.path().to_path_buf());
        let experiment = Experiment::load(&source).await.unwrap();
        assert_eq!(experiment.problems.len(), 2);
        assert_eq!(experiment.agent_count(), 3);
        let first = &experiment.problems[0];
        assert_eq!(first.agents[0].params["next"], "A2");
        assert_eq!(first.agents[0].observers, vec!["message-stats".to_string()]);
        assert_eq!(first.describe().body["variables"], 3);
        assert!(experiment.problems[1].description.is_null());
        assert_eq!(first.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(experiment.problems[1].timeout(), None);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = ExperimentSource::Path(dir.path().join("absent.yaml"));
        let result = Experiment::load(&source).await;
        assert!(matches!(result, Err(ExperimentError::Io { path, .. }) if path.ends_with("absent.yaml")));
    }

    #[test]
    fn test_structural_faults() {
        assert!(matches!(
            Experiment::from_yaml_str("problems: []"),
            Err(ExperimentError::Empty)
        ));
        assert!(matches!(
            Experiment::from_yaml_str("problems:\n  - name: p\n    agents: []\n"),
            Err(ExperimentError::NoAgents(name)) if name == "p"
        ));
        let duplicate = r#"
problems:
  - name: p
    agents:
      - { agent: A1, algorithm: finish-on-config }
      - { agent: A1, algorithm: finish-on-config }
"#;
        assert!(matches!(
            Experiment::from_yaml_str(duplicate),
            Err(ExperimentError::DuplicateAgent { agent, .. }) if agent.as_str() == "A1"
        ));
        assert!(matches!(
            Experiment::from_yaml_str(
                "problems:\n  - name: p\n    timeout_ms: 0\n    agents:\n      - { agent: A1, algorithm: finish-on-config }\n"
            ),
            Err(ExperimentError::ZeroTimeout(name)) if name == "p"
        ));
        assert!(matches!(
            Experiment::from_yaml_str("problems: {"),
            Err(ExperimentError::Yaml(_))
        ));
    }

    #[test]
    fn test_unknown_components_are_reported() {
        let experiment = Experiment::from_yaml_str(RING).unwrap();
        let known = ["token-ring", "finish-on-config"];
        let result = experiment.check_components(|name| known.contains(&name));
        assert!(matches!(
            result,
            Err(ExperimentError::UnknownAlgorithm { name, .. }) if name == "message-stats"
        ));
        assert!(experiment
            .check_components(|name| known.contains(&name) || name == "message-stats")
            .is_ok());
    }

    #[tokio::test]
    async fn test_inline_source() {
        let experiment = Experiment::load(&ExperimentSource::Inline(RING.to_string()))
            .await
            .unwrap();
        assert_eq!(experiment.problems[1].name, "trivial");
    }
}
