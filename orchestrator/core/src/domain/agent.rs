// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// Process-unique identifier of an agent, daemon or controller queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Random identifier, used when a node config does not name itself.
    pub fn generate(prefix: &str) -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", prefix, &uuid[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Where a queue can be reached.
///
/// `Local` queues live in the same process and are reached through the
/// in-process network; `Tcp` queues are reached over a framed TCP connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AgentAddress {
    Local,
    Tcp { host: String, port: u16 },
}

impl AgentAddress {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Parses `host:port`. Anything without a port is rejected.
    pub fn parse_endpoint(endpoint: &str) -> Option<Self> {
        let (host, port) = endpoint.trim().rsplit_once(':')?;
        if host.is_empty() {
            return None;
        }
        let port = port.parse().ok()?;
        Some(Self::tcp(host, port))
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local)
    }
}

impl fmt::Display for AgentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Tcp { host, port } => write!(f, "{}:{}", host, port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint() {
        assert_eq!(
            AgentAddress::parse_endpoint("10.0.0.5:3000"),
            Some(AgentAddress::tcp("10.0.0.5", 3000))
        );
        assert_eq!(
            AgentAddress::parse_endpoint(" controller.lan:4000 "),
            Some(AgentAddress::tcp("controller.lan", 4000))
        );
        assert_eq!(AgentAddress::parse_endpoint("no-port"), None);
        assert_eq!(AgentAddress::parse_endpoint(":3000"), None);
        assert_eq!(AgentAddress::parse_endpoint("host:notaport"), None);
    }

    #[test]
    fn test_generated_ids_are_prefixed_and_distinct() {
        let a = AgentId::generate("daemon");
        let b = AgentId::generate("daemon");
        assert!(a.as_str().starts_with("daemon-"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_address_serde_shape() {
        let json = serde_json::to_value(AgentAddress::tcp("h", 1)).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "tcp", "host": "h", "port": 1}));
        let local = serde_json::to_value(AgentAddress::Local).unwrap();
        assert_eq!(local, serde_json::json!({"kind": "local"}));
    }
}
