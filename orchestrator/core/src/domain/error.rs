// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::agent::{AgentAddress, AgentId};
use crate::domain::message_type::MessageType;
use thiserror::Error;

/// Faults surfaced by the message-passing substrate.
///
/// Connectivity and directory faults are recoverable by the caller; the core
/// never retries them. Deserialization faults are local to one message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommunicationError {
    #[error("Peer unreachable: {agent} ({reason})")]
    PeerUnreachable { agent: AgentId, reason: String },

    #[error("No such agent: {0}")]
    NoSuchAgent(AgentId),

    #[error("Duplicate agent ID {agent}: already registered at {existing}, refused {attempted}")]
    DuplicateAgentId {
        agent: AgentId,
        existing: AgentAddress,
        attempted: AgentAddress,
    },

    #[error("Pipe to {0} is closed")]
    PipeClosed(AgentId),

    #[error("Queue {0} has stopped")]
    QueueStopped(AgentId),

    #[error("Message has no payload at index {index} (type {msg_type})")]
    MissingPayload { index: usize, msg_type: MessageType },

    #[error("Failed to serialize message: {0}")]
    Serialization(String),

    #[error("Failed to deserialize message: {0}")]
    Deserialization(String),
}

impl CommunicationError {
    pub fn unreachable(agent: &AgentId, reason: impl ToString) -> Self {
        Self::PeerUnreachable {
            agent: agent.clone(),
            reason: reason.to_string(),
        }
    }

    /// Whether the fault means the peer cannot currently be reached.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::PeerUnreachable { .. } | Self::PipeClosed(_))
    }

    /// Short label used in metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PeerUnreachable { .. } => "peer_unreachable",
            Self::NoSuchAgent(_) => "no_such_agent",
            Self::DuplicateAgentId { .. } => "duplicate_agent_id",
            Self::PipeClosed(_) => "pipe_closed",
            Self::QueueStopped(_) => "queue_stopped",
            Self::MissingPayload { .. } => "missing_payload",
            Self::Serialization(_) => "serialization",
            Self::Deserialization(_) => "deserialization",
        }
    }
}
