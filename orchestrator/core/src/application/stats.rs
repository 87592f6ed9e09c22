// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Outgoing traffic observer.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::application::listener::{Decision, OutgoingListener};
use crate::domain::agent::AgentId;
use crate::domain::message::Message;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCount {
    pub messages: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficSnapshot {
    pub per_type: BTreeMap<String, TypeCount>,
    pub per_destination: BTreeMap<AgentId, u64>,
}

impl TrafficSnapshot {
    pub fn total_messages(&self) -> u64 {
        self.per_type.values().map(|c| c.messages).sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.per_type.values().map(|c| c.bytes).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.per_type.is_empty()
    }

    /// Adds `other`'s counts into this snapshot.
    pub fn merge(&mut self, other: &TrafficSnapshot) {
        for (msg_type, count) in &other.per_type {
            let total = self.per_type.entry(msg_type.clone()).or_default();
            total.messages += count.messages;
            total.bytes += count.bytes;
        }
        for (destination, messages) in &other.per_destination {
            *self.per_destination.entry(destination.clone()).or_default() += messages;
        }
    }
}

/// Read side of a [`MessageStats`] observer.
#[derive(Debug, Clone, Default)]
pub struct StatsHandle {
    shared: Arc<Mutex<TrafficSnapshot>>,
}

impl StatsHandle {
    pub fn snapshot(&self) -> TrafficSnapshot {
        self.shared.lock().clone()
    }
}

/// Counts every message leaving an agent, per type and per destination. Never
/// discards. Logs a summary when the owning queue drops it.
pub struct MessageStats {
    agent: AgentId,
    shared: Arc<Mutex<TrafficSnapshot>>,
}

impl MessageStats {
    pub fn new(agent: AgentId) -> (Self, StatsHandle) {
        let handle = StatsHandle::default();
        (Self::attach(agent, &handle), handle)
    }

    /// An observer that counts into an existing handle, so whoever created the
    /// handle can read what the agent sent.
    pub fn attach(agent: AgentId, handle: &StatsHandle) -> Self {
        Self {
            agent,
            shared: handle.shared.clone(),
        }
    }
}

impl OutgoingListener for MessageStats {
    fn on_outgoing(&mut self, _from: &AgentId, message: &Message, to: &[AgentId]) -> Decision {
        let bytes = message.to_bytes().map(|b| b.len() as u64).unwrap_or(0);
        let mut snapshot = self.shared.lock();
        for destination in to {
            let count = snapshot
                .per_type
                .entry(message.msg_type().to_string())
                .or_default();
            count.messages += 1;
            count.bytes += bytes;
            *snapshot
                .per_destination
                .entry(destination.clone())
                .or_default() += 1;
        }
        Decision::DontCare
    }
}

impl Drop for MessageStats {
    fn drop(&mut self) {
        let snapshot = self.shared.lock();
        info!(
            agent = %self.agent,
            messages = snapshot.total_messages(),
            bytes = snapshot.total_bytes(),
            types = snapshot.per_type.len(),
            destinations = snapshot.per_destination.len(),
            "Outgoing traffic summary"
        );
        for (msg_type, count) in &snapshot.per_type {
            info!(agent = %self.agent, %msg_type, messages = count.messages, bytes = count.bytes, "Outgoing traffic by type");
        }
    }
}
