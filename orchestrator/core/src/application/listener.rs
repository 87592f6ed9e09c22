// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Listener capabilities a queue dispatches to.
//!
//! Algorithms, observers and the control plane all plug into a queue through one
//! of these two traits. A listener is registered with an interest type and sees
//! every message whose type descends from it.

use async_trait::async_trait;

use crate::application::queue::Outbox;
use crate::domain::agent::AgentId;
use crate::domain::error::CommunicationError;
use crate::domain::message::Message;

/// Verdict of an outgoing listener for one destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Suppress delivery to this destination.
    Discard,
    DontCare,
}

#[async_trait]
pub trait IncomingListener: Send {
    /// Handles one inbound message. The listener may send through `outbox`
    /// before returning; those sends are part of this dispatch.
    async fn on_incoming(
        &mut self,
        message: &Message,
        outbox: &mut Outbox,
    ) -> Result<(), CommunicationError>;
}

pub trait OutgoingListener: Send {
    /// Vets a message about to leave `from`. `to` holds the single destination
    /// being decided on.
    fn on_outgoing(&mut self, from: &AgentId, message: &Message, to: &[AgentId]) -> Decision;
}

pub enum Listener {
    Incoming(Box<dyn IncomingListener>),
    Outgoing(Box<dyn OutgoingListener>),
}

impl Listener {
    pub fn incoming(listener: impl IncomingListener + 'static) -> Self {
        Self::Incoming(Box::new(listener))
    }

    pub fn outgoing(listener: impl OutgoingListener + 'static) -> Self {
        Self::Outgoing(Box::new(listener))
    }
}
