// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Built-in algorithms and observers.

use std::sync::LazyLock;

use async_trait::async_trait;
use cohort_core::application::{IncomingListener, Listener, Outbox};
use cohort_core::domain::agent::AgentId;
use cohort_core::domain::error::CommunicationError;
use cohort_core::domain::message::Message;
use cohort_core::domain::message_type::MessageType;
use serde::Deserialize;
use tracing::{debug, info};

use crate::application::registry::{AgentContext, ListenerSet, OutboxExt, RegistryError};
use crate::domain::protocol::{AGENT_CONFIGURATION, START_AGENTS};

/// Reports completion the moment its configuration arrives.
pub struct FinishOnConfig {
    generation: u64,
    reported: bool,
}

impl FinishOnConfig {
    pub fn listeners(context: &AgentContext) -> Result<ListenerSet, RegistryError> {
        let listener = Self {
            generation: context.generation,
            reported: false,
        };
        Ok(vec![(AGENT_CONFIGURATION.clone(), Listener::incoming(listener))])
    }
}

#[async_trait]
impl IncomingListener for FinishOnConfig {
    async fn on_incoming(
        &mut self,
        _message: &Message,
        outbox: &mut Outbox,
    ) -> Result<(), CommunicationError> {
        if !self.reported {
            self.reported = true;
            outbox.report_finished(self.generation).await?;
        }
        Ok(())
    }
}

pub static TOKEN: LazyLock<MessageType> = LazyLock::new(|| MessageType::new(["TokenRing", "Token"]));

fn one() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct TokenRingParams {
    next: AgentId,
    #[serde(default = "one")]
    laps: u32,
    #[serde(default)]
    initiator: bool,
}

/// Passes a token to `next`. The initiator injects it on start and retires it
/// after `laps` round trips; every agent finishes once it has seen the token
/// `laps` times.
pub struct TokenRing {
    next: AgentId,
    laps: u32,
    initiator: bool,
    generation: u64,
    seen: u32,
    started: bool,
    finished: bool,
}

impl TokenRing {
    pub fn listeners(context: &AgentContext) -> Result<ListenerSet, RegistryError> {
        let params: TokenRingParams = serde_json::from_value(context.role.params.clone())
            .map_err(|e| RegistryError::BadParameters {
                component: "token-ring".into(),
                reason: e.to_string(),
            })?;
        if params.laps == 0 {
            return Err(RegistryError::BadParameters {
                component: "token-ring".into(),
                reason: "laps must be at least 1".into(),
            });
        }
        let listener = Self {
            next: params.next,
            laps: params.laps,
            initiator: params.initiator,
            generation: context.generation,
            seen: 0,
            started: false,
            finished: false,
        };
        Ok(vec![(MessageType::root(), Listener::incoming(listener))])
    }

    async fn pass(&mut self, outbox: &mut Outbox, hop: u64) -> Result<(), CommunicationError> {
        let token = Message::new(TOKEN.clone()).with_payload(&hop)?;
        outbox.send(&self.next, token).await?;
        Ok(())
    }

    async fn finish(&mut self, outbox: &mut Outbox) -> Result<(), CommunicationError> {
        if !self.finished {
            self.finished = true;
            info!(agent = %outbox.id(), laps = self.laps, "Token ring finished");
            outbox.report_finished(self.generation).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl IncomingListener for TokenRing {
    async fn on_incoming(
        &mut self,
        message: &Message,
        outbox: &mut Outbox,
    ) -> Result<(), CommunicationError> {
        let msg_type = message.msg_type();
        if msg_type == &*START_AGENTS {
            if self.initiator && !self.started {
                self.started = true;
                self.pass(outbox, 1).await?;
            }
        } else if msg_type == &*TOKEN {
            let hop: u64 = message.payload(0)?;
            self.seen += 1;
            debug!(agent = %outbox.id(), hop, seen = self.seen, "Token received");
            let last_lap = self.seen >= self.laps;
            if self.initiator && last_lap {
                return self.finish(outbox).await;
            }
            self.pass(outbox, hop + 1).await?;
            if last_lap {
                self.finish(outbox).await?;
            }
        }
        Ok(())
    }
}

/// Logs every message the agent receives.
pub struct MessageLog;

impl MessageLog {
    pub fn listeners(_context: &AgentContext) -> Result<ListenerSet, RegistryError> {
        Ok(vec![(MessageType::root(), Listener::incoming(MessageLog))])
    }
}

#[async_trait]
impl IncomingListener for MessageLog {
    async fn on_incoming(
        &mut self,
        message: &Message,
        outbox: &mut Outbox,
    ) -> Result<(), CommunicationError> {
        info!(
            agent = %outbox.id(),
            msg_type = %message.msg_type(),
            payloads = message.arity(),
            "Message received"
        );
        Ok(())
    }
}
