// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Pipes
//!
//! A pipe is the ordered, one-directional transport between one sending queue and
//! one receiving queue. Every variant preserves send order and reports failures
//! explicitly; nothing is dropped silently.
//!
//! | Variant | Receiving side | Address |
//! |---------|----------------|---------|
//! | [`local::LocalPipe`] | the peer's inbox in [`local::LocalNetwork`] | `AgentAddress::Local` |
//! | [`tcp::TcpPipe`] | a [`tcp::TcpInbound`] owned by the peer queue | `AgentAddress::Tcp` |
//!
//! Pipes are opened lazily by the sending queue through a [`PipeFactory`].

pub mod local;
pub mod tcp;

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::agent::{AgentAddress, AgentId};
use crate::domain::error::CommunicationError;
use crate::domain::message::Envelope;
use crate::domain::node_config::TransportConfig;

pub use local::{LocalNetwork, LocalPipe};
pub use tcp::{TcpInbound, TcpPipe};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeState {
    Open,
    Closed,
    /// A transport error was observed; every further push fails.
    Faulted,
}

#[async_trait]
pub trait OutputPipe: Send {
    /// Hands one envelope to the transport. Fails if the pipe is closed or broken.
    async fn push(&mut self, envelope: Envelope) -> Result<(), CommunicationError>;

    /// Flushes and releases the transport. Idempotent.
    async fn close(&mut self);

    fn state(&self) -> PipeState;

    fn peer(&self) -> &AgentId;
}

#[async_trait]
pub trait PipeFactory: Send + Sync {
    async fn open(
        &self,
        from: &AgentId,
        to: &AgentId,
        address: &AgentAddress,
    ) -> Result<Box<dyn OutputPipe>, CommunicationError>;
}

/// Transport settings shared by every pipe a process opens.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub connect_timeout: Duration,
    pub send_timeout: Duration,
    pub inbox_capacity: usize,
    pub max_frame_bytes: usize,
    pub local_delay: Option<Duration>,
}

impl From<&TransportConfig> for TransportSettings {
    fn from(config: &TransportConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            send_timeout: config.send_timeout(),
            inbox_capacity: config.inbox_capacity,
            max_frame_bytes: config.max_frame_bytes,
            local_delay: config.local_delay(),
        }
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self::from(&TransportConfig::default())
    }
}

/// Chooses the pipe variant from the address kind.
pub struct TransportPipeFactory {
    network: LocalNetwork,
    settings: TransportSettings,
}

impl TransportPipeFactory {
    pub fn new(network: LocalNetwork, settings: TransportSettings) -> Self {
        Self { network, settings }
    }
}

#[async_trait]
impl PipeFactory for TransportPipeFactory {
    async fn open(
        &self,
        from: &AgentId,
        to: &AgentId,
        address: &AgentAddress,
    ) -> Result<Box<dyn OutputPipe>, CommunicationError> {
        match address {
            AgentAddress::Local => {
                let pipe = LocalPipe::open(
                    &self.network,
                    to,
                    self.settings.send_timeout,
                    self.settings.local_delay,
                )?;
                Ok(Box::new(pipe))
            }
            AgentAddress::Tcp { host, port } => {
                let pipe = TcpPipe::connect(from, to, host, *port, &self.settings).await?;
                Ok(Box::new(pipe))
            }
        }
    }
}
