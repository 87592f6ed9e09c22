// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Queue
//!
//! The per-agent message bus. A [`Queue`] owns the agent's listeners, its inbox
//! and (through its [`Outbox`]) every outbound pipe it has opened. It processes
//! one message at a time on its own task, so listeners never need to lock their
//! own state.
//!
//! ## Dispatch order
//!
//! 1. Self-addressed messages queued by the previous dispatch, oldest first.
//! 2. The next envelope from the inbox.
//!
//! A self-send made while a message is being dispatched is appended to the
//! self-delivery FIFO and handled right after that dispatch returns, ahead of any
//! envelope still waiting in the inbox. Self-sends are never dispatched
//! re-entrantly.
//!
//! ## Sending
//!
//! [`Outbox::send`] asks every matching outgoing listener, once per destination.
//! A `Discard` suppresses delivery to that destination only, and is ignored for
//! system messages. Pipes are opened on first use via a directory lookup; a
//! transport fault marks the destination unreachable and is returned to the
//! caller without retry.

use std::collections::{HashMap, VecDeque};
use std::slice;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::listener::{Decision, IncomingListener, Listener, OutgoingListener};
use crate::domain::agent::{AgentAddress, AgentId};
use crate::domain::directory::Directory;
use crate::domain::error::CommunicationError;
use crate::domain::message::{Envelope, Message};
use crate::domain::message_type::MessageType;
use crate::infrastructure::pipe::{LocalNetwork, OutputPipe, PipeFactory, PipeState, TcpInbound};

/// What happened to one destination of a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// An outgoing listener suppressed it.
    Discarded,
    /// Queued for this agent's own dispatch loop.
    ToSelf,
}

/// Sending side of a queue, lent to incoming listeners during dispatch.
pub struct Outbox {
    id: AgentId,
    supervisor: Option<AgentId>,
    outgoing: Vec<(MessageType, Box<dyn OutgoingListener>)>,
    pipes: HashMap<AgentId, Box<dyn OutputPipe>>,
    directory: Arc<dyn Directory>,
    factory: Arc<dyn PipeFactory>,
    self_delivery: VecDeque<Message>,
    stopped: bool,
    own: QueueHandle,
}

impl Outbox {
    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// The queue this agent reports to (its daemon, or the controller).
    pub fn supervisor(&self) -> Option<&AgentId> {
        self.supervisor.as_ref()
    }

    pub async fn send(
        &mut self,
        to: &AgentId,
        message: Message,
    ) -> Result<Delivery, CommunicationError> {
        if self.stopped {
            return Err(CommunicationError::QueueStopped(self.id.clone()));
        }
        if to == &self.id {
            self.self_delivery.push_back(message);
            return Ok(Delivery::ToSelf);
        }

        if self.vetoed(to, &message) {
            metrics::counter!("cohort_messages_discarded_total", "msg_type" => message.msg_type().to_string())
                .increment(1);
            debug!(agent = %self.id, to = %to, msg_type = %message.msg_type(), "Outgoing message discarded");
            return Ok(Delivery::Discarded);
        }

        let msg_type = message.msg_type().to_string();
        match self.deliver(to, message).await {
            Ok(()) => {
                metrics::counter!("cohort_messages_sent_total", "msg_type" => msg_type).increment(1);
                Ok(Delivery::Sent)
            }
            Err(e) => {
                metrics::counter!("cohort_send_failures_total", "reason" => e.kind()).increment(1);
                warn!(agent = %self.id, to = %to, %msg_type, "Send failed: {}", e);
                Err(e)
            }
        }
    }

    /// Sends a copy to each destination. Every destination is attempted; the
    /// first failure is returned after all attempts.
    pub async fn send_multiple(
        &mut self,
        to: &[AgentId],
        message: Message,
    ) -> Result<Vec<Delivery>, CommunicationError> {
        let mut deliveries = Vec::with_capacity(to.len());
        let mut first_error = None;
        for destination in to {
            match self.send(destination, message.clone()).await {
                Ok(delivery) => deliveries.push(delivery),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(deliveries),
        }
    }

    pub fn send_to_self(&mut self, message: Message) {
        self.self_delivery.push_back(message);
    }

    /// Puts `message` into this queue's inbox once `delay` has elapsed. The
    /// timer is dropped if the queue ends first.
    pub fn send_to_self_after(&self, delay: Duration, message: Message) {
        let own = self.own.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = own.stopped() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Err(e) = own.inject(message).await {
                        debug!(agent = %own.id, "Timer message not delivered: {}", e);
                    }
                }
            }
        });
    }

    /// Ends the queue once the current dispatch returns.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Sends over a one-off pipe to an explicit address, bypassing the
    /// directory and outgoing listeners. Used to answer a peer whose ID is
    /// already taken in the directory by someone else.
    pub async fn send_to_address(
        &mut self,
        to: &AgentId,
        address: &AgentAddress,
        message: Message,
    ) -> Result<(), CommunicationError> {
        if self.stopped {
            return Err(CommunicationError::QueueStopped(self.id.clone()));
        }
        let mut pipe = self.factory.open(&self.id, to, address).await?;
        let result = pipe
            .push(Envelope::new(self.id.clone(), to.clone(), message))
            .await;
        pipe.close().await;
        result
    }

    /// Closes and drops the cached pipe to `peer`, if any.
    pub async fn forget_peer(&mut self, peer: &AgentId) {
        if let Some(mut pipe) = self.pipes.remove(peer) {
            pipe.close().await;
        }
    }

    fn vetoed(&mut self, to: &AgentId, message: &Message) -> bool {
        let mut discard = false;
        for (interest, listener) in self.outgoing.iter_mut() {
            if interest.is_parent(message.msg_type())
                && listener.on_outgoing(&self.id, message, slice::from_ref(to)) == Decision::Discard
            {
                discard = true;
            }
        }
        discard && !message.is_system()
    }

    async fn deliver(&mut self, to: &AgentId, message: Message) -> Result<(), CommunicationError> {
        let stale = self
            .pipes
            .get(to)
            .is_some_and(|pipe| pipe.state() != PipeState::Open);
        if stale {
            self.forget_peer(to).await;
        }

        if !self.pipes.contains_key(to) {
            let address = self.directory.lookup(to)?;
            let pipe = match self.factory.open(&self.id, to, &address).await {
                Ok(pipe) => pipe,
                Err(e) => {
                    if e.is_connectivity() {
                        self.directory.mark_unreachable(to);
                    }
                    return Err(e);
                }
            };
            self.pipes.insert(to.clone(), pipe);
        }

        let envelope = Envelope::new(self.id.clone(), to.clone(), message);
        let result = match self.pipes.get_mut(to) {
            Some(pipe) => pipe.push(envelope).await,
            None => Err(CommunicationError::PipeClosed(to.clone())),
        };
        if let Err(e) = &result {
            if e.is_connectivity() {
                self.directory.mark_unreachable(to);
                self.forget_peer(to).await;
            }
        }
        result
    }

    async fn close_all(&mut self) {
        for (_, mut pipe) in self.pipes.drain() {
            pipe.close().await;
        }
    }
}

/// Clonable control handle of a running queue.
#[derive(Clone)]
pub struct QueueHandle {
    id: AgentId,
    inbox: mpsc::Sender<Envelope>,
    cancel: CancellationToken,
}

impl QueueHandle {
    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// Delivers `message` into the queue's inbox as if the agent had sent it to
    /// itself. Used by front-ends and tests.
    pub async fn inject(&self, message: Message) -> Result<(), CommunicationError> {
        if self.cancel.is_cancelled() {
            return Err(CommunicationError::QueueStopped(self.id.clone()));
        }
        self.inbox
            .send(Envelope::new(self.id.clone(), self.id.clone(), message))
            .await
            .map_err(|_| CommunicationError::QueueStopped(self.id.clone()))
    }

    /// Requests teardown. Idempotent.
    pub fn kill(&self) {
        self.cancel.cancel();
    }

    pub fn is_alive(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Resolves once the queue has been killed or has stopped itself.
    pub async fn stopped(&self) {
        self.cancel.cancelled().await
    }
}

pub struct Queue {
    address: AgentAddress,
    incoming: Vec<(MessageType, Box<dyn IncomingListener>)>,
    outbox: Outbox,
    inbox: mpsc::Receiver<Envelope>,
    cancel: CancellationToken,
    network: LocalNetwork,
    inbound: Option<TcpInbound>,
}

pub(crate) struct QueueParts {
    pub id: AgentId,
    pub address: AgentAddress,
    pub supervisor: Option<AgentId>,
    pub inbox: mpsc::Receiver<Envelope>,
    pub inbox_tx: mpsc::Sender<Envelope>,
    pub cancel: CancellationToken,
    pub directory: Arc<dyn Directory>,
    pub factory: Arc<dyn PipeFactory>,
    pub network: LocalNetwork,
    pub inbound: Option<TcpInbound>,
}

impl Queue {
    pub(crate) fn from_parts(parts: QueueParts) -> Self {
        let own = QueueHandle {
            id: parts.id.clone(),
            inbox: parts.inbox_tx,
            cancel: parts.cancel.clone(),
        };
        Self {
            address: parts.address,
            incoming: Vec::new(),
            outbox: Outbox {
                id: parts.id,
                supervisor: parts.supervisor,
                outgoing: Vec::new(),
                pipes: HashMap::new(),
                directory: parts.directory,
                factory: parts.factory,
                self_delivery: VecDeque::new(),
                stopped: false,
                own,
            },
            inbox: parts.inbox,
            cancel: parts.cancel,
            network: parts.network,
            inbound: parts.inbound,
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.outbox.id
    }

    pub fn address(&self) -> &AgentAddress {
        &self.address
    }

    pub fn handle(&self) -> QueueHandle {
        self.outbox.own.clone()
    }

    /// Registers a listener for every message type descending from `interest`.
    /// Listeners run in registration order.
    pub fn register_listener(&mut self, interest: MessageType, listener: Listener) {
        match listener {
            Listener::Incoming(l) => self.incoming.push((interest, l)),
            Listener::Outgoing(l) => self.outbox.outgoing.push((interest, l)),
        }
    }

    /// Access to the outbox before the queue is spawned, e.g. to queue a first
    /// self-addressed message.
    pub fn outbox_mut(&mut self) -> &mut Outbox {
        &mut self.outbox
    }

    /// The dispatch loop. Runs until killed or stopped, then tears down.
    pub async fn run(mut self) {
        let cancel = self.cancel.clone();
        info!(
            agent = %self.outbox.id,
            address = %self.address,
            incoming = self.incoming.len(),
            outgoing = self.outbox.outgoing.len(),
            "Queue started"
        );

        'dispatch: loop {
            while let Some(message) = self.outbox.self_delivery.pop_front() {
                if !self.dispatch_or_cancel(&cancel, message).await {
                    break 'dispatch;
                }
            }
            if self.outbox.stopped {
                break;
            }

            let envelope = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                envelope = self.inbox.recv() => match envelope {
                    Some(envelope) => envelope,
                    None => break,
                },
            };
            metrics::counter!(
                "cohort_messages_received_total",
                "msg_type" => envelope.message.msg_type().to_string()
            )
            .increment(1);
            debug!(agent = %self.outbox.id, from = %envelope.from, msg_type = %envelope.message.msg_type(), "Dispatching");

            if !self.dispatch_or_cancel(&cancel, envelope.message).await {
                break;
            }
        }

        self.teardown().await;
    }

    /// Returns false when the queue must stop.
    async fn dispatch_or_cancel(&mut self, cancel: &CancellationToken, message: Message) -> bool {
        let completed = tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = self.dispatch(&message) => true,
        };
        completed && !self.outbox.stopped
    }

    async fn dispatch(&mut self, message: &Message) {
        let Self {
            incoming, outbox, ..
        } = self;
        for (interest, listener) in incoming.iter_mut() {
            if !interest.is_parent(message.msg_type()) {
                continue;
            }
            if let Err(e) = listener.on_incoming(message, outbox).await {
                warn!(agent = %outbox.id, msg_type = %message.msg_type(), "Listener failed: {}", e);
            }
        }
    }

    async fn teardown(mut self) {
        let id = self.outbox.id.clone();
        // pending senders fail as soon as the inbox is closed
        self.inbox.close();
        self.network.detach(&id);
        self.outbox.directory.unregister(&id);
        if let Some(inbound) = self.inbound.take() {
            inbound.shutdown();
        }
        self.cancel.cancel();
        self.outbox.close_all().await;

        let dropped = self.incoming.len() + self.outbox.outgoing.len();
        self.incoming.clear();
        self.outbox.outgoing.clear();
        self.outbox.self_delivery.clear();
        info!(agent = %id, listeners = dropped, "Queue stopped");
    }
}
