// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-process pipes.
//!
//! Every queue in the process attaches its bounded inbox to a [`LocalNetwork`].
//! A [`LocalPipe`] holds a sender for one peer inbox, so a full inbox makes the
//! sender wait (bounded by the send timeout) and a dropped inbox fails the push.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use super::{OutputPipe, PipeState};
use crate::domain::agent::{AgentAddress, AgentId};
use crate::domain::error::CommunicationError;
use crate::domain::message::Envelope;

/// Process-wide registry of queue inboxes.
#[derive(Clone, Default)]
pub struct LocalNetwork {
    inboxes: Arc<DashMap<AgentId, mpsc::Sender<Envelope>>>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `id`'s inbox. An inbox whose queue is gone may be replaced.
    pub fn attach(
        &self,
        id: &AgentId,
        inbox: mpsc::Sender<Envelope>,
    ) -> Result<(), CommunicationError> {
        match self.inboxes.entry(id.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_closed() {
                    entry.insert(inbox);
                    Ok(())
                } else {
                    Err(CommunicationError::DuplicateAgentId {
                        agent: id.clone(),
                        existing: AgentAddress::Local,
                        attempted: AgentAddress::Local,
                    })
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(inbox);
                Ok(())
            }
        }
    }

    pub fn detach(&self, id: &AgentId) {
        self.inboxes.remove(id);
    }

    pub fn sender(&self, id: &AgentId) -> Option<mpsc::Sender<Envelope>> {
        self.inboxes.get(id).map(|tx| tx.clone())
    }

    pub fn contains(&self, id: &AgentId) -> bool {
        self.inboxes.contains_key(id)
    }
}

enum Route {
    Direct(mpsc::Sender<Envelope>),
    /// Emulated latency: a forwarder task holds each envelope until its deadline.
    Delayed {
        inbox: mpsc::Sender<Envelope>,
        delay: Duration,
        queue: Option<mpsc::UnboundedSender<(Instant, Envelope)>>,
        faulted: Arc<AtomicBool>,
        _forwarder: JoinHandle<()>,
    },
}

pub struct LocalPipe {
    peer: AgentId,
    route: Route,
    state: PipeState,
    send_timeout: Duration,
}

impl LocalPipe {
    pub fn open(
        network: &LocalNetwork,
        to: &AgentId,
        send_timeout: Duration,
        delay: Option<Duration>,
    ) -> Result<Self, CommunicationError> {
        let inbox = network
            .sender(to)
            .filter(|tx| !tx.is_closed())
            .ok_or_else(|| CommunicationError::unreachable(to, "no live in-process inbox"))?;

        let route = match delay {
            None => Route::Direct(inbox),
            Some(delay) => {
                let (queue, mut pending) = mpsc::unbounded_channel::<(Instant, Envelope)>();
                let faulted = Arc::new(AtomicBool::new(false));
                let forwarder = {
                    let inbox = inbox.clone();
                    let faulted = faulted.clone();
                    let peer = to.clone();
                    tokio::spawn(async move {
                        while let Some((deadline, envelope)) = pending.recv().await {
                            tokio::time::sleep_until(deadline).await;
                            if inbox.send(envelope).await.is_err() {
                                debug!(peer = %peer, "Delayed local pipe lost its receiver");
                                faulted.store(true, Ordering::SeqCst);
                                break;
                            }
                        }
                    })
                };
                debug!(peer = %to, delay_ms = delay.as_millis() as u64, "Opened delayed local pipe");
                Route::Delayed {
                    inbox,
                    delay,
                    queue: Some(queue),
                    faulted,
                    _forwarder: forwarder,
                }
            }
        };

        Ok(Self {
            peer: to.clone(),
            route,
            state: PipeState::Open,
            send_timeout,
        })
    }

    fn fault(&mut self, reason: &str) -> CommunicationError {
        self.state = PipeState::Faulted;
        CommunicationError::unreachable(&self.peer, reason)
    }
}

#[async_trait]
impl OutputPipe for LocalPipe {
    async fn push(&mut self, envelope: Envelope) -> Result<(), CommunicationError> {
        match self.state {
            PipeState::Open => {}
            PipeState::Closed => return Err(CommunicationError::PipeClosed(self.peer.clone())),
            PipeState::Faulted => {
                return Err(CommunicationError::unreachable(&self.peer, "pipe faulted earlier"))
            }
        }

        let send_timeout = self.send_timeout;
        let outcome = match &self.route {
            Route::Direct(inbox) => {
                match tokio::time::timeout(send_timeout, inbox.send(envelope)).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(_)) => Err("receiver is gone"),
                    Err(_) => Err("send timed out"),
                }
            }
            Route::Delayed {
                inbox,
                delay,
                queue,
                faulted,
                ..
            } => {
                if faulted.load(Ordering::SeqCst) || inbox.is_closed() {
                    Err("receiver is gone")
                } else {
                    let deadline = Instant::now() + *delay;
                    match queue {
                        Some(queue) => queue
                            .send((deadline, envelope))
                            .map_err(|_| "forwarder stopped"),
                        None => Err("forwarder stopped"),
                    }
                }
            }
        };
        outcome.map_err(|reason| self.fault(reason))
    }

    async fn close(&mut self) {
        if let Route::Delayed { queue, .. } = &mut self.route {
            // forwarder drains what is already queued, then exits
            queue.take();
        }
        if self.state == PipeState::Open {
            self.state = PipeState::Closed;
        }
    }

    fn state(&self) -> PipeState {
        self.state
    }

    fn peer(&self) -> &AgentId {
        &self.peer
    }
}
