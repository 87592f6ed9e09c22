// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Hosts the queues of one process.
//!
//! A [`Runtime`] owns the process's directory, its in-process network and the
//! pipe factory every queue it creates shares. In `InProcess` mode all queues
//! are reached through the local network; in `Tcp` mode each queue gets its own
//! listener and advertises `advertised_host:port`.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::queue::{Queue, QueueHandle, QueueParts};
use crate::domain::agent::{AgentAddress, AgentId};
use crate::domain::directory::Directory;
use crate::domain::error::CommunicationError;
use crate::infrastructure::directory::InMemoryDirectory;
use crate::infrastructure::pipe::{
    LocalNetwork, PipeFactory, TcpInbound, TransportPipeFactory, TransportSettings,
};

/// How long `kill` waits for a queue's teardown before giving up on it.
const KILL_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMode {
    InProcess {
        delay: Option<Duration>,
    },
    Tcp {
        bind_address: String,
        advertised_host: String,
    },
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Communication(#[from] CommunicationError),

    #[error("Failed to bind TCP listener for {agent} on {endpoint}: {source}")]
    Bind {
        agent: AgentId,
        endpoint: String,
        #[source]
        source: std::io::Error,
    },
}

struct Hosted {
    /// Distinguishes a queue from a later one that reuses its ID.
    serial: u64,
    handle: QueueHandle,
    task: JoinHandle<()>,
}

struct RuntimeInner {
    mode: TransportMode,
    settings: TransportSettings,
    directory: Arc<dyn Directory>,
    network: LocalNetwork,
    factory: Arc<dyn PipeFactory>,
    hosted: DashMap<AgentId, Hosted>,
    next_serial: AtomicU64,
}

#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    pub fn new(mode: TransportMode, mut settings: TransportSettings) -> Self {
        if let TransportMode::InProcess { delay } = &mode {
            settings.local_delay = *delay;
        }
        let network = LocalNetwork::new();
        let factory = Arc::new(TransportPipeFactory::new(network.clone(), settings.clone()));
        Self {
            inner: Arc::new(RuntimeInner {
                mode,
                settings,
                directory: Arc::new(InMemoryDirectory::new()),
                network,
                factory,
                hosted: DashMap::new(),
                next_serial: AtomicU64::new(0),
            }),
        }
    }

    /// In-process runtime with default transport settings.
    pub fn in_process() -> Self {
        Self::new(
            TransportMode::InProcess { delay: None },
            TransportSettings::default(),
        )
    }

    pub fn mode(&self) -> &TransportMode {
        &self.inner.mode
    }

    pub fn directory(&self) -> Arc<dyn Directory> {
        self.inner.directory.clone()
    }

    /// Creates a queue and registers it in the directory. `port` is only used in
    /// TCP mode (0 picks an ephemeral port). The queue does nothing until
    /// [`Runtime::spawn`] is called.
    pub async fn create_queue(
        &self,
        id: AgentId,
        port: u16,
        supervisor: Option<AgentId>,
    ) -> Result<Queue, RuntimeError> {
        let (inbox_tx, inbox) = mpsc::channel(self.inner.settings.inbox_capacity);
        let cancel = CancellationToken::new();

        let (address, inbound) = match &self.inner.mode {
            TransportMode::InProcess { .. } => {
                self.inner.network.attach(&id, inbox_tx.clone())?;
                (AgentAddress::Local, None)
            }
            TransportMode::Tcp {
                bind_address,
                advertised_host,
            } => {
                let inbound = TcpInbound::bind(
                    &id,
                    bind_address,
                    port,
                    inbox_tx.clone(),
                    cancel.child_token(),
                    self.inner.settings.max_frame_bytes,
                )
                .await
                .map_err(|source| RuntimeError::Bind {
                    agent: id.clone(),
                    endpoint: format!("{}:{}", bind_address, port),
                    source,
                })?;
                let address = AgentAddress::tcp(advertised_host.clone(), inbound.port());
                (address, Some(inbound))
            }
        };

        if let Err(e) = self.inner.directory.register(id.clone(), address.clone()) {
            if address.is_local() {
                self.inner.network.detach(&id);
            }
            cancel.cancel();
            return Err(e.into());
        }

        debug!(agent = %id, %address, "Created queue");
        Ok(Queue::from_parts(QueueParts {
            id,
            address,
            supervisor,
            inbox,
            inbox_tx,
            cancel,
            directory: self.inner.directory.clone(),
            factory: self.inner.factory.clone(),
            network: self.inner.network.clone(),
            inbound,
        }))
    }

    /// Starts the queue's dispatch loop on its own task. The queue leaves the
    /// hosted set when its loop ends, whether it was killed or stopped itself.
    pub fn spawn(&self, queue: Queue) -> QueueHandle {
        let handle = queue.handle();
        let id = handle.id().clone();
        let serial = self.inner.next_serial.fetch_add(1, Ordering::Relaxed);
        let runtime = Arc::downgrade(&self.inner);
        let (registered_tx, registered_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            // the entry must exist before the loop can end and remove it
            let _ = registered_rx.await;
            queue.run().await;
            if let Some(runtime) = runtime.upgrade() {
                runtime.hosted.remove_if(&id, |_, hosted| hosted.serial == serial);
            }
        });
        self.inner.hosted.insert(
            handle.id().clone(),
            Hosted {
                serial,
                handle: handle.clone(),
                task,
            },
        );
        let _ = registered_tx.send(());
        handle
    }

    /// Kills a hosted queue and waits for its teardown. Idempotent: returns
    /// false if `id` is not hosted here. Must not be called for the queue the
    /// caller is running on; a queue ends itself with `Outbox::stop`.
    pub async fn kill(&self, id: &AgentId) -> bool {
        let Some((_, hosted)) = self.inner.hosted.remove(id) else {
            return false;
        };
        hosted.handle.kill();
        if tokio::time::timeout(KILL_GRACE, hosted.task).await.is_err() {
            warn!(agent = %id, "Queue did not finish teardown within {:?}", KILL_GRACE);
        }
        true
    }

    pub fn handle(&self, id: &AgentId) -> Option<QueueHandle> {
        self.inner.hosted.get(id).map(|h| h.handle.clone())
    }

    /// IDs of hosted queues that are still running.
    pub fn live_agents(&self) -> Vec<AgentId> {
        let mut ids: Vec<AgentId> = self
            .inner
            .hosted
            .iter()
            .filter(|h| h.handle.is_alive())
            .map(|h| h.key().clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn address_of(&self, id: &AgentId) -> Option<AgentAddress> {
        self.inner.directory.lookup(id).ok()
    }

    /// Kills every hosted queue.
    pub async fn shutdown(&self) {
        let ids: Vec<AgentId> = self.inner.hosted.iter().map(|h| h.key().clone()).collect();
        for id in &ids {
            self.kill(id).await;
        }
        info!(queues = ids.len(), "Runtime shut down");
    }
}
