// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Daemon
//!
//! Host-level manager of agent queues. The [`Daemon`] listener runs on the
//! daemon's own queue and:
//!
//! - registers with the controller on `CONNECT_CONTROLLER`,
//! - builds an agent queue for every `AGENT_CONFIGURATION`, hands it the
//!   configuration as its first message and reports it with `AGENT_REPORTING`,
//! - merges the run's directory on `AGENT_DIRECTORY` and acknowledges it,
//! - forwards `START_AGENTS` to its agents,
//! - relays `AGENT_FINISHED` from its agents to the controller, preceded by a
//!   `STATS_REPORT` when the agent runs a `message-stats` observer,
//! - kills agents on `KILL_AGENTS` and acknowledges with `AGENTS_KILLED`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use cohort_core::application::stats::StatsHandle;
use cohort_core::application::{IncomingListener, Outbox, Runtime};
use cohort_core::domain::agent::{AgentAddress, AgentId};
use cohort_core::domain::error::CommunicationError;
use cohort_core::domain::events::ControlEvent;
use cohort_core::domain::message::Message;
use cohort_core::infrastructure::EventBus;
use tracing::{debug, info, warn};

use crate::application::registry::{AgentContext, AlgorithmRegistry};
use crate::domain::protocol::{
    self, Configuration, ConfigurationFailure, DaemonAck, ExperimentSource, FinishedNotice, KillAck,
    KillOrder, Rejection, Reporting, RunDirectory, StartOrder, StatsReport, CONTROLLER_ID,
};

struct HostedAgent {
    generation: u64,
    stats: StatsHandle,
}

pub struct Daemon {
    runtime: Runtime,
    registry: Arc<AlgorithmRegistry>,
    events: EventBus,
    address: AgentAddress,
    controller: AgentId,
    /// Agents hosted here, with the run they were configured for.
    hosted: BTreeMap<AgentId, HostedAgent>,
    /// Remote agents this daemon added to its directory for the current run.
    merged: BTreeSet<AgentId>,
}

impl Daemon {
    /// `address` is where the daemon's own queue can be reached.
    pub fn new(
        runtime: Runtime,
        registry: Arc<AlgorithmRegistry>,
        events: EventBus,
        address: AgentAddress,
    ) -> Self {
        Self {
            runtime,
            registry,
            events,
            address,
            controller: AgentId::new(CONTROLLER_ID),
            hosted: BTreeMap::new(),
            merged: BTreeSet::new(),
        }
    }

    async fn connect(
        &mut self,
        controller: AgentAddress,
        outbox: &mut Outbox,
    ) -> Result<(), CommunicationError> {
        let directory = self.runtime.directory();
        if !controller.is_local() {
            // a reconnect replaces a stale entry
            directory.unregister(&self.controller);
            directory.register(self.controller.clone(), controller.clone())?;
        }
        info!(daemon = %outbox.id(), %controller, "Reporting to controller");
        let report = Reporting {
            id: outbox.id().clone(),
            address: self.address.clone(),
            generation: None,
        };
        outbox
            .send(&self.controller, protocol::daemon_reporting(&report)?)
            .await?;
        Ok(())
    }

    async fn configure(
        &mut self,
        message: &Message,
        outbox: &mut Outbox,
    ) -> Result<(), CommunicationError> {
        let Configuration {
            problem,
            assignment,
            last,
        } = protocol::parse_configuration(message)?;
        let agent = assignment.role.agent.clone();
        let generation = assignment.generation;
        let context = AgentContext {
            agent: agent.clone(),
            generation,
            problem,
            role: assignment.role,
            stats: StatsHandle::default(),
        };

        let daemon = outbox.id().clone();
        match self.spawn_agent(&context, message, daemon).await {
            Ok(address) => {
                self.hosted.insert(
                    agent.clone(),
                    HostedAgent {
                        generation,
                        stats: context.stats.clone(),
                    },
                );
                debug!(daemon = %outbox.id(), %agent, %address, generation, last, "Agent configured");
                let report = Reporting {
                    id: agent,
                    address,
                    generation: Some(generation),
                };
                outbox
                    .send(&self.controller, protocol::agent_reporting(&report)?)
                    .await?;
            }
            Err(reason) => {
                warn!(daemon = %outbox.id(), %agent, generation, "Failed to configure agent: {}", reason);
                let failure = ConfigurationFailure {
                    agent,
                    generation,
                    reason,
                };
                outbox
                    .send(&self.controller, protocol::configuration_failed(&failure)?)
                    .await?;
            }
        }
        Ok(())
    }

    async fn spawn_agent(
        &self,
        context: &AgentContext,
        configuration: &Message,
        daemon: AgentId,
    ) -> Result<AgentAddress, String> {
        let listeners = self.registry.build(context).map_err(|e| e.to_string())?;
        let mut queue = self
            .runtime
            .create_queue(context.agent.clone(), 0, Some(daemon))
            .await
            .map_err(|e| e.to_string())?;
        for (interest, listener) in listeners {
            queue.register_listener(interest, listener);
        }
        queue.outbox_mut().send_to_self(configuration.clone());
        let address = queue.address().clone();
        self.runtime.spawn(queue);
        Ok(address)
    }

    async fn merge_directory(
        &mut self,
        run: RunDirectory,
        outbox: &mut Outbox,
    ) -> Result<(), CommunicationError> {
        let directory = self.runtime.directory();
        for (agent, address) in &run.directory {
            if directory.contains(agent) {
                continue;
            }
            directory.register(agent.clone(), address.clone())?;
            self.merged.insert(agent.clone());
        }
        debug!(daemon = %outbox.id(), generation = run.generation, merged = self.merged.len(), "Run directory merged");
        let ack = DaemonAck {
            daemon: outbox.id().clone(),
            generation: run.generation,
        };
        outbox
            .send(&self.controller, protocol::directory_merged(&ack)?)
            .await?;
        Ok(())
    }

    async fn start(&mut self, message: &Message, outbox: &mut Outbox) -> Result<(), CommunicationError> {
        let order: StartOrder = message.payload(0)?;
        let agents: Vec<AgentId> = self
            .hosted
            .iter()
            .filter(|(_, hosted)| hosted.generation == order.generation)
            .map(|(agent, _)| agent.clone())
            .collect();
        info!(daemon = %outbox.id(), generation = order.generation, agents = agents.len(), "Starting agents");
        outbox.send_multiple(&agents, message.clone()).await?;
        Ok(())
    }

    /// Relays a completion notice. The agent's traffic goes first so the
    /// controller holds it by the time the run completes.
    async fn relay_finished(&mut self, message: &Message, outbox: &mut Outbox) -> Result<(), CommunicationError> {
        let notice: FinishedNotice = message.payload(0)?;
        let traffic = self
            .hosted
            .get(&notice.agent)
            .filter(|hosted| hosted.generation == notice.generation)
            .map(|hosted| hosted.stats.snapshot())
            .filter(|traffic| !traffic.is_empty());
        if let Some(traffic) = traffic {
            debug!(daemon = %outbox.id(), agent = %notice.agent, messages = traffic.total_messages(), "Reporting agent traffic");
            let report = StatsReport {
                agent: notice.agent.clone(),
                generation: notice.generation,
                traffic,
            };
            outbox
                .send(&self.controller, protocol::stats_report(&report)?)
                .await?;
        }
        outbox.send(&self.controller, message.clone()).await?;
        Ok(())
    }

    async fn kill(&mut self, order: KillOrder, outbox: &mut Outbox) -> Result<(), CommunicationError> {
        let targets: Vec<AgentId> = if order.shutdown {
            self.hosted.keys().cloned().collect()
        } else {
            order
                .agents
                .iter()
                .filter(|agent| self.hosted.contains_key(*agent))
                .cloned()
                .collect()
        };
        for agent in &targets {
            self.runtime.kill(agent).await;
            self.hosted.remove(agent);
            outbox.forget_peer(agent).await;
        }

        let directory = self.runtime.directory();
        for agent in std::mem::take(&mut self.merged) {
            directory.unregister(&agent);
            outbox.forget_peer(&agent).await;
        }
        info!(daemon = %outbox.id(), killed = targets.len(), shutdown = order.shutdown, "Agents killed");

        let ack = KillAck {
            daemon: outbox.id().clone(),
            generation: order.generation,
            agents: targets,
        };
        let acked = outbox
            .send(&self.controller, protocol::agents_killed(&ack)?)
            .await;
        if order.shutdown {
            self.events.publish(ControlEvent::UserNotification {
                message: format!("daemon {} shutting down", outbox.id()),
            });
            outbox.stop();
        }
        acked.map(|_| ())
    }

    async fn load(&mut self, source: ExperimentSource, outbox: &mut Outbox) -> Result<(), CommunicationError> {
        let inline = match source {
            ExperimentSource::Inline(yaml) => yaml,
            ExperimentSource::Path(path) => match tokio::fs::read_to_string(&path).await {
                Ok(yaml) => yaml,
                Err(e) => {
                    self.events.publish(ControlEvent::UserNotification {
                        message: format!("cannot read {}: {}", path.display(), e),
                    });
                    return Ok(());
                }
            },
        };
        outbox
            .send(
                &self.controller,
                protocol::load_experiment(&ExperimentSource::Inline(inline))?,
            )
            .await?;
        Ok(())
    }

    async fn exit(&mut self, outbox: &mut Outbox) {
        let hosted: Vec<AgentId> = self.hosted.keys().cloned().collect();
        for agent in &hosted {
            self.runtime.kill(agent).await;
        }
        self.hosted.clear();
        info!(daemon = %outbox.id(), killed = hosted.len(), "Daemon exiting");
        outbox.stop();
    }
}

#[async_trait]
impl IncomingListener for Daemon {
    async fn on_incoming(
        &mut self,
        message: &Message,
        outbox: &mut Outbox,
    ) -> Result<(), CommunicationError> {
        let msg_type = message.msg_type();
        if msg_type == &*protocol::CONNECT_CONTROLLER {
            let controller: AgentAddress = message.payload(0)?;
            if let Err(e) = self.connect(controller, outbox).await {
                self.events.publish(ControlEvent::PeerUnreachable {
                    agent: self.controller.clone(),
                    reason: e.to_string(),
                });
                return Err(e);
            }
        } else if msg_type == &*protocol::REGISTRATION_REJECTED {
            let rejection: Rejection = message.payload(0)?;
            warn!(daemon = %outbox.id(), "Controller rejected registration: {}", rejection.reason);
            self.events.publish(ControlEvent::RegistrationRejected {
                agent: rejection.agent,
                reason: rejection.reason,
            });
            outbox.stop();
        } else if msg_type == &*protocol::AGENT_CONFIGURATION {
            self.configure(message, outbox).await?;
        } else if msg_type == &*protocol::AGENT_DIRECTORY {
            self.merge_directory(message.payload(0)?, outbox).await?;
        } else if msg_type == &*protocol::START_AGENTS {
            self.start(message, outbox).await?;
        } else if msg_type == &*protocol::AGENT_FINISHED {
            self.relay_finished(message, outbox).await?;
        } else if msg_type == &*protocol::KILL_AGENTS {
            self.kill(message.payload(0)?, outbox).await?;
        } else if msg_type == &*protocol::LOAD_EXPERIMENT {
            self.load(message.payload(0)?, outbox).await?;
        } else if msg_type == &*protocol::EXIT {
            self.exit(outbox).await;
        } else if msg_type == &*protocol::USER_NOTIFICATION {
            let text: String = message.payload(0)?;
            self.events.publish(ControlEvent::UserNotification { message: text });
        }
        Ok(())
    }
}
