// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Controller
//!
//! White pages and configuration manager of an experiment, as one incoming
//! listener on the queue named [`CONTROLLER_ID`].
//!
//! ## Lifecycle
//!
//! 1. Daemons announce themselves with `DAEMON_REPORTING`. A daemon ID that is
//!    already registered at another address is answered with
//!    `REGISTRATION_REJECTED` and never receives work.
//! 2. `LOAD_EXPERIMENT` queues problems. Once `min_daemons` daemons are
//!    registered the first problem is distributed: agent roles are assigned to
//!    daemons round-robin, one `AGENT_CONFIGURATION` per agent.
//! 3. Every configured agent is reported back with `AGENT_REPORTING`. When all
//!    of them have reported, `AGENT_DIRECTORY` carries the addresses of every
//!    agent in the run to each involved daemon. A duplicate report aborts the
//!    problem before it starts.
//! 4. Once every daemon answered `DIRECTORY_MERGED`, `START_AGENTS` goes out.
//! 5. `AGENT_FINISHED` is counted, together with the traffic that
//!    `STATS_REPORT` carries ahead of it. At `finished == expected` the run's
//!    agents are killed and the controller waits for `AGENTS_KILLED` from every
//!    involved daemon before moving on.
//! 6. With no problems left the controller is `Done`: daemons are told to shut
//!    down and, if configured to, the controller stops as well.
//!
//! ## Deadlines
//!
//! A run with a timeout (its own, or [`ControllerSettings::run_timeout`]) arms a
//! `RUN_DEADLINE` to the controller itself. If the run is still going when it
//! fires, the problem is reported as timed out and wound down. Every wind-down
//! arms a second deadline after [`ControllerSettings::kill_grace`]; daemons that
//! have not acknowledged the kill by then are dropped. Deadlines carry the
//! run's generation, so one that outlives its run changes nothing.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cohort_core::application::stats::TrafficSnapshot;
use cohort_core::application::{IncomingListener, Outbox};
use cohort_core::domain::agent::{AgentAddress, AgentId};
use cohort_core::domain::directory::Directory;
use cohort_core::domain::error::CommunicationError;
use cohort_core::domain::events::ControlEvent;
use cohort_core::domain::message::Message;
use cohort_core::infrastructure::EventBus;
use tracing::{debug, info, warn};

use crate::application::registry::AlgorithmRegistry;
use crate::domain::experiment::{Experiment, Problem};
use crate::domain::protocol::{
    self, ConfigurationFailure, DaemonAck, Deadline, ExperimentSource, FinishedNotice, KillAck,
    KillOrder, Rejection, Reporting, RoleAssignment, RunDirectory, RunStage, StartOrder,
    StatsReport, CONTROLLER_ID,
};
use crate::domain::run_state::{Progress, RunState};

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Daemons that must be registered before the first problem is handed out.
    pub min_daemons: usize,
    /// Stop the controller queue once every problem is done.
    pub exit_when_done: bool,
    /// Limit for problems that do not set their own.
    pub run_timeout: Option<Duration>,
    /// How long a wind-down waits for kill acknowledgements.
    pub kill_grace: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            min_daemons: 1,
            exit_when_done: false,
            run_timeout: None,
            kill_grace: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    /// Configuration fault; the problem is dropped.
    Aborted,
    /// A daemon went away during distribution; the problem is retried.
    Retry,
    TimedOut,
}

struct CurrentRun {
    generation: u64,
    problem: Problem,
    /// agent → daemon hosting it
    placement: BTreeMap<AgentId, AgentId>,
    /// Agents this controller recorded in its directory for the run.
    registered: BTreeSet<AgentId>,
    /// Daemons that have not yet confirmed the run directory.
    awaiting_merge: BTreeSet<AgentId>,
    outcome: Outcome,
    started: Instant,
    /// Sum of the agents' stats reports.
    traffic: TrafficSnapshot,
}

impl CurrentRun {
    fn new(generation: u64, problem: Problem, placement: BTreeMap<AgentId, AgentId>, outcome: Outcome) -> Self {
        Self {
            generation,
            problem,
            placement,
            registered: BTreeSet::new(),
            awaiting_merge: BTreeSet::new(),
            outcome,
            started: Instant::now(),
            traffic: TrafficSnapshot::default(),
        }
    }

    fn daemons(&self) -> BTreeSet<AgentId> {
        self.placement.values().cloned().collect()
    }

    fn agents_on(&self, daemon: &AgentId) -> Vec<AgentId> {
        self.placement
            .iter()
            .filter(|(_, host)| *host == daemon)
            .map(|(agent, _)| agent.clone())
            .collect()
    }
}

pub struct Controller {
    directory: Arc<dyn Directory>,
    events: EventBus,
    registry: Arc<AlgorithmRegistry>,
    settings: ControllerSettings,
    /// Registered daemons, in registration order.
    daemons: Vec<AgentId>,
    pending: VecDeque<Problem>,
    current: Option<CurrentRun>,
    state: RunState,
    next_generation: u64,
    completed: usize,
    aborted: usize,
    timed_out: usize,
}

impl Controller {
    pub fn new(
        directory: Arc<dyn Directory>,
        events: EventBus,
        registry: Arc<AlgorithmRegistry>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            directory,
            events,
            registry,
            settings,
            daemons: Vec::new(),
            pending: VecDeque::new(),
            current: None,
            state: RunState::Idle,
            next_generation: 1,
            completed: 0,
            aborted: 0,
            timed_out: 0,
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    fn notify(&self, message: impl Into<String>) {
        self.events.publish(ControlEvent::UserNotification {
            message: message.into(),
        });
    }

    fn set_state(&mut self, state: RunState) {
        debug!(from = %self.state, to = %state, "Run state transition");
        self.state = state;
    }

    async fn on_daemon_reporting(
        &mut self,
        report: Reporting,
        outbox: &mut Outbox,
    ) -> Result<(), CommunicationError> {
        let Reporting { id, address, .. } = report;
        match self.directory.register(id.clone(), address.clone()) {
            Ok(()) => {}
            Err(e @ CommunicationError::DuplicateAgentId { .. }) => {
                warn!(daemon = %id, %address, "Rejecting daemon registration: {}", e);
                metrics::counter!("cohort_registrations_rejected_total").increment(1);
                self.events.publish(ControlEvent::RegistrationRejected {
                    agent: id.clone(),
                    reason: e.to_string(),
                });
                let rejection = Rejection {
                    agent: id.clone(),
                    reason: e.to_string(),
                };
                let reply = protocol::registration_rejected(&rejection)?;
                if let Err(send_error) = outbox.send_to_address(&id, &address, reply).await {
                    debug!(daemon = %id, "Could not deliver rejection: {}", send_error);
                }
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        if !self.daemons.contains(&id) {
            info!(daemon = %id, %address, "Daemon registered");
            self.daemons.push(id.clone());
            self.events
                .publish(ControlEvent::DaemonRegistered { daemon: id, address });
        }
        Ok(())
    }

    async fn on_load(&mut self, source: ExperimentSource) -> Result<(), CommunicationError> {
        let loaded = Experiment::load(&source).await.and_then(|experiment| {
            experiment.check_components(|name| {
                self.registry.is_algorithm(name) || self.registry.is_observer(name)
            })?;
            Ok(experiment)
        });
        let experiment = match loaded {
            Ok(experiment) => experiment,
            Err(e) => {
                warn!("Rejected experiment: {}", e);
                self.events.publish(ControlEvent::ConfigurationFault {
                    problem: "<experiment>".into(),
                    reason: e.to_string(),
                });
                return Ok(());
            }
        };
        info!(
            problems = experiment.problems.len(),
            agents = experiment.agent_count(),
            "Experiment loaded"
        );
        self.notify(format!("loaded {} problems", experiment.problems.len()));
        self.pending.extend(experiment.problems);
        Ok(())
    }

    /// Distributes the next pending problem if nothing is running.
    async fn try_start(&mut self, outbox: &mut Outbox) -> Result<(), CommunicationError> {
        while self.state.is_between_runs() && !self.pending.is_empty() {
            if self.daemons.is_empty() || self.daemons.len() < self.settings.min_daemons {
                if self.state != RunState::AwaitingRegistrations {
                    self.notify(format!(
                        "waiting for daemons ({} of {} registered)",
                        self.daemons.len(),
                        self.settings.min_daemons.max(1)
                    ));
                    self.set_state(RunState::AwaitingRegistrations);
                }
                return Ok(());
            }
            let Some(problem) = self.pending.pop_front() else {
                break;
            };
            self.distribute(problem, outbox).await?;
        }
        Ok(())
    }

    async fn distribute(
        &mut self,
        problem: Problem,
        outbox: &mut Outbox,
    ) -> Result<(), CommunicationError> {
        let generation = self.next_generation;
        self.next_generation += 1;

        let placement: BTreeMap<AgentId, AgentId> = problem
            .agents
            .iter()
            .enumerate()
            .map(|(i, role)| (role.agent.clone(), self.daemons[i % self.daemons.len()].clone()))
            .collect();
        info!(
            generation,
            problem = %problem.name,
            agents = placement.len(),
            daemons = self.daemons.len(),
            "Distributing problem"
        );
        self.set_state(RunState::running(generation, placement.len()));
        self.events.publish(ControlEvent::ProblemStarted {
            generation,
            problem: problem.name.clone(),
            agents: placement.len(),
        });

        let description = problem.describe();
        let mut last_index: BTreeMap<&AgentId, usize> = BTreeMap::new();
        for (i, role) in problem.agents.iter().enumerate() {
            if let Some(daemon) = placement.get(&role.agent) {
                last_index.insert(daemon, i);
            }
        }

        let mut configured: BTreeMap<AgentId, AgentId> = BTreeMap::new();
        let mut lost = None;
        for (i, role) in problem.agents.iter().enumerate() {
            let Some(daemon) = placement.get(&role.agent) else {
                continue;
            };
            let assignment = RoleAssignment {
                role: role.clone(),
                generation,
            };
            let last = last_index.get(daemon) == Some(&i);
            let message = protocol::agent_configuration(&description, &assignment, last)?;
            match outbox.send(daemon, message).await {
                Ok(_) => {
                    configured.insert(role.agent.clone(), daemon.clone());
                }
                Err(e) if e.is_connectivity() || matches!(e, CommunicationError::NoSuchAgent(_)) => {
                    lost = Some((daemon.clone(), e));
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let Some((daemon, e)) = lost else {
            if let Some(timeout) = problem.timeout().or(self.settings.run_timeout) {
                debug!(generation, ?timeout, "Run deadline armed");
                arm(outbox, timeout, generation, RunStage::Run)?;
            }
            self.current = Some(CurrentRun::new(generation, problem, placement, Outcome::Completed));
            return Ok(());
        };

        warn!(%daemon, generation, "Daemon lost during distribution: {}", e);
        self.drop_daemon(&daemon, e.to_string());
        self.current = Some(CurrentRun::new(generation, problem, configured, Outcome::Retry));
        self.wind_down(outbox).await
    }

    fn drop_daemon(&mut self, daemon: &AgentId, reason: String) {
        self.daemons.retain(|d| d != daemon);
        self.directory.unregister(daemon);
        self.events.publish(ControlEvent::PeerUnreachable {
            agent: daemon.clone(),
            reason,
        });
    }

    async fn on_agent_reporting(
        &mut self,
        report: Reporting,
        outbox: &mut Outbox,
    ) -> Result<(), CommunicationError> {
        let Some(generation) = report.generation else {
            return Ok(());
        };
        let belongs = matches!(self.state, RunState::Running { .. })
            && self.current.as_ref().is_some_and(|run| {
                run.generation == generation && run.placement.contains_key(&report.id)
            });
        if !belongs {
            debug!(agent = %report.id, generation, "Ignoring stale agent report");
            return Ok(());
        }

        if let Err(e) = self.directory.register(report.id.clone(), report.address.clone()) {
            return self.abort(e.to_string(), outbox).await;
        }
        if let Some(run) = self.current.as_mut() {
            run.registered.insert(report.id.clone());
        }
        match self.state.record_report(generation, &report.id) {
            Progress::Duplicate => {
                let reason = format!("agent {} reported twice", report.id);
                self.abort(reason, outbox).await
            }
            Progress::Complete { expected } => {
                info!(generation, agents = expected, "All agents reported; sharing directory");
                self.share_directory(generation, outbox).await
            }
            Progress::Pending { .. } | Progress::Stale => Ok(()),
        }
    }

    /// Sends every involved daemon the addresses of the run's agents.
    async fn share_directory(&mut self, generation: u64, outbox: &mut Outbox) -> Result<(), CommunicationError> {
        let Some(run) = self.current.as_ref() else {
            return Ok(());
        };
        let directory: BTreeMap<AgentId, AgentAddress> = self
            .directory
            .snapshot()
            .into_iter()
            .filter(|(id, _)| run.placement.contains_key(id))
            .collect();
        let message = protocol::agent_directory(&RunDirectory {
            generation,
            directory,
        })?;
        let mut awaiting = BTreeSet::new();
        for daemon in run.daemons() {
            match outbox.send(&daemon, message.clone()).await {
                Ok(_) => {
                    awaiting.insert(daemon);
                }
                Err(e) => {
                    warn!(%daemon, "Failed to share run directory: {}", e);
                    self.events.publish(ControlEvent::PeerUnreachable {
                        agent: daemon,
                        reason: e.to_string(),
                    });
                }
            }
        }
        let nobody_waiting = awaiting.is_empty();
        if let Some(run) = self.current.as_mut() {
            run.awaiting_merge = awaiting;
        }
        if nobody_waiting {
            return self.start_agents(generation, outbox).await;
        }
        Ok(())
    }

    async fn on_directory_merged(
        &mut self,
        ack: DaemonAck,
        outbox: &mut Outbox,
    ) -> Result<(), CommunicationError> {
        if !matches!(self.state, RunState::Running { .. }) {
            return Ok(());
        }
        let Some(run) = self.current.as_mut() else {
            return Ok(());
        };
        if run.generation != ack.generation || !run.awaiting_merge.remove(&ack.daemon) {
            debug!(daemon = %ack.daemon, generation = ack.generation, "Ignoring stale directory ack");
            return Ok(());
        }
        if run.awaiting_merge.is_empty() {
            return self.start_agents(ack.generation, outbox).await;
        }
        Ok(())
    }

    async fn start_agents(&mut self, generation: u64, outbox: &mut Outbox) -> Result<(), CommunicationError> {
        let Some(run) = self.current.as_ref() else {
            return Ok(());
        };
        let message = protocol::start_agents(&StartOrder { generation })?;
        for daemon in run.daemons() {
            if let Err(e) = outbox.send(&daemon, message.clone()).await {
                warn!(%daemon, "Failed to start agents: {}", e);
                self.events.publish(ControlEvent::PeerUnreachable {
                    agent: daemon,
                    reason: e.to_string(),
                });
            }
        }
        info!(generation, "Agents started");
        self.events.publish(ControlEvent::AgentsStarted { generation });
        Ok(())
    }

    async fn on_agent_finished(
        &mut self,
        notice: FinishedNotice,
        outbox: &mut Outbox,
    ) -> Result<(), CommunicationError> {
        let FinishedNotice { agent, generation } = notice;
        let placed = self
            .current
            .as_ref()
            .is_some_and(|run| run.placement.contains_key(&agent));
        if !placed {
            debug!(%agent, generation, "Ignoring completion notice from an agent outside the run");
            return Ok(());
        }
        match self.state.record_finished(generation, &agent) {
            Progress::Stale | Progress::Duplicate => {
                debug!(%agent, generation, "Ignoring completion notice");
                Ok(())
            }
            Progress::Pending { count, expected } => {
                self.events.publish(ControlEvent::AgentFinished {
                    generation,
                    agent,
                    finished: count,
                    expected,
                });
                Ok(())
            }
            Progress::Complete { expected } => {
                self.events.publish(ControlEvent::AgentFinished {
                    generation,
                    agent,
                    finished: expected,
                    expected,
                });
                if let Some(run) = &self.current {
                    let elapsed = run.started.elapsed();
                    info!(
                        generation,
                        problem = %run.problem.name,
                        elapsed_ms = elapsed.as_millis() as u64,
                        messages = run.traffic.total_messages(),
                        "Problem completed"
                    );
                    metrics::histogram!("cohort_problem_duration_seconds").record(elapsed.as_secs_f64());
                    self.events.publish(ControlEvent::ProblemCompleted {
                        generation,
                        problem: run.problem.name.clone(),
                        elapsed_ms: elapsed.as_millis() as u64,
                        messages: run.traffic.total_messages(),
                        bytes: run.traffic.total_bytes(),
                    });
                }
                self.wind_down(outbox).await
            }
        }
    }

    fn on_stats_report(&mut self, report: StatsReport) {
        if self.state.generation() != Some(report.generation)
            || !matches!(self.state, RunState::Running { .. })
        {
            return;
        }
        let Some(run) = self.current.as_mut() else {
            return;
        };
        if !run.placement.contains_key(&report.agent) {
            debug!(agent = %report.agent, "Ignoring stats from an agent outside the run");
            return;
        }
        run.traffic.merge(&report.traffic);
    }

    async fn on_deadline(&mut self, deadline: Deadline, outbox: &mut Outbox) -> Result<(), CommunicationError> {
        if self.state.generation() != Some(deadline.generation) {
            return Ok(());
        }
        match deadline.stage {
            RunStage::Run => {
                let RunState::Running { expected, finished, .. } = &self.state else {
                    return Ok(());
                };
                let (finished, expected) = (finished.len(), *expected);
                let Some(run) = self.current.as_mut() else {
                    return Ok(());
                };
                warn!(generation = run.generation, problem = %run.problem.name, finished, expected, "Problem timed out");
                run.outcome = Outcome::TimedOut;
                self.events.publish(ControlEvent::ProblemTimedOut {
                    generation: run.generation,
                    problem: run.problem.name.clone(),
                    finished,
                    expected,
                });
                self.wind_down(outbox).await
            }
            RunStage::Teardown => {
                let RunState::Advancing { pending_acks, .. } = &self.state else {
                    return Ok(());
                };
                let silent: Vec<AgentId> = pending_acks.iter().cloned().collect();
                let mut released = silent.is_empty();
                for daemon in silent {
                    warn!(%daemon, generation = deadline.generation, "No kill acknowledgement; dropping daemon");
                    outbox.forget_peer(&daemon).await;
                    self.drop_daemon(&daemon, "no kill acknowledgement".into());
                    released |= self.state.forget_daemon(&daemon);
                }
                if released {
                    return self.advance(outbox).await;
                }
                Ok(())
            }
        }
    }

    async fn abort(&mut self, reason: String, outbox: &mut Outbox) -> Result<(), CommunicationError> {
        let Some(run) = self.current.as_mut() else {
            return Ok(());
        };
        warn!(generation = run.generation, problem = %run.problem.name, "Aborting problem: {}", reason);
        run.outcome = Outcome::Aborted;
        self.events.publish(ControlEvent::ConfigurationFault {
            problem: run.problem.name.clone(),
            reason,
        });
        self.wind_down(outbox).await
    }

    /// Kills the current run's agents and waits for every involved daemon.
    async fn wind_down(&mut self, outbox: &mut Outbox) -> Result<(), CommunicationError> {
        let Some(run) = self.current.as_ref() else {
            return Ok(());
        };
        let generation = run.generation;
        let mut waiting = BTreeSet::new();
        let mut lost = Vec::new();
        for daemon in run.daemons() {
            let order = KillOrder {
                generation: Some(generation),
                agents: run.agents_on(&daemon),
                shutdown: false,
            };
            match outbox.send(&daemon, protocol::kill_agents(&order)?).await {
                Ok(_) => {
                    waiting.insert(daemon);
                }
                Err(e) => lost.push((daemon, e.to_string())),
            }
        }
        for (daemon, reason) in lost {
            self.drop_daemon(&daemon, reason);
        }

        if waiting.is_empty() {
            self.set_state(RunState::advancing(generation, Vec::new()));
            return self.advance(outbox).await;
        }
        self.set_state(RunState::advancing(generation, waiting));
        arm(outbox, self.settings.kill_grace, generation, RunStage::Teardown)
    }

    async fn on_agents_killed(
        &mut self,
        ack: KillAck,
        outbox: &mut Outbox,
    ) -> Result<(), CommunicationError> {
        let Some(generation) = ack.generation else {
            return Ok(());
        };
        match self.state.record_ack(generation, &ack.daemon) {
            Progress::Complete { .. } => self.advance(outbox).await,
            Progress::Pending { count, .. } => {
                debug!(daemon = %ack.daemon, generation, waiting = count, "Kill acknowledged");
                Ok(())
            }
            Progress::Stale | Progress::Duplicate => Ok(()),
        }
    }

    /// Closes the current run and moves to the next problem or to `Done`.
    async fn advance(&mut self, outbox: &mut Outbox) -> Result<(), CommunicationError> {
        if let Some(run) = self.current.take() {
            for agent in &run.registered {
                self.directory.unregister(agent);
            }
            match run.outcome {
                Outcome::Completed => self.completed += 1,
                Outcome::Aborted => self.aborted += 1,
                Outcome::TimedOut => self.timed_out += 1,
                Outcome::Retry => self.pending.push_front(run.problem),
            }
        }

        if !self.pending.is_empty() {
            // the dispatch loop picks the next problem up in `try_start`
            self.set_state(RunState::Idle);
            return Ok(());
        }

        info!(
            completed = self.completed,
            aborted = self.aborted,
            timed_out = self.timed_out,
            "All problems finished"
        );
        self.set_state(RunState::Done);
        self.events.publish(ControlEvent::AllProblemsCompleted {
            problems: self.completed,
        });
        self.shutdown_daemons(outbox).await;
        if self.settings.exit_when_done {
            outbox.stop();
        }
        Ok(())
    }

    async fn shutdown_daemons(&mut self, outbox: &mut Outbox) {
        for daemon in std::mem::take(&mut self.daemons) {
            let sent = match protocol::kill_agents(&KillOrder::shutdown()) {
                Ok(message) => outbox.send(&daemon, message).await.map(|_| ()),
                Err(e) => Err(e),
            };
            if let Err(e) = sent {
                debug!(%daemon, "Shutdown order not delivered: {}", e);
            }
            outbox.forget_peer(&daemon).await;
            self.directory.unregister(&daemon);
        }
    }

    async fn on_configuration_failed(
        &mut self,
        failure: ConfigurationFailure,
        outbox: &mut Outbox,
    ) -> Result<(), CommunicationError> {
        if self.state.generation() != Some(failure.generation)
            || !matches!(self.state, RunState::Running { .. })
        {
            return Ok(());
        }
        let reason = format!("agent {}: {}", failure.agent, failure.reason);
        self.abort(reason, outbox).await
    }

    async fn on_exit(&mut self, outbox: &mut Outbox) {
        info!(state = %self.state, "Controller exiting");
        self.shutdown_daemons(outbox).await;
        outbox.stop();
    }
}

fn arm(outbox: &Outbox, after: Duration, generation: u64, stage: RunStage) -> Result<(), CommunicationError> {
    let deadline = protocol::run_deadline(&Deadline { generation, stage })?;
    outbox.send_to_self_after(after, deadline);
    Ok(())
}

impl Controller {
    async fn handle(&mut self, message: &Message, outbox: &mut Outbox) -> Result<(), CommunicationError> {
        let msg_type = message.msg_type();
        if msg_type == &*protocol::DAEMON_REPORTING {
            self.on_daemon_reporting(message.payload(0)?, outbox).await
        } else if msg_type == &*protocol::AGENT_REPORTING {
            self.on_agent_reporting(message.payload(0)?, outbox).await
        } else if msg_type == &*protocol::DIRECTORY_MERGED {
            self.on_directory_merged(message.payload(0)?, outbox).await
        } else if msg_type == &*protocol::AGENT_FINISHED {
            self.on_agent_finished(message.payload(0)?, outbox).await
        } else if msg_type == &*protocol::STATS_REPORT {
            self.on_stats_report(message.payload(0)?);
            Ok(())
        } else if msg_type == &*protocol::RUN_DEADLINE {
            self.on_deadline(message.payload(0)?, outbox).await
        } else if msg_type == &*protocol::AGENTS_KILLED {
            self.on_agents_killed(message.payload(0)?, outbox).await
        } else if msg_type == &*protocol::CONFIGURATION_FAILED {
            self.on_configuration_failed(message.payload(0)?, outbox).await
        } else if msg_type == &*protocol::LOAD_EXPERIMENT {
            self.on_load(message.payload(0)?).await
        } else if msg_type == &*protocol::EXIT {
            self.on_exit(outbox).await;
            Ok(())
        } else if msg_type == &*protocol::USER_NOTIFICATION {
            let text: String = message.payload(0)?;
            self.notify(text);
            Ok(())
        } else {
            debug!(%msg_type, controller = CONTROLLER_ID, "Unhandled control message");
            Ok(())
        }
    }
}

#[async_trait]
impl IncomingListener for Controller {
    async fn on_incoming(
        &mut self,
        message: &Message,
        outbox: &mut Outbox,
    ) -> Result<(), CommunicationError> {
        let handled = self.handle(message, outbox).await;
        if outbox.is_stopped() {
            return handled;
        }
        let started = self.try_start(outbox).await;
        handled.and(started)
    }
}
