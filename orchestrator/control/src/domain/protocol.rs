// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Control Protocol
//!
//! Message types and payloads exchanged between the controller, daemons and
//! agents. Every type lives under `ROOT/SYSTEM`, so outgoing listeners can never
//! suppress them.
//!
//! | Type | Direction | Payloads |
//! |------|-----------|----------|
//! | `DAEMON_REPORTING` | daemon → controller | [`Reporting`] |
//! | `AGENT_REPORTING` | daemon → controller | [`Reporting`] |
//! | `REGISTRATION_REJECTED` | controller → daemon | [`Rejection`] |
//! | `AGENT_CONFIGURATION` | controller → daemon → agent | [`ProblemDescription`], [`RoleAssignment`], last flag |
//! | `CONFIGURATION_FAILED` | daemon → controller | [`ConfigurationFailure`] |
//! | `AGENT_DIRECTORY` | controller → daemon | [`RunDirectory`] |
//! | `DIRECTORY_MERGED` | daemon → controller | [`DaemonAck`] |
//! | `START_AGENTS` | controller → daemon → agents | [`StartOrder`] |
//! | `AGENT_FINISHED` | agent → daemon → controller | [`FinishedNotice`] |
//! | `STATS_REPORT` | daemon → controller | [`StatsReport`] |
//! | `RUN_DEADLINE` | controller → itself | [`Deadline`] |
//! | `KILL_AGENTS` | controller → daemon | [`KillOrder`] |
//! | `AGENTS_KILLED` | daemon → controller | [`KillAck`] |
//! | `LOAD_EXPERIMENT` | console → daemon/controller | [`ExperimentSource`] |
//! | `CONNECT_CONTROLLER` | console → daemon | controller [`AgentAddress`] |
//! | `EXIT` | console → any | none |
//! | `USER_NOTIFICATION` | any → console | text |

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::LazyLock;

use cohort_core::application::stats::TrafficSnapshot;
use cohort_core::domain::agent::{AgentAddress, AgentId};
use cohort_core::domain::error::CommunicationError;
use cohort_core::domain::message::Message;
use cohort_core::domain::message_type::MessageType;
use serde::{Deserialize, Serialize};

use crate::domain::experiment::AgentRole;

/// Well-known queue ID of the controller.
pub const CONTROLLER_ID: &str = "controller";

fn control_type(component: &str, name: &str) -> MessageType {
    MessageType::system().child([component, name])
}

pub static DAEMON_REPORTING: LazyLock<MessageType> =
    LazyLock::new(|| control_type("WhitePages", "Daemon-Reporting"));
pub static AGENT_REPORTING: LazyLock<MessageType> =
    LazyLock::new(|| control_type("WhitePages", "Agent-Reporting"));
pub static REGISTRATION_REJECTED: LazyLock<MessageType> =
    LazyLock::new(|| control_type("WhitePages", "Registration-Rejected"));
pub static AGENT_CONFIGURATION: LazyLock<MessageType> =
    LazyLock::new(|| control_type("ConfigurationManager", "Agent-Configuration"));
pub static CONFIGURATION_FAILED: LazyLock<MessageType> =
    LazyLock::new(|| control_type("ConfigurationManager", "Configuration-Failed"));
pub static AGENT_DIRECTORY: LazyLock<MessageType> =
    LazyLock::new(|| control_type("WhitePages", "Agent-Directory"));
pub static DIRECTORY_MERGED: LazyLock<MessageType> =
    LazyLock::new(|| control_type("WhitePages", "Directory-Merged"));
pub static START_AGENTS: LazyLock<MessageType> =
    LazyLock::new(|| control_type("ConfigurationManager", "Start"));
pub static AGENT_FINISHED: LazyLock<MessageType> =
    LazyLock::new(|| control_type("Agent", "Finished"));
pub static STATS_REPORT: LazyLock<MessageType> =
    LazyLock::new(|| control_type("Agent", "Stats"));
pub static RUN_DEADLINE: LazyLock<MessageType> =
    LazyLock::new(|| control_type("ConfigurationManager", "Deadline"));
pub static KILL_AGENTS: LazyLock<MessageType> =
    LazyLock::new(|| control_type("WhitePages", "Kill-Agents"));
pub static AGENTS_KILLED: LazyLock<MessageType> =
    LazyLock::new(|| control_type("WhitePages", "Agents-Killed"));
pub static LOAD_EXPERIMENT: LazyLock<MessageType> =
    LazyLock::new(|| control_type("UserIO", "Load"));
pub static CONNECT_CONTROLLER: LazyLock<MessageType> =
    LazyLock::new(|| control_type("UserIO", "Connect"));
pub static EXIT: LazyLock<MessageType> = LazyLock::new(|| control_type("UserIO", "Exit"));
pub static USER_NOTIFICATION: LazyLock<MessageType> =
    LazyLock::new(|| control_type("UserIO", "Notification"));

/// Self-description of a daemon or agent queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reporting {
    pub id: AgentId,
    pub address: AgentAddress,
    /// Run the agent was configured for; absent for daemons.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub agent: AgentId,
    pub reason: String,
}

/// A problem as the controller hands it out. The body is never interpreted
/// by the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemDescription {
    pub name: String,
    #[serde(default)]
    pub body: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub role: AgentRole,
    pub generation: u64,
}

/// Decoded `AGENT_CONFIGURATION` message.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub problem: ProblemDescription,
    pub assignment: RoleAssignment,
    /// Whether this is the last configuration the daemon receives for this run.
    pub last: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationFailure {
    pub agent: AgentId,
    pub generation: u64,
    pub reason: String,
}

/// Addresses of every agent of a run, so that agents hosted by different
/// daemons can reach each other once started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDirectory {
    pub generation: u64,
    pub directory: BTreeMap<AgentId, AgentAddress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonAck {
    pub daemon: AgentId,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOrder {
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishedNotice {
    pub agent: AgentId,
    pub generation: u64,
}

/// Outgoing traffic of one agent up to the moment it finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsReport {
    pub agent: AgentId,
    pub generation: u64,
    pub traffic: TrafficSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    /// Agents have not all finished.
    Run,
    /// Kill acknowledgements are still missing.
    Teardown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deadline {
    pub generation: u64,
    pub stage: RunStage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillOrder {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<u64>,
    pub agents: Vec<AgentId>,
    /// The daemon stops itself after killing everything it hosts.
    #[serde(default)]
    pub shutdown: bool,
}

impl KillOrder {
    pub fn shutdown() -> Self {
        Self {
            generation: None,
            agents: Vec::new(),
            shutdown: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillAck {
    pub daemon: AgentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<u64>,
    pub agents: Vec<AgentId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "value", rename_all = "lowercase")]
pub enum ExperimentSource {
    Path(PathBuf),
    Inline(String),
}

fn single<T: Serialize>(msg_type: &MessageType, payload: &T) -> Result<Message, CommunicationError> {
    Message::new(msg_type.clone()).with_payload(payload)
}

pub fn daemon_reporting(report: &Reporting) -> Result<Message, CommunicationError> {
    single(&DAEMON_REPORTING, report)
}

pub fn agent_reporting(report: &Reporting) -> Result<Message, CommunicationError> {
    single(&AGENT_REPORTING, report)
}

pub fn registration_rejected(rejection: &Rejection) -> Result<Message, CommunicationError> {
    single(&REGISTRATION_REJECTED, rejection)
}

pub fn agent_configuration(
    problem: &ProblemDescription,
    assignment: &RoleAssignment,
    last: bool,
) -> Result<Message, CommunicationError> {
    Message::new(AGENT_CONFIGURATION.clone())
        .with_payload(problem)?
        .with_payload(assignment)?
        .with_payload(&last)
}

pub fn parse_configuration(message: &Message) -> Result<Configuration, CommunicationError> {
    Ok(Configuration {
        problem: message.payload(0)?,
        assignment: message.payload(1)?,
        last: message.payload(2)?,
    })
}

pub fn configuration_failed(failure: &ConfigurationFailure) -> Result<Message, CommunicationError> {
    single(&CONFIGURATION_FAILED, failure)
}

pub fn agent_directory(directory: &RunDirectory) -> Result<Message, CommunicationError> {
    single(&AGENT_DIRECTORY, directory)
}

pub fn directory_merged(ack: &DaemonAck) -> Result<Message, CommunicationError> {
    single(&DIRECTORY_MERGED, ack)
}

pub fn start_agents(order: &StartOrder) -> Result<Message, CommunicationError> {
    single(&START_AGENTS, order)
}

pub fn agent_finished(notice: &FinishedNotice) -> Result<Message, CommunicationError> {
    single(&AGENT_FINISHED, notice)
}

pub fn stats_report(report: &StatsReport) -> Result<Message, CommunicationError> {
    single(&STATS_REPORT, report)
}

pub fn run_deadline(deadline: &Deadline) -> Result<Message, CommunicationError> {
    single(&RUN_DEADLINE, deadline)
}

pub fn kill_agents(order: &KillOrder) -> Result<Message, CommunicationError> {
    single(&KILL_AGENTS, order)
}

pub fn agents_killed(ack: &KillAck) -> Result<Message, CommunicationError> {
    single(&AGENTS_KILLED, ack)
}

pub fn load_experiment(source: &ExperimentSource) -> Result<Message, CommunicationError> {
    single(&LOAD_EXPERIMENT, source)
}

pub fn connect_controller(address: &AgentAddress) -> Result<Message, CommunicationError> {
    single(&CONNECT_CONTROLLER, address)
}

pub fn exit() -> Message {
    Message::new(EXIT.clone())
}

pub fn user_notification(text: &str) -> Result<Message, CommunicationError> {
    single(&USER_NOTIFICATION, &text)
}
