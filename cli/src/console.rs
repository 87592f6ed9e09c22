// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Interactive console of a controller or daemon node.
//!
//! Reads commands from stdin and injects them into the node's queue as control
//! messages; prints every [`ControlEvent`] the node publishes.
//!
//! | Command | Message |
//! |---------|---------|
//! | `connect <host:port>` | `CONNECT_CONTROLLER` |
//! | `load <file>` | `LOAD_EXPERIMENT` |
//! | `exit` | `EXIT` |

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};

use cohort_control::domain::protocol::{self, ExperimentSource};
use cohort_core::application::QueueHandle;
use cohort_core::domain::agent::AgentAddress;
use cohort_core::domain::error::CommunicationError;
use cohort_core::domain::events::{ControlEvent, EventRecord};
use cohort_core::domain::message::Message;
use cohort_core::infrastructure::{EventBus, EventBusError};

/// How long the console waits for its node to stop after `exit` or a signal.
const EXIT_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Connect(AgentAddress),
    Load(PathBuf),
    Exit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("unrecognized command '{0}' (expected connect, load or exit)")]
    Unknown(String),

    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),

    #[error("invalid address '{0}', expected host:port")]
    BadAddress(String),
}

/// Parses one console line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, ConsoleError> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(None);
    };
    let argument = words.next();
    let command = match command.to_ascii_lowercase().as_str() {
        "connect" => {
            let endpoint = argument.ok_or(ConsoleError::MissingArgument("connect"))?;
            let address = AgentAddress::parse_endpoint(endpoint)
                .ok_or_else(|| ConsoleError::BadAddress(endpoint.to_string()))?;
            ConsoleCommand::Connect(address)
        }
        "load" => {
            let path = argument.ok_or(ConsoleError::MissingArgument("load"))?;
            ConsoleCommand::Load(PathBuf::from(path))
        }
        "exit" | "quit" => ConsoleCommand::Exit,
        _ => return Err(ConsoleError::Unknown(command.to_string())),
    };
    Ok(Some(command))
}

impl ConsoleCommand {
    pub fn into_message(self) -> Result<Message, CommunicationError> {
        match self {
            Self::Connect(address) => protocol::connect_controller(&address),
            Self::Load(path) => protocol::load_experiment(&ExperimentSource::Path(path)),
            Self::Exit => Ok(protocol::exit()),
        }
    }
}

/// Tally of what the node reported while the console was attached.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub completed: Option<usize>,
    pub faults: usize,
    pub timed_out: usize,
}

impl SessionSummary {
    fn record(&mut self, event: &ControlEvent) {
        match event {
            ControlEvent::ConfigurationFault { .. } => self.faults += 1,
            ControlEvent::ProblemTimedOut { .. } => self.timed_out += 1,
            ControlEvent::AllProblemsCompleted { problems } => self.completed = Some(*problems),
            _ => {}
        }
    }
}

/// Renders one event as a console line.
pub fn render(record: &EventRecord) -> String {
    let stamp = record.at.format("%H:%M:%S").to_string();
    let summary = record.event.summary();
    let text = match &record.event {
        ControlEvent::ConfigurationFault { .. }
        | ControlEvent::ProblemTimedOut { .. }
        | ControlEvent::PeerUnreachable { .. }
        | ControlEvent::RegistrationRejected { .. } => summary.red().to_string(),
        ControlEvent::ProblemCompleted { .. } | ControlEvent::AllProblemsCompleted { .. } => {
            summary.green().bold().to_string()
        }
        ControlEvent::DaemonRegistered { .. } | ControlEvent::ProblemStarted { .. } => {
            summary.cyan().to_string()
        }
        ControlEvent::AgentFinished { .. } => summary.dimmed().to_string(),
        _ => summary,
    };
    format!("{} {}", stamp.dimmed(), text)
}

/// Attaches the console to `node` until it stops, stdin says `exit`, or the
/// process is signalled. Without `interactive`, stdin is not read.
pub async fn run(node: &QueueHandle, events: &EventBus, interactive: bool) -> Result<SessionSummary> {
    let mut receiver = events.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut reading = interactive;
    let mut summary = SessionSummary::default();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = node.stopped() => break,
            _ = &mut shutdown => {
                info!(node = %node.id(), "Shutdown signal received");
                request_exit(node).await?;
                break;
            }
            record = receiver.recv() => match record {
                Ok(record) => {
                    summary.record(&record.event);
                    println!("{}", render(&record));
                }
                Err(EventBusError::Lagged(_)) => continue,
                Err(_) => break,
            },
            line = lines.next_line(), if reading => match line {
                Ok(Some(line)) => match parse_command(&line) {
                    Ok(Some(ConsoleCommand::Exit)) => {
                        request_exit(node).await?;
                        break;
                    }
                    Ok(Some(command)) => {
                        let message = command.into_message().context("Failed to build console message")?;
                        node.inject(message).await.context("Node is no longer accepting commands")?;
                    }
                    Ok(None) => {}
                    Err(e) => eprintln!("{}", e.to_string().yellow()),
                },
                Ok(None) => reading = false,
                Err(e) => {
                    warn!("Failed to read console input: {}", e);
                    reading = false;
                }
            },
        }
    }

    // events published while the node wound down
    while let Ok(record) = receiver.try_recv() {
        summary.record(&record.event);
        println!("{}", render(&record));
    }
    Ok(summary)
}

async fn request_exit(node: &QueueHandle) -> Result<()> {
    if node.is_alive() && node.inject(protocol::exit()).await.is_err() {
        node.kill();
    }
    if tokio::time::timeout(EXIT_GRACE, node.stopped()).await.is_err() {
        warn!(node = %node.id(), "Node did not stop in time; killing it");
        node.kill();
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_core::domain::agent::AgentId;

    #[test]
    fn test_parse_connect() {
        assert_eq!(
            parse_command("connect 10.0.0.5:3000").unwrap(),
            Some(ConsoleCommand::Connect(AgentAddress::tcp("10.0.0.5", 3000)))
        );
        assert_eq!(
            parse_command("connect"),
            Err(ConsoleError::MissingArgument("connect"))
        );
        assert_eq!(
            parse_command("connect somewhere"),
            Err(ConsoleError::BadAddress("somewhere".to_string()))
        );
    }

    #[test]
    fn test_parse_load_and_exit() {
        assert_eq!(
            parse_command("  load  experiments/ring.yaml ").unwrap(),
            Some(ConsoleCommand::Load(PathBuf::from("experiments/ring.yaml")))
        );
        assert_eq!(parse_command("EXIT").unwrap(), Some(ConsoleCommand::Exit));
        assert_eq!(parse_command("   ").unwrap(), None);
    }

    #[test]
    fn test_anything_else_is_unrecognized() {
        assert_eq!(
            parse_command("start now"),
            Err(ConsoleError::Unknown("start".to_string()))
        );
    }

    #[test]
    fn test_commands_become_control_messages() {
        let message = ConsoleCommand::Load(PathBuf::from("x.yaml")).into_message().unwrap();
        assert_eq!(message.msg_type(), &*protocol::LOAD_EXPERIMENT);
        let source: ExperimentSource = message.payload(0).unwrap();
        assert_eq!(source, ExperimentSource::Path(PathBuf::from("x.yaml")));

        let message = ConsoleCommand::Exit.into_message().unwrap();
        assert_eq!(message.msg_type(), &*protocol::EXIT);
    }

    #[test]
    fn test_summary_counts_faults_and_completion() {
        let mut summary = SessionSummary::default();
        summary.record(&ControlEvent::ConfigurationFault {
            problem: "p".into(),
            reason: "r".into(),
        });
        summary.record(&ControlEvent::PeerUnreachable {
            agent: AgentId::new("D1"),
            reason: "gone".into(),
        });
        summary.record(&ControlEvent::ProblemTimedOut {
            generation: 2,
            problem: "q".into(),
            finished: 1,
            expected: 2,
        });
        summary.record(&ControlEvent::AllProblemsCompleted { problems: 2 });
        assert_eq!(
            summary,
            SessionSummary {
                completed: Some(2),
                faults: 1,
                timed_out: 1,
            }
        );
    }

    #[test]
    fn test_render_keeps_event_text() {
        colored::control::set_override(false);
        let line = render(&EventRecord::now(ControlEvent::AgentsStarted { generation: 4 }));
        assert!(line.ends_with("run 4 started"));

        let line = render(&EventRecord::now(ControlEvent::ProblemCompleted {
            generation: 4,
            problem: "ring".into(),
            elapsed_ms: 12,
            messages: 4,
            bytes: 300,
        }));
        assert!(line.ends_with("problem 'ring' completed in 12 ms (4 messages, 300 bytes)"));
    }
}
