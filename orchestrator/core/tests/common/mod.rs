// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Listeners and helpers shared by the queue and transport tests.

#![allow(dead_code)]

use async_trait::async_trait;
use cohort_core::application::{Delivery, IncomingListener, Listener, Outbox, QueueHandle, Runtime};
use cohort_core::domain::agent::AgentId;
use cohort_core::domain::error::CommunicationError;
use cohort_core::domain::message::Message;
use cohort_core::domain::message_type::MessageType;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

pub fn number_type() -> MessageType {
    MessageType::new(["Test", "Number"])
}

pub fn command_type() -> MessageType {
    MessageType::new(["Test", "Command"])
}

pub fn marker_type() -> MessageType {
    MessageType::system().child(["Test", "Marker"])
}

pub fn number(n: u32) -> Message {
    Message::new(number_type()).with_payload(&n).unwrap()
}

/// What a test asks a [`Commander`] to do from inside its queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    /// Send each number to every destination, one `send_multiple` per number.
    Send { to: Vec<AgentId>, numbers: Vec<u32> },
    /// Send one system marker.
    Marker { to: AgentId },
}

pub type SendResult = Result<Vec<Delivery>, CommunicationError>;

/// Executes [`Command`]s and reports every send result.
pub struct Commander {
    pub results: mpsc::UnboundedSender<SendResult>,
}

#[async_trait]
impl IncomingListener for Commander {
    async fn on_incoming(
        &mut self,
        message: &Message,
        outbox: &mut Outbox,
    ) -> Result<(), CommunicationError> {
        match message.payload::<Command>(0)? {
            Command::Send { to, numbers } => {
                for n in numbers {
                    let result = outbox.send_multiple(&to, number(n)).await;
                    let _ = self.results.send(result);
                }
            }
            Command::Marker { to } => {
                let result = outbox
                    .send(&to, Message::new(marker_type()))
                    .await
                    .map(|d| vec![d]);
                let _ = self.results.send(result);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed {
    Start(u32),
    End(u32),
    Marker,
    Label(String),
}

/// Records what a queue dispatches. With `hold`, each number's dispatch spans
/// a sleep so overlapping dispatch would show up as interleaved events.
pub struct Recorder {
    pub events: mpsc::UnboundedSender<Observed>,
    pub hold: Duration,
}

#[async_trait]
impl IncomingListener for Recorder {
    async fn on_incoming(
        &mut self,
        message: &Message,
        _outbox: &mut Outbox,
    ) -> Result<(), CommunicationError> {
        if message.msg_type() == &number_type() {
            let n: u32 = message.payload(0)?;
            let _ = self.events.send(Observed::Start(n));
            if !self.hold.is_zero() {
                tokio::time::sleep(self.hold).await;
            }
            let _ = self.events.send(Observed::End(n));
        } else if message.msg_type() == &marker_type() {
            let _ = self.events.send(Observed::Marker);
        }
        Ok(())
    }
}

pub fn recorder(hold: Duration) -> (Listener, mpsc::UnboundedReceiver<Observed>) {
    let (events, rx) = mpsc::unbounded_channel();
    (Listener::incoming(Recorder { events, hold }), rx)
}

pub fn commander() -> (Listener, mpsc::UnboundedReceiver<SendResult>) {
    let (results, rx) = mpsc::unbounded_channel();
    (Listener::incoming(Commander { results }), rx)
}

/// Spawns a queue that executes commands.
pub async fn spawn_commander(
    runtime: &Runtime,
    id: &str,
) -> (QueueHandle, mpsc::UnboundedReceiver<SendResult>) {
    let mut queue = runtime.create_queue(id.into(), 0, None).await.unwrap();
    let (listener, results) = commander();
    queue.register_listener(command_type(), listener);
    (runtime.spawn(queue), results)
}

/// Spawns a queue that records every number and marker it receives.
pub async fn spawn_recorder(
    runtime: &Runtime,
    id: &str,
    hold: Duration,
) -> (QueueHandle, mpsc::UnboundedReceiver<Observed>) {
    let mut queue = runtime.create_queue(id.into(), 0, None).await.unwrap();
    let (listener, events) = recorder(hold);
    queue.register_listener(MessageType::root(), listener);
    (runtime.spawn(queue), events)
}

pub async fn command(handle: &QueueHandle, command: Command) {
    handle
        .inject(Message::new(command_type()).with_payload(&command).unwrap())
        .await
        .unwrap();
}

pub async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for the queue")
        .expect("channel closed")
}
