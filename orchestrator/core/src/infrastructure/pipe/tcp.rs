// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Networked pipes.
//!
//! One TCP connection per directed (sender, receiver) pair, carrying
//! length-delimited envelope frames. The receiving queue owns a [`TcpInbound`]
//! that accepts any number of such connections and feeds its inbox.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{OutputPipe, PipeState, TransportSettings};
use crate::domain::agent::AgentId;
use crate::domain::error::CommunicationError;
use crate::domain::message::Envelope;
use crate::infrastructure::codec::{decode_envelope, encode_envelope, frame_codec};

pub struct TcpPipe {
    peer: AgentId,
    endpoint: String,
    sink: FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>,
    /// Set by the watcher once the peer closes or resets the connection.
    peer_closed: Arc<AtomicBool>,
    watcher: JoinHandle<()>,
    state: PipeState,
    send_timeout: Duration,
    max_frame_bytes: usize,
}

impl TcpPipe {
    /// Connects to `host:port`. Unknown hosts, refusals and timeouts are all
    /// reported as `PeerUnreachable`; nothing is retried.
    pub async fn connect(
        from: &AgentId,
        to: &AgentId,
        host: &str,
        port: u16,
        settings: &TransportSettings,
    ) -> Result<Self, CommunicationError> {
        let endpoint = format!("{}:{}", host, port);
        let stream =
            match tokio::time::timeout(settings.connect_timeout, TcpStream::connect(&endpoint))
                .await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    return Err(CommunicationError::unreachable(
                        to,
                        format!("connect to {} failed: {}", endpoint, e),
                    ))
                }
                Err(_) => {
                    return Err(CommunicationError::unreachable(
                        to,
                        format!("connect to {} timed out", endpoint),
                    ))
                }
            };

        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %to, "Could not disable Nagle: {}", e);
        }

        let (read_half, write_half) = stream.into_split();
        let peer_closed = Arc::new(AtomicBool::new(false));
        let watcher = tokio::spawn(watch_peer(read_half, peer_closed.clone()));

        debug!(from = %from, peer = %to, %endpoint, "Opened TCP pipe");
        Ok(Self {
            peer: to.clone(),
            endpoint,
            sink: FramedWrite::new(write_half, frame_codec(settings.max_frame_bytes)),
            peer_closed,
            watcher,
            state: PipeState::Open,
            send_timeout: settings.send_timeout,
            max_frame_bytes: settings.max_frame_bytes,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn fault(&mut self, reason: String) -> CommunicationError {
        self.state = PipeState::Faulted;
        CommunicationError::unreachable(&self.peer, reason)
    }
}

/// The receiving side never writes, so any read completion means the
/// connection is gone.
async fn watch_peer(mut read_half: OwnedReadHalf, peer_closed: Arc<AtomicBool>) {
    let mut buf = [0u8; 64];
    loop {
        match read_half.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => continue,
        }
    }
    peer_closed.store(true, Ordering::SeqCst);
}

#[async_trait]
impl OutputPipe for TcpPipe {
    async fn push(&mut self, envelope: Envelope) -> Result<(), CommunicationError> {
        match self.state {
            PipeState::Open => {}
            PipeState::Closed => return Err(CommunicationError::PipeClosed(self.peer.clone())),
            PipeState::Faulted => {
                return Err(CommunicationError::unreachable(&self.peer, "pipe faulted earlier"))
            }
        }
        if self.peer_closed.load(Ordering::SeqCst) {
            return Err(self.fault(format!("{} closed the connection", self.endpoint)));
        }

        let frame = encode_envelope(&envelope)?;
        if frame.len() > self.max_frame_bytes {
            // refused before anything is written; the stream stays usable
            return Err(CommunicationError::Serialization(format!(
                "frame of {} bytes exceeds the {} byte limit",
                frame.len(),
                self.max_frame_bytes
            )));
        }

        match tokio::time::timeout(self.send_timeout, self.sink.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(self.fault(format!("write to {} failed: {}", self.endpoint, e))),
            Err(_) => Err(self.fault(format!("write to {} timed out", self.endpoint))),
        }
    }

    async fn close(&mut self) {
        if self.state == PipeState::Open {
            let flushed =
                tokio::time::timeout(self.send_timeout, SinkExt::<Bytes>::close(&mut self.sink)).await;
            if let Ok(Err(e)) = flushed {
                debug!(peer = %self.peer, "Error while closing TCP pipe: {}", e);
            }
            self.state = PipeState::Closed;
        }
        self.watcher.abort();
    }

    fn state(&self) -> PipeState {
        self.state
    }

    fn peer(&self) -> &AgentId {
        &self.peer
    }
}

impl Drop for TcpPipe {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

/// Accepting side of the TCP transport for one queue.
pub struct TcpInbound {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TcpInbound {
    /// Binds `bind_address:port` (port 0 picks an ephemeral port) and starts
    /// accepting. Readers stop when `cancel` fires.
    pub async fn bind(
        owner: &AgentId,
        bind_address: &str,
        port: u16,
        inbox: mpsc::Sender<Envelope>,
        cancel: CancellationToken,
        max_frame_bytes: usize,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind((bind_address, port)).await?;
        let local_addr = listener.local_addr()?;
        info!(agent = %owner, %local_addr, "Queue listening for TCP pipes");

        let task = tokio::spawn(accept_loop(
            owner.clone(),
            listener,
            inbox,
            cancel.clone(),
            max_frame_bytes,
        ));

        Ok(Self {
            local_addr,
            cancel,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Stops accepting and closes every connection. Idempotent.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TcpInbound {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn accept_loop(
    owner: AgentId,
    listener: TcpListener,
    inbox: mpsc::Sender<Envelope>,
    cancel: CancellationToken,
    max_frame_bytes: usize,
) {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, remote)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(agent = %owner, %remote, "Could not disable Nagle: {}", e);
                }
                tokio::spawn(read_connection(
                    owner.clone(),
                    stream,
                    remote,
                    inbox.clone(),
                    cancel.child_token(),
                    max_frame_bytes,
                ));
            }
            Err(e) => {
                warn!(agent = %owner, "Failed to accept TCP connection: {}", e);
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }
    debug!(agent = %owner, "TCP accept loop stopped");
}

async fn read_connection(
    owner: AgentId,
    stream: TcpStream,
    remote: SocketAddr,
    inbox: mpsc::Sender<Envelope>,
    cancel: CancellationToken,
    max_frame_bytes: usize,
) {
    let mut frames = FramedRead::new(stream, frame_codec(max_frame_bytes));
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = frames.next() => frame,
        };
        let bytes = match frame {
            None => break,
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => {
                // framing is lost (oversized length or I/O error); drop the connection
                warn!(agent = %owner, %remote, "Closing TCP pipe after framing error: {}", e);
                break;
            }
        };
        match decode_envelope(&bytes) {
            Ok(envelope) => {
                let delivered = tokio::select! {
                    _ = cancel.cancelled() => false,
                    sent = inbox.send(envelope) => sent.is_ok(),
                };
                if !delivered {
                    break;
                }
            }
            Err(e) => {
                metrics::counter!("cohort_frames_rejected_total").increment(1);
                warn!(agent = %owner, %remote, "Dropped undecodable frame: {}", e);
            }
        }
    }
    debug!(agent = %owner, %remote, "TCP pipe reader stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_to_closed_port_is_peer_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = TcpPipe::connect(
            &"A".into(),
            &"B".into(),
            "127.0.0.1",
            port,
            &TransportSettings::default(),
        )
        .await;
        assert!(matches!(
            result,
            Err(CommunicationError::PeerUnreachable { .. })
        ));
    }

    #[tokio::test]
    async fn test_close_flushes_pending_frames_and_refuses_more() {
        use crate::domain::message::Message;
        use crate::domain::message_type::MessageType;

        let (tx, mut rx) = mpsc::channel(4);
        let inbound = TcpInbound::bind(&"B".into(), "127.0.0.1", 0, tx, CancellationToken::new(), 1024)
            .await
            .unwrap();
        let mut pipe = TcpPipe::connect(
            &"A".into(),
            &"B".into(),
            "127.0.0.1",
            inbound.port(),
            &TransportSettings::default(),
        )
        .await
        .unwrap();

        let message = Message::new(MessageType::new(["Test"])).with_payload(&7u32).unwrap();
        pipe.push(Envelope::new("A".into(), "B".into(), message)).await.unwrap();
        pipe.close().await;
        assert_eq!(pipe.state(), PipeState::Closed);

        let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.message.payload::<u32>(0).unwrap(), 7);

        let again = Message::new(MessageType::new(["Test"]));
        assert!(matches!(
            pipe.push(Envelope::new("A".into(), "B".into(), again)).await,
            Err(CommunicationError::PipeClosed(_))
        ));
        inbound.shutdown();
    }

    #[tokio::test]
    async fn test_inbound_shutdown_stops_accept_loop() {
        let (tx, _rx) = mpsc::channel(4);
        let inbound = TcpInbound::bind(
            &"B".into(),
            "127.0.0.1",
            0,
            tx,
            CancellationToken::new(),
            1024,
        )
        .await
        .unwrap();
        assert_ne!(inbound.port(), 0);

        inbound.shutdown();
        tokio::time::timeout(Duration::from_secs(2), async {
            while !inbound.is_finished() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }
}
