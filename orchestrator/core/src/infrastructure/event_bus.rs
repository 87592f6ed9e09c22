// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Control Events
//
// Provides in-memory event streaming using tokio broadcast channels.
// The console and `cohort local` observe run progress through it; integration
// tests await specific events instead of sleeping.
//
// In-memory only: events published before a subscriber attaches are not replayed.

use crate::domain::events::{ControlEvent, EventRecord};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Event bus for publishing and subscribing to control events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<EventRecord>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity.
    /// Capacity determines how many events can be buffered before lagging
    /// receivers start losing the oldest ones.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish(&self, event: ControlEvent) {
        debug!("Publishing event: {:?}", event);

        let receiver_count = self.sender.send(EventRecord::now(event)).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<EventRecord>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<EventRecord, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    pub fn try_recv(&mut self) -> Result<EventRecord, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Waits for the first event matching `predicate`, skipping others.
    /// Lag is tolerated; a closed bus or an elapsed `timeout` is an error.
    pub async fn wait_for<F>(
        &mut self,
        timeout: Duration,
        mut predicate: F,
    ) -> Result<ControlEvent, EventBusError>
    where
        F: FnMut(&ControlEvent) -> bool,
    {
        let search = async {
            loop {
                match self.recv().await {
                    Ok(record) if predicate(&record.event) => return Ok(record.event),
                    Ok(_) | Err(EventBusError::Lagged(_)) => continue,
                    Err(e) => return Err(e),
                }
            }
        };
        tokio::time::timeout(timeout, search)
            .await
            .map_err(|_| EventBusError::TimedOut(timeout))?
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),

    #[error("No matching event within {0:?}")]
    TimedOut(Duration),
}
