// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod listener;
pub mod queue;
pub mod runtime;
pub mod stats;

pub use listener::{Decision, IncomingListener, Listener, OutgoingListener};
pub use queue::{Delivery, Outbox, Queue, QueueHandle};
pub use runtime::{Runtime, RuntimeError, TransportMode};
