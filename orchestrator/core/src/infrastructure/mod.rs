// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod codec;
pub mod directory;
pub mod event_bus;
pub mod pipe;

pub use directory::InMemoryDirectory;
pub use event_bus::{EventBus, EventBusError, EventReceiver};
