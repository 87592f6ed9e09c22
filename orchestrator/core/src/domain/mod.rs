// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Value types of the message-passing substrate.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Message types, messages, agent identity, directory contract, node configuration

pub mod agent;
pub mod directory;
pub mod error;
pub mod events;
pub mod message;
pub mod message_type;
pub mod node_config;
