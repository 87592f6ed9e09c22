// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Cohort Core
//!
//! Message-passing substrate for cooperative distributed agents: hierarchical
//! message types, per-agent queues with pluggable listeners, in-process and TCP
//! pipes, and the agent directory.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Typed, ordered delivery between agent queues

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::*;
