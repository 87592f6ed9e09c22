// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Cohort Control
//!
//! The bootstrap and termination protocol on top of `cohort-core`: daemons
//! register with a controller, the controller hands out agent roles problem by
//! problem, counts completions, and shuts everything down when the experiment
//! is over.
//!
//! # Architecture
//!
//! - **Layer:** Control Plane
//! - **Purpose:** Discover daemons, distribute work, detect global completion

pub mod application;
pub mod domain;
