// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Directory ("white pages")
//!
//! Maps agent IDs to addresses. It is the only state in the substrate that more
//! than one component mutates, so every implementation must make
//! register/lookup/unregister atomic with respect to each other.
//!
//! | Operation | Effect |
//! |-----------|--------|
//! | `register` | adds an entry; a live entry with another address is a `DuplicateAgentId` |
//! | `lookup` | returns the address; unknown is `NoSuchAgent`, invalidated is `PeerUnreachable` |
//! | `mark_unreachable` | invalidates an entry after a transport fault |
//! | `unregister` | removes an entry (idempotent) |
//!
//! The implementation lives in `crate::infrastructure::directory`.

use crate::domain::agent::{AgentAddress, AgentId};
use crate::domain::error::CommunicationError;
use std::collections::BTreeMap;

pub trait Directory: Send + Sync {
    /// Records `id` at `address`. Re-registering the same address is a no-op;
    /// an invalidated entry may be replaced.
    fn register(&self, id: AgentId, address: AgentAddress) -> Result<(), CommunicationError>;

    fn lookup(&self, id: &AgentId) -> Result<AgentAddress, CommunicationError>;

    /// Removes `id`, returning its last address if it was present.
    fn unregister(&self, id: &AgentId) -> Option<AgentAddress>;

    /// Invalidates `id` so later lookups fail fast.
    fn mark_unreachable(&self, id: &AgentId);

    fn contains(&self, id: &AgentId) -> bool;

    /// All reachable entries, sorted by ID.
    fn snapshot(&self) -> BTreeMap<AgentId, AgentAddress>;
}
