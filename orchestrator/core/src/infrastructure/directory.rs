// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory directory guarded by a single lock.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::agent::{AgentAddress, AgentId};
use crate::domain::directory::Directory;
use crate::domain::error::CommunicationError;

#[derive(Debug, Clone)]
struct Entry {
    address: AgentAddress,
    reachable: bool,
}

#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    entries: Arc<RwLock<HashMap<AgentId, Entry>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Directory for InMemoryDirectory {
    fn register(&self, id: AgentId, address: AgentAddress) -> Result<(), CommunicationError> {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(&id) {
            if existing.reachable && existing.address != address {
                warn!(agent = %id, existing = %existing.address, attempted = %address, "Rejected duplicate registration");
                return Err(CommunicationError::DuplicateAgentId {
                    agent: id,
                    existing: existing.address.clone(),
                    attempted: address,
                });
            }
        }
        debug!(agent = %id, %address, "Registered in directory");
        entries.insert(
            id,
            Entry {
                address,
                reachable: true,
            },
        );
        Ok(())
    }

    fn lookup(&self, id: &AgentId) -> Result<AgentAddress, CommunicationError> {
        let entries = self.entries.read();
        match entries.get(id) {
            Some(entry) if entry.reachable => Ok(entry.address.clone()),
            Some(_) => Err(CommunicationError::unreachable(
                id,
                "marked unreachable after an earlier transport fault",
            )),
            None => Err(CommunicationError::NoSuchAgent(id.clone())),
        }
    }

    fn unregister(&self, id: &AgentId) -> Option<AgentAddress> {
        let removed = self.entries.write().remove(id).map(|e| e.address);
        if removed.is_some() {
            debug!(agent = %id, "Unregistered from directory");
        }
        removed
    }

    fn mark_unreachable(&self, id: &AgentId) {
        if let Some(entry) = self.entries.write().get_mut(id) {
            entry.reachable = false;
        }
    }

    fn contains(&self, id: &AgentId) -> bool {
        self.entries.read().contains_key(id)
    }

    fn snapshot(&self) -> BTreeMap<AgentId, AgentAddress> {
        self.entries
            .read()
            .iter()
            .filter(|(_, e)| e.reachable)
            .map(|(id, e)| (id.clone(), e.address.clone()))
            .collect()
    }
}
