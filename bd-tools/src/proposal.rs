//! Ephemeral creation proposals.
//!
//! The creation flow first shows the user what the agent intends to
//! create; the accepted payload is held here until the execution step
//! takes it. Take is an atomic get-and-delete so double-submission
//! cannot execute a proposal twice, and a failed execution restores the
//! entry so the user can retry without re-describing it.
//!
//! Single-process store. A multi-instance deployment must substitute a
//! shared expiring key-value store; the database is not involved here
//! because proposals are never authoritative state.

use crate::error::{Result, ToolError};
use bd_core::clock::Clock;
use bd_core::models::OrgId;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// How often the lazy purge may actually run.
const PURGE_INTERVAL_SECONDS: i64 = 30;

#[derive(Debug, Clone)]
pub struct Proposal {
    pub id: Uuid,
    pub org_id: OrgId,
    pub session_id: Uuid,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

pub struct ProposalStore {
    entries: DashMap<Uuid, Proposal>,
    capacity: usize,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    last_purge_epoch: AtomicI64,
}

impl ProposalStore {
    pub fn new(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
            ttl,
            clock,
            last_purge_epoch: AtomicI64::new(0),
        }
    }

    pub fn insert(
        &self,
        org_id: OrgId,
        session_id: Uuid,
        payload: serde_json::Value,
    ) -> Result<Uuid> {
        let now = self.clock.now();
        self.maybe_purge(now);

        if self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        if self.entries.len() >= self.capacity {
            return Err(ToolError::Conflict(
                "proposal store is full; retry shortly".to_string(),
            ));
        }

        let proposal = Proposal {
            id: Uuid::new_v4(),
            org_id,
            session_id,
            payload,
            created_at: now,
        };
        let id = proposal.id;
        self.entries.insert(id, proposal);
        Ok(id)
    }

    /// Atomic get-and-delete. `None` when the id is unknown, expired, or
    /// already taken.
    pub fn take(&self, id: Uuid) -> Option<Proposal> {
        let (_, proposal) = self.entries.remove(&id)?;
        if self.clock.now() - proposal.created_at > self.ttl {
            return None;
        }
        Some(proposal)
    }

    /// Puts a taken proposal back after its execution failed.
    pub fn restore(&self, proposal: Proposal) {
        self.entries.insert(proposal.id, proposal);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Purges expired entries at most once per interval, keeping the
    /// insert path O(1) amortized.
    fn maybe_purge(&self, now: DateTime<Utc>) {
        let now_epoch = now.timestamp();
        let last = self.last_purge_epoch.load(Ordering::Relaxed);
        if now_epoch - last < PURGE_INTERVAL_SECONDS {
            return;
        }
        if self
            .last_purge_epoch
            .compare_exchange(last, now_epoch, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        self.entries
            .retain(|_, proposal| now - proposal.created_at <= self.ttl);
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.created_at)
            .map(|entry| entry.id);
        if let Some(id) = oldest {
            self.entries.remove(&id);
        }
    }
}
