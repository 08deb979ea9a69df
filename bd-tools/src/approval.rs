//! Human approval gate.
//!
//! Tool categories can be marked approval-gated. A gated call is parked
//! under a server-issued pending-call id; the decision must present that
//! id and consuming it is an atomic remove, so a replayed or fabricated
//! token finds nothing. This layer only enforces that execution does not
//! proceed without an approved token — retry policy after a denial
//! belongs to the agent loop.

use crate::error::{Result, ToolError};
use crate::traits::ToolCategory;
use bd_core::clock::Clock;
use bd_core::models::ActionContext;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Which tool categories require a human decision before execution.
/// Destructive tools are gated by default; query tools never are.
#[derive(Debug, Clone)]
pub struct ApprovalPolicy {
    gated: HashSet<ToolCategory>,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        let mut gated = HashSet::new();
        gated.insert(ToolCategory::Destructive);
        Self { gated }
    }
}

impl ApprovalPolicy {
    pub fn none() -> Self {
        Self {
            gated: HashSet::new(),
        }
    }

    pub fn gating(categories: impl IntoIterator<Item = ToolCategory>) -> Self {
        Self {
            gated: categories.into_iter().collect(),
        }
    }

    pub fn requires_approval(&self, category: ToolCategory) -> bool {
        self.gated.contains(&category)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved,
    Denied,
}

/// Carrier for a decision, keyed by the pending call it answers.
#[derive(Debug, Copy, Clone)]
pub struct ApprovalToken {
    pub pending_call_id: Uuid,
    pub decision: ApprovalDecision,
}

#[derive(Debug, Clone)]
pub struct PendingCall {
    pub id: Uuid,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub context: ActionContext,
    pub created_at: DateTime<Utc>,
}

/// Parked approval-gated calls. Single-process, lifecycle-scoped; each
/// entry is consumed exactly once. Expired entries are purged on insert.
pub struct PendingApprovals {
    entries: DashMap<Uuid, PendingCall>,
    capacity: usize,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl PendingApprovals {
    pub fn new(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
            ttl,
            clock,
        }
    }

    pub fn park(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
        context: &ActionContext,
    ) -> Result<Uuid> {
        let now = self.clock.now();
        self.purge_expired(now);
        if self.entries.len() >= self.capacity {
            return Err(ToolError::Conflict(
                "too many approvals pending; decide or let some expire first".to_string(),
            ));
        }
        let call = PendingCall {
            id: Uuid::new_v4(),
            tool_name: tool_name.to_string(),
            arguments,
            context: context.clone(),
            created_at: now,
        };
        let id = call.id;
        self.entries.insert(id, call);
        tracing::info!(pending_call_id = %id, tool_name, "tool call parked for approval");
        Ok(id)
    }

    /// Atomically removes and returns the pending call. `None` means the
    /// id is unknown, already consumed, or expired.
    pub fn consume(&self, id: Uuid) -> Option<PendingCall> {
        let (_, call) = self.entries.remove(&id)?;
        if self.clock.now() - call.created_at > self.ttl {
            tracing::info!(pending_call_id = %id, "pending approval expired before decision");
            return None;
        }
        Some(call)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge_expired(&self, now: DateTime<Utc>) {
        self.entries.retain(|_, call| now - call.created_at <= self.ttl);
    }
}
