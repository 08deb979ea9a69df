//! Activity ledger data model and store contract.

use crate::models::{OrgId, ProjectId, UserId};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Completed,
    Failed,
    Denied,
    RolledBack,
}

impl ActivityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityStatus::Completed => "completed",
            ActivityStatus::Failed => "failed",
            ActivityStatus::Denied => "denied",
            ActivityStatus::RolledBack => "rolled_back",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "completed" => Ok(ActivityStatus::Completed),
            "failed" => Ok(ActivityStatus::Failed),
            "denied" => Ok(ActivityStatus::Denied),
            "rolled_back" => Ok(ActivityStatus::RolledBack),
            other => Err(Error::InvalidInput(format!(
                "unknown activity status: {other}"
            ))),
        }
    }
}

/// One row per tool invocation. Append-mostly: the only mutation ever
/// applied is the `completed -> rolled_back` flip, and that flip is
/// conditional so it lands at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: Uuid,
    pub org_id: OrgId,
    pub project_id: ProjectId,
    pub user_id: UserId,
    pub session_id: Uuid,
    pub tool_name: String,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub status: ActivityStatus,
    pub requires_approval: bool,
    pub approval_status: Option<String>,
    pub affected_entity_ids: Vec<String>,
    /// Serialized pre-mutation snapshot; the undo engine deserializes it
    /// back into the operation union.
    pub snapshot_before: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn append(&self, record: &ActivityRecord) -> Result<()>;

    async fn get(&self, org_id: OrgId, id: Uuid) -> Result<Option<ActivityRecord>>;

    /// Conditional flip `completed -> rolled_back`. Returns `false` when
    /// the record is missing or no longer `completed`, which gives undo
    /// its at-most-once semantics.
    async fn mark_rolled_back(&self, org_id: OrgId, id: Uuid) -> Result<bool>;

    /// Most recent records for an organization, newest first.
    async fn list_recent(&self, org_id: OrgId, limit: usize) -> Result<Vec<ActivityRecord>>;
}
