//! Schedule descriptors and the claim-based store contract.

use crate::models::{OrgId, ProjectId, UserId};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A cron-triggered standing instruction for the agent.
///
/// `next_run_at` doubles as the claim flag: a claimed/in-flight row has
/// `next_run_at = NULL` and must not be claimed again until a finished
/// run recomputes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDescriptor {
    pub id: Uuid,
    pub org_id: OrgId,
    pub project_id: ProjectId,
    pub name: String,
    pub cron_expression: String,
    pub instruction: String,
    pub enabled: bool,
    pub created_by: UserId,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateScheduleInput {
    pub name: String,
    pub cron_expression: String,
    pub instruction: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateScheduleInput {
    pub name: Option<String>,
    pub cron_expression: Option<String>,
    pub instruction: Option<String>,
    pub enabled: Option<bool>,
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn insert(&self, schedule: &ScheduleDescriptor) -> Result<()>;

    async fn get(&self, org_id: OrgId, id: Uuid) -> Result<Option<ScheduleDescriptor>>;

    async fn list(&self, org_id: OrgId) -> Result<Vec<ScheduleDescriptor>>;

    async fn update(&self, schedule: &ScheduleDescriptor) -> Result<()>;

    async fn delete(&self, org_id: OrgId, id: Uuid) -> Result<bool>;

    /// Atomically claims every due row: in one conditional update,
    /// selects rows with `enabled AND next_run_at <= now`, sets
    /// `next_run_at = NULL` and `last_run_at = now`, and returns the
    /// claimed descriptors. Two concurrent callers each receive a
    /// disjoint subset; a row lost to the race is simply absent.
    async fn claim_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduleDescriptor>>;

    /// Persists the recomputed `next_run_at` once a claimed run finishes
    /// (success or failure). Must be called for every claimed row.
    async fn finish_run(&self, id: Uuid, next_run_at: Option<DateTime<Utc>>) -> Result<()>;
}
