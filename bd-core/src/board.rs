//! Board collaborator interface.
//!
//! The board's CRUD data model lives outside this system; the agent
//! layer only needs a typed surface to mutate through and to read
//! pre-mutation state from when building snapshots. Idempotent membership
//! operations (assign/label) return whether they changed anything so
//! compensators can check-before-insert/delete.

use crate::models::{OrgId, ProjectId, UserId};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub org_id: OrgId,
    pub project_id: ProjectId,
    pub title: String,
    pub description: Option<String>,
    pub column_id: Uuid,
    pub position: i64,
    pub assignee_ids: Vec<UserId>,
    pub label_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub column_id: Uuid,
    /// Appended to the end of the column when absent.
    pub position: Option<i64>,
}

/// Field-wise patch; `None` leaves the field untouched. The description
/// is doubly optional so a patch can distinguish "leave it" from "clear
/// it" — undo needs the latter to restore a previously empty field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
}

impl TaskPatch {
    pub fn set_title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            description: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPlacement {
    pub column_id: Uuid,
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub author_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait BoardStore: Send + Sync {
    async fn create_task(
        &self,
        org_id: OrgId,
        project_id: ProjectId,
        draft: TaskDraft,
    ) -> Result<Task>;

    async fn get_task(&self, org_id: OrgId, task_id: Uuid) -> Result<Option<Task>>;

    async fn list_tasks(&self, org_id: OrgId, project_id: ProjectId) -> Result<Vec<Task>>;

    /// Applies `patch` and returns the updated task. `Err(NotFound)` when
    /// the task is gone.
    async fn update_task(&self, org_id: OrgId, task_id: Uuid, patch: TaskPatch) -> Result<Task>;

    async fn move_task(
        &self,
        org_id: OrgId,
        task_id: Uuid,
        placement: TaskPlacement,
    ) -> Result<Task>;

    /// Returns whether a task was actually removed.
    async fn delete_task(&self, org_id: OrgId, task_id: Uuid) -> Result<bool>;

    /// Returns `false` when the user was already assigned.
    async fn assign_user(&self, org_id: OrgId, task_id: Uuid, user_id: UserId) -> Result<bool>;

    /// Returns `false` when the user was not assigned.
    async fn unassign_user(&self, org_id: OrgId, task_id: Uuid, user_id: UserId) -> Result<bool>;

    /// Returns `false` when the label was already attached.
    async fn add_label(&self, org_id: OrgId, task_id: Uuid, label_id: Uuid) -> Result<bool>;

    /// Returns `false` when the label was not attached.
    async fn remove_label(&self, org_id: OrgId, task_id: Uuid, label_id: Uuid) -> Result<bool>;

    async fn add_comment(
        &self,
        org_id: OrgId,
        task_id: Uuid,
        author_id: UserId,
        body: String,
    ) -> Result<Comment>;

    async fn get_comment(&self, org_id: OrgId, comment_id: Uuid) -> Result<Option<Comment>>;

    async fn delete_comment(&self, org_id: OrgId, comment_id: Uuid) -> Result<bool>;
}
