//! In-memory dev backends.
//!
//! Back the dev runtime and the test suites. Each store holds its rows
//! under a single `RwLock`, so the conditional operations (`claim_due`,
//! `mark_rolled_back`) are atomic the same way their SQL counterparts
//! are.

use crate::board::{BoardStore, Comment, Task, TaskDraft, TaskPatch, TaskPlacement};
use crate::ledger::{ActivityRecord, ActivityStatus, LedgerStore};
use crate::models::{OrgId, ProjectId, UserId};
use crate::schedule::{ScheduleDescriptor, ScheduleStore};
use crate::webhook::{WebhookEndpoint, WebhookStore};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct DevBoardStore {
    tasks: RwLock<HashMap<Uuid, Task>>,
    comments: RwLock<HashMap<Uuid, Comment>>,
}

impl DevBoardStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BoardStore for DevBoardStore {
    async fn create_task(
        &self,
        org_id: OrgId,
        project_id: ProjectId,
        draft: TaskDraft,
    ) -> Result<Task> {
        if draft.title.trim().is_empty() {
            return Err(Error::InvalidInput("task title must not be empty".into()));
        }
        let mut tasks = self.tasks.write().await;
        let position = match draft.position {
            Some(p) => p,
            None => {
                tasks
                    .values()
                    .filter(|t| t.org_id == org_id && t.column_id == draft.column_id)
                    .map(|t| t.position)
                    .max()
                    .unwrap_or(-1)
                    + 1
            }
        };
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            org_id,
            project_id,
            title: draft.title,
            description: draft.description,
            column_id: draft.column_id,
            position,
            assignee_ids: Vec::new(),
            label_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn get_task(&self, org_id: OrgId, task_id: Uuid) -> Result<Option<Task>> {
        Ok(self
            .tasks
            .read()
            .await
            .get(&task_id)
            .filter(|t| t.org_id == org_id)
            .cloned())
    }

    async fn list_tasks(&self, org_id: OrgId, project_id: ProjectId) -> Result<Vec<Task>> {
        let tasks = self.tasks.read().await;
        let mut out: Vec<Task> = tasks
            .values()
            .filter(|t| t.org_id == org_id && t.project_id == project_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| (a.column_id, a.position).cmp(&(b.column_id, b.position)));
        Ok(out)
    }

    async fn update_task(&self, org_id: OrgId, task_id: Uuid, patch: TaskPatch) -> Result<Task> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&task_id)
            .filter(|t| t.org_id == org_id)
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))?;
        if let Some(title) = patch.title {
            task.title = title;
        }
        if let Some(description) = patch.description {
            task.description = description;
        }
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn move_task(
        &self,
        org_id: OrgId,
        task_id: Uuid,
        placement: TaskPlacement,
    ) -> Result<Task> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&task_id)
            .filter(|t| t.org_id == org_id)
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))?;
        task.column_id = placement.column_id;
        task.position = placement.position;
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    async fn delete_task(&self, org_id: OrgId, task_id: Uuid) -> Result<bool> {
        let mut tasks = self.tasks.write().await;
        let existed = tasks
            .get(&task_id)
            .is_some_and(|t| t.org_id == org_id);
        if existed {
            tasks.remove(&task_id);
            let mut comments = self.comments.write().await;
            comments.retain(|_, c| c.task_id != task_id);
        }
        Ok(existed)
    }

    async fn assign_user(&self, org_id: OrgId, task_id: Uuid, user_id: UserId) -> Result<bool> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&task_id)
            .filter(|t| t.org_id == org_id)
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))?;
        if task.assignee_ids.contains(&user_id) {
            return Ok(false);
        }
        task.assignee_ids.push(user_id);
        task.updated_at = Utc::now();
        Ok(true)
    }

    async fn unassign_user(&self, org_id: OrgId, task_id: Uuid, user_id: UserId) -> Result<bool> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&task_id)
            .filter(|t| t.org_id == org_id)
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))?;
        let before = task.assignee_ids.len();
        task.assignee_ids.retain(|u| *u != user_id);
        let changed = task.assignee_ids.len() != before;
        if changed {
            task.updated_at = Utc::now();
        }
        Ok(changed)
    }

    async fn add_label(&self, org_id: OrgId, task_id: Uuid, label_id: Uuid) -> Result<bool> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&task_id)
            .filter(|t| t.org_id == org_id)
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))?;
        if task.label_ids.contains(&label_id) {
            return Ok(false);
        }
        task.label_ids.push(label_id);
        task.updated_at = Utc::now();
        Ok(true)
    }

    async fn remove_label(&self, org_id: OrgId, task_id: Uuid, label_id: Uuid) -> Result<bool> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&task_id)
            .filter(|t| t.org_id == org_id)
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))?;
        let before = task.label_ids.len();
        task.label_ids.retain(|l| *l != label_id);
        let changed = task.label_ids.len() != before;
        if changed {
            task.updated_at = Utc::now();
        }
        Ok(changed)
    }

    async fn add_comment(
        &self,
        org_id: OrgId,
        task_id: Uuid,
        author_id: UserId,
        body: String,
    ) -> Result<Comment> {
        {
            let tasks = self.tasks.read().await;
            if !tasks.get(&task_id).is_some_and(|t| t.org_id == org_id) {
                return Err(Error::NotFound(format!("task {task_id}")));
            }
        }
        let comment = Comment {
            id: Uuid::new_v4(),
            task_id,
            author_id,
            body,
            created_at: Utc::now(),
        };
        self.comments
            .write()
            .await
            .insert(comment.id, comment.clone());
        Ok(comment)
    }

    async fn get_comment(&self, _org_id: OrgId, comment_id: Uuid) -> Result<Option<Comment>> {
        Ok(self.comments.read().await.get(&comment_id).cloned())
    }

    async fn delete_comment(&self, _org_id: OrgId, comment_id: Uuid) -> Result<bool> {
        Ok(self.comments.write().await.remove(&comment_id).is_some())
    }
}

#[derive(Default)]
pub struct DevLedgerStore {
    records: RwLock<HashMap<Uuid, ActivityRecord>>,
}

impl DevLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for DevLedgerStore {
    async fn append(&self, record: &ActivityRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, org_id: OrgId, id: Uuid) -> Result<Option<ActivityRecord>> {
        Ok(self
            .records
            .read()
            .await
            .get(&id)
            .filter(|r| r.org_id == org_id)
            .cloned())
    }

    async fn mark_rolled_back(&self, org_id: OrgId, id: Uuid) -> Result<bool> {
        let mut records = self.records.write().await;
        match records.get_mut(&id) {
            Some(record)
                if record.org_id == org_id && record.status == ActivityStatus::Completed =>
            {
                record.status = ActivityStatus::RolledBack;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_recent(&self, org_id: OrgId, limit: usize) -> Result<Vec<ActivityRecord>> {
        let records = self.records.read().await;
        let mut out: Vec<ActivityRecord> = records
            .values()
            .filter(|r| r.org_id == org_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(limit);
        Ok(out)
    }
}

#[derive(Default)]
pub struct DevScheduleStore {
    schedules: RwLock<HashMap<Uuid, ScheduleDescriptor>>,
}

impl DevScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduleStore for DevScheduleStore {
    async fn insert(&self, schedule: &ScheduleDescriptor) -> Result<()> {
        self.schedules
            .write()
            .await
            .insert(schedule.id, schedule.clone());
        Ok(())
    }

    async fn get(&self, org_id: OrgId, id: Uuid) -> Result<Option<ScheduleDescriptor>> {
        Ok(self
            .schedules
            .read()
            .await
            .get(&id)
            .filter(|s| s.org_id == org_id)
            .cloned())
    }

    async fn list(&self, org_id: OrgId) -> Result<Vec<ScheduleDescriptor>> {
        let schedules = self.schedules.read().await;
        let mut out: Vec<ScheduleDescriptor> = schedules
            .values()
            .filter(|s| s.org_id == org_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn update(&self, schedule: &ScheduleDescriptor) -> Result<()> {
        let mut schedules = self.schedules.write().await;
        if !schedules.contains_key(&schedule.id) {
            return Err(Error::NotFound(format!("schedule {}", schedule.id)));
        }
        schedules.insert(schedule.id, schedule.clone());
        Ok(())
    }

    async fn delete(&self, org_id: OrgId, id: Uuid) -> Result<bool> {
        let mut schedules = self.schedules.write().await;
        let existed = schedules.get(&id).is_some_and(|s| s.org_id == org_id);
        if existed {
            schedules.remove(&id);
        }
        Ok(existed)
    }

    async fn claim_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduleDescriptor>> {
        let mut schedules = self.schedules.write().await;
        let mut claimed = Vec::new();
        for schedule in schedules.values_mut() {
            if !schedule.enabled {
                continue;
            }
            let Some(next_run_at) = schedule.next_run_at else {
                continue;
            };
            if next_run_at > now {
                continue;
            }
            schedule.next_run_at = None;
            schedule.last_run_at = Some(now);
            claimed.push(schedule.clone());
        }
        Ok(claimed)
    }

    async fn finish_run(&self, id: Uuid, next_run_at: Option<DateTime<Utc>>) -> Result<()> {
        let mut schedules = self.schedules.write().await;
        let schedule = schedules
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("schedule {id}")))?;
        schedule.next_run_at = next_run_at;
        schedule.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Default)]
pub struct DevWebhookStore {
    endpoints: RwLock<HashMap<Uuid, WebhookEndpoint>>,
}

impl DevWebhookStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WebhookStore for DevWebhookStore {
    async fn insert(&self, endpoint: &WebhookEndpoint) -> Result<()> {
        self.endpoints
            .write()
            .await
            .insert(endpoint.id, endpoint.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<WebhookEndpoint>> {
        Ok(self.endpoints.read().await.get(&id).cloned())
    }

    async fn list(&self, org_id: OrgId) -> Result<Vec<WebhookEndpoint>> {
        let endpoints = self.endpoints.read().await;
        let mut out: Vec<WebhookEndpoint> = endpoints
            .values()
            .filter(|e| e.org_id == org_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn set_enabled(&self, org_id: OrgId, id: Uuid, enabled: bool) -> Result<bool> {
        let mut endpoints = self.endpoints.write().await;
        match endpoints.get_mut(&id) {
            Some(endpoint) if endpoint.org_id == org_id => {
                endpoint.enabled = enabled;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, org_id: OrgId, id: Uuid) -> Result<bool> {
        let mut endpoints = self.endpoints.write().await;
        let existed = endpoints.get(&id).is_some_and(|e| e.org_id == org_id);
        if existed {
            endpoints.remove(&id);
        }
        Ok(existed)
    }
}
