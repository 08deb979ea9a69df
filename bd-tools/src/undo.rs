//! Snapshot-based compensating undo.
//!
//! A ledger record is undoable while it is still `completed`, carries a
//! snapshot, is younger than the fixed window, names a known operation,
//! and is being undone by its original actor — checked in that order,
//! short-circuiting. Compensation applies the inverse of the recorded
//! operation; only then is the record flipped to `rolled_back`, so a
//! failed compensation leaves the record retryable.

use crate::error::ToolError;
use crate::ledger::ActivityLedger;
use crate::snapshot::Snapshot;
use bd_core::board::{BoardStore, TaskDraft, TaskPatch};
use bd_core::clock::Clock;
use bd_core::ledger::{ActivityRecord, ActivityStatus};
use bd_core::models::{OrgId, UserId};
use std::sync::Arc;
use uuid::Uuid;

/// Fixed undo window.
pub const UNDO_WINDOW_SECONDS: i64 = 300;

#[derive(Debug, Clone)]
pub struct UndoEligibility {
    pub can_undo: bool,
    pub reason: Option<String>,
}

impl UndoEligibility {
    fn ok() -> Self {
        Self {
            can_undo: true,
            reason: None,
        }
    }

    fn no(reason: impl Into<String>) -> Self {
        Self {
            can_undo: false,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UndoOutcome {
    pub success: bool,
    pub message: String,
    pub restored_ids: Vec<String>,
}

impl UndoOutcome {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            restored_ids: Vec::new(),
        }
    }
}

pub struct UndoEngine {
    board: Arc<dyn BoardStore>,
    ledger: Arc<ActivityLedger>,
    clock: Arc<dyn Clock>,
}

impl UndoEngine {
    pub fn new(
        board: Arc<dyn BoardStore>,
        ledger: Arc<ActivityLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            board,
            ledger,
            clock,
        }
    }

    pub fn can_undo(&self, record: &ActivityRecord, requesting_user: UserId) -> UndoEligibility {
        match record.status {
            ActivityStatus::Completed => {}
            ActivityStatus::RolledBack => {
                return UndoEligibility::no("action was already undone");
            }
            ActivityStatus::Failed | ActivityStatus::Denied => {
                return UndoEligibility::no(format!(
                    "only completed actions can be undone (status is {})",
                    record.status.as_str()
                ));
            }
        }

        let Some(snapshot_value) = &record.snapshot_before else {
            return UndoEligibility::no("action has no snapshot to restore from");
        };

        let age = self.clock.now() - record.created_at;
        if age.num_seconds() >= UNDO_WINDOW_SECONDS {
            return UndoEligibility::no(format!(
                "undo window of {UNDO_WINDOW_SECONDS}s has elapsed"
            ));
        }

        if Snapshot::from_value(snapshot_value).is_none() {
            return UndoEligibility::no("operation is not in the undoable set");
        }

        if record.user_id != requesting_user {
            return UndoEligibility::no("only the user who performed the action can undo it");
        }

        UndoEligibility::ok()
    }

    #[tracing::instrument(level = "info", skip(self))]
    pub async fn undo(
        &self,
        org_id: OrgId,
        record_id: Uuid,
        requesting_user: UserId,
    ) -> Result<UndoOutcome, ToolError> {
        let Some(record) = self.ledger.get(org_id, record_id).await? else {
            return Err(ToolError::NotFound(format!("activity record {record_id}")));
        };

        let eligibility = self.can_undo(&record, requesting_user);
        if !eligibility.can_undo {
            return Ok(UndoOutcome::failed(
                eligibility
                    .reason
                    .unwrap_or_else(|| "action cannot be undone".to_string()),
            ));
        }

        let Some(snapshot) = record
            .snapshot_before
            .as_ref()
            .and_then(Snapshot::from_value)
        else {
            return Ok(UndoOutcome::failed("operation is not in the undoable set"));
        };

        let (message, restored_ids) = self.apply_inverse(org_id, snapshot).await?;

        if !self.ledger.mark_rolled_back(org_id, record_id).await? {
            // A concurrent undo won the flip; its compensation already
            // happened, ours was a redundant inverse of the same state.
            return Ok(UndoOutcome::failed("action was already undone"));
        }

        tracing::info!(
            %record_id,
            restored = restored_ids.len(),
            "activity record rolled back"
        );
        Ok(UndoOutcome {
            success: true,
            message,
            restored_ids,
        })
    }

    async fn apply_inverse(
        &self,
        org_id: OrgId,
        snapshot: Snapshot,
    ) -> Result<(String, Vec<String>), ToolError> {
        match snapshot {
            Snapshot::Create { task_id } => {
                if self.board.delete_task(org_id, task_id).await? {
                    Ok((format!("deleted created task {task_id}"), vec![]))
                } else {
                    Ok(("created task was already gone".to_string(), vec![]))
                }
            }
            Snapshot::Update { before } => {
                if self.board.get_task(org_id, before.task_id).await?.is_none() {
                    return Ok(("task no longer exists; nothing to restore".to_string(), vec![]));
                }
                self.board
                    .update_task(
                        org_id,
                        before.task_id,
                        TaskPatch {
                            title: Some(before.title),
                            description: Some(before.description),
                        },
                    )
                    .await?;
                Ok((
                    "restored previous task fields".to_string(),
                    vec![before.task_id.to_string()],
                ))
            }
            Snapshot::Move { before } => {
                if self.board.get_task(org_id, before.task_id).await?.is_none() {
                    return Ok(("task no longer exists; nothing to restore".to_string(), vec![]));
                }
                self.board
                    .move_task(org_id, before.task_id, before.placement)
                    .await?;
                Ok((
                    "restored previous task position".to_string(),
                    vec![before.task_id.to_string()],
                ))
            }
            Snapshot::Delete { task } => {
                let restored = self.reinsert(org_id, &task).await?;
                Ok((
                    // Re-inserted tasks get a new identity.
                    format!("re-created deleted task as {restored}"),
                    vec![restored.to_string()],
                ))
            }
            Snapshot::BatchCreate { task_ids } => {
                let total = task_ids.len();
                let mut removed = 0usize;
                for task_id in task_ids {
                    if self.board.delete_task(org_id, task_id).await? {
                        removed += 1;
                    }
                }
                Ok((format!("deleted {removed} of {total} created tasks"), vec![]))
            }
            Snapshot::BatchUpdate { before } => {
                let total = before.len();
                let mut restored_ids = Vec::new();
                for entry in before {
                    if self.board.get_task(org_id, entry.task_id).await?.is_none() {
                        continue;
                    }
                    self.board
                        .update_task(
                            org_id,
                            entry.task_id,
                            TaskPatch {
                                title: Some(entry.title),
                                description: Some(entry.description),
                            },
                        )
                        .await?;
                    restored_ids.push(entry.task_id.to_string());
                }
                Ok((
                    format!("restored fields on {} of {total} tasks", restored_ids.len()),
                    restored_ids,
                ))
            }
            Snapshot::BatchMove { before } => {
                let total = before.len();
                let mut restored_ids = Vec::new();
                for entry in before {
                    if self.board.get_task(org_id, entry.task_id).await?.is_none() {
                        continue;
                    }
                    self.board
                        .move_task(org_id, entry.task_id, entry.placement)
                        .await?;
                    restored_ids.push(entry.task_id.to_string());
                }
                Ok((
                    format!(
                        "restored positions of {} of {total} tasks",
                        restored_ids.len()
                    ),
                    restored_ids,
                ))
            }
            Snapshot::BatchDelete { tasks } => {
                let total = tasks.len();
                let mut restored_ids = Vec::new();
                for task in tasks {
                    let restored = self.reinsert(org_id, &task).await?;
                    restored_ids.push(restored.to_string());
                }
                Ok((
                    format!("re-created {} of {total} deleted tasks", restored_ids.len()),
                    restored_ids,
                ))
            }
            Snapshot::Assign { task_id, user_id } => {
                match self.board.unassign_user(org_id, task_id, user_id).await {
                    Ok(_) => Ok((
                        "removed the assignment".to_string(),
                        vec![task_id.to_string()],
                    )),
                    Err(bd_core::Error::NotFound(_)) => {
                        Ok(("task no longer exists; nothing to restore".to_string(), vec![]))
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Snapshot::Unassign { task_id, user_id } => {
                match self.board.assign_user(org_id, task_id, user_id).await {
                    Ok(_) => Ok((
                        "restored the assignment".to_string(),
                        vec![task_id.to_string()],
                    )),
                    Err(bd_core::Error::NotFound(_)) => {
                        Ok(("task no longer exists; nothing to restore".to_string(), vec![]))
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Snapshot::AddLabel { task_id, label_id } => {
                match self.board.remove_label(org_id, task_id, label_id).await {
                    Ok(_) => Ok(("removed the label".to_string(), vec![task_id.to_string()])),
                    Err(bd_core::Error::NotFound(_)) => {
                        Ok(("task no longer exists; nothing to restore".to_string(), vec![]))
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Snapshot::RemoveLabel { task_id, label_id } => {
                match self.board.add_label(org_id, task_id, label_id).await {
                    Ok(_) => Ok(("restored the label".to_string(), vec![task_id.to_string()])),
                    Err(bd_core::Error::NotFound(_)) => {
                        Ok(("task no longer exists; nothing to restore".to_string(), vec![]))
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Snapshot::AddComment { comment_id, .. } => {
                if self.board.delete_comment(org_id, comment_id).await? {
                    Ok(("deleted the comment".to_string(), vec![]))
                } else {
                    Ok(("comment was already gone".to_string(), vec![]))
                }
            }
        }
    }

    /// Re-inserts a deleted task from its snapshot. The row gets a new
    /// identity; assignees and labels are restored best-effort.
    async fn reinsert(
        &self,
        org_id: OrgId,
        task: &bd_core::board::Task,
    ) -> Result<Uuid, ToolError> {
        let restored = self
            .board
            .create_task(
                org_id,
                task.project_id,
                TaskDraft {
                    title: task.title.clone(),
                    description: task.description.clone(),
                    column_id: task.column_id,
                    position: Some(task.position),
                },
            )
            .await?;
        for user_id in &task.assignee_ids {
            self.board
                .assign_user(org_id, restored.id, *user_id)
                .await?;
        }
        for label_id in &task.label_ids {
            self.board
                .add_label(org_id, restored.id, *label_id)
                .await?;
        }
        Ok(restored.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board_tools::{
        AssignmentTool, BatchDeleteTasksTool, BatchUpdateTasksTool, CreateTaskTool,
        DeleteTaskTool, MoveTaskTool, UpdateTaskTool,
    };
    use crate::traits::BoardTool;
    use bd_core::clock::ManualClock;
    use bd_core::dev::{DevBoardStore, DevLedgerStore};
    use bd_core::ledger::LedgerStore;
    use bd_core::models::{ActionContext, ProjectId, TriggerKind};
    use chrono::{Duration, Utc};
    use serde_json::json;

    struct Fixture {
        board: Arc<DevBoardStore>,
        store: Arc<DevLedgerStore>,
        ledger: Arc<ActivityLedger>,
        clock: Arc<ManualClock>,
        engine: UndoEngine,
        ctx: ActionContext,
    }

    fn fixture() -> Fixture {
        let board = Arc::new(DevBoardStore::new());
        let store = Arc::new(DevLedgerStore::new());
        let ledger = Arc::new(ActivityLedger::new(store.clone()));
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let engine = UndoEngine::new(board.clone(), ledger.clone(), clock.clone());
        let ctx = ActionContext::system(
            OrgId(Uuid::nil()),
            ProjectId(Uuid::nil()),
            UserId(Uuid::new_v4()),
            TriggerKind::Chat,
        );
        Fixture {
            board,
            store,
            ledger,
            clock,
            engine,
            ctx,
        }
    }

    /// Executes a tool and appends its completed record synchronously,
    /// stamped with the fixture clock.
    async fn run_tool(
        f: &Fixture,
        tool: &dyn BoardTool,
        args: serde_json::Value,
    ) -> (Uuid, serde_json::Value) {
        let execution = tool.execute(args.clone(), &f.ctx).await.expect("tool runs");
        let record = ActivityRecord {
            id: Uuid::new_v4(),
            org_id: f.ctx.org_id,
            project_id: f.ctx.project_id,
            user_id: f.ctx.user_id,
            session_id: f.ctx.session_id,
            tool_name: tool.spec().name,
            input: args,
            output: Some(execution.output.clone()),
            error: None,
            status: ActivityStatus::Completed,
            requires_approval: false,
            approval_status: None,
            affected_entity_ids: execution.affected_entity_ids,
            snapshot_before: execution.snapshot.as_ref().map(|s| s.to_value()),
            created_at: f.clock.now(),
        };
        let id = record.id;
        f.store.append(&record).await.expect("append record");
        (id, execution.output)
    }

    fn created_task_id(output: &serde_json::Value) -> Uuid {
        Uuid::parse_str(
            output
                .pointer("/task/id")
                .and_then(|v| v.as_str())
                .expect("output carries task id"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn create_then_undo_then_undo_again() {
        let f = fixture();
        let create = CreateTaskTool::new(f.board.clone());
        let (record_id, output) = run_tool(
            &f,
            &create,
            json!({ "title": "ship v2", "column_id": Uuid::new_v4().to_string() }),
        )
        .await;
        let task_id = created_task_id(&output);

        let outcome = f
            .engine
            .undo(f.ctx.org_id, record_id, f.ctx.user_id)
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(f.board.get_task(f.ctx.org_id, task_id).await.unwrap().is_none());

        let record = f.ledger.get(f.ctx.org_id, record_id).await.unwrap().unwrap();
        assert_eq!(record.status, ActivityStatus::RolledBack);

        let again = f
            .engine
            .undo(f.ctx.org_id, record_id, f.ctx.user_id)
            .await
            .unwrap();
        assert!(!again.success);
        assert!(again.message.contains("already undone"));
    }

    #[tokio::test]
    async fn update_undo_restores_previous_fields() {
        let f = fixture();
        let create = CreateTaskTool::new(f.board.clone());
        let (_, output) = run_tool(
            &f,
            &create,
            json!({
                "title": "original",
                "description": "before text",
                "column_id": Uuid::new_v4().to_string(),
            }),
        )
        .await;
        let task_id = created_task_id(&output);
        let before = f.board.get_task(f.ctx.org_id, task_id).await.unwrap().unwrap();

        let update = UpdateTaskTool::new(f.board.clone());
        let (record_id, _) = run_tool(
            &f,
            &update,
            json!({ "task_id": task_id.to_string(), "title": "renamed", "description": "after" }),
        )
        .await;

        let outcome = f
            .engine
            .undo(f.ctx.org_id, record_id, f.ctx.user_id)
            .await
            .unwrap();
        assert!(outcome.success);

        let after = f.board.get_task(f.ctx.org_id, task_id).await.unwrap().unwrap();
        assert_eq!(after.title, before.title);
        assert_eq!(after.description, before.description);
    }

    #[tokio::test]
    async fn move_undo_restores_position() {
        let f = fixture();
        let create = CreateTaskTool::new(f.board.clone());
        let (_, output) = run_tool(
            &f,
            &create,
            json!({ "title": "t", "column_id": Uuid::new_v4().to_string() }),
        )
        .await;
        let task_id = created_task_id(&output);
        let before = f.board.get_task(f.ctx.org_id, task_id).await.unwrap().unwrap();

        let mover = MoveTaskTool::new(f.board.clone());
        let (record_id, _) = run_tool(
            &f,
            &mover,
            json!({
                "task_id": task_id.to_string(),
                "column_id": Uuid::new_v4().to_string(),
                "position": 7,
            }),
        )
        .await;

        let outcome = f
            .engine
            .undo(f.ctx.org_id, record_id, f.ctx.user_id)
            .await
            .unwrap();
        assert!(outcome.success);

        let after = f.board.get_task(f.ctx.org_id, task_id).await.unwrap().unwrap();
        assert_eq!(after.column_id, before.column_id);
        assert_eq!(after.position, before.position);
    }

    #[tokio::test]
    async fn delete_undo_reinserts_with_new_identity() {
        let f = fixture();
        let create = CreateTaskTool::new(f.board.clone());
        let (_, output) = run_tool(
            &f,
            &create,
            json!({
                "title": "precious",
                "description": "keep these fields",
                "column_id": Uuid::new_v4().to_string(),
            }),
        )
        .await;
        let task_id = created_task_id(&output);

        let delete = DeleteTaskTool::new(f.board.clone());
        let (record_id, _) =
            run_tool(&f, &delete, json!({ "task_id": task_id.to_string() })).await;
        assert!(f.board.get_task(f.ctx.org_id, task_id).await.unwrap().is_none());

        let outcome = f
            .engine
            .undo(f.ctx.org_id, record_id, f.ctx.user_id)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.restored_ids.len(), 1);

        let new_id = Uuid::parse_str(&outcome.restored_ids[0]).unwrap();
        assert_ne!(new_id, task_id);
        let restored = f.board.get_task(f.ctx.org_id, new_id).await.unwrap().unwrap();
        assert_eq!(restored.title, "precious");
        assert_eq!(restored.description.as_deref(), Some("keep these fields"));
    }

    #[tokio::test]
    async fn batch_update_undo_reports_partial_success() {
        let f = fixture();
        let create = CreateTaskTool::new(f.board.clone());
        let column = Uuid::new_v4().to_string();
        let (_, out_a) = run_tool(&f, &create, json!({ "title": "a", "column_id": column })).await;
        let (_, out_b) = run_tool(&f, &create, json!({ "title": "b", "column_id": column })).await;
        let id_a = created_task_id(&out_a);
        let id_b = created_task_id(&out_b);

        let batch = BatchUpdateTasksTool::new(f.board.clone());
        let (record_id, _) = run_tool(
            &f,
            &batch,
            json!({
                "updates": [
                    { "task_id": id_a.to_string(), "title": "a2" },
                    { "task_id": id_b.to_string(), "title": "b2" }
                ]
            }),
        )
        .await;

        // One target disappears before the undo.
        f.board.delete_task(f.ctx.org_id, id_b).await.unwrap();

        let outcome = f
            .engine
            .undo(f.ctx.org_id, record_id, f.ctx.user_id)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.restored_ids, vec![id_a.to_string()]);
        assert!(outcome.message.contains("1 of 2"));

        let a = f.board.get_task(f.ctx.org_id, id_a).await.unwrap().unwrap();
        assert_eq!(a.title, "a");
    }

    #[tokio::test]
    async fn batch_delete_undo_recreates_all_tasks() {
        let f = fixture();
        let create = CreateTaskTool::new(f.board.clone());
        let column = Uuid::new_v4().to_string();
        let (_, out_a) = run_tool(&f, &create, json!({ "title": "first", "column_id": column })).await;
        let (_, out_b) =
            run_tool(&f, &create, json!({ "title": "second", "column_id": column })).await;
        let id_a = created_task_id(&out_a);
        let id_b = created_task_id(&out_b);

        let batch = BatchDeleteTasksTool::new(f.board.clone());
        let (record_id, _) = run_tool(
            &f,
            &batch,
            json!({ "task_ids": [id_a.to_string(), id_b.to_string()] }),
        )
        .await;
        assert!(f.board.get_task(f.ctx.org_id, id_a).await.unwrap().is_none());

        let outcome = f
            .engine
            .undo(f.ctx.org_id, record_id, f.ctx.user_id)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.restored_ids.len(), 2);

        let titles: Vec<String> = f
            .board
            .list_tasks(f.ctx.org_id, f.ctx.project_id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert!(titles.contains(&"first".to_string()));
        assert!(titles.contains(&"second".to_string()));
    }

    #[tokio::test]
    async fn undo_window_boundary() {
        let f = fixture();
        let create = CreateTaskTool::new(f.board.clone());
        let column = Uuid::new_v4().to_string();

        let (within_id, _) =
            run_tool(&f, &create, json!({ "title": "w", "column_id": column })).await;
        f.clock.advance(Duration::seconds(299));
        let outcome = f
            .engine
            .undo(f.ctx.org_id, within_id, f.ctx.user_id)
            .await
            .unwrap();
        assert!(outcome.success, "4:59 old record is still undoable");

        let (late_id, _) =
            run_tool(&f, &create, json!({ "title": "l", "column_id": column })).await;
        f.clock.advance(Duration::seconds(301));
        let outcome = f
            .engine
            .undo(f.ctx.org_id, late_id, f.ctx.user_id)
            .await
            .unwrap();
        assert!(!outcome.success, "5:01 old record is past the window");
        assert!(outcome.message.contains("window"));
    }

    #[tokio::test]
    async fn cross_user_undo_is_refused() {
        let f = fixture();
        let create = CreateTaskTool::new(f.board.clone());
        let (record_id, _) = run_tool(
            &f,
            &create,
            json!({ "title": "mine", "column_id": Uuid::new_v4().to_string() }),
        )
        .await;

        let other = UserId(Uuid::new_v4());
        let outcome = f.engine.undo(f.ctx.org_id, record_id, other).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.message.contains("original"));
    }

    #[tokio::test]
    async fn assign_undo_is_idempotent_about_missing_state() {
        let f = fixture();
        let create = CreateTaskTool::new(f.board.clone());
        let (_, output) = run_tool(
            &f,
            &create,
            json!({ "title": "t", "column_id": Uuid::new_v4().to_string() }),
        )
        .await;
        let task_id = created_task_id(&output);
        let user = Uuid::new_v4();

        let assign = AssignmentTool::assign(f.board.clone());
        let (record_id, _) = run_tool(
            &f,
            &assign,
            json!({ "task_id": task_id.to_string(), "user_id": user.to_string() }),
        )
        .await;

        // Assignment already removed by hand; the inverse is a no-op.
        f.board
            .unassign_user(f.ctx.org_id, task_id, UserId(user))
            .await
            .unwrap();

        let outcome = f
            .engine
            .undo(f.ctx.org_id, record_id, f.ctx.user_id)
            .await
            .unwrap();
        assert!(outcome.success);
        let task = f.board.get_task(f.ctx.org_id, task_id).await.unwrap().unwrap();
        assert!(task.assignee_ids.is_empty());
    }

    #[tokio::test]
    async fn records_without_snapshot_are_not_undoable() {
        let f = fixture();
        let record = ActivityRecord {
            id: Uuid::new_v4(),
            org_id: f.ctx.org_id,
            project_id: f.ctx.project_id,
            user_id: f.ctx.user_id,
            session_id: f.ctx.session_id,
            tool_name: "assign_task".to_string(),
            input: json!({}),
            output: Some(json!({ "changed": false })),
            error: None,
            status: ActivityStatus::Completed,
            requires_approval: false,
            approval_status: None,
            affected_entity_ids: vec![],
            snapshot_before: None,
            created_at: f.clock.now(),
        };
        f.store.append(&record).await.unwrap();

        let outcome = f
            .engine
            .undo(f.ctx.org_id, record.id, f.ctx.user_id)
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.message.contains("snapshot"));
    }
}
