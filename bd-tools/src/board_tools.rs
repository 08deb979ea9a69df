//! Board tools exposed to the agent loop.
//!
//! Every mutating tool reads the state it is about to change and builds
//! its [`Snapshot`] before touching the store, so the ledger entry can
//! reverse the call even after the transaction commits. Batch tools
//! resolve every referenced task up front and fail whole before any
//! mutation when one is missing.

use crate::error::{Result, ToolError};
use crate::proposal::ProposalStore;
use crate::snapshot::{Snapshot, TaskFieldsBefore, TaskPlacementBefore};
use crate::traits::{
    BoardTool, ToolCategory, ToolExecution, ToolSpec, optional_i64, optional_string, require_i64,
    require_string, require_uuid,
};
use async_trait::async_trait;
use bd_core::board::{BoardStore, Task, TaskDraft, TaskPatch, TaskPlacement};
use bd_core::models::{AccessLevel, ActionContext, UserId};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

fn task_json(task: &Task) -> serde_json::Value {
    serde_json::to_value(task).unwrap_or(serde_json::Value::Null)
}

async fn require_task(
    board: &Arc<dyn BoardStore>,
    context: &ActionContext,
    task_id: Uuid,
) -> Result<Task> {
    board
        .get_task(context.org_id, task_id)
        .await?
        .ok_or_else(|| ToolError::NotFound(format!("task {task_id}")))
}

// === Query tools ===

pub struct ListTasksTool {
    board: Arc<dyn BoardStore>,
}

impl ListTasksTool {
    pub fn new(board: Arc<dyn BoardStore>) -> Self {
        Self { board }
    }
}

#[async_trait]
impl BoardTool for ListTasksTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "list_tasks".to_string(),
            description: "List all tasks on the project board, grouped by column order."
                .to_string(),
            parameters_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {}
            }),
            category: ToolCategory::Query,
            required_level: AccessLevel::Member,
        }
    }

    async fn execute(
        &self,
        _arguments: serde_json::Value,
        context: &ActionContext,
    ) -> Result<ToolExecution> {
        let tasks = self
            .board
            .list_tasks(context.org_id, context.project_id)
            .await?;
        Ok(ToolExecution::query(json!({
            "count": tasks.len(),
            "tasks": tasks.iter().map(task_json).collect::<Vec<_>>(),
        })))
    }
}

pub struct GetTaskTool {
    board: Arc<dyn BoardStore>,
}

impl GetTaskTool {
    pub fn new(board: Arc<dyn BoardStore>) -> Self {
        Self { board }
    }
}

#[async_trait]
impl BoardTool for GetTaskTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_task".to_string(),
            description: "Fetch one task by id, including assignees and labels.".to_string(),
            parameters_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "task_id": { "type": "string" }
                },
                "required": ["task_id"]
            }),
            category: ToolCategory::Query,
            required_level: AccessLevel::Member,
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ActionContext,
    ) -> Result<ToolExecution> {
        let task_id = require_uuid(&arguments, "task_id")?;
        let task = require_task(&self.board, context, task_id).await?;
        Ok(ToolExecution::query(json!({ "task": task_json(&task) })))
    }
}

// === Write tools ===

pub struct CreateTaskTool {
    board: Arc<dyn BoardStore>,
}

impl CreateTaskTool {
    pub fn new(board: Arc<dyn BoardStore>) -> Self {
        Self { board }
    }
}

fn parse_draft(value: &serde_json::Value) -> Result<TaskDraft> {
    let title = require_string(value, "title")?;
    if title.trim().is_empty() {
        return Err(ToolError::InvalidArguments(
            "title must not be empty".to_string(),
        ));
    }
    Ok(TaskDraft {
        title,
        description: optional_string(value, "description")?,
        column_id: require_uuid(value, "column_id")?,
        position: optional_i64(value, "position")?,
    })
}

#[async_trait]
impl BoardTool for CreateTaskTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "create_task".to_string(),
            description: "Create a task in a column. Appends to the end unless a position is given."
                .to_string(),
            parameters_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "title": { "type": "string" },
                    "description": { "type": "string" },
                    "column_id": { "type": "string" },
                    "position": { "type": "integer" }
                },
                "required": ["title", "column_id"]
            }),
            category: ToolCategory::Write,
            required_level: AccessLevel::Editor,
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ActionContext,
    ) -> Result<ToolExecution> {
        let draft = parse_draft(&arguments)?;
        let task = self
            .board
            .create_task(context.org_id, context.project_id, draft)
            .await?;
        Ok(ToolExecution {
            output: json!({ "task": task_json(&task) }),
            snapshot: Some(Snapshot::Create { task_id: task.id }),
            affected_entity_ids: vec![task.id.to_string()],
        })
    }
}

pub struct UpdateTaskTool {
    board: Arc<dyn BoardStore>,
}

impl UpdateTaskTool {
    pub fn new(board: Arc<dyn BoardStore>) -> Self {
        Self { board }
    }
}

fn parse_patch(value: &serde_json::Value) -> Result<TaskPatch> {
    Ok(TaskPatch {
        title: optional_string(value, "title")?,
        description: optional_string(value, "description")?.map(Some),
    })
}

#[async_trait]
impl BoardTool for UpdateTaskTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "update_task".to_string(),
            description: "Update a task's title and/or description.".to_string(),
            parameters_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "task_id": { "type": "string" },
                    "title": { "type": "string" },
                    "description": { "type": "string" }
                },
                "required": ["task_id"]
            }),
            category: ToolCategory::Write,
            required_level: AccessLevel::Editor,
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ActionContext,
    ) -> Result<ToolExecution> {
        let task_id = require_uuid(&arguments, "task_id")?;
        let patch = parse_patch(&arguments)?;
        // An empty patch is a caller error and must raise before any
        // snapshot or ledger work happens.
        if patch.is_empty() {
            return Err(ToolError::InvalidArguments(
                "update_task requires at least one of title, description".to_string(),
            ));
        }

        let before = require_task(&self.board, context, task_id).await?;
        let snapshot = Snapshot::Update {
            before: TaskFieldsBefore {
                task_id,
                title: before.title.clone(),
                description: before.description.clone(),
            },
        };
        let task = self.board.update_task(context.org_id, task_id, patch).await?;
        Ok(ToolExecution {
            output: json!({ "task": task_json(&task) }),
            snapshot: Some(snapshot),
            affected_entity_ids: vec![task_id.to_string()],
        })
    }
}

pub struct MoveTaskTool {
    board: Arc<dyn BoardStore>,
}

impl MoveTaskTool {
    pub fn new(board: Arc<dyn BoardStore>) -> Self {
        Self { board }
    }
}

#[async_trait]
impl BoardTool for MoveTaskTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "move_task".to_string(),
            description: "Move a task to a column and position.".to_string(),
            parameters_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "task_id": { "type": "string" },
                    "column_id": { "type": "string" },
                    "position": { "type": "integer" }
                },
                "required": ["task_id", "column_id", "position"]
            }),
            category: ToolCategory::Write,
            required_level: AccessLevel::Editor,
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ActionContext,
    ) -> Result<ToolExecution> {
        let task_id = require_uuid(&arguments, "task_id")?;
        let placement = TaskPlacement {
            column_id: require_uuid(&arguments, "column_id")?,
            position: require_i64(&arguments, "position")?,
        };

        let before = require_task(&self.board, context, task_id).await?;
        let snapshot = Snapshot::Move {
            before: TaskPlacementBefore {
                task_id,
                placement: TaskPlacement {
                    column_id: before.column_id,
                    position: before.position,
                },
            },
        };
        let task = self
            .board
            .move_task(context.org_id, task_id, placement)
            .await?;
        Ok(ToolExecution {
            output: json!({ "task": task_json(&task) }),
            snapshot: Some(snapshot),
            affected_entity_ids: vec![task_id.to_string()],
        })
    }
}

/// Assign/unassign share a body; `assigning` selects the direction.
pub struct AssignmentTool {
    board: Arc<dyn BoardStore>,
    assigning: bool,
}

impl AssignmentTool {
    pub fn assign(board: Arc<dyn BoardStore>) -> Self {
        Self {
            board,
            assigning: true,
        }
    }

    pub fn unassign(board: Arc<dyn BoardStore>) -> Self {
        Self {
            board,
            assigning: false,
        }
    }
}

#[async_trait]
impl BoardTool for AssignmentTool {
    fn spec(&self) -> ToolSpec {
        let (name, description) = if self.assigning {
            ("assign_task", "Assign a user to a task.")
        } else {
            ("unassign_task", "Remove a user from a task's assignees.")
        };
        ToolSpec {
            name: name.to_string(),
            description: description.to_string(),
            parameters_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "task_id": { "type": "string" },
                    "user_id": { "type": "string" }
                },
                "required": ["task_id", "user_id"]
            }),
            category: ToolCategory::Write,
            required_level: AccessLevel::Editor,
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ActionContext,
    ) -> Result<ToolExecution> {
        let task_id = require_uuid(&arguments, "task_id")?;
        let user_id = UserId(require_uuid(&arguments, "user_id")?);

        let changed = if self.assigning {
            self.board
                .assign_user(context.org_id, task_id, user_id)
                .await?
        } else {
            self.board
                .unassign_user(context.org_id, task_id, user_id)
                .await?
        };

        // No change means nothing to reverse; the record carries no
        // snapshot and undo will refuse it with a clear reason.
        let snapshot = changed.then(|| {
            if self.assigning {
                Snapshot::Assign { task_id, user_id }
            } else {
                Snapshot::Unassign { task_id, user_id }
            }
        });
        Ok(ToolExecution {
            output: json!({ "task_id": task_id.to_string(), "changed": changed }),
            snapshot,
            affected_entity_ids: vec![task_id.to_string()],
        })
    }
}

/// Add/remove a label; `adding` selects the direction.
pub struct LabelTool {
    board: Arc<dyn BoardStore>,
    adding: bool,
}

impl LabelTool {
    pub fn add(board: Arc<dyn BoardStore>) -> Self {
        Self {
            board,
            adding: true,
        }
    }

    pub fn remove(board: Arc<dyn BoardStore>) -> Self {
        Self {
            board,
            adding: false,
        }
    }
}

#[async_trait]
impl BoardTool for LabelTool {
    fn spec(&self) -> ToolSpec {
        let (name, description) = if self.adding {
            ("add_label", "Attach a label to a task.")
        } else {
            ("remove_label", "Detach a label from a task.")
        };
        ToolSpec {
            name: name.to_string(),
            description: description.to_string(),
            parameters_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "task_id": { "type": "string" },
                    "label_id": { "type": "string" }
                },
                "required": ["task_id", "label_id"]
            }),
            category: ToolCategory::Write,
            required_level: AccessLevel::Editor,
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ActionContext,
    ) -> Result<ToolExecution> {
        let task_id = require_uuid(&arguments, "task_id")?;
        let label_id = require_uuid(&arguments, "label_id")?;

        let changed = if self.adding {
            self.board
                .add_label(context.org_id, task_id, label_id)
                .await?
        } else {
            self.board
                .remove_label(context.org_id, task_id, label_id)
                .await?
        };
        let snapshot = changed.then(|| {
            if self.adding {
                Snapshot::AddLabel { task_id, label_id }
            } else {
                Snapshot::RemoveLabel { task_id, label_id }
            }
        });
        Ok(ToolExecution {
            output: json!({ "task_id": task_id.to_string(), "changed": changed }),
            snapshot,
            affected_entity_ids: vec![task_id.to_string()],
        })
    }
}

pub struct AddCommentTool {
    board: Arc<dyn BoardStore>,
}

impl AddCommentTool {
    pub fn new(board: Arc<dyn BoardStore>) -> Self {
        Self { board }
    }
}

#[async_trait]
impl BoardTool for AddCommentTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "add_comment".to_string(),
            description: "Add a comment to a task, authored by the acting user.".to_string(),
            parameters_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "task_id": { "type": "string" },
                    "body": { "type": "string" }
                },
                "required": ["task_id", "body"]
            }),
            category: ToolCategory::Write,
            required_level: AccessLevel::Member,
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ActionContext,
    ) -> Result<ToolExecution> {
        let task_id = require_uuid(&arguments, "task_id")?;
        let body = require_string(&arguments, "body")?;
        if body.trim().is_empty() {
            return Err(ToolError::InvalidArguments(
                "comment body must not be empty".to_string(),
            ));
        }

        let comment = self
            .board
            .add_comment(context.org_id, task_id, context.user_id, body)
            .await?;
        Ok(ToolExecution {
            output: json!({
                "comment_id": comment.id.to_string(),
                "task_id": task_id.to_string(),
            }),
            snapshot: Some(Snapshot::AddComment {
                comment_id: comment.id,
                task_id,
            }),
            affected_entity_ids: vec![comment.id.to_string()],
        })
    }
}

pub struct BatchCreateTasksTool {
    board: Arc<dyn BoardStore>,
}

impl BatchCreateTasksTool {
    pub fn new(board: Arc<dyn BoardStore>) -> Self {
        Self { board }
    }
}

#[async_trait]
impl BoardTool for BatchCreateTasksTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "batch_create_tasks".to_string(),
            description: "Create several tasks at once.".to_string(),
            parameters_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "tasks": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "additionalProperties": false,
                            "properties": {
                                "title": { "type": "string" },
                                "description": { "type": "string" },
                                "column_id": { "type": "string" },
                                "position": { "type": "integer" }
                            },
                            "required": ["title", "column_id"]
                        }
                    }
                },
                "required": ["tasks"]
            }),
            category: ToolCategory::Write,
            required_level: AccessLevel::Editor,
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ActionContext,
    ) -> Result<ToolExecution> {
        let entries = arguments
            .get("tasks")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ToolError::InvalidArguments("missing key: tasks".to_string()))?;
        if entries.is_empty() {
            return Err(ToolError::InvalidArguments(
                "tasks must not be empty".to_string(),
            ));
        }
        let drafts = entries
            .iter()
            .map(parse_draft)
            .collect::<Result<Vec<_>>>()?;

        let mut created = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let task = self
                .board
                .create_task(context.org_id, context.project_id, draft)
                .await?;
            created.push(task);
        }
        let task_ids: Vec<Uuid> = created.iter().map(|t| t.id).collect();
        Ok(ToolExecution {
            output: json!({
                "count": created.len(),
                "tasks": created.iter().map(task_json).collect::<Vec<_>>(),
            }),
            snapshot: Some(Snapshot::BatchCreate {
                task_ids: task_ids.clone(),
            }),
            affected_entity_ids: task_ids.iter().map(|id| id.to_string()).collect(),
        })
    }
}

pub struct BatchMoveTasksTool {
    board: Arc<dyn BoardStore>,
}

impl BatchMoveTasksTool {
    pub fn new(board: Arc<dyn BoardStore>) -> Self {
        Self { board }
    }
}

#[async_trait]
impl BoardTool for BatchMoveTasksTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "batch_move_tasks".to_string(),
            description: "Move several tasks in one call, e.g. sweeping a column.".to_string(),
            parameters_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "moves": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "additionalProperties": false,
                            "properties": {
                                "task_id": { "type": "string" },
                                "column_id": { "type": "string" },
                                "position": { "type": "integer" }
                            },
                            "required": ["task_id", "column_id", "position"]
                        }
                    }
                },
                "required": ["moves"]
            }),
            category: ToolCategory::Write,
            required_level: AccessLevel::Editor,
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ActionContext,
    ) -> Result<ToolExecution> {
        let entries = arguments
            .get("moves")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ToolError::InvalidArguments("missing key: moves".to_string()))?;
        if entries.is_empty() {
            return Err(ToolError::InvalidArguments(
                "moves must not be empty".to_string(),
            ));
        }

        // Resolve every target before mutating anything.
        let mut planned = Vec::with_capacity(entries.len());
        let mut before = Vec::with_capacity(entries.len());
        for entry in entries {
            let task_id = require_uuid(entry, "task_id")?;
            let placement = TaskPlacement {
                column_id: require_uuid(entry, "column_id")?,
                position: require_i64(entry, "position")?,
            };
            let task = require_task(&self.board, context, task_id).await?;
            before.push(TaskPlacementBefore {
                task_id,
                placement: TaskPlacement {
                    column_id: task.column_id,
                    position: task.position,
                },
            });
            planned.push((task_id, placement));
        }

        let snapshot = Snapshot::BatchMove { before };
        let mut affected = Vec::with_capacity(planned.len());
        for (task_id, placement) in planned {
            self.board
                .move_task(context.org_id, task_id, placement)
                .await?;
            affected.push(task_id.to_string());
        }
        Ok(ToolExecution {
            output: json!({ "moved": affected.len() }),
            snapshot: Some(snapshot),
            affected_entity_ids: affected,
        })
    }
}

pub struct BatchUpdateTasksTool {
    board: Arc<dyn BoardStore>,
}

impl BatchUpdateTasksTool {
    pub fn new(board: Arc<dyn BoardStore>) -> Self {
        Self { board }
    }
}

#[async_trait]
impl BoardTool for BatchUpdateTasksTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "batch_update_tasks".to_string(),
            description: "Update titles/descriptions of several tasks in one call.".to_string(),
            parameters_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "updates": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "additionalProperties": false,
                            "properties": {
                                "task_id": { "type": "string" },
                                "title": { "type": "string" },
                                "description": { "type": "string" }
                            },
                            "required": ["task_id"]
                        }
                    }
                },
                "required": ["updates"]
            }),
            category: ToolCategory::Write,
            required_level: AccessLevel::Editor,
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ActionContext,
    ) -> Result<ToolExecution> {
        let entries = arguments
            .get("updates")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ToolError::InvalidArguments("missing key: updates".to_string()))?;
        if entries.is_empty() {
            return Err(ToolError::InvalidArguments(
                "updates must not be empty".to_string(),
            ));
        }

        let mut planned = Vec::with_capacity(entries.len());
        let mut before = Vec::with_capacity(entries.len());
        for entry in entries {
            let task_id = require_uuid(entry, "task_id")?;
            let patch = parse_patch(entry)?;
            if patch.is_empty() {
                return Err(ToolError::InvalidArguments(format!(
                    "update for task {task_id} changes no fields"
                )));
            }
            let task = require_task(&self.board, context, task_id).await?;
            before.push(TaskFieldsBefore {
                task_id,
                title: task.title.clone(),
                description: task.description.clone(),
            });
            planned.push((task_id, patch));
        }

        let snapshot = Snapshot::BatchUpdate { before };
        let mut affected = Vec::with_capacity(planned.len());
        for (task_id, patch) in planned {
            self.board
                .update_task(context.org_id, task_id, patch)
                .await?;
            affected.push(task_id.to_string());
        }
        Ok(ToolExecution {
            output: json!({ "updated": affected.len() }),
            snapshot: Some(snapshot),
            affected_entity_ids: affected,
        })
    }
}

/// Stages a set of task drafts for the two-step creation flow: the user
/// reviews what the agent intends to create, then the agent confirms
/// with the returned proposal id.
pub struct ProposeTasksTool {
    proposals: Arc<ProposalStore>,
}

impl ProposeTasksTool {
    pub fn new(proposals: Arc<ProposalStore>) -> Self {
        Self { proposals }
    }
}

#[async_trait]
impl BoardTool for ProposeTasksTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "propose_tasks".to_string(),
            description: "Stage task drafts for user review; nothing is created until the \
                          proposal is confirmed."
                .to_string(),
            parameters_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "tasks": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "additionalProperties": false,
                            "properties": {
                                "title": { "type": "string" },
                                "description": { "type": "string" },
                                "column_id": { "type": "string" },
                                "position": { "type": "integer" }
                            },
                            "required": ["title", "column_id"]
                        }
                    }
                },
                "required": ["tasks"]
            }),
            category: ToolCategory::Write,
            required_level: AccessLevel::Editor,
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ActionContext,
    ) -> Result<ToolExecution> {
        let entries = arguments
            .get("tasks")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ToolError::InvalidArguments("missing key: tasks".to_string()))?;
        if entries.is_empty() {
            return Err(ToolError::InvalidArguments(
                "tasks must not be empty".to_string(),
            ));
        }
        // Validate the drafts up front so confirmation cannot fail on shape.
        for entry in entries {
            parse_draft(entry)?;
        }

        let proposal_id = self.proposals.insert(
            context.org_id,
            context.session_id,
            json!({ "tasks": entries }),
        )?;
        Ok(ToolExecution::query(json!({
            "proposal_id": proposal_id.to_string(),
            "count": entries.len(),
        })))
    }
}

/// Executes a staged proposal. The proposal is consumed atomically; if
/// creation fails it is restored so the user can retry without
/// re-describing it.
pub struct ConfirmProposalTool {
    board: Arc<dyn BoardStore>,
    proposals: Arc<ProposalStore>,
}

impl ConfirmProposalTool {
    pub fn new(board: Arc<dyn BoardStore>, proposals: Arc<ProposalStore>) -> Self {
        Self { board, proposals }
    }
}

#[async_trait]
impl BoardTool for ConfirmProposalTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "confirm_proposal".to_string(),
            description: "Create the tasks staged under a proposal id.".to_string(),
            parameters_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "proposal_id": { "type": "string" }
                },
                "required": ["proposal_id"]
            }),
            category: ToolCategory::Write,
            required_level: AccessLevel::Editor,
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ActionContext,
    ) -> Result<ToolExecution> {
        let proposal_id = require_uuid(&arguments, "proposal_id")?;
        let Some(proposal) = self.proposals.take(proposal_id) else {
            return Err(ToolError::NotFound(format!(
                "proposal {proposal_id} (expired or already confirmed)"
            )));
        };
        if proposal.org_id != context.org_id {
            self.proposals.restore(proposal);
            return Err(ToolError::NotFound(format!(
                "proposal {proposal_id} (expired or already confirmed)"
            )));
        }

        let drafts: Vec<TaskDraft> = match proposal
            .payload
            .get("tasks")
            .and_then(|v| v.as_array())
            .map(|entries| entries.iter().map(parse_draft).collect::<Result<Vec<_>>>())
        {
            Some(Ok(drafts)) => drafts,
            _ => {
                return Err(ToolError::ExecutionFailed(
                    "proposal payload is malformed".to_string(),
                ));
            }
        };

        let mut created = Vec::with_capacity(drafts.len());
        for draft in drafts {
            match self
                .board
                .create_task(context.org_id, context.project_id, draft)
                .await
            {
                Ok(task) => created.push(task),
                Err(e) => {
                    // Leave the proposal retryable; tasks created so far
                    // stay on the board and are listed in the error.
                    let created_ids: Vec<String> =
                        created.iter().map(|t| t.id.to_string()).collect();
                    self.proposals.restore(proposal);
                    return Err(ToolError::ExecutionFailed(format!(
                        "proposal execution failed after creating {:?}: {e}",
                        created_ids
                    )));
                }
            }
        }

        let task_ids: Vec<Uuid> = created.iter().map(|t| t.id).collect();
        Ok(ToolExecution {
            output: json!({
                "count": created.len(),
                "tasks": created.iter().map(task_json).collect::<Vec<_>>(),
            }),
            snapshot: Some(Snapshot::BatchCreate {
                task_ids: task_ids.clone(),
            }),
            affected_entity_ids: task_ids.iter().map(|id| id.to_string()).collect(),
        })
    }
}

// === Destructive tools ===

pub struct DeleteTaskTool {
    board: Arc<dyn BoardStore>,
}

impl DeleteTaskTool {
    pub fn new(board: Arc<dyn BoardStore>) -> Self {
        Self { board }
    }
}

#[async_trait]
impl BoardTool for DeleteTaskTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "delete_task".to_string(),
            description: "Permanently delete a task and its comments.".to_string(),
            parameters_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "task_id": { "type": "string" }
                },
                "required": ["task_id"]
            }),
            category: ToolCategory::Destructive,
            required_level: AccessLevel::Editor,
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ActionContext,
    ) -> Result<ToolExecution> {
        let task_id = require_uuid(&arguments, "task_id")?;
        let task = require_task(&self.board, context, task_id).await?;
        let snapshot = Snapshot::Delete { task };
        self.board.delete_task(context.org_id, task_id).await?;
        Ok(ToolExecution {
            output: json!({ "deleted": task_id.to_string() }),
            snapshot: Some(snapshot),
            affected_entity_ids: vec![task_id.to_string()],
        })
    }
}

pub struct BatchDeleteTasksTool {
    board: Arc<dyn BoardStore>,
}

impl BatchDeleteTasksTool {
    pub fn new(board: Arc<dyn BoardStore>) -> Self {
        Self { board }
    }
}

#[async_trait]
impl BoardTool for BatchDeleteTasksTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "batch_delete_tasks".to_string(),
            description: "Permanently delete several tasks in one call.".to_string(),
            parameters_schema: json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "task_ids": {
                        "type": "array",
                        "items": { "type": "string" }
                    }
                },
                "required": ["task_ids"]
            }),
            category: ToolCategory::Destructive,
            required_level: AccessLevel::Admin,
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ActionContext,
    ) -> Result<ToolExecution> {
        let raw_ids = arguments
            .get("task_ids")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ToolError::InvalidArguments("missing key: task_ids".to_string()))?;
        if raw_ids.is_empty() {
            return Err(ToolError::InvalidArguments(
                "task_ids must not be empty".to_string(),
            ));
        }
        let mut task_ids = Vec::with_capacity(raw_ids.len());
        for raw in raw_ids {
            let s = raw.as_str().ok_or_else(|| {
                ToolError::InvalidArguments("task_ids entries must be strings".to_string())
            })?;
            task_ids.push(Uuid::parse_str(s.trim()).map_err(|_| {
                ToolError::InvalidArguments(format!("task_ids entry {s:?} is not a uuid"))
            })?);
        }

        let mut tasks = Vec::with_capacity(task_ids.len());
        for task_id in &task_ids {
            tasks.push(require_task(&self.board, context, *task_id).await?);
        }
        let snapshot = Snapshot::BatchDelete { tasks };

        let mut affected = Vec::with_capacity(task_ids.len());
        for task_id in task_ids {
            self.board.delete_task(context.org_id, task_id).await?;
            affected.push(task_id.to_string());
        }
        Ok(ToolExecution {
            output: json!({ "deleted": affected.len() }),
            snapshot: Some(snapshot),
            affected_entity_ids: affected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bd_core::dev::DevBoardStore;
    use bd_core::models::{OrgId, ProjectId, TriggerKind};

    fn ctx() -> ActionContext {
        ActionContext::system(
            OrgId(Uuid::nil()),
            ProjectId(Uuid::nil()),
            UserId(Uuid::new_v4()),
            TriggerKind::Chat,
        )
    }

    fn board() -> Arc<dyn BoardStore> {
        Arc::new(DevBoardStore::new())
    }

    #[tokio::test]
    async fn empty_patch_raises_before_snapshot_work() {
        let board = board();
        let tool = UpdateTaskTool::new(board);
        let err = tool
            .execute(
                json!({ "task_id": Uuid::new_v4().to_string() }),
                &ctx(),
            )
            .await
            .expect_err("empty patch must be rejected");
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn update_snapshot_carries_previous_fields() {
        let board = board();
        let context = ctx();
        let created = CreateTaskTool::new(board.clone())
            .execute(
                json!({ "title": "old title", "column_id": Uuid::new_v4().to_string() }),
                &context,
            )
            .await
            .unwrap();
        let Some(Snapshot::Create { task_id }) = created.snapshot else {
            panic!("create must snapshot the new id");
        };

        let updated = UpdateTaskTool::new(board)
            .execute(
                json!({ "task_id": task_id.to_string(), "title": "new title" }),
                &context,
            )
            .await
            .unwrap();
        let Some(Snapshot::Update { before }) = updated.snapshot else {
            panic!("update must snapshot prior fields");
        };
        assert_eq!(before.title, "old title");
    }

    #[tokio::test]
    async fn batch_move_fails_whole_before_mutating_when_a_task_is_missing() {
        let board = board();
        let context = ctx();
        let created = CreateTaskTool::new(board.clone())
            .execute(
                json!({ "title": "solo", "column_id": Uuid::new_v4().to_string() }),
                &context,
            )
            .await
            .unwrap();
        let Some(Snapshot::Create { task_id }) = created.snapshot else {
            panic!("expected create snapshot");
        };
        let original = board.get_task(context.org_id, task_id).await.unwrap().unwrap();

        let err = BatchMoveTasksTool::new(board.clone())
            .execute(
                json!({
                    "moves": [
                        { "task_id": task_id.to_string(), "column_id": Uuid::new_v4().to_string(), "position": 0 },
                        { "task_id": Uuid::new_v4().to_string(), "column_id": Uuid::new_v4().to_string(), "position": 0 }
                    ]
                }),
                &context,
            )
            .await
            .expect_err("missing batch target fails the whole call");
        assert!(matches!(err, ToolError::NotFound(_)));

        // The present task was not moved.
        let after = board.get_task(context.org_id, task_id).await.unwrap().unwrap();
        assert_eq!(after.column_id, original.column_id);
        assert_eq!(after.position, original.position);
    }

    #[tokio::test]
    async fn proposal_flow_is_consume_once_with_restore_on_failure() {
        use bd_core::clock::ManualClock;
        use chrono::{Duration, Utc};

        let board = board();
        let context = ctx();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let proposals = Arc::new(ProposalStore::new(8, Duration::minutes(5), clock));

        let proposed = ProposeTasksTool::new(proposals.clone())
            .execute(
                json!({
                    "tasks": [
                        { "title": "step one", "column_id": Uuid::new_v4().to_string() },
                        { "title": "step two", "column_id": Uuid::new_v4().to_string() }
                    ]
                }),
                &context,
            )
            .await
            .unwrap();
        let proposal_id = proposed
            .output
            .get("proposal_id")
            .and_then(|v| v.as_str())
            .unwrap()
            .to_string();

        let confirm = ConfirmProposalTool::new(board.clone(), proposals.clone());
        let args = json!({ "proposal_id": proposal_id });
        let execution = confirm.execute(args.clone(), &context).await.unwrap();
        assert!(matches!(
            execution.snapshot,
            Some(Snapshot::BatchCreate { ref task_ids }) if task_ids.len() == 2
        ));
        assert_eq!(
            board.list_tasks(context.org_id, context.project_id).await.unwrap().len(),
            2
        );

        // The proposal was consumed; confirming again finds nothing.
        let err = confirm
            .execute(args, &context)
            .await
            .expect_err("second confirmation must fail");
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn redundant_assignment_produces_no_snapshot() {
        let board = board();
        let context = ctx();
        let created = CreateTaskTool::new(board.clone())
            .execute(
                json!({ "title": "t", "column_id": Uuid::new_v4().to_string() }),
                &context,
            )
            .await
            .unwrap();
        let Some(Snapshot::Create { task_id }) = created.snapshot else {
            panic!("expected create snapshot");
        };
        let user = Uuid::new_v4().to_string();
        let args = json!({ "task_id": task_id.to_string(), "user_id": user });

        let first = AssignmentTool::assign(board.clone())
            .execute(args.clone(), &context)
            .await
            .unwrap();
        assert!(first.snapshot.is_some());

        let second = AssignmentTool::assign(board)
            .execute(args, &context)
            .await
            .unwrap();
        assert!(second.snapshot.is_none());
    }
}
