//! Pre-mutation snapshots.
//!
//! One variant per reversible operation, carrying exactly the prior
//! field values its compensator needs. Tools build the snapshot before
//! mutating; the ledger stores it serialized; the undo engine
//! deserializes it and dispatches on the `operation` tag.

use bd_core::board::{Task, TaskPlacement};
use bd_core::UserId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFieldsBefore {
    pub task_id: Uuid,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPlacementBefore {
    pub task_id: Uuid,
    pub placement: TaskPlacement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum Snapshot {
    Create {
        task_id: Uuid,
    },
    Update {
        before: TaskFieldsBefore,
    },
    Move {
        before: TaskPlacementBefore,
    },
    Delete {
        task: Task,
    },
    BatchCreate {
        task_ids: Vec<Uuid>,
    },
    BatchUpdate {
        before: Vec<TaskFieldsBefore>,
    },
    BatchMove {
        before: Vec<TaskPlacementBefore>,
    },
    BatchDelete {
        tasks: Vec<Task>,
    },
    Assign {
        task_id: Uuid,
        user_id: UserId,
    },
    Unassign {
        task_id: Uuid,
        user_id: UserId,
    },
    AddLabel {
        task_id: Uuid,
        label_id: Uuid,
    },
    RemoveLabel {
        task_id: Uuid,
        label_id: Uuid,
    },
    AddComment {
        comment_id: Uuid,
        task_id: Uuid,
    },
}

impl Snapshot {
    pub fn operation(&self) -> &'static str {
        match self {
            Snapshot::Create { .. } => "create",
            Snapshot::Update { .. } => "update",
            Snapshot::Move { .. } => "move",
            Snapshot::Delete { .. } => "delete",
            Snapshot::BatchCreate { .. } => "batchCreate",
            Snapshot::BatchUpdate { .. } => "batchUpdate",
            Snapshot::BatchMove { .. } => "batchMove",
            Snapshot::BatchDelete { .. } => "batchDelete",
            Snapshot::Assign { .. } => "assign",
            Snapshot::Unassign { .. } => "unassign",
            Snapshot::AddLabel { .. } => "addLabel",
            Snapshot::RemoveLabel { .. } => "removeLabel",
            Snapshot::AddComment { .. } => "addComment",
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// `None` when the stored value's `operation` tag is not in the
    /// known-undoable set (or the shape does not match).
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}
