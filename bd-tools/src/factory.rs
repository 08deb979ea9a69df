//! Capability-profiled tool factory.
//!
//! Every trigger used to need its own hand-maintained tool table; here
//! one catalog is filtered by a [`CapabilityProfile`] instead. The
//! delegation tool itself is never produced by this factory — the
//! delegation controller adds it, because only the controller knows the
//! current depth.

use crate::board_tools::{
    AddCommentTool, AssignmentTool, BatchCreateTasksTool, BatchDeleteTasksTool,
    BatchMoveTasksTool, BatchUpdateTasksTool, ConfirmProposalTool, CreateTaskTool, DeleteTaskTool,
    GetTaskTool, LabelTool, ListTasksTool, MoveTaskTool, ProposeTasksTool, UpdateTaskTool,
};
use crate::proposal::ProposalStore;
use crate::traits::{BoardTool, ToolCategory};
use bd_core::board::BoardStore;
use std::sync::Arc;

#[derive(Debug, Copy, Clone)]
pub struct CapabilityProfile {
    pub queries: bool,
    pub writes: bool,
    pub destructive: bool,
    /// Whether the agent loop may add the delegation tool on top of this
    /// toolset (depth permitting).
    pub delegation: bool,
}

impl CapabilityProfile {
    /// Interactive chat: the full surface, with destructive tools behind
    /// the approval gate.
    pub fn chat() -> Self {
        Self {
            queries: true,
            writes: true,
            destructive: true,
            delegation: true,
        }
    }

    /// Autonomous triggers (mention, webhook, schedule): no destructive
    /// tools, since nobody is present to approve them.
    pub fn trusted_trigger() -> Self {
        Self {
            queries: true,
            writes: true,
            destructive: false,
            delegation: true,
        }
    }

    /// Delegated sub-agents: queries and non-destructive writes only.
    pub fn delegate() -> Self {
        Self {
            queries: true,
            writes: true,
            destructive: false,
            delegation: false,
        }
    }

    fn allows(&self, category: ToolCategory) -> bool {
        match category {
            ToolCategory::Query => self.queries,
            ToolCategory::Write => self.writes,
            ToolCategory::Destructive => self.destructive,
            ToolCategory::Delegation => self.delegation,
        }
    }
}

pub fn build_toolset(
    profile: CapabilityProfile,
    board: Arc<dyn BoardStore>,
    proposals: Arc<ProposalStore>,
) -> Vec<Arc<dyn BoardTool>> {
    let catalog: Vec<Arc<dyn BoardTool>> = vec![
        Arc::new(ListTasksTool::new(board.clone())),
        Arc::new(GetTaskTool::new(board.clone())),
        Arc::new(CreateTaskTool::new(board.clone())),
        Arc::new(UpdateTaskTool::new(board.clone())),
        Arc::new(MoveTaskTool::new(board.clone())),
        Arc::new(AssignmentTool::assign(board.clone())),
        Arc::new(AssignmentTool::unassign(board.clone())),
        Arc::new(LabelTool::add(board.clone())),
        Arc::new(LabelTool::remove(board.clone())),
        Arc::new(AddCommentTool::new(board.clone())),
        Arc::new(ProposeTasksTool::new(proposals.clone())),
        Arc::new(ConfirmProposalTool::new(board.clone(), proposals)),
        Arc::new(BatchCreateTasksTool::new(board.clone())),
        Arc::new(BatchUpdateTasksTool::new(board.clone())),
        Arc::new(BatchMoveTasksTool::new(board.clone())),
        Arc::new(DeleteTaskTool::new(board.clone())),
        Arc::new(BatchDeleteTasksTool::new(board)),
    ];

    catalog
        .into_iter()
        .filter(|tool| profile.allows(tool.spec().category))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bd_core::clock::SystemClock;
    use bd_core::dev::DevBoardStore;
    use chrono::Duration;

    fn board() -> Arc<dyn BoardStore> {
        Arc::new(DevBoardStore::new())
    }

    fn proposals() -> Arc<ProposalStore> {
        Arc::new(ProposalStore::new(
            8,
            Duration::minutes(5),
            Arc::new(SystemClock),
        ))
    }

    #[test]
    fn chat_profile_includes_destructive_tools() {
        let tools = build_toolset(CapabilityProfile::chat(), board(), proposals());
        assert!(tools.iter().any(|t| t.spec().name == "delete_task"));
        assert!(tools.iter().any(|t| t.spec().name == "batch_delete_tasks"));
    }

    #[test]
    fn trusted_trigger_profile_excludes_destructive_tools() {
        let tools = build_toolset(CapabilityProfile::trusted_trigger(), board(), proposals());
        assert!(!tools
            .iter()
            .any(|t| t.spec().category.is_destructive()));
        assert!(tools.iter().any(|t| t.spec().name == "create_task"));
    }

    #[test]
    fn delegate_profile_has_no_destructive_tools() {
        let tools = build_toolset(CapabilityProfile::delegate(), board(), proposals());
        assert!(!tools
            .iter()
            .any(|t| t.spec().category.is_destructive()));
        assert!(tools.iter().any(|t| t.spec().name == "list_tasks"));
    }
}
