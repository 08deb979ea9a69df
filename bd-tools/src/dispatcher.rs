//! The tool wrapper: {permission check → approval gate → execute →
//! ledger write} around every tool invocation.
//!
//! Ordering within one dispatch is strict: the permission check precedes
//! execution, execution precedes the ledger write. The ledger write is
//! fire-and-forget; its failure never fails the call.

use crate::approval::{ApprovalDecision, ApprovalPolicy, ApprovalToken, PendingApprovals};
use crate::error::{Result, ToolError};
use crate::gate::PermissionGate;
use crate::ledger::ActivityLedger;
use crate::traits::{BoardTool, ToolSpec};
use bd_core::clock::Clock;
use bd_core::ledger::{ActivityRecord, ActivityStatus};
use bd_core::models::ActionContext;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug)]
pub enum ToolOutcome {
    Completed {
        record_id: Uuid,
        output: serde_json::Value,
    },
    /// The call is parked; nothing was executed or recorded. The
    /// interactive layer surfaces the approval UI and re-invokes with a
    /// token carrying this id.
    PendingApproval {
        pending_call_id: Uuid,
    },
}

#[derive(Clone)]
pub struct ToolDispatcher {
    gate: PermissionGate,
    policy: ApprovalPolicy,
    approvals: Arc<PendingApprovals>,
    ledger: Arc<ActivityLedger>,
    clock: Arc<dyn Clock>,
}

impl ToolDispatcher {
    pub fn new(
        gate: PermissionGate,
        policy: ApprovalPolicy,
        approvals: Arc<PendingApprovals>,
        ledger: Arc<ActivityLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gate,
            policy,
            approvals,
            ledger,
            clock,
        }
    }

    pub fn approvals(&self) -> &Arc<PendingApprovals> {
        &self.approvals
    }

    #[tracing::instrument(level = "info", skip_all, fields(tool_name = %tool.spec().name))]
    pub async fn dispatch(
        &self,
        tool: &dyn BoardTool,
        arguments: serde_json::Value,
        context: &ActionContext,
        approval: Option<ApprovalToken>,
    ) -> Result<ToolOutcome> {
        let spec = tool.spec();
        let requires_approval = self.policy.requires_approval(spec.category);

        if !context.is_trusted() {
            if let Err(denied) = self
                .gate
                .ensure(
                    context,
                    "project",
                    &context.project_id.to_string(),
                    spec.required_level,
                )
                .await
            {
                self.ledger.record(self.denied_record(
                    &spec,
                    &arguments,
                    context,
                    requires_approval,
                    None,
                    denied.to_string(),
                ));
                return Err(denied);
            }
        }

        let mut approval_status = None;
        if requires_approval {
            match approval {
                None => {
                    let pending_call_id =
                        self.approvals.park(&spec.name, arguments, context)?;
                    return Ok(ToolOutcome::PendingApproval { pending_call_id });
                }
                Some(token) => {
                    let Some(parked) = self.approvals.consume(token.pending_call_id) else {
                        return Err(ToolError::Conflict(
                            "approval token does not reference a live pending call".to_string(),
                        ));
                    };
                    if parked.tool_name != spec.name || parked.arguments != arguments {
                        return Err(ToolError::Conflict(
                            "approval token was issued for a different call".to_string(),
                        ));
                    }
                    match token.decision {
                        ApprovalDecision::Denied => {
                            let message = format!("approval denied for {}", spec.name);
                            self.ledger.record(self.denied_record(
                                &spec,
                                &arguments,
                                context,
                                requires_approval,
                                Some("denied".to_string()),
                                message.clone(),
                            ));
                            return Err(ToolError::ApprovalDenied(message));
                        }
                        ApprovalDecision::Approved => {
                            approval_status = Some("approved".to_string());
                        }
                    }
                }
            }
        }

        match tool.execute(arguments.clone(), context).await {
            Ok(execution) => {
                let record = ActivityRecord {
                    id: Uuid::new_v4(),
                    org_id: context.org_id,
                    project_id: context.project_id,
                    user_id: context.user_id,
                    session_id: context.session_id,
                    tool_name: spec.name.clone(),
                    input: arguments,
                    output: Some(execution.output.clone()),
                    error: None,
                    status: ActivityStatus::Completed,
                    requires_approval,
                    approval_status,
                    affected_entity_ids: execution.affected_entity_ids,
                    snapshot_before: execution.snapshot.as_ref().map(|s| s.to_value()),
                    created_at: self.clock.now(),
                };
                let record_id = record.id;
                self.ledger.record(record);
                Ok(ToolOutcome::Completed {
                    record_id,
                    output: execution.output,
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, "tool execution failed");
                let record = ActivityRecord {
                    id: Uuid::new_v4(),
                    org_id: context.org_id,
                    project_id: context.project_id,
                    user_id: context.user_id,
                    session_id: context.session_id,
                    tool_name: spec.name.clone(),
                    input: arguments,
                    output: None,
                    error: Some(e.to_string()),
                    status: ActivityStatus::Failed,
                    requires_approval,
                    approval_status,
                    affected_entity_ids: Vec::new(),
                    snapshot_before: None,
                    created_at: self.clock.now(),
                };
                self.ledger.record(record);
                Err(e)
            }
        }
    }

    fn denied_record(
        &self,
        spec: &ToolSpec,
        arguments: &serde_json::Value,
        context: &ActionContext,
        requires_approval: bool,
        approval_status: Option<String>,
        message: String,
    ) -> ActivityRecord {
        ActivityRecord {
            id: Uuid::new_v4(),
            org_id: context.org_id,
            project_id: context.project_id,
            user_id: context.user_id,
            session_id: context.session_id,
            tool_name: spec.name.clone(),
            input: arguments.clone(),
            output: None,
            error: Some(message),
            status: ActivityStatus::Denied,
            requires_approval,
            approval_status,
            affected_entity_ids: Vec::new(),
            snapshot_before: None,
            created_at: self.clock.now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board_tools::{CreateTaskTool, DeleteTaskTool};
    use bd_core::authz::StaticAccessChecker;
    use bd_core::board::{BoardStore, TaskDraft};
    use bd_core::clock::ManualClock;
    use bd_core::dev::{DevBoardStore, DevLedgerStore};
    use bd_core::models::{AccessLevel, OrgId, ProjectId, TriggerKind, UserId};
    use chrono::{Duration, Utc};

    struct Fixture {
        board: Arc<DevBoardStore>,
        ledger: Arc<ActivityLedger>,
        dispatcher: ToolDispatcher,
        org: OrgId,
        project: ProjectId,
        editor: UserId,
    }

    fn fixture() -> Fixture {
        let org = OrgId(Uuid::nil());
        let project = ProjectId(Uuid::nil());
        let editor = UserId(Uuid::new_v4());
        let board = Arc::new(DevBoardStore::new());
        let ledger = Arc::new(ActivityLedger::new(Arc::new(DevLedgerStore::new())));
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let checker = Arc::new(StaticAccessChecker::new().grant(editor, AccessLevel::Editor));
        let approvals = Arc::new(PendingApprovals::new(
            16,
            Duration::minutes(10),
            clock.clone(),
        ));
        let dispatcher = ToolDispatcher::new(
            PermissionGate::new(checker),
            ApprovalPolicy::default(),
            approvals,
            ledger.clone(),
            clock,
        );
        Fixture {
            board,
            ledger,
            dispatcher,
            org,
            project,
            editor,
        }
    }

    fn user_ctx(f: &Fixture, user: UserId) -> ActionContext {
        ActionContext::for_user(f.org, f.project, user, Uuid::new_v4(), "jwt")
    }

    fn create_args() -> serde_json::Value {
        serde_json::json!({
            "title": "write release notes",
            "column_id": Uuid::new_v4().to_string(),
        })
    }

    #[tokio::test]
    async fn denied_permission_records_exactly_once_and_never_executes() {
        let f = fixture();
        let stranger = UserId(Uuid::new_v4());
        let tool = CreateTaskTool::new(f.board.clone());

        let err = f
            .dispatcher
            .dispatch(&tool, create_args(), &user_ctx(&f, stranger), None)
            .await
            .expect_err("stranger must be denied");
        assert!(matches!(err, ToolError::PermissionDenied(_)));

        assert!(f.board.list_tasks(f.org, f.project).await.unwrap().is_empty());

        f.ledger.flush().await;
        let records = f.ledger.list_recent(f.org, 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ActivityStatus::Denied);
    }

    #[tokio::test]
    async fn trusted_context_skips_the_permission_gate() {
        let f = fixture();
        let unknown_user = UserId(Uuid::new_v4());
        let ctx = ActionContext::system(f.org, f.project, unknown_user, TriggerKind::Schedule);
        let tool = CreateTaskTool::new(f.board.clone());

        let outcome = f
            .dispatcher
            .dispatch(&tool, create_args(), &ctx, None)
            .await
            .expect("trusted dispatch executes");
        assert!(matches!(outcome, ToolOutcome::Completed { .. }));
        assert_eq!(f.board.list_tasks(f.org, f.project).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn approval_gated_call_parks_then_executes_on_approved_token() {
        let f = fixture();
        let ctx = user_ctx(&f, f.editor);
        let task = f
            .board
            .create_task(
                f.org,
                f.project,
                TaskDraft {
                    title: "obsolete".to_string(),
                    description: None,
                    column_id: Uuid::new_v4(),
                    position: None,
                },
            )
            .await
            .unwrap();
        let tool = DeleteTaskTool::new(f.board.clone());
        let args = serde_json::json!({ "task_id": task.id.to_string() });

        let outcome = f
            .dispatcher
            .dispatch(&tool, args.clone(), &ctx, None)
            .await
            .unwrap();
        let ToolOutcome::PendingApproval { pending_call_id } = outcome else {
            panic!("destructive call should park for approval");
        };

        // Nothing executed, nothing recorded while pending.
        assert!(f.board.get_task(f.org, task.id).await.unwrap().is_some());
        f.ledger.flush().await;
        assert!(f.ledger.list_recent(f.org, 10).await.unwrap().is_empty());

        let outcome = f
            .dispatcher
            .dispatch(
                &tool,
                args,
                &ctx,
                Some(ApprovalToken {
                    pending_call_id,
                    decision: ApprovalDecision::Approved,
                }),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, ToolOutcome::Completed { .. }));
        assert!(f.board.get_task(f.org, task.id).await.unwrap().is_none());

        f.ledger.flush().await;
        let records = f.ledger.list_recent(f.org, 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].approval_status.as_deref(), Some("approved"));
    }

    #[tokio::test]
    async fn denied_token_is_terminal_and_recorded() {
        let f = fixture();
        let ctx = user_ctx(&f, f.editor);
        let task = f
            .board
            .create_task(
                f.org,
                f.project,
                TaskDraft {
                    title: "keep me".to_string(),
                    description: None,
                    column_id: Uuid::new_v4(),
                    position: None,
                },
            )
            .await
            .unwrap();
        let tool = DeleteTaskTool::new(f.board.clone());
        let args = serde_json::json!({ "task_id": task.id.to_string() });

        let ToolOutcome::PendingApproval { pending_call_id } = f
            .dispatcher
            .dispatch(&tool, args.clone(), &ctx, None)
            .await
            .unwrap()
        else {
            panic!("expected pending approval");
        };

        let err = f
            .dispatcher
            .dispatch(
                &tool,
                args.clone(),
                &ctx,
                Some(ApprovalToken {
                    pending_call_id,
                    decision: ApprovalDecision::Denied,
                }),
            )
            .await
            .expect_err("denied approval must not execute");
        assert!(matches!(err, ToolError::ApprovalDenied(_)));
        assert!(f.board.get_task(f.org, task.id).await.unwrap().is_some());

        // The pending id was consumed by the denial; replaying it fails.
        let err = f
            .dispatcher
            .dispatch(
                &tool,
                args,
                &ctx,
                Some(ApprovalToken {
                    pending_call_id,
                    decision: ApprovalDecision::Approved,
                }),
            )
            .await
            .expect_err("consumed token must not be reusable");
        assert!(matches!(err, ToolError::Conflict(_)));
    }

    #[tokio::test]
    async fn approval_token_for_different_arguments_is_rejected() {
        let f = fixture();
        let ctx = user_ctx(&f, f.editor);
        let tool = DeleteTaskTool::new(f.board.clone());
        let parked_args = serde_json::json!({ "task_id": Uuid::new_v4().to_string() });
        let other_args = serde_json::json!({ "task_id": Uuid::new_v4().to_string() });

        let ToolOutcome::PendingApproval { pending_call_id } = f
            .dispatcher
            .dispatch(&tool, parked_args, &ctx, None)
            .await
            .unwrap()
        else {
            panic!("expected pending approval");
        };

        let err = f
            .dispatcher
            .dispatch(
                &tool,
                other_args,
                &ctx,
                Some(ApprovalToken {
                    pending_call_id,
                    decision: ApprovalDecision::Approved,
                }),
            )
            .await
            .expect_err("token must be bound to the original call");
        assert!(matches!(err, ToolError::Conflict(_)));
    }

    #[tokio::test]
    async fn failed_execution_is_recorded_and_reraised() {
        let f = fixture();
        let ctx = user_ctx(&f, f.editor);
        let tool = DeleteTaskTool::new(f.board.clone());
        let args = serde_json::json!({ "task_id": Uuid::new_v4().to_string() });

        let ToolOutcome::PendingApproval { pending_call_id } =
            f.dispatcher.dispatch(&tool, args.clone(), &ctx, None).await.unwrap()
        else {
            panic!("expected pending approval");
        };
        let err = f
            .dispatcher
            .dispatch(
                &tool,
                args,
                &ctx,
                Some(ApprovalToken {
                    pending_call_id,
                    decision: ApprovalDecision::Approved,
                }),
            )
            .await
            .expect_err("deleting a missing task fails");
        assert!(matches!(err, ToolError::NotFound(_)));

        f.ledger.flush().await;
        let records = f.ledger.list_recent(f.org, 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ActivityStatus::Failed);
        assert!(records[0].error.is_some());
    }
}
