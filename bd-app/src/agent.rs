//! The agent tool loop: model call → dispatch tool calls → feed results
//! back, bounded by a loop budget.
//!
//! Denied or failed tool calls become tool-role error messages in the
//! transcript rather than aborting the turn, so the model can explain or
//! adjust. Approval-gated calls are handed to the interactive layer over
//! a channel; on triggers with nobody to ask, the pending call is
//! reported back as such.

use bd_core::models::ActionContext;
use bd_llm::{AgentStep, ChatMessage, ChatModel, StepStatus, ToolCall};
use bd_tools::approval::{ApprovalDecision, ApprovalToken};
use bd_tools::dispatcher::{ToolDispatcher, ToolOutcome};
use bd_tools::traits::{BoardTool, to_llm_tool_def};
use bd_tools::ToolError;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Sent when a tool call needs a human decision. The interactive layer
/// owns the UI and answers on `response_tx`; dropping the sender counts
/// as a denial.
pub struct ApprovalRequest {
    pub pending_call_id: Uuid,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub response_tx: oneshot::Sender<ApprovalDecision>,
}

#[derive(Debug)]
pub struct AgentRun {
    pub text: String,
    pub steps: Vec<AgentStep>,
}

pub struct AgentRunner {
    model: Arc<dyn ChatModel>,
    dispatcher: ToolDispatcher,
    system_prompt: String,
    max_tool_loops: usize,
    max_tool_output_chars: usize,
}

impl AgentRunner {
    pub fn new(model: Arc<dyn ChatModel>, dispatcher: ToolDispatcher, system_prompt: String) -> Self {
        Self {
            model,
            dispatcher,
            system_prompt,
            max_tool_loops: 6,
            max_tool_output_chars: 4000,
        }
    }

    #[tracing::instrument(level = "info", skip_all, fields(trigger = context.trigger.as_str()))]
    pub async fn run(
        &self,
        tools: &[Arc<dyn BoardTool>],
        context: &ActionContext,
        instruction: &str,
        approval_tx: Option<&mpsc::Sender<ApprovalRequest>>,
    ) -> anyhow::Result<AgentRun> {
        let tool_defs: Vec<bd_llm::ToolDefinition> =
            tools.iter().map(|t| to_llm_tool_def(t.as_ref())).collect();
        let mut messages = vec![
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(instruction),
        ];
        let mut steps: Vec<AgentStep> = Vec::new();

        for tool_loop in 1..=self.max_tool_loops {
            let response = self
                .model
                .chat(&messages, &tool_defs)
                .await
                .map_err(|e| anyhow::anyhow!("model call failed: {e}"))?;
            tracing::info!(
                tool_loop,
                tool_calls = response.message.tool_calls.len(),
                content_len = response.message.content.len(),
                "agent loop iteration"
            );

            if response.message.tool_calls.is_empty() {
                return Ok(AgentRun {
                    text: response.message.content,
                    steps,
                });
            }

            let tool_calls = response.message.tool_calls.clone();
            messages.push(response.message);

            for call in tool_calls {
                let (content, step) = self
                    .handle_tool_call(tools, context, &call, approval_tx)
                    .await;
                if let Some(step) = step {
                    steps.push(step);
                }
                messages.push(ChatMessage::tool_result(call.id.clone(), content));
            }
        }

        tracing::warn!(max_tool_loops = self.max_tool_loops, "agent tool loop limit reached");
        Ok(AgentRun {
            text: "Tool loop limit reached.".to_string(),
            steps,
        })
    }

    async fn handle_tool_call(
        &self,
        tools: &[Arc<dyn BoardTool>],
        context: &ActionContext,
        call: &ToolCall,
        approval_tx: Option<&mpsc::Sender<ApprovalRequest>>,
    ) -> (String, Option<AgentStep>) {
        let Some(tool) = tools.iter().find(|t| t.spec().name == call.name) else {
            tracing::warn!(tool_name = %call.name, "model referenced unknown tool");
            return (json!({ "error": "unknown tool" }).to_string(), None);
        };

        let arguments: serde_json::Value = match serde_json::from_str(&call.arguments) {
            Ok(v) => v,
            Err(e) => {
                return (
                    json!({ "error": format!("invalid tool arguments: {e}") }).to_string(),
                    Some(AgentStep {
                        tool_name: call.name.clone(),
                        status: StepStatus::Failed,
                    }),
                );
            }
        };

        match self
            .dispatcher
            .dispatch(tool.as_ref(), arguments.clone(), context, None)
            .await
        {
            Ok(ToolOutcome::Completed { output, record_id }) => (
                json!({ "record_id": record_id.to_string(), "output": self.truncate(output) })
                    .to_string(),
                Some(AgentStep {
                    tool_name: call.name.clone(),
                    status: StepStatus::Completed,
                }),
            ),
            Ok(ToolOutcome::PendingApproval { pending_call_id }) => {
                self.resolve_pending(tool.as_ref(), context, call, arguments, pending_call_id, approval_tx)
                    .await
            }
            Err(e) => self.error_result(call, e),
        }
    }

    /// Hands a parked call to the approver and re-dispatches with the
    /// decision token. Without an approver the pending state is final
    /// for this turn.
    async fn resolve_pending(
        &self,
        tool: &dyn BoardTool,
        context: &ActionContext,
        call: &ToolCall,
        arguments: serde_json::Value,
        pending_call_id: Uuid,
        approval_tx: Option<&mpsc::Sender<ApprovalRequest>>,
    ) -> (String, Option<AgentStep>) {
        let Some(approval_tx) = approval_tx else {
            return (
                json!({
                    "status": "pending_approval",
                    "message": "this call requires human approval and no approver is available on this trigger",
                })
                .to_string(),
                Some(AgentStep {
                    tool_name: call.name.clone(),
                    status: StepStatus::PendingApproval,
                }),
            );
        };

        let (response_tx, response_rx) = oneshot::channel();
        let request = ApprovalRequest {
            pending_call_id,
            tool_name: call.name.clone(),
            arguments: arguments.clone(),
            response_tx,
        };
        if approval_tx.send(request).await.is_err() {
            tracing::warn!(tool_name = %call.name, "approval channel closed; treating as denied");
            return (
                json!({ "error": "tool call denied" }).to_string(),
                Some(AgentStep {
                    tool_name: call.name.clone(),
                    status: StepStatus::Denied,
                }),
            );
        }
        let decision = response_rx.await.unwrap_or(ApprovalDecision::Denied);

        match self
            .dispatcher
            .dispatch(
                tool,
                arguments,
                context,
                Some(ApprovalToken {
                    pending_call_id,
                    decision,
                }),
            )
            .await
        {
            Ok(ToolOutcome::Completed { output, record_id }) => (
                json!({ "record_id": record_id.to_string(), "output": self.truncate(output) })
                    .to_string(),
                Some(AgentStep {
                    tool_name: call.name.clone(),
                    status: StepStatus::Completed,
                }),
            ),
            Ok(ToolOutcome::PendingApproval { .. }) => (
                json!({ "error": "tool call parked twice; giving up this turn" }).to_string(),
                Some(AgentStep {
                    tool_name: call.name.clone(),
                    status: StepStatus::PendingApproval,
                }),
            ),
            Err(e) => self.error_result(call, e),
        }
    }

    fn error_result(&self, call: &ToolCall, error: ToolError) -> (String, Option<AgentStep>) {
        let status = match error {
            ToolError::PermissionDenied(_) | ToolError::ApprovalDenied(_) => StepStatus::Denied,
            _ => StepStatus::Failed,
        };
        (
            json!({ "error": error.to_string() }).to_string(),
            Some(AgentStep {
                tool_name: call.name.clone(),
                status,
            }),
        )
    }

    fn truncate(&self, output: serde_json::Value) -> serde_json::Value {
        let rendered = output.to_string();
        if rendered.chars().count() <= self.max_tool_output_chars {
            return output;
        }
        let truncated: String = rendered.chars().take(self.max_tool_output_chars).collect();
        json!({
            "truncated": true,
            "preview": truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bd_core::authz::StaticAccessChecker;
    use bd_core::clock::ManualClock;
    use bd_core::dev::{DevBoardStore, DevLedgerStore};
    use bd_core::models::{AccessLevel, OrgId, ProjectId, UserId};
    use bd_llm::{scripted_tool_call, ScriptedModel};
    use bd_tools::approval::{ApprovalPolicy, PendingApprovals};
    use bd_tools::factory::{build_toolset, CapabilityProfile};
    use bd_tools::gate::PermissionGate;
    use bd_tools::ledger::ActivityLedger;
    use bd_tools::proposal::ProposalStore;
    use bd_core::board::BoardStore;
    use chrono::{Duration, Utc};

    struct Fixture {
        board: Arc<DevBoardStore>,
        proposals: Arc<ProposalStore>,
        runner: AgentRunner,
        org: OrgId,
        project: ProjectId,
        user: UserId,
    }

    fn fixture(model: ScriptedModel) -> Fixture {
        let board = Arc::new(DevBoardStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let user = UserId(Uuid::new_v4());
        let checker = Arc::new(StaticAccessChecker::new().grant(user, AccessLevel::Admin));
        let ledger = Arc::new(ActivityLedger::new(Arc::new(DevLedgerStore::new())));
        let proposals = Arc::new(ProposalStore::new(8, Duration::minutes(5), clock.clone()));
        let dispatcher = ToolDispatcher::new(
            PermissionGate::new(checker),
            ApprovalPolicy::default(),
            Arc::new(PendingApprovals::new(16, Duration::minutes(10), clock.clone())),
            ledger,
            clock,
        );
        let runner = AgentRunner::new(Arc::new(model), dispatcher, "manage the board".to_string());
        Fixture {
            board,
            proposals,
            runner,
            org: OrgId(Uuid::nil()),
            project: ProjectId(Uuid::nil()),
            user,
        }
    }

    fn user_ctx(f: &Fixture) -> ActionContext {
        ActionContext::for_user(f.org, f.project, f.user, Uuid::new_v4(), "jwt")
    }

    #[tokio::test]
    async fn tool_call_executes_and_is_reported_as_a_step() {
        let model = ScriptedModel::new([scripted_tool_call(
            "tc1",
            "create_task",
            json!({ "title": "from the loop", "column_id": Uuid::new_v4().to_string() }),
        )]);
        let f = fixture(model);
        let tools = build_toolset(CapabilityProfile::chat(), f.board.clone(), f.proposals.clone());

        let run = f
            .runner
            .run(&tools, &user_ctx(&f), "make a task", None)
            .await
            .unwrap();

        assert_eq!(run.text, "done");
        assert_eq!(run.steps.len(), 1);
        assert_eq!(run.steps[0].tool_name, "create_task");
        assert_eq!(run.steps[0].status, StepStatus::Completed);
        assert_eq!(f.board.list_tasks(f.org, f.project).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_tool_does_not_abort_the_turn() {
        let model = ScriptedModel::new([scripted_tool_call("tc1", "explode", json!({}))]);
        let f = fixture(model);
        let tools = build_toolset(CapabilityProfile::chat(), f.board.clone(), f.proposals.clone());

        let run = f
            .runner
            .run(&tools, &user_ctx(&f), "do something odd", None)
            .await
            .unwrap();
        assert_eq!(run.text, "done");
        assert!(run.steps.is_empty());
    }

    #[tokio::test]
    async fn destructive_call_without_approver_stays_pending() {
        let ctx_board = Arc::new(DevBoardStore::new());
        let task = ctx_board
            .create_task(
                OrgId(Uuid::nil()),
                ProjectId(Uuid::nil()),
                bd_core::board::TaskDraft {
                    title: "doomed".to_string(),
                    description: None,
                    column_id: Uuid::new_v4(),
                    position: None,
                },
            )
            .await
            .unwrap();

        let model = ScriptedModel::new([scripted_tool_call(
            "tc1",
            "delete_task",
            json!({ "task_id": task.id.to_string() }),
        )]);
        let mut f = fixture(model);
        f.board = ctx_board;
        let tools = build_toolset(CapabilityProfile::chat(), f.board.clone(), f.proposals.clone());

        let run = f
            .runner
            .run(&tools, &user_ctx(&f), "clean up", None)
            .await
            .unwrap();
        assert_eq!(run.steps.len(), 1);
        assert_eq!(run.steps[0].status, StepStatus::PendingApproval);
        // The task survived.
        assert!(f.board.get_task(f.org, task.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn approver_channel_resolves_the_pending_call() {
        let ctx_board = Arc::new(DevBoardStore::new());
        let task = ctx_board
            .create_task(
                OrgId(Uuid::nil()),
                ProjectId(Uuid::nil()),
                bd_core::board::TaskDraft {
                    title: "approved removal".to_string(),
                    description: None,
                    column_id: Uuid::new_v4(),
                    position: None,
                },
            )
            .await
            .unwrap();

        let model = ScriptedModel::new([scripted_tool_call(
            "tc1",
            "delete_task",
            json!({ "task_id": task.id.to_string() }),
        )]);
        let mut f = fixture(model);
        f.board = ctx_board;
        let tools = build_toolset(CapabilityProfile::chat(), f.board.clone(), f.proposals.clone());

        let (tx, mut rx) = mpsc::channel::<ApprovalRequest>(4);
        let approver = tokio::spawn(async move {
            if let Some(request) = rx.recv().await {
                assert_eq!(request.tool_name, "delete_task");
                let _ = request.response_tx.send(ApprovalDecision::Approved);
            }
        });

        let run = f
            .runner
            .run(&tools, &user_ctx(&f), "clean up", Some(&tx))
            .await
            .unwrap();
        approver.await.unwrap();

        assert_eq!(run.steps.len(), 1);
        assert_eq!(run.steps[0].status, StepStatus::Completed);
        assert!(f.board.get_task(f.org, task.id).await.unwrap().is_none());
    }
}
