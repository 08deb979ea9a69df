//! Trigger entry points.
//!
//! Chat turns, comment @mentions, webhook deliveries, and schedule fires
//! all funnel into the same execution path: rate-limit admission, build
//! the capability-profiled toolset (plus the delegation tool when depth
//! allows), then run the agent loop. Mention, webhook, and schedule
//! triggers run under trusted contexts owned by whoever registered the
//! trigger.

use crate::agent::{AgentRun, AgentRunner, ApprovalRequest};
use crate::config::LimitsConfig;
use crate::delegation;
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::scheduler::ScheduleRunner;
use crate::webhook::AdmittedDelivery;
use bd_core::board::BoardStore;
use bd_core::models::{ActionContext, DelegationContext, OrgId, ProjectId, TriggerKind, UserId};
use bd_core::schedule::ScheduleDescriptor;
use bd_core::Error;
use bd_tools::factory::{build_toolset, CapabilityProfile};
use bd_tools::proposal::ProposalStore;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// The agent's @handle in board comments.
pub const MENTION_HANDLE: &str = "boardpilot";

pub struct TriggerExecutor {
    runner: Arc<AgentRunner>,
    board: Arc<dyn BoardStore>,
    proposals: Arc<ProposalStore>,
    limiter: Arc<RateLimiter>,
    limits: LimitsConfig,
}

impl TriggerExecutor {
    pub fn new(
        runner: Arc<AgentRunner>,
        board: Arc<dyn BoardStore>,
        proposals: Arc<ProposalStore>,
        limiter: Arc<RateLimiter>,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            runner,
            board,
            proposals,
            limiter,
            limits,
        }
    }

    fn admit(&self, org_id: OrgId, user_id: UserId) -> Result<(), Error> {
        let decision = self.limiter.check_pair(
            &format!("user:{user_id}"),
            RateLimitConfig {
                max_requests: self.limits.user_max_requests,
                window_seconds: self.limits.window_seconds,
            },
            &format!("org:{org_id}"),
            RateLimitConfig {
                max_requests: self.limits.org_max_requests,
                window_seconds: self.limits.window_seconds,
            },
        );
        if decision.allowed {
            Ok(())
        } else {
            Err(Error::LimitExceeded {
                retry_after_seconds: decision.retry_after_seconds,
            })
        }
    }

    fn toolset(
        &self,
        profile: CapabilityProfile,
        context: &ActionContext,
    ) -> Vec<Arc<dyn bd_tools::BoardTool>> {
        let mut tools = build_toolset(profile, self.board.clone(), self.proposals.clone());
        if profile.delegation {
            let delegation_context = DelegationContext::root(context.clone());
            if let Some(tool) = delegation::delegation_tool(
                self.runner.clone(),
                self.board.clone(),
                self.proposals.clone(),
                &delegation_context,
            ) {
                tools.push(tool);
            }
        }
        tools
    }

    /// Interactive chat turn for a signed-in user.
    pub async fn chat_turn(
        &self,
        context: &ActionContext,
        message: &str,
        approval_tx: Option<&mpsc::Sender<ApprovalRequest>>,
    ) -> Result<AgentRun, Error> {
        self.admit(context.org_id, context.user_id)?;
        let tools = self.toolset(CapabilityProfile::chat(), context);
        self.runner
            .run(&tools, context, message, approval_tx)
            .await
            .map_err(|e| Error::BackendMessage(format!("agent run failed: {e}")))
    }

    /// A board comment mentioning the agent. The comment author owns the
    /// resulting trusted context.
    pub async fn mention(
        &self,
        org_id: OrgId,
        project_id: ProjectId,
        author: UserId,
        comment_text: &str,
    ) -> Result<AgentRun, Error> {
        let Some(instruction) = extract_mention_instruction(comment_text, MENTION_HANDLE) else {
            return Err(Error::InvalidInput(format!(
                "comment does not mention @{MENTION_HANDLE}"
            )));
        };
        self.admit(org_id, author)?;

        let context = ActionContext::system(org_id, project_id, author, TriggerKind::Mention);
        let tools = self.toolset(CapabilityProfile::trusted_trigger(), &context);
        self.runner
            .run(&tools, &context, &instruction, None)
            .await
            .map_err(|e| Error::BackendMessage(format!("agent run failed: {e}")))
    }

    /// An admitted webhook delivery. Callers fire-and-forget this from
    /// the receiver; failures are logged, never surfaced to the sender.
    pub async fn webhook_delivery(&self, delivery: AdmittedDelivery) {
        let endpoint = delivery.endpoint;
        if let Err(e) = self.admit(endpoint.org_id, endpoint.created_by) {
            tracing::warn!(
                webhook_id = %endpoint.id,
                error = %e,
                "webhook delivery rejected by rate limiter"
            );
            return;
        }

        let context = ActionContext::system(
            endpoint.org_id,
            endpoint.project_id,
            endpoint.created_by,
            TriggerKind::Webhook,
        );
        let instruction = format!(
            "{}\n\n--- Webhook payload ({}) ---\n{}",
            endpoint.instruction, endpoint.name, delivery.payload
        );
        let tools = self.toolset(CapabilityProfile::trusted_trigger(), &context);
        match self.runner.run(&tools, &context, &instruction, None).await {
            Ok(run) => {
                tracing::info!(
                    webhook_id = %endpoint.id,
                    steps = run.steps.len(),
                    "webhook-triggered agent run completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    webhook_id = %endpoint.id,
                    error = %e,
                    "webhook-triggered agent run failed"
                );
            }
        }
    }
}

#[async_trait]
impl ScheduleRunner for TriggerExecutor {
    async fn run_schedule(&self, schedule: &ScheduleDescriptor) -> anyhow::Result<()> {
        self.admit(schedule.org_id, schedule.created_by)
            .map_err(|e| anyhow::anyhow!("schedule admission failed: {e}"))?;

        let context = ActionContext::system(
            schedule.org_id,
            schedule.project_id,
            schedule.created_by,
            TriggerKind::Schedule,
        );
        let instruction = format!(
            "Scheduled instruction ({}):\n{}",
            schedule.name, schedule.instruction
        );
        let tools = self.toolset(CapabilityProfile::trusted_trigger(), &context);
        let run = self
            .runner
            .run(&tools, &context, &instruction, None)
            .await?;
        tracing::info!(
            schedule_id = %schedule.id,
            steps = run.steps.len(),
            "scheduled agent run completed"
        );
        Ok(())
    }
}

/// Extracts the instruction that follows `@handle` in a comment.
/// Returns `None` when the handle is not mentioned or nothing follows.
pub fn extract_mention_instruction(text: &str, handle: &str) -> Option<String> {
    let needle = format!("@{handle}");
    let start = text.find(&needle)?;
    let instruction = text[start + needle.len()..].trim();
    if instruction.is_empty() {
        return None;
    }
    Some(instruction.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bd_core::authz::StaticAccessChecker;
    use bd_core::clock::ManualClock;
    use bd_core::dev::{DevBoardStore, DevLedgerStore};
    use bd_core::models::AccessLevel;
    use bd_llm::ScriptedModel;
    use bd_tools::approval::{ApprovalPolicy, PendingApprovals};
    use bd_tools::dispatcher::ToolDispatcher;
    use bd_tools::gate::PermissionGate;
    use bd_tools::ledger::ActivityLedger;
    use chrono::{Duration, Utc};

    fn executor(limits: LimitsConfig) -> (TriggerExecutor, UserId) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let user = UserId(Uuid::new_v4());
        let dispatcher = ToolDispatcher::new(
            PermissionGate::new(Arc::new(
                StaticAccessChecker::new().grant(user, AccessLevel::Admin),
            )),
            ApprovalPolicy::default(),
            Arc::new(PendingApprovals::new(16, Duration::minutes(10), clock.clone())),
            Arc::new(ActivityLedger::new(Arc::new(DevLedgerStore::new()))),
            clock.clone(),
        );
        let runner = Arc::new(AgentRunner::new(
            Arc::new(ScriptedModel::empty()),
            dispatcher,
            "manage the board".to_string(),
        ));
        let board: Arc<dyn BoardStore> = Arc::new(DevBoardStore::new());
        let proposals = Arc::new(ProposalStore::new(
            8,
            Duration::minutes(5),
            clock.clone(),
        ));
        (
            TriggerExecutor::new(
                runner,
                board,
                proposals,
                Arc::new(RateLimiter::new(clock)),
                limits,
            ),
            user,
        )
    }

    #[test]
    fn mention_instruction_extraction() {
        assert_eq!(
            extract_mention_instruction("hey @boardpilot move this to done", "boardpilot"),
            Some("move this to done".to_string())
        );
        assert!(extract_mention_instruction("no mention here", "boardpilot").is_none());
        assert!(extract_mention_instruction("@boardpilot   ", "boardpilot").is_none());
    }

    #[tokio::test]
    async fn chat_turn_is_rate_limited() {
        let limits = LimitsConfig {
            user_max_requests: 1,
            org_max_requests: 100,
            window_seconds: 60,
        };
        let (executor, user) = executor(limits);
        let context = ActionContext::for_user(
            OrgId(Uuid::nil()),
            ProjectId(Uuid::nil()),
            user,
            Uuid::new_v4(),
            "jwt",
        );

        executor
            .chat_turn(&context, "hello", None)
            .await
            .expect("first turn admitted");
        let err = executor
            .chat_turn(&context, "hello again", None)
            .await
            .expect_err("second turn rejected");
        assert!(matches!(err, Error::LimitExceeded { retry_after_seconds } if retry_after_seconds > 0));
    }

    #[tokio::test]
    async fn mention_without_handle_is_rejected() {
        let (executor, user) = executor(LimitsConfig::default());
        let err = executor
            .mention(
                OrgId(Uuid::nil()),
                ProjectId(Uuid::nil()),
                user,
                "just a regular comment",
            )
            .await
            .expect_err("no handle, no run");
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
