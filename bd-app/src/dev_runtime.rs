//! Runtime wiring.
//!
//! Builds the full component graph from config: stores (sqlite when a
//! path is configured, in-memory otherwise), permission gate, approval
//! gate, ledger, undo engine, webhook gate, agent runner, trigger
//! executor, and scheduler. Exposes deterministic dev org/project/user
//! ids so a fresh checkout is immediately usable.

use crate::agent::AgentRunner;
use crate::config::BoardPilotConfig;
use crate::rate_limit::RateLimiter;
use crate::scheduler::SchedulerRuntime;
use crate::triggers::TriggerExecutor;
use crate::webhook::WebhookGate;
use bd_core::authz::StaticAccessChecker;
use bd_core::board::BoardStore;
use bd_core::clock::{Clock, SystemClock};
use bd_core::dev::{DevBoardStore, DevLedgerStore, DevScheduleStore, DevWebhookStore};
use bd_core::ledger::LedgerStore;
use bd_core::models::{AccessLevel, OrgId, ProjectId, UserId};
use bd_core::schedule::ScheduleStore;
use bd_core::secrets::DevSecretCipher;
use bd_core::sqlite::SqliteStores;
use bd_core::webhook::WebhookStore;
use bd_llm::{ChatModel, ScriptedModel};
use bd_tools::approval::{ApprovalPolicy, PendingApprovals};
use bd_tools::dispatcher::ToolDispatcher;
use bd_tools::gate::PermissionGate;
use bd_tools::ledger::ActivityLedger;
use bd_tools::proposal::ProposalStore;
use bd_tools::undo::UndoEngine;
use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

const PENDING_APPROVAL_CAPACITY: usize = 256;
const PENDING_APPROVAL_TTL_MINUTES: i64 = 15;
const PROPOSAL_CAPACITY: usize = 256;
const PROPOSAL_TTL_MINUTES: i64 = 10;

pub struct AppRuntime {
    pub config: BoardPilotConfig,
    pub org_id: OrgId,
    pub project_id: ProjectId,
    pub dev_user: UserId,
    pub ledger: Arc<ActivityLedger>,
    pub undo: Arc<UndoEngine>,
    pub webhook_store: Arc<dyn WebhookStore>,
    pub webhook_gate: Arc<WebhookGate>,
    pub executor: Arc<TriggerExecutor>,
    pub scheduler: Arc<SchedulerRuntime>,
}

pub fn dev_org_id() -> OrgId {
    OrgId(Uuid::nil())
}

pub fn dev_project_id() -> ProjectId {
    ProjectId(Uuid::nil())
}

pub fn dev_user_id() -> UserId {
    UserId(Uuid::nil())
}

pub fn build_runtime(config: BoardPilotConfig) -> anyhow::Result<AppRuntime> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let org_id = dev_org_id();
    let project_id = dev_project_id();
    let dev_user = dev_user_id();

    let (ledger_store, schedule_store, webhook_store): (
        Arc<dyn LedgerStore>,
        Arc<dyn ScheduleStore>,
        Arc<dyn WebhookStore>,
    ) = match &config.storage.sqlite_path {
        Some(path) => {
            let stores = SqliteStores::open(path)
                .map_err(|e| anyhow::anyhow!("open sqlite store {path}: {e}"))?;
            (
                Arc::new(stores.ledger()),
                Arc::new(stores.schedules()),
                Arc::new(stores.webhooks()),
            )
        }
        None => (
            Arc::new(DevLedgerStore::new()),
            Arc::new(DevScheduleStore::new()),
            Arc::new(DevWebhookStore::new()),
        ),
    };

    let board: Arc<dyn BoardStore> = Arc::new(DevBoardStore::new());
    let checker = Arc::new(StaticAccessChecker::new().grant(dev_user, AccessLevel::Admin));
    let ledger = Arc::new(ActivityLedger::new(ledger_store));
    let approvals = Arc::new(PendingApprovals::new(
        PENDING_APPROVAL_CAPACITY,
        Duration::minutes(PENDING_APPROVAL_TTL_MINUTES),
        clock.clone(),
    ));
    let dispatcher = ToolDispatcher::new(
        PermissionGate::new(checker),
        ApprovalPolicy::default(),
        approvals,
        ledger.clone(),
        clock.clone(),
    );

    let undo = Arc::new(UndoEngine::new(board.clone(), ledger.clone(), clock.clone()));
    let webhook_gate = Arc::new(WebhookGate::new(
        webhook_store.clone(),
        Arc::new(DevSecretCipher),
        config.webhooks.max_payload_bytes,
    ));

    // Provider adapters are wired outside this workspace; the scripted
    // model keeps the dev runtime self-contained.
    let model: Arc<dyn ChatModel> = Arc::new(ScriptedModel::empty());
    let runner = Arc::new(AgentRunner::new(
        model,
        dispatcher,
        config.general.system_prompt.clone(),
    ));

    let proposals = Arc::new(ProposalStore::new(
        PROPOSAL_CAPACITY,
        Duration::minutes(PROPOSAL_TTL_MINUTES),
        clock.clone(),
    ));
    let limiter = Arc::new(RateLimiter::new(clock.clone()));
    let executor = Arc::new(TriggerExecutor::new(
        runner,
        board.clone(),
        proposals,
        limiter,
        config.limits.clone(),
    ));
    let scheduler = Arc::new(SchedulerRuntime::new(
        schedule_store,
        executor.clone(),
        clock,
    ));

    Ok(AppRuntime {
        config,
        org_id,
        project_id,
        dev_user,
        ledger,
        undo,
        webhook_store,
        webhook_gate,
        executor,
        scheduler,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dev_runtime_builds_from_defaults() {
        let runtime = build_runtime(BoardPilotConfig::dev_default()).unwrap();
        assert_eq!(runtime.org_id, dev_org_id());
        assert!(runtime
            .scheduler
            .list(runtime.org_id)
            .await
            .unwrap()
            .is_empty());
    }
}
