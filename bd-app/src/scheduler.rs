//! Claim-based schedule runtime.
//!
//! Correctness rests on the store's atomic claim: a due row is nulled
//! and returned to exactly one `poll_once` caller, in one process or
//! many. The in-process running set is a secondary guard that stops a
//! long run from overlapping itself; a row claimed while its previous
//! run is still executing is skipped but still has its `next_run_at`
//! recomputed so it never appears permanently stuck.

use bd_core::clock::Clock;
use bd_core::cron;
use bd_core::models::{OrgId, ProjectId, UserId};
use bd_core::schedule::{
    CreateScheduleInput, ScheduleDescriptor, ScheduleStore, UpdateScheduleInput,
};
use bd_core::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Executes the agent for one claimed schedule. Implemented by the
/// trigger layer; tests substitute recording stubs.
#[async_trait]
pub trait ScheduleRunner: Send + Sync {
    async fn run_schedule(&self, schedule: &ScheduleDescriptor) -> anyhow::Result<()>;
}

pub struct SchedulerRuntime {
    store: Arc<dyn ScheduleStore>,
    runner: Arc<dyn ScheduleRunner>,
    clock: Arc<dyn Clock>,
    running: Arc<Mutex<HashSet<Uuid>>>,
    shutdown: CancellationToken,
    background_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SchedulerRuntime {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        runner: Arc<dyn ScheduleRunner>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            runner,
            clock,
            running: Arc::new(Mutex::new(HashSet::new())),
            shutdown: CancellationToken::new(),
            background_tasks: Mutex::new(Vec::new()),
        }
    }

    /// Validates and persists a new schedule. Cron validity and the
    /// minimum-interval floor are checked here, never at execution time.
    pub async fn create_schedule(
        &self,
        org_id: OrgId,
        project_id: ProjectId,
        created_by: UserId,
        input: CreateScheduleInput,
    ) -> Result<ScheduleDescriptor> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::InvalidInput("schedule name must not be empty".into()));
        }
        if input.instruction.trim().is_empty() {
            return Err(Error::InvalidInput(
                "schedule instruction must not be empty".into(),
            ));
        }
        cron::validate_schedule_expression(&input.cron_expression, cron::MIN_INTERVAL_SECONDS)?;

        let now = self.clock.now();
        let next_run_at = if input.enabled {
            cron::next_run_after(&input.cron_expression, now)?
        } else {
            None
        };
        let schedule = ScheduleDescriptor {
            id: Uuid::new_v4(),
            org_id,
            project_id,
            name,
            cron_expression: input.cron_expression,
            instruction: input.instruction,
            enabled: input.enabled,
            created_by,
            last_run_at: None,
            next_run_at,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(&schedule).await?;
        Ok(schedule)
    }

    pub async fn update_schedule(
        &self,
        org_id: OrgId,
        id: Uuid,
        input: UpdateScheduleInput,
    ) -> Result<ScheduleDescriptor> {
        let mut schedule = self
            .store
            .get(org_id, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("schedule {id}")))?;

        if let Some(name) = input.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(Error::InvalidInput("schedule name must not be empty".into()));
            }
            schedule.name = name;
        }
        if let Some(expression) = input.cron_expression {
            cron::validate_schedule_expression(&expression, cron::MIN_INTERVAL_SECONDS)?;
            schedule.cron_expression = expression;
        }
        if let Some(instruction) = input.instruction {
            if instruction.trim().is_empty() {
                return Err(Error::InvalidInput(
                    "schedule instruction must not be empty".into(),
                ));
            }
            schedule.instruction = instruction;
        }
        if let Some(enabled) = input.enabled {
            schedule.enabled = enabled;
        }

        let now = self.clock.now();
        schedule.next_run_at = if schedule.enabled {
            cron::next_run_after(&schedule.cron_expression, now)?
        } else {
            None
        };
        schedule.updated_at = now;
        self.store.update(&schedule).await?;
        Ok(schedule)
    }

    pub async fn list(&self, org_id: OrgId) -> Result<Vec<ScheduleDescriptor>> {
        self.store.list(org_id).await
    }

    pub async fn delete(&self, org_id: OrgId, id: Uuid) -> Result<bool> {
        self.store.delete(org_id, id).await
    }

    /// One poll tick: atomically claim every due row, then launch each
    /// claimed run in the background. The tick never awaits executions.
    /// Returns how many rows this caller claimed.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn poll_once(&self) -> Result<usize> {
        let now = self.clock.now();
        let claimed = self.store.claim_due(now).await?;
        let claimed_count = claimed.len();

        for schedule in claimed {
            let schedule_id = schedule.id;

            let already_running = {
                let mut running = self.running.lock().await;
                if running.contains(&schedule_id) {
                    true
                } else {
                    running.insert(schedule_id);
                    false
                }
            };

            if already_running {
                // Skip the execution but repersist a future fire time so
                // the row does not sit claimed forever.
                let next = self.next_or_fallback(&schedule);
                tracing::warn!(
                    %schedule_id,
                    "schedule still running from a previous claim; skipping this fire"
                );
                self.store.finish_run(schedule_id, Some(next)).await?;
                continue;
            }

            let store = self.store.clone();
            let runner = self.runner.clone();
            let running = self.running.clone();
            let clock = self.clock.clone();
            tokio::spawn(async move {
                if let Err(e) = runner.run_schedule(&schedule).await {
                    tracing::error!(%schedule_id, error = %e, "scheduled agent run failed");
                }
                running.lock().await.remove(&schedule_id);

                let next = next_run_or_fallback(&schedule, clock.now());
                if let Err(e) = store.finish_run(schedule_id, Some(next)).await {
                    tracing::error!(%schedule_id, error = %e, "failed to persist recomputed next run");
                }
            });
        }

        Ok(claimed_count)
    }

    /// Manual trigger: same execution function as the poll path, but a
    /// schedule that is already running is an explicit error rather than
    /// a silent skip, since this is a direct user action.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn execute_by_id(&self, org_id: OrgId, id: Uuid) -> Result<()> {
        let schedule = self
            .store
            .get(org_id, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("schedule {id}")))?;

        {
            let mut running = self.running.lock().await;
            if running.contains(&id) {
                return Err(Error::Conflict(format!(
                    "schedule {id} is already running"
                )));
            }
            running.insert(id);
        }

        let result = self.runner.run_schedule(&schedule).await;
        self.running.lock().await.remove(&id);

        let next = self.next_or_fallback(&schedule);
        self.store.finish_run(id, Some(next)).await?;

        result.map_err(|e| Error::BackendMessage(format!("schedule execution failed: {e}")))
    }

    /// Spawns the tick loop.
    pub async fn start(self: Arc<Self>, tick: std::time::Duration) {
        let runtime = self.clone();
        let shutdown = self.shutdown.child_token();
        let handle = tokio::spawn(async move {
            tracing::info!(tick_seconds = tick.as_secs(), "scheduler loop started");
            let mut interval = tokio::time::interval(tick);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("scheduler loop received shutdown signal");
                        break;
                    }
                    _ = interval.tick() => {}
                }
                if let Err(e) = runtime.poll_once().await {
                    tracing::error!(error = %e, "scheduler poll failed");
                }
            }
        });
        self.background_tasks.lock().await.push(handle);
    }

    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles = {
            let mut guard = self.background_tasks.lock().await;
            std::mem::take(&mut *guard)
        };
        for handle in handles {
            match tokio::time::timeout(std::time::Duration::from_secs(5), handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "scheduler background task join failed");
                }
                Err(_) => {
                    tracing::warn!("timed out waiting for scheduler task shutdown");
                }
            }
        }
    }

    fn next_or_fallback(&self, schedule: &ScheduleDescriptor) -> DateTime<Utc> {
        next_run_or_fallback(schedule, self.clock.now())
    }
}

/// A claimed row must never be left with a null `next_run_at`; when the
/// expression stops yielding occurrences (or was corrupted in storage)
/// fall back to an hour out and keep the schedule claimable.
fn next_run_or_fallback(schedule: &ScheduleDescriptor, from: DateTime<Utc>) -> DateTime<Utc> {
    match cron::next_run_after(&schedule.cron_expression, from) {
        Ok(Some(next)) => next,
        Ok(None) => from + Duration::hours(1),
        Err(e) => {
            tracing::error!(
                schedule_id = %schedule.id,
                error = %e,
                "stored cron expression failed to evaluate; using fallback"
            );
            from + Duration::hours(1)
        }
    }
}
