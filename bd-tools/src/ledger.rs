//! Fire-and-forget activity ledger writer.
//!
//! `record` enqueues and returns immediately; a background worker owns
//! the store write with one retry. A full queue or failed write is
//! logged and dropped — ledger persistence must never fail or slow the
//! tool call that produced the entry. Reads and the rollback flip go
//! straight to the store.

use bd_core::ledger::{ActivityRecord, LedgerStore};
use bd_core::models::OrgId;
use bd_core::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

const QUEUE_CAPACITY: usize = 1024;

enum LedgerMessage {
    Append(Box<ActivityRecord>),
    Flush(oneshot::Sender<()>),
}

pub struct ActivityLedger {
    tx: mpsc::Sender<LedgerMessage>,
    store: Arc<dyn LedgerStore>,
}

impl ActivityLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(run_writer(store.clone(), rx));
        Self { tx, store }
    }

    /// Best-effort append, decoupled from the caller's latency budget.
    pub fn record(&self, record: ActivityRecord) {
        let record_id = record.id;
        if let Err(e) = self.tx.try_send(LedgerMessage::Append(Box::new(record))) {
            tracing::error!(%record_id, error = %e, "activity ledger queue rejected record");
        }
    }

    /// Waits until every previously enqueued record has been written.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(LedgerMessage::Flush(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    pub async fn get(&self, org_id: OrgId, id: Uuid) -> Result<Option<ActivityRecord>> {
        self.store.get(org_id, id).await
    }

    pub async fn mark_rolled_back(&self, org_id: OrgId, id: Uuid) -> Result<bool> {
        self.store.mark_rolled_back(org_id, id).await
    }

    pub async fn list_recent(&self, org_id: OrgId, limit: usize) -> Result<Vec<ActivityRecord>> {
        self.store.list_recent(org_id, limit).await
    }
}

async fn run_writer(store: Arc<dyn LedgerStore>, mut rx: mpsc::Receiver<LedgerMessage>) {
    while let Some(message) = rx.recv().await {
        match message {
            LedgerMessage::Append(record) => {
                if let Err(first) = store.append(&record).await {
                    tracing::warn!(record_id = %record.id, error = %first, "ledger write failed; retrying once");
                    if let Err(second) = store.append(&record).await {
                        tracing::error!(record_id = %record.id, error = %second, "ledger write dropped after retry");
                    }
                }
            }
            LedgerMessage::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bd_core::dev::DevLedgerStore;
    use bd_core::ledger::ActivityStatus;
    use bd_core::models::{ProjectId, UserId};
    use chrono::Utc;

    fn record(org_id: OrgId) -> ActivityRecord {
        ActivityRecord {
            id: Uuid::new_v4(),
            org_id,
            project_id: ProjectId(Uuid::nil()),
            user_id: UserId(Uuid::nil()),
            session_id: Uuid::new_v4(),
            tool_name: "create_task".to_string(),
            input: serde_json::json!({}),
            output: None,
            error: None,
            status: ActivityStatus::Completed,
            requires_approval: false,
            approval_status: None,
            affected_entity_ids: vec![],
            snapshot_before: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn records_are_written_in_the_background() {
        let org = OrgId(Uuid::nil());
        let store = Arc::new(DevLedgerStore::new());
        let ledger = ActivityLedger::new(store);

        let entry = record(org);
        let id = entry.id;
        ledger.record(entry);
        ledger.flush().await;

        assert!(ledger.get(org, id).await.unwrap().is_some());
    }
}
