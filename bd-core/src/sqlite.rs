//! Sqlite-backed stores for the persistent coordination state: the
//! activity ledger, schedules, and webhook registrations.
//!
//! All three share one connection behind a mutex; the conditional
//! updates (`claim_due`, `mark_rolled_back`) run inside a transaction so
//! they keep their exactly-once semantics across concurrent callers.
//! Timestamps are stored as fixed-width RFC 3339 UTC strings, which
//! makes string comparison in SQL agree with chronological order.

use crate::ledger::{ActivityRecord, ActivityStatus, LedgerStore};
use crate::models::{OrgId, ProjectId, UserId};
use crate::schedule::{ScheduleDescriptor, ScheduleStore};
use crate::webhook::{WebhookEndpoint, WebhookStore};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const SCHEMA_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS bp_activity (
    id TEXT PRIMARY KEY,
    org_id TEXT NOT NULL,
    project_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    session_id TEXT NOT NULL,
    tool_name TEXT NOT NULL,
    input_json TEXT NOT NULL,
    output_json TEXT,
    error TEXT,
    status TEXT NOT NULL,
    requires_approval INTEGER NOT NULL,
    approval_status TEXT,
    affected_ids_json TEXT NOT NULL,
    snapshot_json TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS bp_activity_org_created_idx
    ON bp_activity (org_id, created_at);

CREATE TABLE IF NOT EXISTS bp_schedules (
    id TEXT PRIMARY KEY,
    org_id TEXT NOT NULL,
    project_id TEXT NOT NULL,
    name TEXT NOT NULL,
    cron_expression TEXT NOT NULL,
    instruction TEXT NOT NULL,
    enabled INTEGER NOT NULL,
    created_by TEXT NOT NULL,
    last_run_at TEXT,
    next_run_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS bp_schedules_due_idx
    ON bp_schedules (enabled, next_run_at);

CREATE TABLE IF NOT EXISTS bp_webhooks (
    id TEXT PRIMARY KEY,
    org_id TEXT NOT NULL,
    project_id TEXT NOT NULL,
    name TEXT NOT NULL,
    secret_ciphertext TEXT NOT NULL,
    instruction TEXT NOT NULL,
    enabled INTEGER NOT NULL,
    created_by TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

/// Shared handle over one sqlite database holding the three persistent
/// tables. Clone-cheap; each store keeps the same connection.
#[derive(Clone)]
pub struct SqliteStores {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStores {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::backend("sqlite open", e))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::backend("sqlite open", e))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_DDL)
            .map_err(|e| Error::backend("sqlite schema", e))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn ledger(&self) -> SqliteLedgerStore {
        SqliteLedgerStore {
            conn: self.conn.clone(),
        }
    }

    pub fn schedules(&self) -> SqliteScheduleStore {
        SqliteScheduleStore {
            conn: self.conn.clone(),
        }
    }

    pub fn webhooks(&self) -> SqliteWebhookStore {
        SqliteWebhookStore {
            conn: self.conn.clone(),
        }
    }
}

pub struct SqliteLedgerStore {
    conn: Arc<Mutex<Connection>>,
}

pub struct SqliteScheduleStore {
    conn: Arc<Mutex<Connection>>,
}

pub struct SqliteWebhookStore {
    conn: Arc<Mutex<Connection>>,
}

fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::BackendMessage(format!("bad stored timestamp {s:?}: {e}")))
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::BackendMessage(format!("bad stored uuid {s:?}: {e}")))
}

fn db_err(e: rusqlite::Error) -> Error {
    Error::backend("sqlite", e)
}

fn lock<'a>(conn: &'a Arc<Mutex<Connection>>) -> Result<std::sync::MutexGuard<'a, Connection>> {
    conn.lock()
        .map_err(|_| Error::BackendMessage("sqlite connection mutex poisoned".to_string()))
}

fn read_activity(row: &Row<'_>) -> Result<ActivityRecord> {
    let id: String = row.get("id").map_err(db_err)?;
    let org_id: String = row.get("org_id").map_err(db_err)?;
    let project_id: String = row.get("project_id").map_err(db_err)?;
    let user_id: String = row.get("user_id").map_err(db_err)?;
    let session_id: String = row.get("session_id").map_err(db_err)?;
    let input_json: String = row.get("input_json").map_err(db_err)?;
    let output_json: Option<String> = row.get("output_json").map_err(db_err)?;
    let snapshot_json: Option<String> = row.get("snapshot_json").map_err(db_err)?;
    let affected_json: String = row.get("affected_ids_json").map_err(db_err)?;
    let status: String = row.get("status").map_err(db_err)?;
    let created_at: String = row.get("created_at").map_err(db_err)?;

    Ok(ActivityRecord {
        id: parse_uuid(&id)?,
        org_id: OrgId(parse_uuid(&org_id)?),
        project_id: ProjectId(parse_uuid(&project_id)?),
        user_id: UserId(parse_uuid(&user_id)?),
        session_id: parse_uuid(&session_id)?,
        tool_name: row.get("tool_name").map_err(db_err)?,
        input: serde_json::from_str(&input_json).unwrap_or(serde_json::Value::Null),
        output: output_json.and_then(|s| serde_json::from_str(&s).ok()),
        error: row.get("error").map_err(db_err)?,
        status: ActivityStatus::from_str(&status)?,
        requires_approval: row.get::<_, i64>("requires_approval").map_err(db_err)? != 0,
        approval_status: row.get("approval_status").map_err(db_err)?,
        affected_entity_ids: serde_json::from_str(&affected_json).unwrap_or_default(),
        snapshot_before: snapshot_json.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: parse_ts(&created_at)?,
    })
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn append(&self, record: &ActivityRecord) -> Result<()> {
        let conn = lock(&self.conn)?;
        let affected_json = serde_json::to_string(&record.affected_entity_ids)
            .map_err(|e| Error::backend("serialize affected ids", e))?;
        let snapshot_json = match &record.snapshot_before {
            Some(v) => Some(
                serde_json::to_string(v).map_err(|e| Error::backend("serialize snapshot", e))?,
            ),
            None => None,
        };
        let output_json = match &record.output {
            Some(v) => {
                Some(serde_json::to_string(v).map_err(|e| Error::backend("serialize output", e))?)
            }
            None => None,
        };
        conn.execute(
            r#"
INSERT INTO bp_activity (
    id, org_id, project_id, user_id, session_id, tool_name,
    input_json, output_json, error, status, requires_approval,
    approval_status, affected_ids_json, snapshot_json, created_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
"#,
            params![
                record.id.to_string(),
                record.org_id.to_string(),
                record.project_id.to_string(),
                record.user_id.to_string(),
                record.session_id.to_string(),
                record.tool_name,
                record.input.to_string(),
                output_json,
                record.error,
                record.status.as_str(),
                record.requires_approval as i64,
                record.approval_status,
                affected_json,
                snapshot_json,
                fmt_ts(record.created_at),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, org_id: OrgId, id: Uuid) -> Result<Option<ActivityRecord>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn
            .prepare("SELECT * FROM bp_activity WHERE id = ?1 AND org_id = ?2 LIMIT 1")
            .map_err(db_err)?;
        let mut rows = stmt
            .query(params![id.to_string(), org_id.to_string()])
            .map_err(db_err)?;
        match rows.next().map_err(db_err)? {
            Some(row) => Ok(Some(read_activity(row)?)),
            None => Ok(None),
        }
    }

    async fn mark_rolled_back(&self, org_id: OrgId, id: Uuid) -> Result<bool> {
        let conn = lock(&self.conn)?;
        let changed = conn
            .execute(
                r#"
UPDATE bp_activity SET status = 'rolled_back'
 WHERE id = ?1 AND org_id = ?2 AND status = 'completed'
"#,
                params![id.to_string(), org_id.to_string()],
            )
            .map_err(db_err)?;
        Ok(changed == 1)
    }

    async fn list_recent(&self, org_id: OrgId, limit: usize) -> Result<Vec<ActivityRecord>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn
            .prepare(
                "SELECT * FROM bp_activity WHERE org_id = ?1 ORDER BY created_at DESC LIMIT ?2",
            )
            .map_err(db_err)?;
        let mut rows = stmt
            .query(params![org_id.to_string(), limit as i64])
            .map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(db_err)? {
            out.push(read_activity(row)?);
        }
        Ok(out)
    }
}

fn read_schedule(row: &Row<'_>) -> Result<ScheduleDescriptor> {
    let id: String = row.get("id").map_err(db_err)?;
    let org_id: String = row.get("org_id").map_err(db_err)?;
    let project_id: String = row.get("project_id").map_err(db_err)?;
    let created_by: String = row.get("created_by").map_err(db_err)?;
    let last_run_at: Option<String> = row.get("last_run_at").map_err(db_err)?;
    let next_run_at: Option<String> = row.get("next_run_at").map_err(db_err)?;
    let created_at: String = row.get("created_at").map_err(db_err)?;
    let updated_at: String = row.get("updated_at").map_err(db_err)?;

    Ok(ScheduleDescriptor {
        id: parse_uuid(&id)?,
        org_id: OrgId(parse_uuid(&org_id)?),
        project_id: ProjectId(parse_uuid(&project_id)?),
        name: row.get("name").map_err(db_err)?,
        cron_expression: row.get("cron_expression").map_err(db_err)?,
        instruction: row.get("instruction").map_err(db_err)?,
        enabled: row.get::<_, i64>("enabled").map_err(db_err)? != 0,
        created_by: UserId(parse_uuid(&created_by)?),
        last_run_at: last_run_at.as_deref().map(parse_ts).transpose()?,
        next_run_at: next_run_at.as_deref().map(parse_ts).transpose()?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

#[async_trait]
impl ScheduleStore for SqliteScheduleStore {
    async fn insert(&self, schedule: &ScheduleDescriptor) -> Result<()> {
        let conn = lock(&self.conn)?;
        conn.execute(
            r#"
INSERT INTO bp_schedules (
    id, org_id, project_id, name, cron_expression, instruction,
    enabled, created_by, last_run_at, next_run_at, created_at, updated_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
"#,
            params![
                schedule.id.to_string(),
                schedule.org_id.to_string(),
                schedule.project_id.to_string(),
                schedule.name,
                schedule.cron_expression,
                schedule.instruction,
                schedule.enabled as i64,
                schedule.created_by.to_string(),
                schedule.last_run_at.map(fmt_ts),
                schedule.next_run_at.map(fmt_ts),
                fmt_ts(schedule.created_at),
                fmt_ts(schedule.updated_at),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, org_id: OrgId, id: Uuid) -> Result<Option<ScheduleDescriptor>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn
            .prepare("SELECT * FROM bp_schedules WHERE id = ?1 AND org_id = ?2 LIMIT 1")
            .map_err(db_err)?;
        let mut rows = stmt
            .query(params![id.to_string(), org_id.to_string()])
            .map_err(db_err)?;
        match rows.next().map_err(db_err)? {
            Some(row) => Ok(Some(read_schedule(row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, org_id: OrgId) -> Result<Vec<ScheduleDescriptor>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn
            .prepare("SELECT * FROM bp_schedules WHERE org_id = ?1 ORDER BY name")
            .map_err(db_err)?;
        let mut rows = stmt.query(params![org_id.to_string()]).map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(db_err)? {
            out.push(read_schedule(row)?);
        }
        Ok(out)
    }

    async fn update(&self, schedule: &ScheduleDescriptor) -> Result<()> {
        let conn = lock(&self.conn)?;
        let changed = conn
            .execute(
                r#"
UPDATE bp_schedules SET
    name = ?2, cron_expression = ?3, instruction = ?4, enabled = ?5,
    last_run_at = ?6, next_run_at = ?7, updated_at = ?8
 WHERE id = ?1
"#,
                params![
                    schedule.id.to_string(),
                    schedule.name,
                    schedule.cron_expression,
                    schedule.instruction,
                    schedule.enabled as i64,
                    schedule.last_run_at.map(fmt_ts),
                    schedule.next_run_at.map(fmt_ts),
                    fmt_ts(schedule.updated_at),
                ],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(Error::NotFound(format!("schedule {}", schedule.id)));
        }
        Ok(())
    }

    async fn delete(&self, org_id: OrgId, id: Uuid) -> Result<bool> {
        let conn = lock(&self.conn)?;
        let changed = conn
            .execute(
                "DELETE FROM bp_schedules WHERE id = ?1 AND org_id = ?2",
                params![id.to_string(), org_id.to_string()],
            )
            .map_err(db_err)?;
        Ok(changed == 1)
    }

    async fn claim_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduleDescriptor>> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction().map_err(db_err)?;
        let now_s = fmt_ts(now);

        let due_ids: Vec<String> = {
            let mut stmt = tx
                .prepare(
                    r#"
SELECT id FROM bp_schedules
 WHERE enabled = 1 AND next_run_at IS NOT NULL AND next_run_at <= ?1
"#,
                )
                .map_err(db_err)?;
            let ids = stmt
                .query_map(params![now_s], |row| row.get::<_, String>(0))
                .map_err(db_err)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(db_err)?;
            ids
        };

        let mut claimed = Vec::new();
        for id in due_ids {
            // The WHERE clause repeats the due condition so a row that a
            // concurrent claimer already nulled is skipped, not re-taken.
            let changed = tx
                .execute(
                    r#"
UPDATE bp_schedules SET next_run_at = NULL, last_run_at = ?1
 WHERE id = ?2 AND enabled = 1 AND next_run_at IS NOT NULL AND next_run_at <= ?1
"#,
                    params![now_s, id],
                )
                .map_err(db_err)?;
            if changed != 1 {
                continue;
            }
            let mut stmt = tx
                .prepare("SELECT * FROM bp_schedules WHERE id = ?1 LIMIT 1")
                .map_err(db_err)?;
            let mut rows = stmt.query(params![id]).map_err(db_err)?;
            if let Some(row) = rows.next().map_err(db_err)? {
                claimed.push(read_schedule(row)?);
            }
        }

        tx.commit().map_err(db_err)?;
        Ok(claimed)
    }

    async fn finish_run(&self, id: Uuid, next_run_at: Option<DateTime<Utc>>) -> Result<()> {
        let conn = lock(&self.conn)?;
        let changed = conn
            .execute(
                "UPDATE bp_schedules SET next_run_at = ?2, updated_at = ?3 WHERE id = ?1",
                params![
                    id.to_string(),
                    next_run_at.map(fmt_ts),
                    fmt_ts(Utc::now())
                ],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(Error::NotFound(format!("schedule {id}")));
        }
        Ok(())
    }
}

fn read_webhook(row: &Row<'_>) -> Result<WebhookEndpoint> {
    let id: String = row.get("id").map_err(db_err)?;
    let org_id: String = row.get("org_id").map_err(db_err)?;
    let project_id: String = row.get("project_id").map_err(db_err)?;
    let created_by: String = row.get("created_by").map_err(db_err)?;
    let created_at: String = row.get("created_at").map_err(db_err)?;

    Ok(WebhookEndpoint {
        id: parse_uuid(&id)?,
        org_id: OrgId(parse_uuid(&org_id)?),
        project_id: ProjectId(parse_uuid(&project_id)?),
        name: row.get("name").map_err(db_err)?,
        secret_ciphertext: row.get("secret_ciphertext").map_err(db_err)?,
        instruction: row.get("instruction").map_err(db_err)?,
        enabled: row.get::<_, i64>("enabled").map_err(db_err)? != 0,
        created_by: UserId(parse_uuid(&created_by)?),
        created_at: parse_ts(&created_at)?,
    })
}

#[async_trait]
impl WebhookStore for SqliteWebhookStore {
    async fn insert(&self, endpoint: &WebhookEndpoint) -> Result<()> {
        let conn = lock(&self.conn)?;
        conn.execute(
            r#"
INSERT INTO bp_webhooks (
    id, org_id, project_id, name, secret_ciphertext, instruction,
    enabled, created_by, created_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
"#,
            params![
                endpoint.id.to_string(),
                endpoint.org_id.to_string(),
                endpoint.project_id.to_string(),
                endpoint.name,
                endpoint.secret_ciphertext,
                endpoint.instruction,
                endpoint.enabled as i64,
                endpoint.created_by.to_string(),
                fmt_ts(endpoint.created_at),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<WebhookEndpoint>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn
            .prepare("SELECT * FROM bp_webhooks WHERE id = ?1 LIMIT 1")
            .map_err(db_err)?;
        let mut rows = stmt.query(params![id.to_string()]).map_err(db_err)?;
        match rows.next().map_err(db_err)? {
            Some(row) => Ok(Some(read_webhook(row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, org_id: OrgId) -> Result<Vec<WebhookEndpoint>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn
            .prepare("SELECT * FROM bp_webhooks WHERE org_id = ?1 ORDER BY name")
            .map_err(db_err)?;
        let mut rows = stmt.query(params![org_id.to_string()]).map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(db_err)? {
            out.push(read_webhook(row)?);
        }
        Ok(out)
    }

    async fn set_enabled(&self, org_id: OrgId, id: Uuid, enabled: bool) -> Result<bool> {
        let conn = lock(&self.conn)?;
        let changed = conn
            .execute(
                "UPDATE bp_webhooks SET enabled = ?3 WHERE id = ?1 AND org_id = ?2",
                params![id.to_string(), org_id.to_string(), enabled as i64],
            )
            .map_err(db_err)?;
        Ok(changed == 1)
    }

    async fn delete(&self, org_id: OrgId, id: Uuid) -> Result<bool> {
        let conn = lock(&self.conn)?;
        let changed = conn
            .execute(
                "DELETE FROM bp_webhooks WHERE id = ?1 AND org_id = ?2",
                params![id.to_string(), org_id.to_string()],
            )
            .map_err(db_err)?;
        Ok(changed == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn org() -> OrgId {
        OrgId(Uuid::nil())
    }

    fn schedule(next_run_at: Option<DateTime<Utc>>) -> ScheduleDescriptor {
        let now = Utc::now();
        ScheduleDescriptor {
            id: Uuid::new_v4(),
            org_id: org(),
            project_id: ProjectId(Uuid::nil()),
            name: "nightly-rollup".to_string(),
            cron_expression: "0 0 2 * * *".to_string(),
            instruction: "archive done column".to_string(),
            enabled: true,
            created_by: UserId(Uuid::nil()),
            last_run_at: None,
            next_run_at,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn schedule_round_trips_and_claims_once() {
        let stores = SqliteStores::open_in_memory().unwrap();
        let schedules = stores.schedules();
        let now = Utc::now();
        let due = schedule(Some(now - Duration::seconds(30)));
        schedules.insert(&due).await.unwrap();

        let claimed = schedules.claim_due(now).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, due.id);
        assert!(claimed[0].next_run_at.is_none());
        assert!(claimed[0].last_run_at.is_some());

        assert!(schedules.claim_due(now).await.unwrap().is_empty());

        schedules
            .finish_run(due.id, Some(now + Duration::hours(1)))
            .await
            .unwrap();
        let stored = schedules.get(org(), due.id).await.unwrap().unwrap();
        assert!(stored.next_run_at.is_some());
    }

    #[tokio::test]
    async fn ledger_rollback_flip_is_conditional() {
        let stores = SqliteStores::open_in_memory().unwrap();
        let ledger = stores.ledger();
        let record = ActivityRecord {
            id: Uuid::new_v4(),
            org_id: org(),
            project_id: ProjectId(Uuid::nil()),
            user_id: UserId(Uuid::nil()),
            session_id: Uuid::new_v4(),
            tool_name: "update_task".to_string(),
            input: serde_json::json!({"title": "new"}),
            output: Some(serde_json::json!({"ok": true})),
            error: None,
            status: ActivityStatus::Completed,
            requires_approval: false,
            approval_status: None,
            affected_entity_ids: vec!["t1".to_string()],
            snapshot_before: Some(serde_json::json!({"operation": "update"})),
            created_at: Utc::now(),
        };
        ledger.append(&record).await.unwrap();

        let loaded = ledger.get(org(), record.id).await.unwrap().unwrap();
        assert_eq!(loaded.tool_name, "update_task");
        assert_eq!(loaded.affected_entity_ids, vec!["t1".to_string()]);
        assert!(loaded.snapshot_before.is_some());

        assert!(ledger.mark_rolled_back(org(), record.id).await.unwrap());
        assert!(!ledger.mark_rolled_back(org(), record.id).await.unwrap());
    }

    #[tokio::test]
    async fn webhook_rows_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boardpilot.db");
        let endpoint = WebhookEndpoint {
            id: Uuid::new_v4(),
            org_id: org(),
            project_id: ProjectId(Uuid::nil()),
            name: "ci-events".to_string(),
            secret_ciphertext: "c2VjcmV0".to_string(),
            instruction: "file a task for failed builds".to_string(),
            enabled: true,
            created_by: UserId(Uuid::nil()),
            created_at: Utc::now(),
        };

        {
            let stores = SqliteStores::open(&path).unwrap();
            stores.webhooks().insert(&endpoint).await.unwrap();
        }

        let stores = SqliteStores::open(&path).unwrap();
        let loaded = stores.webhooks().get(endpoint.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "ci-events");
        assert!(loaded.enabled);
    }
}
