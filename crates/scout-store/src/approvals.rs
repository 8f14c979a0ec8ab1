use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row};
use serde_json::Value;
use uuid::Uuid;

use scout_core::{ApprovalItem, ApprovalStatus, ApprovalStore, Result, ScoutError};

use crate::store::{SqliteStore, db_err, parse_ts, ts};

const COLUMNS: &str = "id, user_id, agent_type, action, payload, status, rationale, confidence, decided_at, expires_at, created_at";

/// Raw column values, converted outside the rusqlite row closure so that
/// parse failures surface as store errors.
struct ApprovalRow {
    id: String,
    user_id: String,
    agent_type: String,
    action: String,
    payload: String,
    status: String,
    rationale: String,
    confidence: f64,
    decided_at: Option<String>,
    expires_at: String,
    created_at: String,
}

impl ApprovalRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            agent_type: row.get(2)?,
            action: row.get(3)?,
            payload: row.get(4)?,
            status: row.get(5)?,
            rationale: row.get(6)?,
            confidence: row.get(7)?,
            decided_at: row.get(8)?,
            expires_at: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    fn into_item(self) -> Result<ApprovalItem> {
        Ok(ApprovalItem {
            id: Uuid::parse_str(&self.id).map_err(db_err)?,
            user_id: self.user_id,
            agent_type: self.agent_type,
            action: self.action,
            payload: serde_json::from_str(&self.payload)?,
            status: self.status.parse().map_err(ScoutError::Store)?,
            rationale: self.rationale,
            confidence: self.confidence,
            decided_at: self.decided_at.as_deref().map(parse_ts).transpose()?,
            expires_at: parse_ts(&self.expires_at)?,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

/// `'pending', 'paused'`, built only from enum values.
fn status_list(statuses: &[ApprovalStatus]) -> String {
    statuses
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

impl SqliteStore {
    fn select_approval(conn: &rusqlite::Connection, id: Uuid) -> Result<Option<ApprovalItem>> {
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM approval_queue WHERE id = ?1"),
                rusqlite::params![id.to_string()],
                ApprovalRow::from_row,
            )
            .optional()
            .map_err(db_err)?;
        row.map(ApprovalRow::into_item).transpose()
    }
}

#[async_trait]
impl ApprovalStore for SqliteStore {
    async fn insert_approval(&self, item: &ApprovalItem) -> Result<()> {
        let payload = serde_json::to_string(&item.payload)?;
        let db = self.conn();
        db.execute(
            &format!(
                "INSERT INTO approval_queue ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            rusqlite::params![
                item.id.to_string(),
                item.user_id,
                item.agent_type,
                item.action,
                payload,
                item.status.as_str(),
                item.rationale,
                item.confidence,
                item.decided_at.map(ts),
                ts(item.expires_at),
                ts(item.created_at),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_approval(&self, id: Uuid) -> Result<Option<ApprovalItem>> {
        let db = self.conn();
        Self::select_approval(&db, id)
    }

    async fn list_approvals(
        &self,
        user_id: &str,
        status: Option<ApprovalStatus>,
    ) -> Result<Vec<ApprovalItem>> {
        let db = self.conn();
        let mut stmt = db
            .prepare(&format!(
                "SELECT {COLUMNS} FROM approval_queue
                 WHERE user_id = ?1 AND (?2 IS NULL OR status = ?2)
                 ORDER BY created_at DESC"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(
                rusqlite::params![user_id, status.map(|s| s.as_str())],
                ApprovalRow::from_row,
            )
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        rows.into_iter().map(ApprovalRow::into_item).collect()
    }

    async fn transition_approval(
        &self,
        id: Uuid,
        from: &[ApprovalStatus],
        to: ApprovalStatus,
        payload: Option<&Value>,
        decided_at: Option<DateTime<Utc>>,
    ) -> Result<Option<ApprovalItem>> {
        if from.is_empty() {
            return Ok(None);
        }
        let payload = payload.map(serde_json::to_string).transpose()?;
        let db = self.conn();
        let changed = db
            .execute(
                &format!(
                    "UPDATE approval_queue
                     SET status = ?2,
                         payload = COALESCE(?3, payload),
                         decided_at = COALESCE(?4, decided_at)
                     WHERE id = ?1 AND status IN ({})",
                    status_list(from)
                ),
                rusqlite::params![id.to_string(), to.as_str(), payload, decided_at.map(ts)],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Ok(None);
        }
        Self::select_approval(&db, id)
    }

    async fn pause_pending(&self, user_id: &str) -> Result<usize> {
        let db = self.conn();
        db.execute(
            "UPDATE approval_queue SET status = 'paused' WHERE user_id = ?1 AND status = 'pending'",
            rusqlite::params![user_id],
        )
        .map_err(db_err)
    }

    async fn expire_pending_before(&self, now: DateTime<Utc>) -> Result<usize> {
        let db = self.conn();
        db.execute(
            "UPDATE approval_queue SET status = 'expired'
             WHERE status = 'pending' AND expires_at <= ?1",
            rusqlite::params![ts(now)],
        )
        .map_err(db_err)
    }
}
