//! Append-mostly records: agent outputs, activity events, routing decisions.

use async_trait::async_trait;
use uuid::Uuid;

use scout_core::{
    ActivityEvent, ActivityLog, AgentOutput, OutputRecord, OutputStore, Result, RoutingDecision,
    RoutingLog, Severity,
};

use crate::store::{SqliteStore, db_err, parse_ts, ts};

fn parse_severity(raw: &str) -> Severity {
    match raw {
        "critical" => Severity::Critical,
        "warning" => Severity::Warning,
        "action" => Severity::Action,
        _ => Severity::Info,
    }
}

#[async_trait]
impl OutputStore for SqliteStore {
    async fn save_output(&self, record: &OutputRecord) -> Result<()> {
        let alternatives = serde_json::to_string(&record.output.alternatives_considered)?;
        let data = serde_json::to_string(&record.output.data)?;
        let db = self.conn();
        db.execute(
            "INSERT INTO agent_outputs
                (id, user_id, agent_type, action, rationale, confidence, alternatives, data, requires_approval, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                record.id.to_string(),
                record.user_id,
                record.agent_type,
                record.output.action,
                record.output.rationale,
                record.output.confidence,
                alternatives,
                data,
                record.output.requires_approval as i32,
                ts(record.created_at),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn recent_outputs(&self, user_id: &str, limit: usize) -> Result<Vec<OutputRecord>> {
        type Raw = (String, String, String, String, f64, String, String, i32, String);
        let rows: Vec<Raw> = {
            let db = self.conn();
            let mut stmt = db
                .prepare(
                    "SELECT id, agent_type, action, rationale, confidence, alternatives, data, requires_approval, created_at
                     FROM agent_outputs
                     WHERE user_id = ?1
                     ORDER BY created_at DESC
                     LIMIT ?2",
                )
                .map_err(db_err)?;
            let rows = stmt.query_map(rusqlite::params![user_id, limit as i64], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                ))
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
            rows
        };

        rows.into_iter()
            .map(
                |(id, agent_type, action, rationale, confidence, alternatives, data, requires_approval, created_at)|
                 -> Result<OutputRecord> {
                    Ok(OutputRecord {
                        id: Uuid::parse_str(&id).map_err(db_err)?,
                        user_id: user_id.to_string(),
                        agent_type,
                        output: AgentOutput {
                            action,
                            rationale,
                            confidence,
                            alternatives_considered: serde_json::from_str(&alternatives)?,
                            data: serde_json::from_str(&data)?,
                            requires_approval: requires_approval != 0,
                        },
                        created_at: parse_ts(&created_at)?,
                    })
                },
            )
            .collect()
    }
}

#[async_trait]
impl ActivityLog for SqliteStore {
    async fn append_activity(&self, event: &ActivityEvent) -> Result<()> {
        let data = serde_json::to_string(&event.data)?;
        let db = self.conn();
        db.execute(
            "INSERT INTO activity_events (id, user_id, event_type, title, severity, data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                event.id.to_string(),
                event.user_id,
                event.event_type,
                event.title,
                event.severity.as_str(),
                data,
                ts(event.created_at),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn recent_activity(&self, user_id: &str, limit: usize) -> Result<Vec<ActivityEvent>> {
        type Raw = (String, String, String, String, String, String);
        let rows: Vec<Raw> = {
            let db = self.conn();
            let mut stmt = db
                .prepare(
                    "SELECT id, event_type, title, severity, data, created_at
                     FROM activity_events
                     WHERE user_id = ?1
                     ORDER BY created_at DESC
                     LIMIT ?2",
                )
                .map_err(db_err)?;
            let rows = stmt.query_map(rusqlite::params![user_id, limit as i64], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
            rows
        };

        rows.into_iter()
            .map(|(id, event_type, title, severity, data, created_at)| -> Result<ActivityEvent> {
                Ok(ActivityEvent {
                    id: Uuid::parse_str(&id).map_err(db_err)?,
                    user_id: user_id.to_string(),
                    event_type,
                    title,
                    severity: parse_severity(&severity),
                    data: serde_json::from_str(&data)?,
                    created_at: parse_ts(&created_at)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl RoutingLog for SqliteStore {
    async fn record_routing(&self, decision: &RoutingDecision) -> Result<()> {
        let db = self.conn();
        db.execute(
            "INSERT INTO routing_decisions
                (id, user_id, task_kind, target, action_kind, gate_outcome, task_handle, decided_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                decision.id.to_string(),
                decision.user_id,
                decision.task_kind,
                decision.target,
                decision.action_kind.as_str(),
                decision.gate_outcome,
                decision.task_handle,
                ts(decision.decided_at),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }
}

impl SqliteStore {
    /// Number of routing decisions recorded for a user.
    pub fn routing_count(&self, user_id: &str) -> Result<usize> {
        let db = self.conn();
        let count: i64 = db
            .query_row(
                "SELECT COUNT(*) FROM routing_decisions WHERE user_id = ?1",
                rusqlite::params![user_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count as usize)
    }
}
