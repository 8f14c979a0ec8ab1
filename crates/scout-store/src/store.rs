use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use scout_core::{Result, ScoutError};

/// The SQLite persistence store behind every persistence trait in
/// `scout_core::store`.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        info!(?path, "opening persistence store");

        let conn = Connection::open(path).map_err(db_err)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(db_err)?;

        // Enable WAL mode for concurrent readers across worker processes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS preferences (
                user_id TEXT PRIMARY KEY,
                autonomy_level INTEGER,
                preferences TEXT NOT NULL DEFAULT 'null',
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS profiles (
                user_id TEXT PRIMARY KEY,
                profile TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS approval_queue (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                agent_type TEXT NOT NULL,
                action TEXT NOT NULL,
                payload TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                rationale TEXT NOT NULL DEFAULT '',
                confidence REAL NOT NULL DEFAULT 0.0,
                decided_at TEXT,
                expires_at TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS agent_outputs (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                agent_type TEXT NOT NULL,
                action TEXT NOT NULL,
                rationale TEXT NOT NULL,
                confidence REAL NOT NULL,
                alternatives TEXT NOT NULL DEFAULT '[]',
                data TEXT NOT NULL DEFAULT 'null',
                requires_approval INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS activity_events (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                title TEXT NOT NULL,
                severity TEXT NOT NULL,
                data TEXT NOT NULL DEFAULT 'null',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS routing_decisions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                task_kind TEXT NOT NULL,
                target TEXT NOT NULL,
                action_kind TEXT NOT NULL,
                gate_outcome TEXT NOT NULL,
                task_handle TEXT NOT NULL,
                decided_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS coord_values (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at TEXT
            );

            CREATE TABLE IF NOT EXISTS coord_hashes (
                key TEXT NOT NULL,
                field TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (key, field)
            );

            CREATE TABLE IF NOT EXISTS coord_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                channel TEXT NOT NULL,
                payload TEXT NOT NULL,
                published_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_approval_user_status ON approval_queue(user_id, status);
            CREATE INDEX IF NOT EXISTS idx_approval_status_expiry ON approval_queue(status, expires_at);
            CREATE INDEX IF NOT EXISTS idx_outputs_user ON agent_outputs(user_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_activity_user ON activity_events(user_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_coord_messages_channel ON coord_messages(channel, id);
            ",
        )
        .map_err(db_err)?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    pub(crate) fn conn(&self) -> parking_lot::MutexGuard<'_, Connection> {
        self.db.lock()
    }
}

pub(crate) fn db_err(e: impl std::fmt::Display) -> ScoutError {
    ScoutError::Store(e.to_string())
}

/// Fixed-width UTC timestamps so text comparison in SQL orders correctly.
pub(crate) fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ScoutError::Store(format!("bad timestamp '{raw}': {e}")))
}
