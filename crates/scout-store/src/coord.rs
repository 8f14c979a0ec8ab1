//! Coordination records kept in the shared database, so every process
//! opening the same file sees the same pause flags, brake state and context
//! cache. Published messages land in an outbox table that pollers read with
//! [`SqliteStore::messages_since`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::time::Duration;

use scout_core::{CoordinationStore, Result, ScoutError};

use crate::store::{SqliteStore, db_err, parse_ts, ts};

/// A message read back from the outbox.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxMessage {
    pub id: i64,
    pub channel: String,
    pub payload: String,
    pub published_at: DateTime<Utc>,
}

fn wrong_type(key: &str) -> ScoutError {
    ScoutError::Coordination(format!("WRONGTYPE operation against key '{key}'"))
}

/// The live plain value at `key`, dropping it first if it has expired.
fn live_value(db: &Connection, key: &str) -> Result<Option<String>> {
    let now = ts(Utc::now());
    db.execute(
        "DELETE FROM coord_values WHERE key = ?1 AND expires_at IS NOT NULL AND expires_at <= ?2",
        rusqlite::params![key, now],
    )
    .map_err(db_err)?;
    db.query_row(
        "SELECT value FROM coord_values WHERE key = ?1",
        rusqlite::params![key],
        |row| row.get(0),
    )
    .optional()
    .map_err(db_err)
}

fn is_hash(db: &Connection, key: &str) -> Result<bool> {
    db.query_row(
        "SELECT EXISTS(SELECT 1 FROM coord_hashes WHERE key = ?1)",
        rusqlite::params![key],
        |row| row.get(0),
    )
    .map_err(db_err)
}

impl SqliteStore {
    fn put_value(&self, key: &str, value: &str, expires_at: Option<String>) -> Result<()> {
        let mut db = self.conn();
        let tx = db.transaction().map_err(db_err)?;
        tx.execute(
            "DELETE FROM coord_hashes WHERE key = ?1",
            rusqlite::params![key],
        )
        .map_err(db_err)?;
        tx.execute(
            "INSERT INTO coord_values (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at",
            rusqlite::params![key, value, expires_at],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)
    }

    /// Outbox messages on `channel` with an id above `after_id`, oldest first.
    pub fn messages_since(
        &self,
        channel: &str,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<OutboxMessage>> {
        let db = self.conn();
        let mut stmt = db
            .prepare(
                "SELECT id, channel, payload, published_at FROM coord_messages
                 WHERE channel = ?1 AND id > ?2
                 ORDER BY id ASC
                 LIMIT ?3",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(
                rusqlite::params![channel, after_id, limit as i64],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .map_err(db_err)?;

        let mut messages = Vec::new();
        for row in rows {
            let (id, channel, payload, published_at) = row.map_err(db_err)?;
            messages.push(OutboxMessage {
                id,
                channel,
                payload,
                published_at: parse_ts(&published_at)?,
            });
        }
        Ok(messages)
    }

    /// Drop outbox messages published before `before`. Returns how many.
    pub fn prune_messages(&self, before: DateTime<Utc>) -> Result<usize> {
        let db = self.conn();
        db.execute(
            "DELETE FROM coord_messages WHERE published_at < ?1",
            rusqlite::params![ts(before)],
        )
        .map_err(db_err)
    }
}

#[async_trait]
impl CoordinationStore for SqliteStore {
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.put_value(key, value, None)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let db = self.conn();
        Ok(live_value(&db, key)?.is_some() || is_hash(&db, key)?)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut db = self.conn();
        let existed = live_value(&db, key)?.is_some();
        let tx = db.transaction().map_err(db_err)?;
        tx.execute(
            "DELETE FROM coord_values WHERE key = ?1",
            rusqlite::params![key],
        )
        .map_err(db_err)?;
        let fields = tx
            .execute(
                "DELETE FROM coord_hashes WHERE key = ?1",
                rusqlite::params![key],
            )
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(existed || fields > 0)
    }

    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> Result<()> {
        let mut db = self.conn();
        if live_value(&db, key)?.is_some() {
            return Err(wrong_type(key));
        }
        let tx = db.transaction().map_err(db_err)?;
        for (field, value) in fields {
            tx.execute(
                "INSERT INTO coord_hashes (key, field, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key, field) DO UPDATE SET value = excluded.value",
                rusqlite::params![key, field, value],
            )
            .map_err(db_err)?;
        }
        tx.commit().map_err(db_err)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let db = self.conn();
        if live_value(&db, key)?.is_some() {
            return Err(wrong_type(key));
        }
        let mut stmt = db
            .prepare("SELECT field, value FROM coord_hashes WHERE key = ?1")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(rusqlite::params![key], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<HashMap<_, _>>>()
            .map_err(db_err)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let db = self.conn();
        match live_value(&db, key)? {
            Some(value) => Ok(Some(value)),
            None if is_hash(&db, key)? => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        // A TTL past the representable range never expires.
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .filter(|at| at.timestamp() < 253_402_300_800)
            .map(ts);
        self.put_value(key, value, expires_at)
    }

    /// Appends to the outbox. Nothing is pushed to live subscribers, so the
    /// count is always zero.
    async fn publish(&self, channel: &str, payload: &str) -> Result<usize> {
        let db = self.conn();
        db.execute(
            "INSERT INTO coord_messages (channel, payload, published_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![channel, payload, ts(Utc::now())],
        )
        .map_err(db_err)?;
        Ok(0)
    }
}
