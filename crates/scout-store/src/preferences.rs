use async_trait::async_trait;
use chrono::Utc;
use rusqlite::OptionalExtension;
use serde_json::Value;

use scout_core::{PreferenceStore, Result};

use crate::store::{SqliteStore, db_err, ts};

#[async_trait]
impl PreferenceStore for SqliteStore {
    async fn autonomy_level(&self, user_id: &str) -> Result<Option<u8>> {
        let db = self.conn();
        let level: Option<Option<i64>> = db
            .query_row(
                "SELECT autonomy_level FROM preferences WHERE user_id = ?1",
                rusqlite::params![user_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        Ok(level.flatten().map(|l| l.clamp(0, u8::MAX as i64) as u8))
    }

    async fn set_autonomy_level(&self, user_id: &str, level: u8) -> Result<()> {
        let db = self.conn();
        db.execute(
            "INSERT INTO preferences (user_id, autonomy_level, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                autonomy_level = excluded.autonomy_level,
                updated_at = excluded.updated_at",
            rusqlite::params![user_id, level as i64, ts(Utc::now())],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn preferences(&self, user_id: &str) -> Result<Value> {
        let raw: Option<String> = {
            let db = self.conn();
            db.query_row(
                "SELECT preferences FROM preferences WHERE user_id = ?1",
                rusqlite::params![user_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?
        };
        match raw {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Value::Null),
        }
    }

    async fn set_preferences(&self, user_id: &str, preferences: &Value) -> Result<()> {
        let json = serde_json::to_string(preferences)?;
        let db = self.conn();
        db.execute(
            "INSERT INTO preferences (user_id, preferences, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                preferences = excluded.preferences,
                updated_at = excluded.updated_at",
            rusqlite::params![user_id, json, ts(Utc::now())],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn profile(&self, user_id: &str) -> Result<Value> {
        let raw: Option<String> = {
            let db = self.conn();
            db.query_row(
                "SELECT profile FROM profiles WHERE user_id = ?1",
                rusqlite::params![user_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?
        };
        match raw {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Value::Null),
        }
    }

    async fn set_profile(&self, user_id: &str, profile: &Value) -> Result<()> {
        let json = serde_json::to_string(profile)?;
        let db = self.conn();
        db.execute(
            "INSERT INTO profiles (user_id, profile, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                profile = excluded.profile,
                updated_at = excluded.updated_at",
            rusqlite::params![user_id, json, ts(Utc::now())],
        )
        .map_err(db_err)?;
        Ok(())
    }
}
