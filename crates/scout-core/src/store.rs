//! Persistence-store seams. `scout-store` provides the SQLite implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::approval::{ApprovalItem, ApprovalStatus, OutputRecord};
use crate::error::Result;
use crate::event::ActivityEvent;
use crate::types::RoutingDecision;

#[async_trait]
pub trait ApprovalStore: Send + Sync {
    async fn insert_approval(&self, item: &ApprovalItem) -> Result<()>;

    async fn get_approval(&self, id: Uuid) -> Result<Option<ApprovalItem>>;

    /// Items for a user, newest first, optionally filtered by status.
    async fn list_approvals(
        &self,
        user_id: &str,
        status: Option<ApprovalStatus>,
    ) -> Result<Vec<ApprovalItem>>;

    /// Move one item to `to` if and only if its current status is in `from`,
    /// committed as a single-record transaction. A replacement payload and
    /// decision timestamp are written in the same commit. Returns `None` when
    /// the item's status did not match.
    async fn transition_approval(
        &self,
        id: Uuid,
        from: &[ApprovalStatus],
        to: ApprovalStatus,
        payload: Option<&Value>,
        decided_at: Option<DateTime<Utc>>,
    ) -> Result<Option<ApprovalItem>>;

    /// Mark every pending item of the user as paused. Returns the count.
    async fn pause_pending(&self, user_id: &str) -> Result<usize>;

    /// Expire every pending item whose deadline is at or before `now`.
    /// Items in any other status are untouched.
    async fn expire_pending_before(&self, now: DateTime<Utc>) -> Result<usize>;
}

#[async_trait]
pub trait OutputStore: Send + Sync {
    async fn save_output(&self, record: &OutputRecord) -> Result<()>;

    async fn recent_outputs(&self, user_id: &str, limit: usize) -> Result<Vec<OutputRecord>>;
}

#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn append_activity(&self, event: &ActivityEvent) -> Result<()>;

    async fn recent_activity(&self, user_id: &str, limit: usize) -> Result<Vec<ActivityEvent>>;
}

#[async_trait]
pub trait RoutingLog: Send + Sync {
    async fn record_routing(&self, decision: &RoutingDecision) -> Result<()>;
}

/// User profile and preference records.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// The persisted autonomy level (0..=3), if the user ever set one.
    async fn autonomy_level(&self, user_id: &str) -> Result<Option<u8>>;

    async fn set_autonomy_level(&self, user_id: &str, level: u8) -> Result<()>;

    /// Free-form preferences object; `Value::Null` when unset.
    async fn preferences(&self, user_id: &str) -> Result<Value>;

    async fn set_preferences(&self, user_id: &str, preferences: &Value) -> Result<()>;

    /// Free-form profile object; `Value::Null` when unset.
    async fn profile(&self, user_id: &str) -> Result<Value>;

    async fn set_profile(&self, user_id: &str, profile: &Value) -> Result<()>;
}
