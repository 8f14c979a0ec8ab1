use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::types::UserId;

/// Well-known event types. Agent completions use `"<agent>.completed"`.
pub mod types {
    pub const BRAKE_ACTIVATED: &str = "brake.activated";
    pub const BRAKE_PAUSED: &str = "brake.paused";
    pub const BRAKE_PARTIAL: &str = "brake.partial";
    pub const BRAKE_RESUMED: &str = "brake.resumed";
    pub const APPROVAL_NEW: &str = "approval.new";
    pub const APPROVAL_APPROVED: &str = "approval.approved";
    pub const APPROVAL_REJECTED: &str = "approval.rejected";

    pub fn agent_completed(agent_type: &str) -> String {
        format!("{agent_type}.completed")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Action,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Action => "action",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// Append-only audit/notification record, mirrored to the user's channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: Uuid,
    pub user_id: UserId,
    pub event_type: String,
    pub title: String,
    pub severity: Severity,
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

impl ActivityEvent {
    pub fn new(
        user_id: &str,
        event_type: impl Into<String>,
        title: impl Into<String>,
        severity: Severity,
        data: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            event_type: event_type.into(),
            title: title.into(),
            severity,
            data,
            created_at: Utc::now(),
        }
    }

    /// The wire shape published on the coordination bus.
    pub fn to_published(&self) -> PublishedEvent {
        PublishedEvent {
            event_type: self.event_type.clone(),
            event_id: self.id,
            timestamp: self.created_at,
            user_id: self.user_id.clone(),
            title: self.title.clone(),
            severity: self.severity,
            data: self.data.clone(),
        }
    }
}

/// JSON payload of every published notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub user_id: UserId,
    pub title: String,
    pub severity: Severity,
    pub data: Value,
}
