use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::types::UserId;

/// Lifecycle of an approval queue item.
///
/// ```text
/// pending ──► approved | rejected | expired | paused
/// paused  ──► approved | rejected | expired      (only after resume)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
    Paused,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
            Self::Paused => "paused",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Expired)
    }

    /// Monotonic transition table. No backward moves, nothing leaves a
    /// terminal state, and paused never returns to pending.
    pub fn can_transition_to(&self, next: ApprovalStatus) -> bool {
        use ApprovalStatus::*;
        match self {
            Pending => matches!(next, Approved | Rejected | Expired | Paused),
            Paused => matches!(next, Approved | Rejected | Expired),
            Approved | Rejected | Expired => false,
        }
    }

    /// States that may move to `next`.
    pub fn sources_of(next: ApprovalStatus) -> Vec<ApprovalStatus> {
        [Self::Pending, Self::Paused]
            .into_iter()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "expired" => Ok(Self::Expired),
            "paused" => Ok(Self::Paused),
            other => Err(format!("unknown approval status '{other}'")),
        }
    }
}

/// A gated write action waiting for a human decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalItem {
    pub id: Uuid,
    pub user_id: UserId,
    pub agent_type: String,
    pub action: String,
    /// Serialized arguments of the deferred call.
    pub payload: Value,
    pub status: ApprovalStatus,
    pub rationale: String,
    pub confidence: f64,
    pub decided_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ApprovalItem {
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// A persisted agent output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputRecord {
    pub id: Uuid,
    pub user_id: UserId,
    pub agent_type: String,
    pub output: crate::types::AgentOutput,
    pub created_at: DateTime<Utc>,
}

impl OutputRecord {
    pub fn new(user_id: &str, agent_type: &str, output: crate::types::AgentOutput) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            agent_type: agent_type.to_string(),
            output,
            created_at: Utc::now(),
        }
    }
}
