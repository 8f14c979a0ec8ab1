use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Identity of an end user. All per-user state is keyed by this.
pub type UserId = String;

/// Action prefix applied to outputs of suggestion-only runs.
pub const SUGGEST_PREFIX: &str = "suggest:";

/// Action name of the synthetic output returned when a write is deferred.
pub const QUEUED_FOR_APPROVAL: &str = "queued_for_approval";

/// Whether a capability only observes or also changes the outside world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Read,
    Write,
}

impl ActionKind {
    /// Lowest autonomy tier (as its numeric level) that can perform this kind
    /// of action in any form.
    pub fn minimum_level(&self) -> u8 {
        match self {
            Self::Read => 0,
            Self::Write => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result every capability emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub action: String,
    pub rationale: String,
    /// Clamped to 0.0..=1.0.
    pub confidence: f64,
    #[serde(default)]
    pub alternatives_considered: Vec<String>,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub requires_approval: bool,
}

impl AgentOutput {
    pub fn new(action: impl Into<String>, rationale: impl Into<String>, confidence: f64) -> Self {
        Self {
            action: action.into(),
            rationale: rationale.into(),
            confidence: confidence.clamp(0.0, 1.0),
            alternatives_considered: Vec::new(),
            data: Value::Null,
            requires_approval: false,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_alternatives(mut self, alternatives: Vec<String>) -> Self {
        self.alternatives_considered = alternatives;
        self
    }

    pub fn requiring_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }

    /// The output handed back in place of a write that now waits for a human.
    pub fn queued_for_approval(approval_id: Uuid, rationale: impl Into<String>) -> Self {
        Self::new(QUEUED_FOR_APPROVAL, rationale, 1.0)
            .with_data(serde_json::json!({ "approval_id": approval_id }))
            .requiring_approval()
    }

    /// Rewrite into a suggestion: the action gains the `suggest:` prefix and
    /// never asks for approval. Already-rewritten outputs are left alone.
    pub fn into_suggestion(mut self) -> Self {
        if !self.action.starts_with(SUGGEST_PREFIX) {
            self.action = format!("{SUGGEST_PREFIX}{}", self.action);
        }
        self.requires_approval = false;
        self
    }

    pub fn is_suggestion(&self) -> bool {
        self.action.starts_with(SUGGEST_PREFIX)
    }
}

/// Audit record of one dispatch choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub id: Uuid,
    pub user_id: UserId,
    pub task_kind: String,
    pub target: String,
    pub action_kind: ActionKind,
    pub gate_outcome: String,
    pub task_handle: String,
    pub decided_at: DateTime<Utc>,
}
