use thiserror::Error;
use uuid::Uuid;

/// Unified error type for the Scout control plane.
#[derive(Error, Debug)]
pub enum ScoutError {
    // ── Brake errors ───────────────────────────────────────────
    #[error("emergency brake is active for user {user_id}")]
    BrakeActive { user_id: String },

    #[error("brake state for user {user_id} could not be verified: {reason}")]
    BrakeCheckFailed { user_id: String, reason: String },

    // ── Autonomy errors ────────────────────────────────────────
    #[error("action '{action}' requires autonomy L{required}, user is at L{current}")]
    TierViolation {
        action: String,
        required: u8,
        current: u8,
    },

    // ── Dispatch errors ────────────────────────────────────────
    #[error("unknown task kind: {0}")]
    UnknownTaskKind(String),

    #[error("task queue error: {0}")]
    TaskQueue(String),

    // ── Approval errors ────────────────────────────────────────
    #[error("approval item not found: {0}")]
    ApprovalNotFound(Uuid),

    #[error("approval item {id} cannot move from {from} to {to}")]
    InvalidTransition { id: Uuid, from: String, to: String },

    // ── Store errors ───────────────────────────────────────────
    #[error("coordination store error: {0}")]
    Coordination(String),

    #[error("persistence store error: {0}")]
    Store(String),

    // ── Agent errors ───────────────────────────────────────────
    #[error("agent error: {agent}: {reason}")]
    Agent { agent: String, reason: String },

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ScoutError {
    /// True for policy stops (brake, tier) as opposed to faults.
    pub fn is_safety_stop(&self) -> bool {
        matches!(
            self,
            Self::BrakeActive { .. } | Self::BrakeCheckFailed { .. } | Self::TierViolation { .. }
        )
    }

    /// Message suitable for showing to the end user. Faults collapse into a
    /// generic message; only policy stops are explained.
    pub fn user_message(&self) -> String {
        match self {
            Self::BrakeActive { .. } => {
                "Your agents are paused. Resume them to continue.".to_string()
            }
            Self::BrakeCheckFailed { .. } => {
                "Agent safety status is unavailable, so agents are paused for now.".to_string()
            }
            Self::TierViolation { action, required, .. } => format!(
                "'{action}' requires a higher autonomy tier (L{required}). Upgrade your tier or run it manually."
            ),
            _ => "Something went wrong. Please try again.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScoutError>;
