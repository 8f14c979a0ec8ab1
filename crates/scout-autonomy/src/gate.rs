use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use scout_config::AutonomyConfig;
use scout_core::{ActionKind, PreferenceStore, Result, ScoutError};

use crate::brake::BrakeController;
use crate::level::AutonomyLevel;

/// What the gate lets a capability do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateOutcome {
    /// Run the real logic.
    Execute,
    /// Run the real logic, hand back the result as a suggestion only.
    Suggest,
    /// Refuse before any logic runs.
    Blocked,
    /// Defer the write to the approval queue.
    QueueApproval,
}

impl GateOutcome {
    /// The tier table. Brake state is not considered here.
    ///
    /// | Tier | read    | write          |
    /// |------|---------|----------------|
    /// | L0   | suggest | blocked        |
    /// | L1   | execute | blocked        |
    /// | L2   | execute | queue_approval |
    /// | L3   | execute | execute        |
    pub fn for_level(level: AutonomyLevel, kind: ActionKind) -> Self {
        match (level, kind) {
            (AutonomyLevel::Suggest, ActionKind::Read) => Self::Suggest,
            (AutonomyLevel::Suggest, ActionKind::Write) => Self::Blocked,
            (AutonomyLevel::ReadOnly, ActionKind::Read) => Self::Execute,
            (AutonomyLevel::ReadOnly, ActionKind::Write) => Self::Blocked,
            (AutonomyLevel::Supervised, ActionKind::Read) => Self::Execute,
            (AutonomyLevel::Supervised, ActionKind::Write) => Self::QueueApproval,
            (AutonomyLevel::Autonomous, _) => Self::Execute,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Execute => "execute",
            Self::Suggest => "suggest",
            Self::Blocked => "blocked",
            Self::QueueApproval => "queue_approval",
        }
    }
}

impl fmt::Display for GateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Organization-wide cap on a user's own autonomy preference.
#[async_trait]
pub trait OrgPolicy: Send + Sync {
    async fn get_ceiling(&self, user_id: &str) -> Result<Option<AutonomyLevel>>;
}

/// Non-enterprise deployments: no cap.
pub struct NoCeiling;

#[async_trait]
impl OrgPolicy for NoCeiling {
    async fn get_ceiling(&self, _user_id: &str) -> Result<Option<AutonomyLevel>> {
        Ok(None)
    }
}

/// One ceiling for every user.
pub struct FixedCeiling(pub AutonomyLevel);

#[async_trait]
impl OrgPolicy for FixedCeiling {
    async fn get_ceiling(&self, _user_id: &str) -> Result<Option<AutonomyLevel>> {
        Ok(Some(self.0))
    }
}

/// Resolves a user's effective autonomy tier.
#[async_trait]
pub trait TierResolver: Send + Sync {
    async fn resolve(&self, user_id: &str) -> Result<AutonomyLevel>;
}

/// Stored preference (or the configured default), capped by the org ceiling.
pub struct PreferenceTierResolver {
    preferences: Arc<dyn PreferenceStore>,
    policy: Arc<dyn OrgPolicy>,
    default_level: AutonomyLevel,
}

impl PreferenceTierResolver {
    pub fn new(preferences: Arc<dyn PreferenceStore>, policy: Arc<dyn OrgPolicy>) -> Self {
        Self {
            preferences,
            policy,
            default_level: AutonomyLevel::default(),
        }
    }

    pub fn with_default_level(mut self, level: AutonomyLevel) -> Self {
        self.default_level = level;
        self
    }

    /// Resolver plus org policy from the `[autonomy]` section.
    pub fn from_config(preferences: Arc<dyn PreferenceStore>, config: &AutonomyConfig) -> Self {
        let policy: Arc<dyn OrgPolicy> = match config.org_ceiling {
            Some(ceiling) => Arc::new(FixedCeiling(AutonomyLevel::from_u8(ceiling))),
            None => Arc::new(NoCeiling),
        };
        Self::new(preferences, policy).with_default_level(AutonomyLevel::from_u8(config.default_level))
    }
}

#[async_trait]
impl TierResolver for PreferenceTierResolver {
    async fn resolve(&self, user_id: &str) -> Result<AutonomyLevel> {
        let requested = self
            .preferences
            .autonomy_level(user_id)
            .await?
            .map(AutonomyLevel::from_u8)
            .unwrap_or(self.default_level);
        let ceiling = self.policy.get_ceiling(user_id).await?;
        let effective = requested.capped_at(ceiling);
        debug!(user_id = %user_id, %requested, %effective, "resolved autonomy tier");
        Ok(effective)
    }
}

/// A gate decision with the tier it was based on. `level` is `None` when
/// the brake decided before any tier was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateDecision {
    pub outcome: GateOutcome,
    pub level: Option<AutonomyLevel>,
}

impl GateDecision {
    /// `Ok(outcome)` unless blocked, in which case the caller's error.
    pub fn into_result(self, user_id: &str, action: &str, kind: ActionKind) -> Result<GateOutcome> {
        match self.outcome {
            GateOutcome::Blocked => Err(self.blocked_error(user_id, action, kind)),
            outcome => Ok(outcome),
        }
    }

    /// The error a blocked decision surfaces: `BrakeActive` when the brake
    /// decided, `TierViolation` otherwise.
    pub fn blocked_error(&self, user_id: &str, action: &str, kind: ActionKind) -> ScoutError {
        match self.level {
            None => ScoutError::BrakeActive {
                user_id: user_id.to_string(),
            },
            Some(level) => ScoutError::TierViolation {
                action: action.to_string(),
                required: kind.minimum_level(),
                current: level.as_u8(),
            },
        }
    }
}

/// The tiered autonomy gate. Always consults the brake first.
pub struct AutonomyGate {
    brake: Arc<BrakeController>,
    tiers: Arc<dyn TierResolver>,
}

impl AutonomyGate {
    pub fn new(brake: Arc<BrakeController>, tiers: Arc<dyn TierResolver>) -> Self {
        Self { brake, tiers }
    }

    pub fn brake(&self) -> &Arc<BrakeController> {
        &self.brake
    }

    pub async fn check(&self, user_id: &str, kind: ActionKind) -> Result<GateOutcome> {
        Ok(self.decide(user_id, kind).await?.outcome)
    }

    /// Brake first: a braked user is blocked without ever resolving a tier.
    pub async fn decide(&self, user_id: &str, kind: ActionKind) -> Result<GateDecision> {
        if self.brake.check(user_id).await {
            info!(user_id = %user_id, %kind, "gate blocked by brake");
            return Ok(GateDecision {
                outcome: GateOutcome::Blocked,
                level: None,
            });
        }

        let level = self.tiers.resolve(user_id).await?;
        let outcome = GateOutcome::for_level(level, kind);
        if outcome == GateOutcome::Blocked {
            info!(user_id = %user_id, %kind, %level, "gate blocked by tier");
        } else {
            debug!(user_id = %user_id, %kind, %level, %outcome, "gate decision");
        }
        Ok(GateDecision {
            outcome,
            level: Some(level),
        })
    }
}
