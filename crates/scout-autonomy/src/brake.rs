//! # Emergency Brake
//!
//! Per-user pause/resume state machine:
//!
//! ```text
//! RUNNING ──activate──► PAUSING ──verify(all stopped)──► PAUSED
//!                          └─────verify(some stuck)────► PARTIAL
//! PAUSED | PARTIAL ──resume──► RESUMING ──► RUNNING
//! ```
//!
//! Two records live in the coordination store per user: the pause flag,
//! whose existence alone means "paused" and which every privileged step
//! checks, and the state hash holding the snapshot above. An unset hash is
//! RUNNING. The brake is cooperative: it only guarantees that no new
//! privileged step starts once the flag is observed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use scout_config::{BrakeConfig, FailMode, MAX_VERIFY_DELAY_SECS};
use scout_core::coord::publish_event_best_effort;
use scout_core::event::types as event_types;
use scout_core::{
    ActivityEvent, ApprovalStore, CoordinationStore, Result, ScoutError, Severity, TaskQueue, keys,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BrakeState {
    Running,
    Pausing,
    Paused,
    Partial,
    Resuming,
}

impl BrakeState {
    /// Activated and not yet released.
    pub fn is_engaged(&self) -> bool {
        matches!(self, Self::Pausing | Self::Paused | Self::Partial)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Pausing => "PAUSING",
            Self::Paused => "PAUSED",
            Self::Partial => "PARTIAL",
            Self::Resuming => "RESUMING",
        }
    }
}

impl fmt::Display for BrakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BrakeState {
    type Err = ScoutError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "RUNNING" => Ok(Self::Running),
            "PAUSING" => Ok(Self::Pausing),
            "PAUSED" => Ok(Self::Paused),
            "PARTIAL" => Ok(Self::Partial),
            "RESUMING" => Ok(Self::Resuming),
            other => Err(ScoutError::Coordination(format!(
                "unknown brake state '{other}'"
            ))),
        }
    }
}

/// The per-user brake record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrakeSnapshot {
    pub state: BrakeState,
    pub activated_at: Option<DateTime<Utc>>,
    /// Approval items moved to `paused` by the last verification.
    pub paused_tasks_count: usize,
    /// Task handles still in flight at the last verification.
    pub stuck_task_ids: Vec<String>,
}

impl BrakeSnapshot {
    pub fn running() -> Self {
        Self {
            state: BrakeState::Running,
            activated_at: None,
            paused_tasks_count: 0,
            stuck_task_ids: Vec::new(),
        }
    }

    /// Hash fields as stored in the coordination store. Every field is
    /// always written so a write fully replaces the previous snapshot.
    fn to_fields(&self) -> Result<Vec<(&'static str, String)>> {
        Ok(vec![
            ("state", self.state.as_str().to_string()),
            (
                "activated_at",
                self.activated_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
            ),
            ("paused_tasks_count", self.paused_tasks_count.to_string()),
            ("stuck_task_ids", serde_json::to_string(&self.stuck_task_ids)?),
        ])
    }

    fn from_fields(fields: &HashMap<String, String>) -> Result<Self> {
        let Some(state) = fields.get("state") else {
            return Ok(Self::running());
        };
        let activated_at = match fields.get("activated_at").map(String::as_str) {
            None | Some("") => None,
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map_err(|e| ScoutError::Coordination(format!("bad activated_at: {e}")))?
                    .with_timezone(&Utc),
            ),
        };
        let paused_tasks_count = fields
            .get("paused_tasks_count")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0);
        let stuck_task_ids = match fields.get("stuck_task_ids") {
            Some(raw) if !raw.is_empty() => serde_json::from_str(raw)?,
            _ => Vec::new(),
        };
        Ok(Self {
            state: state.parse()?,
            activated_at,
            paused_tasks_count,
            stuck_task_ids,
        })
    }
}

/// Schedules the deferred completion check that follows an activation.
#[async_trait]
pub trait VerificationScheduler: Send + Sync {
    async fn schedule_verification(&self, user_id: &str, delay: Duration) -> Result<()>;
}

/// Owns every write to the pause flag and the brake state hash.
pub struct BrakeController {
    coord: Arc<dyn CoordinationStore>,
    approvals: Arc<dyn ApprovalStore>,
    inspector: Arc<dyn TaskQueue>,
    verifier: Arc<dyn VerificationScheduler>,
    fail_mode: FailMode,
    verify_delay: Duration,
}

impl BrakeController {
    pub fn new(
        coord: Arc<dyn CoordinationStore>,
        approvals: Arc<dyn ApprovalStore>,
        inspector: Arc<dyn TaskQueue>,
        verifier: Arc<dyn VerificationScheduler>,
    ) -> Self {
        let defaults = BrakeConfig::default();
        Self {
            coord,
            approvals,
            inspector,
            verifier,
            fail_mode: defaults.fail_mode,
            verify_delay: Duration::from_secs(defaults.verify_delay_secs),
        }
    }

    pub fn with_config(mut self, config: &BrakeConfig) -> Self {
        self.fail_mode = config.fail_mode;
        self.verify_delay =
            Duration::from_secs(config.verify_delay_secs.min(MAX_VERIFY_DELAY_SECS));
        self
    }

    pub fn fail_mode(&self) -> FailMode {
        self.fail_mode
    }

    /// Is the user paused? Side-effect free. When the coordination store
    /// cannot answer, the configured fail mode decides.
    pub async fn check(&self, user_id: &str) -> bool {
        match self.coord.exists(&keys::pause_flag(user_id)).await {
            Ok(paused) => paused,
            Err(e) => match self.fail_mode {
                FailMode::Closed => {
                    error!(user_id = %user_id, error = %e, "brake check failed, treating user as paused");
                    true
                }
                FailMode::Open => {
                    warn!(user_id = %user_id, error = %e, "brake check failed, treating user as running");
                    false
                }
            },
        }
    }

    /// Guard for the start of every privileged step.
    pub async fn check_or_raise(&self, user_id: &str) -> Result<()> {
        match self.coord.exists(&keys::pause_flag(user_id)).await {
            Ok(false) => Ok(()),
            Ok(true) => {
                info!(user_id = %user_id, "brake engaged, refusing privileged step");
                Err(ScoutError::BrakeActive {
                    user_id: user_id.to_string(),
                })
            }
            Err(e) => match self.fail_mode {
                FailMode::Closed => {
                    error!(user_id = %user_id, error = %e, "brake check failed, refusing privileged step");
                    Err(ScoutError::BrakeCheckFailed {
                        user_id: user_id.to_string(),
                        reason: e.to_string(),
                    })
                }
                FailMode::Open => {
                    warn!(user_id = %user_id, error = %e, "brake check failed, proceeding (fail-open)");
                    Ok(())
                }
            },
        }
    }

    /// Engage the brake. The flag is written first; the notification and
    /// the deferred verification never undo it when they fail. Activating an
    /// engaged brake only re-sets the flag and re-publishes the event.
    pub async fn activate(&self, user_id: &str) -> Result<BrakeSnapshot> {
        self.coord.set(&keys::pause_flag(user_id), "1").await?;

        let current = self.read_state_or_running(user_id).await;
        if current.state.is_engaged() {
            info!(user_id = %user_id, state = %current.state, "emergency brake already engaged");
            self.publish_activated(user_id, &current).await;
            return Ok(current);
        }

        let snapshot = BrakeSnapshot {
            state: BrakeState::Pausing,
            activated_at: Some(Utc::now()),
            paused_tasks_count: 0,
            stuck_task_ids: Vec::new(),
        };
        self.write_snapshot(user_id, &snapshot).await?;
        info!(user_id = %user_id, "emergency brake activated");
        self.publish_activated(user_id, &snapshot).await;

        if let Err(e) = self
            .verifier
            .schedule_verification(user_id, self.verify_delay)
            .await
        {
            warn!(user_id = %user_id, error = %e, "failed to schedule brake verification");
        }

        Ok(snapshot)
    }

    async fn publish_activated(&self, user_id: &str, snapshot: &BrakeSnapshot) {
        let event = ActivityEvent::new(
            user_id,
            event_types::BRAKE_ACTIVATED,
            "Emergency brake activated",
            Severity::Critical,
            serde_json::json!({ "state": snapshot.state }),
        );
        publish_event_best_effort(self.coord.as_ref(), &event).await;
    }

    /// Release the brake, whatever the prior state. Stuck tasks never block
    /// a resume.
    pub async fn resume(&self, user_id: &str) -> Result<BrakeSnapshot> {
        let mut snapshot = self.read_state_or_running(user_id).await;
        snapshot.state = BrakeState::Resuming;
        self.write_snapshot(user_id, &snapshot).await?;

        self.coord.delete(&keys::pause_flag(user_id)).await?;

        let snapshot = BrakeSnapshot::running();
        self.write_snapshot(user_id, &snapshot).await?;
        info!(user_id = %user_id, "emergency brake released");

        let event = ActivityEvent::new(
            user_id,
            event_types::BRAKE_RESUMED,
            "Agents resumed",
            Severity::Info,
            serde_json::json!({ "state": snapshot.state }),
        );
        publish_event_best_effort(self.coord.as_ref(), &event).await;

        Ok(snapshot)
    }

    pub async fn get_state(&self, user_id: &str) -> Result<BrakeSnapshot> {
        let fields = self.coord.hgetall(&keys::brake_state(user_id)).await?;
        BrakeSnapshot::from_fields(&fields)
    }

    /// An unreadable state hash must never stop the brake being engaged or
    /// released. Store errors still propagate from the writes that follow.
    async fn read_state_or_running(&self, user_id: &str) -> BrakeSnapshot {
        match self.get_state(user_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "unreadable brake state, treating as running");
                BrakeSnapshot::running()
            }
        }
    }

    /// The deferred completion check. Only settles a brake that is still
    /// PAUSING, into PAUSED or PARTIAL, and parks the user's pending approval
    /// items. A resume at any point before the settled state is written wins.
    pub async fn verify_completion(&self, user_id: &str) -> Result<BrakeSnapshot> {
        if !self.is_flagged(user_id).await? {
            info!(user_id = %user_id, "brake released before verification, nothing to do");
            return Ok(BrakeSnapshot::running());
        }
        let mut snapshot = self.get_state(user_id).await?;
        if snapshot.state != BrakeState::Pausing {
            info!(user_id = %user_id, state = %snapshot.state, "brake not pausing, verification skipped");
            return Ok(snapshot);
        }

        let stuck_task_ids: Vec<String> = match self.inspector.inspect().await {
            Ok(tasks) => tasks
                .into_iter()
                .filter(|t| t.user_id == user_id)
                .map(|t| t.handle.to_string())
                .collect(),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "task inspection unavailable, assuming none stuck");
                Vec::new()
            }
        };

        let latest = self.get_state(user_id).await?;
        if latest.state != BrakeState::Pausing || !self.is_flagged(user_id).await? {
            info!(user_id = %user_id, state = %latest.state, "brake changed during verification, nothing to settle");
            return Ok(latest);
        }

        snapshot.state = if stuck_task_ids.is_empty() {
            BrakeState::Paused
        } else {
            BrakeState::Partial
        };
        snapshot.stuck_task_ids = stuck_task_ids;
        snapshot.paused_tasks_count = self.approvals.pause_pending(user_id).await?;
        self.write_snapshot(user_id, &snapshot).await?;

        if !self.is_flagged(user_id).await? {
            // A resume finished between the last check and the write.
            warn!(user_id = %user_id, "brake released while settling, restoring running state");
            let running = BrakeSnapshot::running();
            self.write_snapshot(user_id, &running).await?;
            return Ok(running);
        }

        let event = match snapshot.state {
            BrakeState::Partial => {
                warn!(
                    user_id = %user_id,
                    stuck = snapshot.stuck_task_ids.len(),
                    "brake verification found tasks still running"
                );
                ActivityEvent::new(
                    user_id,
                    event_types::BRAKE_PARTIAL,
                    "Some agent tasks are still finishing",
                    Severity::Critical,
                    serde_json::json!({
                        "stuck_task_ids": snapshot.stuck_task_ids,
                        "paused_approvals": snapshot.paused_tasks_count,
                    }),
                )
            }
            _ => {
                info!(user_id = %user_id, paused_approvals = snapshot.paused_tasks_count, "all agents stopped");
                ActivityEvent::new(
                    user_id,
                    event_types::BRAKE_PAUSED,
                    "All agents stopped",
                    Severity::Info,
                    serde_json::json!({ "paused_approvals": snapshot.paused_tasks_count }),
                )
            }
        };
        publish_event_best_effort(self.coord.as_ref(), &event).await;

        Ok(snapshot)
    }

    async fn is_flagged(&self, user_id: &str) -> Result<bool> {
        self.coord.exists(&keys::pause_flag(user_id)).await
    }

    async fn write_snapshot(&self, user_id: &str, snapshot: &BrakeSnapshot) -> Result<()> {
        self.coord
            .hset(&keys::brake_state(user_id), &snapshot.to_fields()?)
            .await
    }
}
