use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use scout_config::{ApprovalConfig, MAX_EXPIRY_HOURS};
use scout_core::coord::publish_event_best_effort;
use scout_core::event::types as event_types;
use scout_core::{
    ActivityEvent, AgentOutput, ApprovalItem, ApprovalStatus, ApprovalStore, CoordinationStore,
    Result, ScoutError, Severity, keys,
};

/// A human decision on a queued item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ApprovalDecision {
    /// Approve, optionally replacing the stored payload with an edited one.
    Approve { edited_payload: Option<Value> },
    Reject,
}

impl ApprovalDecision {
    pub fn approve() -> Self {
        Self::Approve {
            edited_payload: None,
        }
    }

    pub fn approve_edited(payload: Value) -> Self {
        Self::Approve {
            edited_payload: Some(payload),
        }
    }

    fn target_status(&self) -> ApprovalStatus {
        match self {
            Self::Approve { .. } => ApprovalStatus::Approved,
            Self::Reject => ApprovalStatus::Rejected,
        }
    }
}

fn expiry_window(hours: u64) -> Duration {
    Duration::hours(hours.min(MAX_EXPIRY_HOURS) as i64)
}

/// Holding area for gated write actions. Owns every status transition
/// except the brake's `pending → paused`.
pub struct ApprovalQueue {
    store: Arc<dyn ApprovalStore>,
    coord: Arc<dyn CoordinationStore>,
    expiry: Duration,
}

impl ApprovalQueue {
    pub fn new(store: Arc<dyn ApprovalStore>, coord: Arc<dyn CoordinationStore>) -> Self {
        Self {
            store,
            coord,
            expiry: expiry_window(ApprovalConfig::default().expiry_hours),
        }
    }

    pub fn with_config(self, config: &ApprovalConfig) -> Self {
        self.with_expiry(expiry_window(config.expiry_hours))
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry.min(expiry_window(MAX_EXPIRY_HOURS));
        self
    }

    /// Queue a write action for a human decision. Returns the stored item
    /// and the synthetic output the caller hands back in place of the write.
    pub async fn queue(
        &self,
        user_id: &str,
        agent_type: &str,
        action: &str,
        payload: Value,
        rationale: &str,
        confidence: f64,
    ) -> Result<(ApprovalItem, AgentOutput)> {
        let now = Utc::now();
        let item = ApprovalItem {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            agent_type: agent_type.to_string(),
            action: action.to_string(),
            payload,
            status: ApprovalStatus::Pending,
            rationale: rationale.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
            decided_at: None,
            expires_at: now
                .checked_add_signed(self.expiry)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            created_at: now,
        };
        self.store.insert_approval(&item).await?;
        info!(user_id = %user_id, item_id = %item.id, agent = agent_type, action, "queued action for approval");

        let event = ActivityEvent::new(
            user_id,
            event_types::APPROVAL_NEW,
            format!("{agent_type} wants to {action}"),
            Severity::Action,
            serde_json::json!({
                "approval_id": item.id,
                "agent_type": agent_type,
                "action": action,
                "expires_at": item.expires_at,
            }),
        );
        publish_event_best_effort(self.coord.as_ref(), &event).await;

        let output = AgentOutput::queued_for_approval(item.id, rationale);
        Ok((item, output))
    }

    /// Apply a human decision. Paused items can only be resolved once the
    /// user's brake is released.
    pub async fn resolve(&self, id: Uuid, decision: ApprovalDecision) -> Result<ApprovalItem> {
        let item = self
            .store
            .get_approval(id)
            .await?
            .ok_or(ScoutError::ApprovalNotFound(id))?;
        let to = decision.target_status();

        if !item.status.can_transition_to(to) {
            return Err(ScoutError::InvalidTransition {
                id,
                from: item.status.to_string(),
                to: to.to_string(),
            });
        }
        if item.status == ApprovalStatus::Paused
            && self.coord.exists(&keys::pause_flag(&item.user_id)).await?
        {
            info!(item_id = %id, user_id = %item.user_id, "refusing to resolve paused item while braked");
            return Err(ScoutError::BrakeActive {
                user_id: item.user_id,
            });
        }

        let edited = match &decision {
            ApprovalDecision::Approve { edited_payload } => edited_payload.as_ref(),
            ApprovalDecision::Reject => None,
        };
        let updated = self
            .store
            .transition_approval(
                id,
                &ApprovalStatus::sources_of(to),
                to,
                edited,
                Some(Utc::now()),
            )
            .await?;

        let Some(updated) = updated else {
            // Lost a race with another resolver, the sweep or the brake.
            let current = self
                .store
                .get_approval(id)
                .await?
                .ok_or(ScoutError::ApprovalNotFound(id))?;
            warn!(item_id = %id, status = %current.status, "approval item changed before it could be resolved");
            return Err(ScoutError::InvalidTransition {
                id,
                from: current.status.to_string(),
                to: to.to_string(),
            });
        };
        info!(item_id = %id, user_id = %updated.user_id, status = %updated.status, "approval item resolved");

        let (event_type, title) = match to {
            ApprovalStatus::Approved => (event_types::APPROVAL_APPROVED, "approved"),
            _ => (event_types::APPROVAL_REJECTED, "rejected"),
        };
        let event = ActivityEvent::new(
            &updated.user_id,
            event_type,
            format!("{} {title}", updated.action),
            Severity::Info,
            serde_json::json!({
                "approval_id": updated.id,
                "agent_type": updated.agent_type,
                "action": updated.action,
                "payload": updated.payload,
            }),
        );
        publish_event_best_effort(self.coord.as_ref(), &event).await;

        Ok(updated)
    }

    /// Expire every pending item past its deadline. Paused items are exempt.
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> Result<usize> {
        let expired = self.store.expire_pending_before(now).await?;
        if expired > 0 {
            info!(expired, "expired stale approval items");
        }
        Ok(expired)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<ApprovalItem>> {
        self.store.get_approval(id).await
    }

    pub async fn list_pending(&self, user_id: &str) -> Result<Vec<ApprovalItem>> {
        self.store
            .list_approvals(user_id, Some(ApprovalStatus::Pending))
            .await
    }

    pub async fn list_paused(&self, user_id: &str) -> Result<Vec<ApprovalItem>> {
        self.store
            .list_approvals(user_id, Some(ApprovalStatus::Paused))
            .await
    }
}
