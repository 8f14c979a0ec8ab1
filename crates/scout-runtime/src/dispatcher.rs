//! # Task Dispatcher
//!
//! Deterministic routing of task requests onto the task queue. The brake and
//! the autonomy gate are both consulted before anything is enqueued, and an
//! unknown task kind is a hard error with no default route.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use scout_autonomy::{AutonomyGate, BrakeController, GateOutcome};
use scout_core::{
    ActionKind, Result, RoutingDecision, RoutingLog, ScoutError, TaskHandle, TaskQueue,
};

/// Every kind of task a worker can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    JobScout,
    JobScorer,
    CompanyResearch,
    InterviewPrep,
    ResumeTailor,
    CoverLetter,
    Apply,
    FollowUp,
}

impl TaskKind {
    pub const ALL: [TaskKind; 8] = [
        Self::JobScout,
        Self::JobScorer,
        Self::CompanyResearch,
        Self::InterviewPrep,
        Self::ResumeTailor,
        Self::CoverLetter,
        Self::Apply,
        Self::FollowUp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JobScout => "job_scout",
            Self::JobScorer => "job_scorer",
            Self::CompanyResearch => "company_research",
            Self::InterviewPrep => "interview_prep",
            Self::ResumeTailor => "resume_tailor",
            Self::CoverLetter => "cover_letter",
            Self::Apply => "apply",
            Self::FollowUp => "follow_up",
        }
    }

    /// Writes act on the outside world on the user's behalf (submitting an
    /// application, sending a follow-up). Everything else only produces
    /// material for the user.
    pub fn action_kind(&self) -> ActionKind {
        match self {
            Self::Apply | Self::FollowUp => ActionKind::Write,
            Self::JobScout
            | Self::JobScorer
            | Self::CompanyResearch
            | Self::InterviewPrep
            | Self::ResumeTailor
            | Self::CoverLetter => ActionKind::Read,
        }
    }

    /// Worker target the task is enqueued under.
    pub fn target(&self) -> &'static str {
        match self {
            Self::JobScout => "agents.job_scout",
            Self::JobScorer => "agents.job_scorer",
            Self::CompanyResearch => "agents.company_research",
            Self::InterviewPrep => "agents.interview_prep",
            Self::ResumeTailor => "agents.resume_tailor",
            Self::CoverLetter => "agents.cover_letter",
            Self::Apply => "agents.apply",
            Self::FollowUp => "agents.follow_up",
        }
    }

    /// Reverse of [`TaskKind::target`].
    pub fn from_target(target: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.target() == target)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = ScoutError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ScoutError::UnknownTaskKind(s.to_string()))
    }
}

/// What a successful dispatch hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReceipt {
    pub handle: TaskHandle,
    pub kind: TaskKind,
    pub target: &'static str,
    pub outcome: GateOutcome,
}

pub struct Dispatcher {
    brake: Arc<BrakeController>,
    gate: Arc<AutonomyGate>,
    queue: Arc<dyn TaskQueue>,
    routing: Arc<dyn RoutingLog>,
}

impl Dispatcher {
    pub fn new(
        brake: Arc<BrakeController>,
        gate: Arc<AutonomyGate>,
        queue: Arc<dyn TaskQueue>,
        routing: Arc<dyn RoutingLog>,
    ) -> Self {
        Self {
            brake,
            gate,
            queue,
            routing,
        }
    }

    /// Route one task. Order: brake, kind lookup, gate, enqueue, audit.
    /// Only the audit write may fail without failing the dispatch.
    pub async fn dispatch(&self, kind: &str, user_id: &str, payload: Value) -> Result<DispatchReceipt> {
        self.brake.check_or_raise(user_id).await?;

        let kind: TaskKind = kind.parse()?;
        let action_kind = kind.action_kind();
        let outcome = self
            .gate
            .decide(user_id, action_kind)
            .await?
            .into_result(user_id, kind.as_str(), action_kind)?;

        let target = kind.target();
        let handle = self.queue.submit(target, user_id, payload).await?;
        info!(user_id = %user_id, %kind, route = target, %outcome, task = %handle, "task dispatched");

        let decision = RoutingDecision {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            task_kind: kind.as_str().to_string(),
            target: target.to_string(),
            action_kind,
            gate_outcome: outcome.as_str().to_string(),
            task_handle: handle.to_string(),
            decided_at: Utc::now(),
        };
        if let Err(e) = self.routing.record_routing(&decision).await {
            warn!(user_id = %user_id, task = %handle, error = %e, "failed to record routing decision");
        }

        Ok(DispatchReceipt {
            handle,
            kind,
            target,
            outcome,
        })
    }
}
