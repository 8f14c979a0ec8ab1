//! # Agent Execution Contract
//!
//! Every capability runs through [`AgentRunner::run`]:
//!
//! ```text
//!   1. brake check          (before any side effect)
//!   2. gate check           execute | suggest | queue_approval | blocked
//!   3. capability logic     (skipped for queue_approval and blocked)
//!   4. persist output   ─┐
//!   5. activity record   ├─ each isolated; failures are logged only
//!   6. publish event    ─┘
//!   7. return the output
//! ```

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use scout_autonomy::{ApprovalQueue, AutonomyGate, BrakeController, GateOutcome};
use scout_core::coord::publish_event;
use scout_core::event::types as event_types;
use scout_core::{
    ActionKind, ActivityEvent, ActivityLog, AgentOutput, CoordinationStore, OutputRecord,
    OutputStore, Result, Severity,
};

use crate::context::{ContextCache, SharedContext};

/// A single agent action. Domain logic lives behind `execute`.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Agent name, e.g. `"job_scout"`. Used for persistence and event types.
    fn agent_type(&self) -> &str;

    fn action_kind(&self) -> ActionKind;

    async fn execute(&self, ctx: &AgentContext, user_id: &str, input: Value) -> Result<AgentOutput>;
}

/// Handed to a capability while it runs.
pub struct AgentContext {
    pub user_id: String,
    pub agent_type: String,
    pub shared: SharedContext,
    approvals: Arc<ApprovalQueue>,
}

impl AgentContext {
    /// Queue a write for human approval instead of performing it. Return the
    /// result from `execute` as-is.
    pub async fn defer_to_approval(
        &self,
        action: &str,
        payload: Value,
        rationale: &str,
        confidence: f64,
    ) -> Result<AgentOutput> {
        let (_, output) = self
            .approvals
            .queue(
                &self.user_id,
                &self.agent_type,
                action,
                payload,
                rationale,
                confidence,
            )
            .await?;
        Ok(output)
    }
}

pub struct AgentRunner {
    brake: Arc<BrakeController>,
    gate: Arc<AutonomyGate>,
    approvals: Arc<ApprovalQueue>,
    context: Arc<ContextCache>,
    outputs: Arc<dyn OutputStore>,
    activity: Arc<dyn ActivityLog>,
    coord: Arc<dyn CoordinationStore>,
}

impl AgentRunner {
    pub fn new(
        brake: Arc<BrakeController>,
        gate: Arc<AutonomyGate>,
        approvals: Arc<ApprovalQueue>,
        context: Arc<ContextCache>,
        outputs: Arc<dyn OutputStore>,
        activity: Arc<dyn ActivityLog>,
        coord: Arc<dyn CoordinationStore>,
    ) -> Self {
        Self {
            brake,
            gate,
            approvals,
            context,
            outputs,
            activity,
            coord,
        }
    }

    pub async fn run(
        &self,
        capability: &dyn Capability,
        user_id: &str,
        input: Value,
    ) -> Result<AgentOutput> {
        self.brake.check_or_raise(user_id).await?;

        let agent = capability.agent_type();
        let kind = capability.action_kind();
        let decision = self.gate.decide(user_id, kind).await?;

        let output = match decision.outcome {
            GateOutcome::Execute => {
                let ctx = self.context_for(agent, user_id).await?;
                capability.execute(&ctx, user_id, input).await?
            }
            GateOutcome::Suggest => {
                let ctx = self.context_for(agent, user_id).await?;
                capability
                    .execute(&ctx, user_id, input)
                    .await?
                    .into_suggestion()
            }
            GateOutcome::QueueApproval => {
                let rationale = match decision.level {
                    Some(level) => format!("{agent} needs your approval at autonomy {level}"),
                    None => format!("{agent} needs your approval"),
                };
                let (item, output) = self
                    .approvals
                    .queue(user_id, agent, agent, input, &rationale, 1.0)
                    .await?;
                info!(user_id = %user_id, agent, item_id = %item.id, "write deferred to approval queue");
                output
            }
            GateOutcome::Blocked => {
                let err = decision.blocked_error(user_id, agent, kind);
                info!(user_id = %user_id, agent, error = %err, "capability blocked");
                return Err(err);
            }
        };

        self.record(agent, user_id, &output).await;
        Ok(output)
    }

    async fn context_for(&self, agent: &str, user_id: &str) -> Result<AgentContext> {
        Ok(AgentContext {
            user_id: user_id.to_string(),
            agent_type: agent.to_string(),
            shared: self.context.get(user_id).await?,
            approvals: self.approvals.clone(),
        })
    }

    /// Persist, log and publish. Three independent failure domains: none
    /// can stop the others or the caller.
    async fn record(&self, agent: &str, user_id: &str, output: &AgentOutput) {
        let record = OutputRecord::new(user_id, agent, output.clone());
        if let Err(e) = self.outputs.save_output(&record).await {
            warn!(user_id = %user_id, agent, error = %e, "failed to persist agent output");
        }

        let severity = if output.requires_approval {
            Severity::Action
        } else {
            Severity::Info
        };
        let event = ActivityEvent::new(
            user_id,
            event_types::agent_completed(agent),
            format!("{agent}: {}", output.action),
            severity,
            serde_json::json!({
                "output_id": record.id,
                "action": output.action,
                "confidence": output.confidence,
                "requires_approval": output.requires_approval,
            }),
        );

        if let Err(e) = self.activity.append_activity(&event).await {
            warn!(user_id = %user_id, agent, error = %e, "failed to append activity record");
        }
        if let Err(e) = publish_event(self.coord.as_ref(), &event).await {
            warn!(user_id = %user_id, agent, error = %e, "failed to publish completion event");
        }
    }
}
