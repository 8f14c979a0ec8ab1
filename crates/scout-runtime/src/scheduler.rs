//! # Cron & One-Shot Scheduler
//!
//! Drives the control plane's timed work:
//! - **Recurring**: the approval expiry sweep, on a cron expression
//!   (e.g. `"0 0 */6 * * *"` for every six hours).
//! - **OneShot**: the deferred brake verification that follows each
//!   activation. A newer verification for the same user replaces an
//!   older one still waiting.
//!
//! Jobs are executed outside the task lock, so a job may schedule more work.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use scout_autonomy::{ApprovalQueue, BrakeController, VerificationScheduler};
use scout_config::ScoutConfig;
use scout_core::{Result, ScoutError};

/// Label of the recurring expiry sweep.
pub const EXPIRY_SWEEP_LABEL: &str = "approval-expiry-sweep";

/// The work a scheduled task performs when it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum ScheduledJob {
    ExpirySweep,
    VerifyBrake { user_id: String },
}

/// A scheduled task, either recurring (cron) or one-shot (delay).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: Uuid,
    /// Dedup key: at most one active task per label.
    pub label: Option<String>,
    pub job: ScheduledJob,
    pub kind: ScheduleKind,
    pub created_at: DateTime<Utc>,
    pub active: bool,
    pub fire_count: u64,
    pub last_fired: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleKind {
    Cron { expression: String },
    OneShot { fire_at: DateTime<Utc> },
}

impl ScheduledTask {
    fn is_due(&self, now: DateTime<Utc>) -> std::result::Result<bool, cron::error::Error> {
        match &self.kind {
            ScheduleKind::Cron { expression } => {
                let schedule = Schedule::from_str(expression)?;
                let since = self.last_fired.unwrap_or(self.created_at);
                Ok(schedule.after(&since).next().is_some_and(|next| next <= now))
            }
            ScheduleKind::OneShot { fire_at } => Ok(now >= *fire_at),
        }
    }
}

/// Clone-able handle for adding tasks from any async context. Also the
/// brake's verification scheduler.
#[derive(Clone, Default)]
pub struct SchedulerHandle {
    tasks: Arc<TokioMutex<HashMap<Uuid, ScheduledTask>>>,
}

impl SchedulerHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a recurring cron task. An active task with the same label is kept
    /// and its id returned instead.
    pub async fn add_cron(&self, job: ScheduledJob, cron_expr: &str, label: &str) -> Result<Uuid> {
        Schedule::from_str(cron_expr)
            .map_err(|e| ScoutError::Config(format!("invalid cron expression '{cron_expr}': {e}")))?;

        let mut tasks = self.tasks.lock().await;
        if let Some(existing) = tasks
            .values()
            .find(|t| t.active && t.label.as_deref() == Some(label))
        {
            info!(task_id = %existing.id, label, "cron task already exists, skipping duplicate");
            return Ok(existing.id);
        }

        let task = ScheduledTask {
            id: Uuid::new_v4(),
            label: Some(label.to_string()),
            job,
            kind: ScheduleKind::Cron {
                expression: cron_expr.to_string(),
            },
            created_at: Utc::now(),
            active: true,
            fire_count: 0,
            last_fired: None,
        };
        let id = task.id;
        tasks.insert(id, task);
        info!(task_id = %id, cron = cron_expr, label, "scheduled recurring task");
        Ok(id)
    }

    /// Add a one-shot task. An active task with the same label is replaced.
    pub async fn add_one_shot(&self, job: ScheduledJob, delay: Duration, label: &str) -> Uuid {
        let now = Utc::now();
        let fire_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let task = ScheduledTask {
            id: Uuid::new_v4(),
            label: Some(label.to_string()),
            job,
            kind: ScheduleKind::OneShot { fire_at },
            created_at: now,
            active: true,
            fire_count: 0,
            last_fired: None,
        };

        let mut tasks = self.tasks.lock().await;
        tasks.retain(|_, t| t.label.as_deref() != Some(label));
        let id = task.id;
        tasks.insert(id, task);
        info!(task_id = %id, label, fire_at = %fire_at, "scheduled one-shot task");
        id
    }

    pub async fn remove(&self, task_id: Uuid) -> bool {
        self.tasks.lock().await.remove(&task_id).is_some()
    }

    pub async fn get(&self, task_id: Uuid) -> Option<ScheduledTask> {
        self.tasks.lock().await.get(&task_id).cloned()
    }

    pub async fn list_active(&self) -> Vec<ScheduledTask> {
        self.tasks
            .lock()
            .await
            .values()
            .filter(|t| t.active)
            .cloned()
            .collect()
    }

    /// Mark due tasks fired and return their jobs. Fired one-shots are
    /// dropped; broken crons deactivate.
    async fn take_due(&self, now: DateTime<Utc>) -> Vec<(Uuid, ScheduledJob)> {
        let mut tasks = self.tasks.lock().await;
        let mut due = Vec::new();
        let mut finished = Vec::new();

        for task in tasks.values_mut().filter(|t| t.active) {
            match task.is_due(now) {
                Ok(true) => {
                    task.fire_count += 1;
                    task.last_fired = Some(now);
                    if matches!(task.kind, ScheduleKind::OneShot { .. }) {
                        task.active = false;
                        finished.push(task.id);
                    }
                    debug!(task_id = %task.id, label = ?task.label, fire_count = task.fire_count, "scheduler firing task");
                    due.push((task.id, task.job.clone()));
                }
                Ok(false) => {}
                Err(e) => {
                    error!(task_id = %task.id, error = %e, "invalid cron expression, deactivating");
                    task.active = false;
                }
            }
        }

        for id in finished {
            tasks.remove(&id);
        }
        due
    }

    /// Number of tasks held, active or not.
    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl VerificationScheduler for SchedulerHandle {
    async fn schedule_verification(&self, user_id: &str, delay: Duration) -> Result<()> {
        self.add_one_shot(
            ScheduledJob::VerifyBrake {
                user_id: user_id.to_string(),
            },
            delay,
            &format!("verify-brake:{user_id}"),
        )
        .await;
        Ok(())
    }
}

/// Runs due jobs against the brake and the approval queue.
pub struct Scheduler {
    handle: SchedulerHandle,
    brake: Arc<BrakeController>,
    approvals: Arc<ApprovalQueue>,
    tick_interval: Duration,
}

impl Scheduler {
    pub fn new(
        handle: SchedulerHandle,
        brake: Arc<BrakeController>,
        approvals: Arc<ApprovalQueue>,
    ) -> Self {
        Self {
            handle,
            brake,
            approvals,
            tick_interval: Duration::from_secs(10),
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Apply `[scheduler]` and register the `[approvals]` sweep.
    pub async fn load_from_config(&mut self, config: &ScoutConfig) -> Result<()> {
        self.tick_interval = Duration::from_secs(config.scheduler.tick_secs.max(1));
        let id = self
            .handle
            .add_cron(
                ScheduledJob::ExpirySweep,
                &config.approvals.sweep_cron,
                EXPIRY_SWEEP_LABEL,
            )
            .await?;
        info!(task_id = %id, cron = %config.approvals.sweep_cron, "loaded approval expiry sweep from config");
        Ok(())
    }

    /// Fire every task due at `now`. Returns the number of jobs run.
    pub async fn tick(&self, now: DateTime<Utc>) -> usize {
        let due = self.handle.take_due(now).await;
        for (task_id, job) in &due {
            if let Err(e) = self.execute(job, now).await {
                warn!(task_id = %task_id, job = ?job, error = %e, "scheduled job failed");
            }
        }
        due.len()
    }

    async fn execute(&self, job: &ScheduledJob, now: DateTime<Utc>) -> Result<()> {
        match job {
            ScheduledJob::ExpirySweep => {
                let expired = self.approvals.expire_stale(now).await?;
                debug!(expired, "approval expiry sweep finished");
            }
            ScheduledJob::VerifyBrake { user_id } => {
                let snapshot = self.brake.verify_completion(user_id).await?;
                debug!(user_id = %user_id, state = %snapshot.state, "brake verification finished");
            }
        }
        Ok(())
    }

    /// Run the scheduler loop. This should be spawned as a background task.
    pub async fn run(self) {
        info!(interval_secs = self.tick_interval.as_secs(), "scheduler started");
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.tick(Utc::now()).await;
        }
    }
}
