//! Wiring of the control plane from a loaded config.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use scout_autonomy::{ApprovalQueue, AutonomyGate, BrakeController, PreferenceTierResolver};
use scout_config::ScoutConfig;
use scout_core::{InFlightTask, Result};
use scout_runtime::{
    AgentRunner, CapabilityRegistry, ContextCache, LocalTaskQueue, Scheduler, SchedulerHandle,
    Worker,
};
use scout_store::SqliteStore;

/// Every long-lived component, built once per process.
pub struct ControlPlane {
    pub config: ScoutConfig,
    pub queue: LocalTaskQueue,
    pub scheduler: SchedulerHandle,
    pub brake: Arc<BrakeController>,
    pub approvals: Arc<ApprovalQueue>,
    pub runner: Arc<AgentRunner>,
}

impl ControlPlane {
    /// Open the store and assemble the components. Returns the receiving end
    /// of the task queue for the worker pool.
    ///
    /// Coordination records live in the database, so every process opened on
    /// the same file shares pause flags and brake state. The task queue and
    /// its in-flight set belong to this process.
    pub fn build(config: ScoutConfig) -> Result<(Self, mpsc::Receiver<InFlightTask>)> {
        let store = Arc::new(SqliteStore::open(&config.store.db_path)?);
        let coord = store.clone();
        let (queue, rx) = LocalTaskQueue::new(config.worker.queue_capacity);
        let scheduler = SchedulerHandle::new();

        let brake = Arc::new(
            BrakeController::new(
                coord.clone(),
                store.clone(),
                Arc::new(queue.clone()),
                Arc::new(scheduler.clone()),
            )
            .with_config(&config.brake),
        );
        let tiers = Arc::new(PreferenceTierResolver::from_config(
            store.clone(),
            &config.autonomy,
        ));
        let gate = Arc::new(AutonomyGate::new(brake.clone(), tiers));
        let approvals = Arc::new(
            ApprovalQueue::new(store.clone(), coord.clone()).with_config(&config.approvals),
        );
        let context = Arc::new(ContextCache::with_config(
            coord.clone(),
            store.clone(),
            store.clone(),
            &config.context,
        ));
        let runner = Arc::new(AgentRunner::new(
            brake.clone(),
            gate,
            approvals.clone(),
            context,
            store.clone(),
            store,
            coord,
        ));

        info!(db = ?config.store.db_path, fail_mode = ?brake.fail_mode(), "control plane assembled");

        Ok((
            Self {
                config,
                queue,
                scheduler,
                brake,
                approvals,
                runner,
            },
            rx,
        ))
    }

    pub fn worker(&self, registry: CapabilityRegistry) -> Arc<Worker> {
        Arc::new(Worker::new(
            self.runner.clone(),
            Arc::new(registry),
            self.queue.clone(),
            self.config.worker.concurrency,
        ))
    }

    /// A scheduler with the expiry sweep registered.
    pub async fn scheduler(&self) -> Result<Scheduler> {
        let mut scheduler = Scheduler::new(
            self.scheduler.clone(),
            self.brake.clone(),
            self.approvals.clone(),
        );
        scheduler.load_from_config(&self.config).await?;
        Ok(scheduler)
    }
}
