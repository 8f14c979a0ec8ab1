use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, info, warn};

use scout_core::{AgentOutput, InFlightTask, Result, ScoutError, TaskHandle};

use crate::agent::{AgentRunner, Capability};
use crate::dispatcher::TaskKind;
use crate::queue::LocalTaskQueue;

/// Capabilities by task kind.
#[derive(Default)]
pub struct CapabilityRegistry {
    capabilities: HashMap<TaskKind, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: TaskKind, capability: Arc<dyn Capability>) {
        self.capabilities.insert(kind, capability);
    }

    pub fn get(&self, kind: TaskKind) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(&kind).cloned()
    }

    /// Kinds with no capability registered.
    pub fn missing(&self) -> Vec<TaskKind> {
        TaskKind::ALL
            .into_iter()
            .filter(|k| !self.capabilities.contains_key(k))
            .collect()
    }
}

/// Releases a task's in-flight entry when dropped, on unwind too.
struct CompleteOnDrop<'a> {
    queue: &'a LocalTaskQueue,
    handle: TaskHandle,
}

impl Drop for CompleteOnDrop<'_> {
    fn drop(&mut self) {
        self.queue.complete(self.handle);
    }
}

/// Drains the local task queue and runs each task through the agent runner.
pub struct Worker {
    runner: Arc<AgentRunner>,
    registry: Arc<CapabilityRegistry>,
    queue: LocalTaskQueue,
    concurrency: usize,
}

impl Worker {
    pub fn new(
        runner: Arc<AgentRunner>,
        registry: Arc<CapabilityRegistry>,
        queue: LocalTaskQueue,
        concurrency: usize,
    ) -> Self {
        Self {
            runner,
            registry,
            queue,
            concurrency: concurrency.max(1),
        }
    }

    /// Run one task. The task is marked complete whatever the outcome,
    /// including a panicking capability.
    pub async fn process(&self, task: InFlightTask) -> Result<AgentOutput> {
        let guard = CompleteOnDrop {
            queue: &self.queue,
            handle: task.handle,
        };
        let result = self.execute(&task).await;
        drop(guard);

        match &result {
            Ok(output) => debug!(task = %task.handle, action = %output.action, "task finished"),
            Err(e) if e.is_safety_stop() => {
                info!(task = %task.handle, user_id = %task.user_id, reason = %e, "task stopped by safety policy")
            }
            Err(e) => warn!(task = %task.handle, user_id = %task.user_id, error = %e, "task failed"),
        }
        result
    }

    async fn execute(&self, task: &InFlightTask) -> Result<AgentOutput> {
        let kind = TaskKind::from_target(&task.name)
            .ok_or_else(|| ScoutError::UnknownTaskKind(task.name.clone()))?;
        let capability = self.registry.get(kind).ok_or_else(|| ScoutError::Agent {
            agent: kind.to_string(),
            reason: "no capability registered".into(),
        })?;
        self.runner
            .run(capability.as_ref(), &task.user_id, task.args.clone())
            .await
    }

    /// Consume tasks until every queue handle is dropped, running up to
    /// `concurrency` at once.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<InFlightTask>) {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        info!(concurrency = self.concurrency, "worker started");

        while let Some(task) = rx.recv().await {
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let worker = self.clone();
            tokio::spawn(async move {
                let _ = worker.process(task).await;
                drop(permit);
            });
        }

        info!("worker queue closed, shutting down");
    }
}
