use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use scout_core::{InFlightTask, Result, ScoutError, TaskHandle, TaskQueue};

/// In-process task queue: a bounded channel feeding the workers plus the
/// set of tasks accepted and not yet completed.
#[derive(Clone)]
pub struct LocalTaskQueue {
    tx: mpsc::Sender<InFlightTask>,
    in_flight: Arc<Mutex<HashMap<TaskHandle, InFlightTask>>>,
}

impl LocalTaskQueue {
    /// Create a queue. Returns the queue and the receiver the worker drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<InFlightTask>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let queue = Self {
            tx,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        };
        (queue, rx)
    }

    /// Forget a finished task. Returns whether it was still tracked.
    pub fn complete(&self, handle: TaskHandle) -> bool {
        self.in_flight.lock().remove(&handle).is_some()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }
}

#[async_trait]
impl TaskQueue for LocalTaskQueue {
    async fn submit(&self, name: &str, user_id: &str, args: Value) -> Result<TaskHandle> {
        let task = InFlightTask {
            handle: TaskHandle::new(),
            name: name.to_string(),
            user_id: user_id.to_string(),
            args,
            submitted_at: Utc::now(),
        };
        let handle = task.handle;
        self.in_flight.lock().insert(handle, task.clone());

        if self.tx.send(task).await.is_err() {
            self.in_flight.lock().remove(&handle);
            return Err(ScoutError::TaskQueue("worker channel closed".into()));
        }
        debug!(task = %handle, name, user_id = %user_id, "task submitted");
        Ok(handle)
    }

    async fn inspect(&self) -> Result<Vec<InFlightTask>> {
        Ok(self.in_flight.lock().values().cloned().collect())
    }
}
