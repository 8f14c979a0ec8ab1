use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::error::Result;
use crate::types::UserId;

/// Handle returned by the task queue for a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskHandle(pub Uuid);

impl TaskHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A task accepted by the queue and not yet finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InFlightTask {
    pub handle: TaskHandle,
    /// Worker target name, e.g. `"agents.job_scout"`.
    pub name: String,
    pub user_id: UserId,
    pub args: Value,
    pub submitted_at: DateTime<Utc>,
}

/// The distributed task queue the dispatcher feeds.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn submit(&self, name: &str, user_id: &str, args: Value) -> Result<TaskHandle>;

    /// Best-effort listing of in-flight tasks. Callers must tolerate errors.
    async fn inspect(&self) -> Result<Vec<InFlightTask>>;
}
