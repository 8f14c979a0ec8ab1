use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use scout_config::ContextConfig;
use scout_core::{CoordinationStore, OutputRecord, OutputStore, PreferenceStore, Result, keys};

/// What every agent sees about the user it works for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SharedContext {
    pub profile: Value,
    pub preferences: Value,
    /// Newest first.
    pub recent_outputs: Vec<OutputRecord>,
}

/// Read-through cache of [`SharedContext`] in the coordination store.
/// Entries may be stale for up to the TTL. The cache never makes a read
/// fail: cache errors fall through to the persistence store.
pub struct ContextCache {
    coord: Arc<dyn CoordinationStore>,
    preferences: Arc<dyn PreferenceStore>,
    outputs: Arc<dyn OutputStore>,
    ttl: Duration,
    recent_outputs: usize,
}

impl ContextCache {
    pub fn new(
        coord: Arc<dyn CoordinationStore>,
        preferences: Arc<dyn PreferenceStore>,
        outputs: Arc<dyn OutputStore>,
    ) -> Self {
        Self::with_config(coord, preferences, outputs, &ContextConfig::default())
    }

    pub fn with_config(
        coord: Arc<dyn CoordinationStore>,
        preferences: Arc<dyn PreferenceStore>,
        outputs: Arc<dyn OutputStore>,
        config: &ContextConfig,
    ) -> Self {
        Self {
            coord,
            preferences,
            outputs,
            ttl: Duration::from_secs(config.ttl_secs),
            recent_outputs: config.recent_outputs,
        }
    }

    pub async fn get(&self, user_id: &str) -> Result<SharedContext> {
        let key = keys::shared_context(user_id);
        match self.coord.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(context) => {
                    debug!(user_id = %user_id, "shared context cache hit");
                    return Ok(context);
                }
                Err(e) => warn!(user_id = %user_id, error = %e, "discarding unreadable cached context"),
            },
            Ok(None) => {}
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "context cache unavailable, reading store directly");
                return self.load(user_id).await;
            }
        }

        let context = self.load(user_id).await?;
        match serde_json::to_string(&context) {
            Ok(raw) => {
                if let Err(e) = self.coord.set_ex(&key, &raw, self.ttl).await {
                    warn!(user_id = %user_id, error = %e, "failed to cache shared context");
                }
            }
            Err(e) => warn!(user_id = %user_id, error = %e, "failed to encode shared context"),
        }
        Ok(context)
    }

    /// Drop the cached entry so the next read goes to the store.
    pub async fn invalidate(&self, user_id: &str) -> Result<()> {
        self.coord.delete(&keys::shared_context(user_id)).await?;
        Ok(())
    }

    async fn load(&self, user_id: &str) -> Result<SharedContext> {
        Ok(SharedContext {
            profile: self.preferences.profile(user_id).await?,
            preferences: self.preferences.preferences(user_id).await?,
            recent_outputs: self
                .outputs
                .recent_outputs(user_id, self.recent_outputs)
                .await?,
        })
    }
}
