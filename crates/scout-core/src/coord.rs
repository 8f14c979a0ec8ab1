//! The shared low-latency coordination store: existence flags, small per-user
//! hash records, TTL'd cache entries and a publish/subscribe bus.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::warn;

use crate::error::{Result, ScoutError};
use crate::event::ActivityEvent;
use crate::keys;

/// Key/value + hash + pub/sub operations the control plane relies on.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Merge `fields` into the hash at `key`, creating it if needed.
    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> Result<()>;

    /// All fields of the hash at `key`; empty when unset.
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Returns the number of subscribers that received the message.
    async fn publish(&self, channel: &str, payload: &str) -> Result<usize>;
}

/// Publish an activity event on the user's notification channel.
pub async fn publish_event(coord: &dyn CoordinationStore, event: &ActivityEvent) -> Result<usize> {
    let payload = serde_json::to_string(&event.to_published())?;
    coord
        .publish(&keys::events_channel(&event.user_id), &payload)
        .await
}

/// Publish and swallow failures. For notifications that must never undo or
/// block the write they accompany.
pub async fn publish_event_best_effort(coord: &dyn CoordinationStore, event: &ActivityEvent) {
    if let Err(e) = publish_event(coord, event).await {
        warn!(
            user_id = %event.user_id,
            event_type = %event.event_type,
            error = %e,
            "failed to publish event"
        );
    }
}

// ── In-process implementation ──────────────────────────────────

#[derive(Debug, Clone)]
enum Entry {
    Value {
        value: String,
        expires_at: Option<Instant>,
    },
    Hash(HashMap<String, String>),
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self, Entry::Value { expires_at: Some(at), .. } if *at <= now)
    }
}

/// A coordination store living inside one process. Suitable for single-node
/// deployments and tests; multi-process deployments plug a networked store
/// in behind the same trait.
#[derive(Clone)]
pub struct MemoryCoordinationStore {
    entries: Arc<DashMap<String, Entry>>,
    channels: Arc<DashMap<String, broadcast::Sender<String>>>,
    channel_capacity: usize,
}

impl MemoryCoordinationStore {
    pub fn new() -> Self {
        Self::with_channel_capacity(1024)
    }

    pub fn with_channel_capacity(channel_capacity: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            channels: Arc::new(DashMap::new()),
            channel_capacity,
        }
    }

    /// Subscribe to a channel. Messages published before subscribing are not
    /// replayed.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.channel_capacity).0)
            .subscribe()
    }

    /// Lazily drop an expired entry and report whether a live one remains.
    fn live_entry(&self, key: &str) -> Option<Entry> {
        let now = Instant::now();
        let entry = self.entries.get(key).map(|e| e.value().clone())?;
        if entry.is_expired(now) {
            self.entries.remove_if(key, |_, e| e.is_expired(now));
            return None;
        }
        Some(entry)
    }
}

impl Default for MemoryCoordinationStore {
    fn default() -> Self {
        Self::new()
    }
}

fn wrong_type(key: &str) -> ScoutError {
    ScoutError::Coordination(format!("WRONGTYPE operation against key '{key}'"))
}

#[async_trait]
impl CoordinationStore for MemoryCoordinationStore {
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            Entry::Value {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.live_entry(key).is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let existed = self.live_entry(key).is_some();
        self.entries.remove(key);
        Ok(existed)
    }

    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> Result<()> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Hash(HashMap::new()));
        match entry.value_mut() {
            Entry::Hash(map) => {
                for (field, value) in fields {
                    map.insert((*field).to_string(), value.clone());
                }
                Ok(())
            }
            Entry::Value { .. } => Err(wrong_type(key)),
        }
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        match self.live_entry(key) {
            None => Ok(HashMap::new()),
            Some(Entry::Hash(map)) => Ok(map),
            Some(Entry::Value { .. }) => Err(wrong_type(key)),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.live_entry(key) {
            None => Ok(None),
            Some(Entry::Value { value, .. }) => Ok(Some(value)),
            Some(Entry::Hash(_)) => Err(wrong_type(key)),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            Entry::Value {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<usize> {
        // No subscribers is not an error.
        Ok(self
            .channels
            .get(channel)
            .and_then(|tx| tx.send(payload.to_string()).ok())
            .unwrap_or(0))
    }
}
