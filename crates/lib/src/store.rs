//! Thread → conversation session mappings with per-entry expiration.
//!
//! The orchestrator only touches mappings through the [`SessionStore`] trait
//! so tests can substitute an in-memory fake and deployments can swap in a
//! persistent key-value store.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Key-value mapping thread_ts → conversation_id with a time-to-live.
/// At most one mapping per thread; a live mapping is never overwritten by
/// the orchestrator, only re-created after expiry.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Look up the conversation id for a thread. Absent is a valid state.
    async fn get(&self, thread_ts: &str) -> Result<Option<String>>;

    /// Store a mapping that expires after ttl.
    async fn put(&self, thread_ts: &str, conversation_id: &str, ttl: Duration) -> Result<()>;
}

/// In-memory store: entries carry their expiry instant and are dropped
/// lazily on read.
pub struct MemorySessionStore {
    inner: Arc<RwLock<HashMap<String, (String, Instant)>>>,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, thread_ts: &str) -> Result<Option<String>> {
        let expired = {
            let g = self.inner.read().await;
            match g.get(thread_ts) {
                Some((value, expires_at)) => {
                    if Instant::now() < *expires_at {
                        return Ok(Some(value.clone()));
                    }
                    true
                }
                None => false,
            }
        };
        if expired {
            self.inner.write().await.remove(thread_ts);
        }
        Ok(None)
    }

    async fn put(&self, thread_ts: &str, conversation_id: &str, ttl: Duration) -> Result<()> {
        let mut g = self.inner.write().await;
        g.insert(
            thread_ts.to_string(),
            (conversation_id.to_string(), Instant::now() + ttl),
        );
        Ok(())
    }
}
