//! Distributed mutual-exclusion lock.
//!
//! Acquire is a set-if-absent write of a random owner token; release is an
//! atomic compare-and-delete keyed on that token, so a process can never
//! release a lock it no longer owns (for example one that expired and was
//! re-acquired elsewhere).
//!
//! There is no automatic lease extension: if a critical section outlives
//! the TTL, the lock silently passes to the next acquirer. Pick a TTL that
//! comfortably covers the critical section, or call [`DistributedLock::extend`]
//! from inside it at known long-running points.

use crate::config::LockConfig;
use crate::store::RemoteStore;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

pub struct DistributedLock {
    store: Arc<dyn RemoteStore>,
    config: LockConfig,
    namespace: String,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn RemoteStore>, config: LockConfig) -> Self {
        Self {
            store,
            config,
            namespace: "cachekit".to_string(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    fn lock_key(&self, key: &str) -> String {
        format!("{}:lock:{}", self.namespace, key)
    }

    /// Try to acquire the lock, retrying with linear backoff
    /// (`retry_delay * attempt`) while it is held. Returns the owner token
    /// on success and `None` once retries are exhausted — `None` means
    /// "did not acquire", not an error. A remote store failure is an `Err`,
    /// because mutual exclusion cannot be promised without the shared store.
    pub async fn acquire(
        &self,
        key: &str,
        ttl: Duration,
        max_retries: u32,
    ) -> Result<Option<String>> {
        let lock_key = self.lock_key(key);
        let token = Uuid::new_v4().to_string();
        for attempt in 0..=max_retries {
            if self
                .store
                .set_if_absent(&lock_key, token.as_bytes(), ttl)
                .await?
            {
                debug!(key, attempt, "lock acquired");
                return Ok(Some(token));
            }
            if attempt < max_retries {
                tokio::time::sleep(self.config.retry_delay * (attempt + 1)).await;
            }
        }
        debug!(key, max_retries, "lock not acquired");
        Ok(None)
    }

    /// [`acquire`](Self::acquire) with the configured default TTL and retry
    /// count.
    pub async fn acquire_default(&self, key: &str) -> Result<Option<String>> {
        self.acquire(key, self.config.default_ttl, self.config.default_retries)
            .await
    }

    /// Release the lock if `token` still owns it. Returns `false` when the
    /// stored token no longer matches — the lease expired and someone else
    /// holds the lock now; their record is left untouched.
    pub async fn release(&self, key: &str, token: &str) -> Result<bool> {
        self.store
            .compare_and_delete(&self.lock_key(key), token.as_bytes())
            .await
    }

    /// Push the lease out to `ttl` from now, only if `token` still owns the
    /// lock. Explicit and caller-driven; there is no background heartbeat.
    pub async fn extend(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        self.store
            .compare_and_expire(&self.lock_key(key), token.as_bytes(), ttl)
            .await
    }
}
