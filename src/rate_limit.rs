//! Fixed-window rate limiter built on the remote store's atomic increment.
//!
//! One counter per identifier per window: the first increment arms the
//! window expiry, every later increment just counts. Bursts aligned at
//! window boundaries can exceed the intended average rate — that is the
//! accepted fixed-window trade-off, not a bug.
//!
//! When the remote store is unreachable the limiter degrades to a
//! per-process window, so an outage cannot disable limiting entirely; the
//! decision is then local to this process.

use crate::codec::epoch_ms;
use crate::config::RateLimitConfig;
use crate::store::RemoteStore;
use crate::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Quota left in the current window after this call.
    pub remaining: u64,
    /// When the current window resets, epoch milliseconds.
    pub reset_at_ms: u64,
}

struct LocalWindow {
    count: u64,
    window_ends: Instant,
}

pub struct RateLimiter {
    store: Arc<dyn RemoteStore>,
    config: RateLimitConfig,
    namespace: String,
    local: Mutex<HashMap<String, LocalWindow>>,
    outage_logged: AtomicBool,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RemoteStore>, config: RateLimitConfig) -> Self {
        Self {
            store,
            config,
            namespace: "cachekit".to_string(),
            local: Mutex::new(HashMap::new()),
            outage_logged: AtomicBool::new(false),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    fn counter_key(&self, identifier: &str) -> String {
        format!("{}:rl:{}", self.namespace, identifier)
    }

    /// Count this call against `identifier`'s quota for the current window.
    /// Exceeding the limit is a structured "not allowed" decision, not an
    /// error.
    pub async fn check(
        &self,
        identifier: &str,
        limit: u64,
        window: Duration,
    ) -> Result<RateLimitDecision> {
        let key = self.counter_key(identifier);
        match self.store.incr_with_expiry(&key, window).await {
            Ok((count, reset_in)) => {
                self.outage_logged.store(false, Ordering::Relaxed);
                Ok(Self::decision(count, limit, reset_in))
            }
            Err(e) if e.is_remote_unavailable() => {
                if !self.outage_logged.swap(true, Ordering::Relaxed) {
                    warn!(error = %e, "remote store unreachable, rate limiting per process");
                }
                Ok(self.check_local(identifier, limit, window).await)
            }
            Err(e) => Err(e),
        }
    }

    /// [`check`](Self::check) with the configured default limit and window.
    pub async fn check_default(&self, identifier: &str) -> Result<RateLimitDecision> {
        self.check(
            identifier,
            self.config.default_limit,
            self.config.default_window,
        )
        .await
    }

    async fn check_local(
        &self,
        identifier: &str,
        limit: u64,
        window: Duration,
    ) -> RateLimitDecision {
        let mut windows = self.local.lock().await;
        let now = Instant::now();
        if windows.len() > 1024 {
            windows.retain(|_, w| w.window_ends > now);
        }
        let slot = windows
            .entry(identifier.to_string())
            .or_insert_with(|| LocalWindow {
                count: 0,
                window_ends: now + window,
            });
        if slot.window_ends <= now {
            slot.count = 0;
            slot.window_ends = now + window;
        }
        slot.count += 1;
        let reset_in = slot.window_ends.saturating_duration_since(now);
        Self::decision(slot.count, limit, reset_in)
    }

    fn decision(count: u64, limit: u64, reset_in: Duration) -> RateLimitDecision {
        RateLimitDecision {
            allowed: count <= limit,
            remaining: limit.saturating_sub(count),
            reset_at_ms: epoch_ms() + reset_in.as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryStore::new()), RateLimitConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn sixth_call_is_denied_then_window_resets() {
        let limiter = limiter();
        let window = Duration::from_secs(60);
        for i in 0..5 {
            let decision = limiter.check("user1", 5, window).await.unwrap();
            assert!(decision.allowed, "call {} should be allowed", i + 1);
            assert_eq!(decision.remaining, 4 - i);
        }
        let denied = limiter.check("user1", 5, window).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);

        tokio::time::advance(Duration::from_secs(61)).await;
        let fresh = limiter.check("user1", 5, window).await.unwrap();
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 4);
    }

    #[tokio::test]
    async fn identifiers_have_independent_quotas() {
        let limiter = limiter();
        let window = Duration::from_secs(60);
        limiter.check("a", 1, window).await.unwrap();
        let denied = limiter.check("a", 1, window).await.unwrap();
        assert!(!denied.allowed);
        let other = limiter.check("b", 1, window).await.unwrap();
        assert!(other.allowed);
    }

    #[tokio::test]
    async fn count_is_monotonic_within_a_window() {
        let limiter = limiter();
        let window = Duration::from_secs(60);
        let mut last_remaining = u64::MAX;
        for _ in 0..4 {
            let decision = limiter.check("mono", 10, window).await.unwrap();
            assert!(decision.remaining < last_remaining);
            last_remaining = decision.remaining;
        }
    }
}
