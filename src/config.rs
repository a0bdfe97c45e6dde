//! Configuration for the cache facade, rate limiter and distributed lock.
//!
//! Everything has a code default; `from_env` overlays `CACHEKIT_*`
//! environment variables on top. Unparseable values fall back to the default
//! with a warning rather than failing startup.

use std::time::Duration;
use tracing::warn;

/// TTL tiers callers can pick by [`crate::facade::Priority`] instead of
/// hand-choosing a duration.
#[derive(Debug, Clone)]
pub struct TtlTiers {
    pub short: Duration,
    pub medium: Duration,
    pub long: Duration,
    /// For rarely-changing reference data.
    pub static_: Duration,
}

impl Default for TtlTiers {
    fn default() -> Self {
        Self {
            short: Duration::from_secs(60),
            medium: Duration::from_secs(300),
            long: Duration::from_secs(3600),
            static_: Duration::from_secs(86_400),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Key namespace; every remote key this crate writes lives under it.
    pub namespace: String,
    pub default_ttl: Duration,
    pub tiers: TtlTiers,
    /// Upper bound on local fallback entries before eviction kicks in.
    pub max_local_entries: usize,
    /// Chance that a local write triggers a sweep of expired entries.
    pub sweep_probability: f64,
    /// Per-call budget for remote store commands, connection included.
    pub command_timeout: Duration,
    /// Values larger than this are served but not cached.
    pub max_entry_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: "cachekit".to_string(),
            default_ttl: Duration::from_secs(300),
            tiers: TtlTiers::default(),
            max_local_entries: 10_000,
            sweep_probability: 1.0 / 16.0,
            command_timeout: Duration::from_secs(1),
            max_entry_size: 10 * 1024 * 1024,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_max_local_entries(mut self, max: usize) -> Self {
        self.max_local_entries = max;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_sweep_probability(mut self, p: f64) -> Self {
        self.sweep_probability = p.clamp(0.0, 1.0);
        self
    }

    /// Overlay `CACHEKIT_NAMESPACE` and `CACHEKIT_DEFAULT_TTL_SECS` on the
    /// defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(ns) = std::env::var("CACHEKIT_NAMESPACE") {
            if !ns.is_empty() {
                cfg.namespace = ns;
            }
        }
        if let Some(secs) = env_u64("CACHEKIT_DEFAULT_TTL_SECS") {
            cfg.default_ttl = Duration::from_secs(secs);
        }
        cfg
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub default_limit: u64,
    pub default_window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_limit: 100,
            default_window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.default_window = window;
        self
    }

    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(limit) = env_u64("CACHEKIT_RATE_LIMIT") {
            cfg.default_limit = limit;
        }
        if let Some(ms) = env_u64("CACHEKIT_RATE_WINDOW_MS") {
            cfg.default_window = Duration::from_millis(ms);
        }
        cfg
    }
}

#[derive(Debug, Clone)]
pub struct LockConfig {
    pub default_ttl: Duration,
    pub default_retries: u32,
    /// Linear backoff base: attempt N sleeps `retry_delay * N`.
    pub retry_delay: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(10),
            default_retries: 3,
            retry_delay: Duration::from_millis(100),
        }
    }
}

impl LockConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.default_retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(ms) = env_u64("CACHEKIT_LOCK_TTL_MS") {
            cfg.default_ttl = Duration::from_millis(ms);
        }
        if let Some(n) = env_u64("CACHEKIT_LOCK_RETRIES") {
            cfg.default_retries = n as u32;
        }
        cfg
    }
}

fn env_u64(key: &str) -> Option<u64> {
    match std::env::var(key) {
        Ok(raw) => match raw.parse::<u64>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(key, value = %raw, "ignoring unparseable environment value");
                None
            }
        },
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = CacheConfig::default();
        assert_eq!(cfg.namespace, "cachekit");
        assert!(cfg.sweep_probability > 0.0 && cfg.sweep_probability < 1.0);
        assert!(cfg.tiers.short < cfg.tiers.static_);
    }

    #[test]
    fn builders_compose() {
        let cfg = CacheConfig::new()
            .with_namespace("orders")
            .with_default_ttl(Duration::from_secs(30))
            .with_sweep_probability(2.0);
        assert_eq!(cfg.namespace, "orders");
        assert_eq!(cfg.default_ttl, Duration::from_secs(30));
        assert_eq!(cfg.sweep_probability, 1.0);
    }

    #[test]
    fn lock_config_builder() {
        let cfg = LockConfig::new()
            .with_ttl(Duration::from_millis(500))
            .with_retries(7);
        assert_eq!(cfg.default_ttl, Duration::from_millis(500));
        assert_eq!(cfg.default_retries, 7);
    }
}
