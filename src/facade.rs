//! Cache facade: the public surface the rest of the system consumes.
//!
//! Reads try the remote tier first and fall through to the process-local
//! store on a miss or a remote failure. Writes go to both tiers, remote
//! best-effort, local always — so a later remote outage still finds a warm
//! local copy. No caller-visible failure ever occurs purely because the
//! remote store is down; correctness of the underlying data never depends
//! on the cache being available.

use crate::codec;
use crate::config::CacheConfig;
use crate::local::LocalStore;
use crate::store::RemoteStore;
use crate::tags::TagIndex;
use crate::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// TTL tier shorthand for callers that do not want to pick a duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Short,
    Medium,
    Long,
    /// Rarely-changing reference data.
    Static,
}

/// Per-write options: explicit TTL wins over priority tier, which wins over
/// the configured default.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub ttl: Option<Duration>,
    pub tags: Vec<String>,
    pub priority: Option<Priority>,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    fn resolve_ttl(&self, config: &CacheConfig) -> Duration {
        if let Some(ttl) = self.ttl {
            return ttl;
        }
        match self.priority {
            Some(Priority::Short) => config.tiers.short,
            Some(Priority::Medium) => config.tiers.medium,
            Some(Priority::Long) => config.tiers.long,
            Some(Priority::Static) => config.tiers.static_,
            None => config.default_ttl,
        }
    }
}

/// Monotonic operation counters, read via [`Cache::counters`].
#[derive(Debug, Clone, Default)]
pub struct CacheCounters {
    pub hits: u64,
    pub local_hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub remote_errors: u64,
    pub revalidations: u64,
    pub revalidation_failures: u64,
}

#[derive(Default)]
struct AtomicCounters {
    hits: AtomicU64,
    local_hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    remote_errors: AtomicU64,
    revalidations: AtomicU64,
    revalidation_failures: AtomicU64,
}

impl AtomicCounters {
    fn snapshot(&self) -> CacheCounters {
        CacheCounters {
            hits: self.hits.load(Ordering::Relaxed),
            local_hits: self.local_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            remote_errors: self.remote_errors.load(Ordering::Relaxed),
            revalidations: self.revalidations.load(Ordering::Relaxed),
            revalidation_failures: self.revalidation_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of both tiers.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub remote_connected: bool,
    pub remote_key_count: u64,
    pub local_entry_count: usize,
    pub counters: CacheCounters,
}

struct CacheInner {
    remote: Arc<dyn RemoteStore>,
    local: Arc<LocalStore>,
    tags: TagIndex,
    config: CacheConfig,
    counters: AtomicCounters,
    /// Keys with a background revalidation in flight; concurrent stale hits
    /// for the same key coalesce instead of fetching twice.
    revalidating: Mutex<HashSet<String>>,
}

/// Clears a key's in-flight mark when the refresh task ends, whether the
/// fetcher returned, errored, or panicked.
struct InflightGuard {
    inner: Arc<CacheInner>,
    key: String,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.inner.revalidating.lock().unwrap().remove(&self.key);
    }
}

/// The cache facade. Cheap to clone; construct one per process at startup
/// and hand clones to every consumer.
#[derive(Clone)]
pub struct Cache {
    inner: Arc<CacheInner>,
}

impl Cache {
    pub fn new(remote: Arc<dyn RemoteStore>, config: CacheConfig) -> Self {
        let local = Arc::new(LocalStore::new(
            config.max_local_entries,
            config.sweep_probability,
        ));
        let tags = TagIndex::new(remote.clone(), local.clone(), config.namespace.clone());
        Self {
            inner: Arc::new(CacheInner {
                remote,
                local,
                tags,
                config,
                counters: AtomicCounters::default(),
                revalidating: Mutex::new(HashSet::new()),
            }),
        }
    }

    fn entry_key(&self, key: &str) -> String {
        format!("{}:entry:{}", self.inner.config.namespace, key)
    }

    /// Remote first, local on miss or remote failure. Returns the value and
    /// its envelope write time. A corrupt payload is a serialization error,
    /// never a silent miss.
    async fn lookup<T: DeserializeOwned>(&self, full_key: &str) -> Result<Option<(T, u64)>> {
        match self.inner.remote.get(full_key).await {
            Ok(Some(bytes)) => {
                let decoded = codec::decode(&bytes)?;
                self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(decoded));
            }
            Ok(None) => {}
            Err(e) if e.is_remote_unavailable() => {
                self.inner
                    .counters
                    .remote_errors
                    .fetch_add(1, Ordering::Relaxed);
                debug!(key = full_key, error = %e, "remote read failed, trying local tier");
            }
            Err(e) => return Err(e),
        }
        if let Some(bytes) = self.inner.local.get(full_key) {
            let decoded = codec::decode(&bytes)?;
            self.inner
                .counters
                .local_hits
                .fetch_add(1, Ordering::Relaxed);
            return Ok(Some(decoded));
        }
        self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        Ok(self
            .lookup(&self.entry_key(key))
            .await?
            .map(|(value, _)| value))
    }

    /// `get`, invoking `fallback` on a total miss. A non-null fallback
    /// result is cached best-effort; failing to cache it does not fail the
    /// read.
    pub async fn get_or_fetch<T, F, Fut>(
        &self,
        key: &str,
        options: WriteOptions,
        fallback: F,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        if let Some(value) = self.get(key).await? {
            return Ok(Some(value));
        }
        match fallback().await? {
            Some(value) => {
                if let Err(e) = self.set(key, &value, options).await {
                    warn!(key, error = %e, "failed to cache fallback result");
                }
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Write to both tiers and register tags. The remote write is
    /// best-effort: on failure the local write still proceeds, so this
    /// process keeps serving the value through an outage.
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        options: WriteOptions,
    ) -> Result<()> {
        let full_key = self.entry_key(key);
        let ttl = options.resolve_ttl(&self.inner.config);
        let bytes = codec::encode(value)?;
        if bytes.len() > self.inner.config.max_entry_size {
            warn!(key, size = bytes.len(), "value exceeds max entry size, not cached");
            return Ok(());
        }

        if let Err(e) = self.inner.remote.set_ex(&full_key, &bytes, ttl).await {
            self.inner
                .counters
                .remote_errors
                .fetch_add(1, Ordering::Relaxed);
            warn!(key, error = %e, "remote write failed, local tier only");
        }
        self.inner.local.set(&full_key, bytes, ttl, &options.tags);

        for tag in &options.tags {
            if let Err(e) = self.inner.tags.tag(tag, &full_key, ttl).await {
                warn!(tag, error = %e, "failed to register tag");
            }
        }
        self.inner.counters.sets.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Remove from both tiers. Deleting an absent key is not an error.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let full_key = self.entry_key(key);
        if let Err(e) = self.inner.remote.del(&[full_key.clone()]).await {
            self.inner
                .counters
                .remote_errors
                .fetch_add(1, Ordering::Relaxed);
            warn!(key, error = %e, "remote delete failed");
        }
        self.inner.local.delete(&full_key);
        self.inner.counters.deletes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Delete every entry registered under `tag`. Best-effort complete:
    /// keys that are already gone or unreachable do not fail the operation.
    pub async fn invalidate_tag(&self, tag: &str) -> Result<usize> {
        self.inner.tags.invalidate(tag).await
    }

    /// Drop everything this cache wrote: the remote namespace and the whole
    /// local tier.
    pub async fn clear(&self) -> Result<()> {
        let prefix = format!("{}:", self.inner.config.namespace);
        if let Err(e) = self.inner.remote.clear_namespace(&prefix).await {
            self.inner
                .counters
                .remote_errors
                .fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, "remote clear failed");
        }
        self.inner.local.clear();
        Ok(())
    }

    /// Read-through sugar: cached value if present, otherwise run `query`,
    /// cache its result under `tags` and return it.
    pub async fn cached_query<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        tags: &[&str],
        query: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.get(key).await? {
            return Ok(value);
        }
        let value = query().await?;
        let options = WriteOptions::new().with_ttl(ttl).with_tags(tags.iter().copied());
        if let Err(e) = self.set(key, &value, options).await {
            warn!(key, error = %e, "failed to cache query result");
        }
        Ok(value)
    }

    /// Serve a cached value immediately, fresh or stale; refresh stale
    /// entries in the background. Only a total miss blocks on `fetcher`.
    ///
    /// An entry is fresh for `ttl` after it was written and servable for
    /// `stale_ttl` (the physical expiry). Concurrent stale hits for the
    /// same key coalesce into a single background refresh; refresh failures
    /// are counted and logged, never propagated — the caller already has a
    /// response.
    pub async fn stale_while_revalidate<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        stale_ttl: Duration,
        fetcher: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let full_key = self.entry_key(key);
        if let Some((value, stored_at)) = self.lookup::<T>(&full_key).await? {
            let age_ms = codec::epoch_ms().saturating_sub(stored_at) as u128;
            if age_ms > ttl.as_millis() {
                self.spawn_revalidation(key, stale_ttl, fetcher);
            }
            return Ok(value);
        }
        let value = fetcher().await?;
        self.store_refreshed(key, &value, stale_ttl).await;
        Ok(value)
    }

    fn spawn_revalidation<T, F, Fut>(&self, key: &str, stale_ttl: Duration, fetcher: F)
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        {
            let mut inflight = self.inner.revalidating.lock().unwrap();
            if !inflight.insert(key.to_string()) {
                debug!(key, "revalidation already in flight, coalescing");
                return;
            }
        }
        let cache = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            // Dropped on every exit path, so a fetcher that panics cannot
            // leave the key marked in flight and block later refreshes.
            let _inflight = InflightGuard {
                inner: Arc::clone(&cache.inner),
                key: key.clone(),
            };
            cache
                .inner
                .counters
                .revalidations
                .fetch_add(1, Ordering::Relaxed);
            match fetcher().await {
                Ok(value) => cache.store_refreshed(&key, &value, stale_ttl).await,
                Err(e) => {
                    cache
                        .inner
                        .counters
                        .revalidation_failures
                        .fetch_add(1, Ordering::Relaxed);
                    warn!(key = %key, error = %e, "background revalidation failed");
                }
            }
        });
    }

    async fn store_refreshed<T: Serialize>(&self, key: &str, value: &T, stale_ttl: Duration) {
        let options = WriteOptions::new().with_ttl(stale_ttl);
        if let Err(e) = self.set(key, value, options).await {
            warn!(key, error = %e, "failed to store refreshed value");
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let (ping, key_count) = futures::future::join(
            self.inner.remote.ping(),
            self.inner.remote.key_count(),
        )
        .await;
        CacheStats {
            remote_connected: ping.is_ok(),
            remote_key_count: key_count.unwrap_or(0),
            local_entry_count: self.inner.local.len(),
            counters: self.inner.counters.snapshot(),
        }
    }

    pub fn counters(&self) -> CacheCounters {
        self.inner.counters.snapshot()
    }

    pub fn remote_name(&self) -> &'static str {
        self.inner.remote.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn cache() -> Cache {
        Cache::new(Arc::new(MemoryStore::new()), CacheConfig::default())
    }

    #[test]
    fn explicit_ttl_beats_priority_tier() {
        let config = CacheConfig::default();
        let opts = WriteOptions::new()
            .with_ttl(Duration::from_secs(7))
            .with_priority(Priority::Static);
        assert_eq!(opts.resolve_ttl(&config), Duration::from_secs(7));

        let opts = WriteOptions::new().with_priority(Priority::Long);
        assert_eq!(opts.resolve_ttl(&config), config.tiers.long);

        let opts = WriteOptions::new();
        assert_eq!(opts.resolve_ttl(&config), config.default_ttl);
    }

    #[tokio::test]
    async fn counters_track_hits_and_misses() {
        let cache = cache();
        assert_eq!(cache.get::<String>("absent").await.unwrap(), None);
        cache
            .set("k", &"v".to_string(), WriteOptions::new())
            .await
            .unwrap();
        let _: Option<String> = cache.get("k").await.unwrap();
        let counters = cache.counters();
        assert_eq!(counters.misses, 1);
        assert_eq!(counters.hits, 1);
        assert_eq!(counters.sets, 1);
    }

    #[tokio::test]
    async fn get_or_fetch_does_not_cache_none() {
        let cache = cache();
        let result: Option<String> = cache
            .get_or_fetch("absent", WriteOptions::new(), || async { Ok(None) })
            .await
            .unwrap();
        assert_eq!(result, None);
        assert_eq!(cache.get::<String>("absent").await.unwrap(), None);
    }
}
