//! Remote store adapters.
//!
//! The facade, rate limiter and distributed lock all talk to a shared
//! key-value service through the [`RemoteStore`] trait. [`RedisStore`] is the
//! production implementation; [`MemoryStore`] is a complete in-process
//! implementation used by tests and by single-process deployments that do not
//! run a remote store at all.

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Atomic primitives offered by the shared key-value service.
///
/// Every method is a network call on the production implementation and can
/// fail; failures come back as [`crate::Error::Remote`] or
/// [`crate::Error::Timeout`], never as a panic. Mutations must use the
/// store's native atomic operations — no implementation may emulate them
/// with a read followed by a write.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Store `value` under `key` with an expiry.
    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete keys; returns how many existed. Absent keys are not an error.
    async fn del(&self, keys: &[String]) -> Result<u64>;

    /// Atomically increment the counter at `key`. The first increment in a
    /// window arms the expiry. Returns the post-increment count and the time
    /// remaining until the counter resets — both from a single round trip.
    async fn incr_with_expiry(&self, key: &str, window: Duration) -> Result<(u64, Duration)>;

    /// `SET key value NX PX ttl` semantics: succeeds only if `key` is absent.
    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool>;

    /// Delete `key` only if its current value equals `expected`, in one
    /// atomic round trip. A check followed by a separate delete would let
    /// another owner slip in between; that is not an acceptable
    /// implementation.
    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool>;

    /// Reset the expiry of `key` only if its current value equals
    /// `expected`; atomic for the same reason as [`compare_and_delete`].
    ///
    /// [`compare_and_delete`]: RemoteStore::compare_and_delete
    async fn compare_and_expire(&self, key: &str, expected: &[u8], ttl: Duration) -> Result<bool>;

    /// Add `member` to the set at `set_key`, keeping the set alive for at
    /// least `ttl` (the expiry is pushed out, never shortened below it).
    async fn add_to_set(&self, set_key: &str, member: &str, ttl: Duration) -> Result<()>;

    async fn members_of(&self, set_key: &str) -> Result<Vec<String>>;

    /// Delete every key under `prefix`. Scoped so a shared store is never
    /// flushed wholesale.
    async fn clear_namespace(&self, prefix: &str) -> Result<u64>;

    /// Total keys held by the store (for diagnostics).
    async fn key_count(&self) -> Result<u64>;

    /// Liveness probe.
    async fn ping(&self) -> Result<()>;

    fn name(&self) -> &'static str;
}
