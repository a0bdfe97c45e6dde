//! # cachekit
//!
//! 统一缓存层：远程/本地双层存储、标签失效、限流与分布式锁。
//!
//! A unified caching layer that fronts a shared remote key-value service
//! with a process-local fallback tier, and builds tag-based bulk
//! invalidation, a stale-while-revalidate read path, a fixed-window rate
//! limiter and a distributed mutual-exclusion lock on the same small set of
//! atomic primitives (set-if-absent, atomic increment, compare-and-delete).
//!
//! ## Core Philosophy
//!
//! - **Degrade, never fail**: a remote store outage must not surface to
//!   callers of `get`/`set` — reads fall through to the local tier, writes
//!   keep the local copy warm.
//! - **Atomic or nothing**: every cross-process mutation uses the store's
//!   native atomic operations; no read-modify-write pairs over the network.
//! - **Everything self-expires**: entries, tag sets, counters and lock
//!   records all carry a TTL; the only garbage collection is a best-effort
//!   sweep of the local tier.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Cache`] | Facade: get/set/delete, tag invalidation, cached queries, stale-while-revalidate |
//! | [`RemoteStore`] | Trait over the shared key-value service's atomic primitives |
//! | [`RedisStore`] | Production remote store (pooled, per-command timeouts, Lua for conditionals) |
//! | [`MemoryStore`] | Complete in-memory remote store for tests and single-process use |
//! | [`RateLimiter`] | Fixed-window quota checks per identifier |
//! | [`DistributedLock`] | Set-if-absent acquire, token-checked release |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cachekit::{Cache, CacheConfig, RedisStore, WriteOptions};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> cachekit::Result<()> {
//!     let store = Arc::new(RedisStore::connect(
//!         "redis://127.0.0.1:6379",
//!         Duration::from_secs(1),
//!     )?);
//!     let cache = Cache::new(store, CacheConfig::from_env());
//!
//!     cache
//!         .set(
//!             "user:42",
//!             &"profile".to_string(),
//!             WriteOptions::new()
//!                 .with_ttl(Duration::from_secs(300))
//!                 .with_tag("users"),
//!         )
//!         .await?;
//!     let profile: Option<String> = cache.get("user:42").await?;
//!     println!("{profile:?}");
//!
//!     cache.invalidate_tag("users").await?;
//!     Ok(())
//! }
//! ```
//!
//! Construct one [`Cache`] at process startup and hand clones to every
//! consumer; there is deliberately no global singleton. The rate limiter
//! and lock are independent consumers of the same [`RemoteStore`] and do
//! not go through the facade.

pub mod codec;
pub mod config;
pub mod error;
pub mod facade;
pub mod local;
pub mod lock;
pub mod rate_limit;
pub mod store;
pub mod tags;

pub use config::{CacheConfig, LockConfig, RateLimitConfig, TtlTiers};
pub use error::Error;
pub use facade::{Cache, CacheCounters, CacheStats, Priority, WriteOptions};
pub use local::LocalStore;
pub use lock::DistributedLock;
pub use rate_limit::{RateLimitDecision, RateLimiter};
pub use store::{MemoryStore, RedisStore, RemoteStore};
pub use tags::TagIndex;

/// Result type alias for the library.
pub type Result<T> = std::result::Result<T, Error>;
