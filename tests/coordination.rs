//! Cross-process coordination primitives: distributed lock and rate
//! limiter, exercised the way independent processes would share them —
//! separate instances over one store.

mod common;

use cachekit::{DistributedLock, LockConfig, MemoryStore, RateLimitConfig, RateLimiter};
use common::FailingStore;
use std::sync::Arc;
use std::time::Duration;

fn lock_pair() -> (DistributedLock, DistributedLock) {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let config = LockConfig::default().with_retry_delay(Duration::from_millis(1));
    (
        DistributedLock::new(store.clone(), config.clone()),
        DistributedLock::new(store, config),
    )
}

#[tokio::test]
async fn concurrent_acquirers_get_exactly_one_token() {
    let (caller_a, caller_b) = lock_pair();
    let ttl = Duration::from_secs(10);
    let (a, b) = tokio::join!(
        caller_a.acquire("report", ttl, 0),
        caller_b.acquire("report", ttl, 0)
    );
    let granted = [a.unwrap(), b.unwrap()];
    assert_eq!(granted.iter().filter(|t| t.is_some()).count(), 1);
}

#[tokio::test]
async fn waiter_acquires_after_release() {
    let (caller_a, caller_b) = lock_pair();
    let ttl = Duration::from_secs(10);
    let token = caller_a.acquire("report", ttl, 0).await.unwrap().unwrap();

    let waiter = tokio::spawn(async move { caller_b.acquire("report", ttl, 20).await });
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(caller_a.release("report", &token).await.unwrap());

    let token_b = waiter.await.unwrap().unwrap();
    assert!(token_b.is_some());
}

#[tokio::test(start_paused = true)]
async fn stale_owner_cannot_release_the_new_owners_lock() {
    let (caller_a, caller_b) = lock_pair();
    let token_a = caller_a
        .acquire("report", Duration::from_millis(40), 0)
        .await
        .unwrap()
        .unwrap();
    tokio::time::advance(Duration::from_millis(50)).await;
    let token_b = caller_b
        .acquire("report", Duration::from_secs(10), 0)
        .await
        .unwrap()
        .unwrap();

    assert!(!caller_a.release("report", &token_a).await.unwrap());
    assert!(caller_b.release("report", &token_b).await.unwrap());
}

#[tokio::test]
async fn lock_acquire_surfaces_remote_outage_as_error() {
    let lock = DistributedLock::new(Arc::new(FailingStore), LockConfig::default());
    let result = lock.acquire("report", Duration::from_secs(1), 0).await;
    assert!(result.is_err());
}

#[tokio::test(start_paused = true)]
async fn limiter_enforces_quota_across_instances_sharing_a_store() {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let config = RateLimitConfig::default()
        .with_limit(5)
        .with_window(Duration::from_secs(60));
    let limiter_a = RateLimiter::new(store.clone(), config.clone());
    let limiter_b = RateLimiter::new(store, config);

    for _ in 0..3 {
        assert!(limiter_a.check_default("user1").await.unwrap().allowed);
    }
    for _ in 0..2 {
        assert!(limiter_b.check_default("user1").await.unwrap().allowed);
    }
    // Sixth call in the shared window, regardless of which process makes it.
    assert!(!limiter_a.check_default("user1").await.unwrap().allowed);

    tokio::time::advance(Duration::from_secs(61)).await;
    assert!(limiter_b.check_default("user1").await.unwrap().allowed);
}

#[tokio::test]
async fn limiter_keeps_limiting_per_process_during_an_outage() {
    common::init_tracing();
    let limiter = RateLimiter::new(
        Arc::new(FailingStore),
        RateLimitConfig::default()
            .with_limit(2)
            .with_window(Duration::from_secs(60)),
    );
    assert!(limiter.check_default("user1").await.unwrap().allowed);
    assert!(limiter.check_default("user1").await.unwrap().allowed);
    let denied = limiter.check_default("user1").await.unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0);
}
