//! Shared test doubles.

use async_trait::async_trait;
use cachekit::{Error, RemoteStore, Result};
use std::time::Duration;

/// Log output for tests run with `RUST_LOG` set.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// A remote store where every call fails, simulating a full outage.
pub struct FailingStore;

fn down<T>() -> Result<T> {
    Err(Error::remote("connection refused"))
}

#[async_trait]
impl RemoteStore for FailingStore {
    async fn set_ex(&self, _: &str, _: &[u8], _: Duration) -> Result<()> {
        down()
    }
    async fn get(&self, _: &str) -> Result<Option<Vec<u8>>> {
        down()
    }
    async fn del(&self, _: &[String]) -> Result<u64> {
        down()
    }
    async fn incr_with_expiry(&self, _: &str, _: Duration) -> Result<(u64, Duration)> {
        down()
    }
    async fn set_if_absent(&self, _: &str, _: &[u8], _: Duration) -> Result<bool> {
        down()
    }
    async fn compare_and_delete(&self, _: &str, _: &[u8]) -> Result<bool> {
        down()
    }
    async fn compare_and_expire(&self, _: &str, _: &[u8], _: Duration) -> Result<bool> {
        down()
    }
    async fn add_to_set(&self, _: &str, _: &str, _: Duration) -> Result<()> {
        down()
    }
    async fn members_of(&self, _: &str) -> Result<Vec<String>> {
        down()
    }
    async fn clear_namespace(&self, _: &str) -> Result<u64> {
        down()
    }
    async fn key_count(&self) -> Result<u64> {
        down()
    }
    async fn ping(&self) -> Result<()> {
        down()
    }
    fn name(&self) -> &'static str {
        "failing"
    }
}
