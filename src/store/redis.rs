//! Redis implementation of [`RemoteStore`].
//!
//! Connections come from a deadpool pool; every command (pool checkout
//! included) runs under the configured command timeout so a wedged server
//! degrades into [`crate::Error::Timeout`] instead of a hang. The
//! conditional operations are Lua scripts, which Redis executes atomically
//! in a single round trip.

use super::RemoteStore;
use crate::{Error, Result};
use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Connection, Pool, Runtime};
use once_cell::sync::Lazy;
use redis::{AsyncCommands, Script};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// Delete the key only when it still holds the expected value.
static COMPARE_AND_DELETE: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#,
    )
});

/// Re-arm the expiry only when the key still holds the expected value.
static COMPARE_AND_EXPIRE: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('PEXPIRE', KEYS[1], ARGV[2])
else
  return 0
end
"#,
    )
});

/// INCR plus expiry arming and PTTL readback in one round trip.
static INCR_WITH_EXPIRY: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('PTTL', KEYS[1])
return {count, ttl}
"#,
    )
});

/// SADD, then push the set's expiry out to at least ARGV[2] ms. A freshly
/// created set is persistent, so the no-TTL case must arm one explicitly.
static ADD_TO_SET: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
redis.call('SADD', KEYS[1], ARGV[1])
local ttl = redis.call('PTTL', KEYS[1])
if ttl == -1 or (ttl >= 0 and ttl < tonumber(ARGV[2])) then
  redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 1
"#,
    )
});

pub struct RedisStore {
    pool: Pool,
    command_timeout: Duration,
}

impl RedisStore {
    /// Build a pooled client for `url` (e.g. `redis://127.0.0.1:6379`).
    /// No connection is opened until the first command.
    pub fn connect(url: &str, command_timeout: Duration) -> Result<Self> {
        let pool = PoolConfig::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| Error::Configuration(e.to_string()))?;
        Ok(Self {
            pool,
            command_timeout,
        })
    }

    /// Build from the `CACHEKIT_REDIS_URL` environment variable, defaulting
    /// to a local instance.
    pub fn from_env(command_timeout: Duration) -> Result<Self> {
        let url = std::env::var("CACHEKIT_REDIS_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        Self::connect(&url, command_timeout)
    }

    async fn conn(&self) -> Result<Connection> {
        self.pool.get().await.map_err(Error::remote)
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
    {
        match timeout(self.command_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.command_timeout)),
        }
    }
}

#[async_trait]
impl RemoteStore for RedisStore {
    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.run(async {
            let mut conn = self.conn().await?;
            let _: () = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("PX")
                .arg(ttl.as_millis().max(1) as u64)
                .query_async(&mut conn)
                .await
                .map_err(Error::remote)?;
            Ok(())
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.run(async {
            let mut conn = self.conn().await?;
            let value: Option<Vec<u8>> = conn.get(key).await.map_err(Error::remote)?;
            Ok(value)
        })
        .await
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.run(async {
            let mut conn = self.conn().await?;
            let removed: u64 = conn.del(keys.to_vec()).await.map_err(Error::remote)?;
            Ok(removed)
        })
        .await
    }

    async fn incr_with_expiry(&self, key: &str, window: Duration) -> Result<(u64, Duration)> {
        let window_ms = window.as_millis().max(1) as u64;
        self.run(async {
            let mut conn = self.conn().await?;
            let (count, pttl): (u64, i64) = INCR_WITH_EXPIRY
                .key(key)
                .arg(window_ms)
                .invoke_async(&mut conn)
                .await
                .map_err(Error::remote)?;
            let reset_in = if pttl > 0 {
                Duration::from_millis(pttl as u64)
            } else {
                window
            };
            Ok((count, reset_in))
        })
        .await
    }

    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        self.run(async {
            let mut conn = self.conn().await?;
            let reply: Option<String> = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("NX")
                .arg("PX")
                .arg(ttl.as_millis().max(1) as u64)
                .query_async(&mut conn)
                .await
                .map_err(Error::remote)?;
            Ok(reply.is_some())
        })
        .await
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool> {
        self.run(async {
            let mut conn = self.conn().await?;
            let removed: i64 = COMPARE_AND_DELETE
                .key(key)
                .arg(expected)
                .invoke_async(&mut conn)
                .await
                .map_err(Error::remote)?;
            Ok(removed == 1)
        })
        .await
    }

    async fn compare_and_expire(&self, key: &str, expected: &[u8], ttl: Duration) -> Result<bool> {
        self.run(async {
            let mut conn = self.conn().await?;
            let updated: i64 = COMPARE_AND_EXPIRE
                .key(key)
                .arg(expected)
                .arg(ttl.as_millis().max(1) as u64)
                .invoke_async(&mut conn)
                .await
                .map_err(Error::remote)?;
            Ok(updated == 1)
        })
        .await
    }

    async fn add_to_set(&self, set_key: &str, member: &str, ttl: Duration) -> Result<()> {
        self.run(async {
            let mut conn = self.conn().await?;
            let _: i64 = ADD_TO_SET
                .key(set_key)
                .arg(member)
                .arg(ttl.as_millis().max(1) as u64)
                .invoke_async(&mut conn)
                .await
                .map_err(Error::remote)?;
            Ok(())
        })
        .await
    }

    async fn members_of(&self, set_key: &str) -> Result<Vec<String>> {
        self.run(async {
            let mut conn = self.conn().await?;
            let members: Vec<String> = conn.smembers(set_key).await.map_err(Error::remote)?;
            Ok(members)
        })
        .await
    }

    async fn clear_namespace(&self, prefix: &str) -> Result<u64> {
        self.run(async {
            // Collected first: DEL while a SCAN cursor is open would skip keys.
            let mut conn = self.conn().await?;
            let pattern = format!("{prefix}*");
            let mut keys: Vec<String> = Vec::new();
            {
                let mut iter: redis::AsyncIter<'_, String> = conn
                    .scan_match(pattern)
                    .await
                    .map_err(Error::remote)?;
                while let Some(key) = iter.next_item().await {
                    keys.push(key);
                }
            }
            let mut removed = 0u64;
            for chunk in keys.chunks(200) {
                let n: u64 = conn.del(chunk.to_vec()).await.map_err(Error::remote)?;
                removed += n;
            }
            Ok(removed)
        })
        .await
    }

    async fn key_count(&self) -> Result<u64> {
        self.run(async {
            let mut conn = self.conn().await?;
            let count: i64 = redis::cmd("DBSIZE")
                .query_async(&mut conn)
                .await
                .map_err(Error::remote)?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        self.run(async {
            let mut conn = self.conn().await?;
            let _: String = redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(Error::remote)?;
            Ok(())
        })
        .await
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
