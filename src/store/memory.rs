//! In-memory implementation of [`RemoteStore`].
//!
//! Complete enough to stand in for the real store in tests and in
//! single-process deployments. Expiry uses `tokio::time::Instant`, so tests
//! can drive it with a paused clock. Counters are stored as decimal strings,
//! matching how the remote store represents them.

use super::RemoteStore;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;
use tokio::time::Instant;

enum Stored {
    Bytes(Vec<u8>),
    Set(HashSet<String>),
}

struct MemEntry {
    stored: Stored,
    expires_at: Option<Instant>,
}

impl MemEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.map(|at| at <= Instant::now()).unwrap_or(false)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, MemEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove the entry if it has expired, so callers observe the same
    /// "expired means absent" behavior the remote store gives them.
    fn purge_expired(entries: &mut HashMap<String, MemEntry>, key: &str) {
        if entries.get(key).map(MemEntry::is_expired).unwrap_or(false) {
            entries.remove(key);
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            key.to_string(),
            MemEntry {
                stored: Stored::Bytes(value.to_vec()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut entries = self.entries.write().unwrap();
        Self::purge_expired(&mut entries, key);
        match entries.get(key) {
            Some(MemEntry {
                stored: Stored::Bytes(data),
                ..
            }) => Ok(Some(data.clone())),
            _ => Ok(None),
        }
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        let mut entries = self.entries.write().unwrap();
        let mut removed = 0;
        for key in keys {
            Self::purge_expired(&mut entries, key);
            if entries.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn incr_with_expiry(&self, key: &str, window: Duration) -> Result<(u64, Duration)> {
        let mut entries = self.entries.write().unwrap();
        Self::purge_expired(&mut entries, key);
        let now = Instant::now();
        match entries.get_mut(key) {
            Some(entry) => {
                let current = match &entry.stored {
                    Stored::Bytes(data) => std::str::from_utf8(data)
                        .ok()
                        .and_then(|s| s.parse::<u64>().ok())
                        .ok_or_else(|| Error::remote("counter holds a non-numeric value"))?,
                    Stored::Set(_) => {
                        return Err(Error::remote("counter key holds a set"));
                    }
                };
                let count = current + 1;
                entry.stored = Stored::Bytes(count.to_string().into_bytes());
                let reset_in = entry
                    .expires_at
                    .map(|at| at.saturating_duration_since(now))
                    .unwrap_or(window);
                Ok((count, reset_in))
            }
            None => {
                entries.insert(
                    key.to_string(),
                    MemEntry {
                        stored: Stored::Bytes(b"1".to_vec()),
                        expires_at: Some(now + window),
                    },
                );
                Ok((1, window))
            }
        }
    }

    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.write().unwrap();
        Self::purge_expired(&mut entries, key);
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            MemEntry {
                stored: Stored::Bytes(value.to_vec()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool> {
        let mut entries = self.entries.write().unwrap();
        Self::purge_expired(&mut entries, key);
        let matches = matches!(
            entries.get(key),
            Some(MemEntry {
                stored: Stored::Bytes(data),
                ..
            }) if data.as_slice() == expected
        );
        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }

    async fn compare_and_expire(&self, key: &str, expected: &[u8], ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.write().unwrap();
        Self::purge_expired(&mut entries, key);
        match entries.get_mut(key) {
            Some(entry) => match &entry.stored {
                Stored::Bytes(data) if data.as_slice() == expected => {
                    entry.expires_at = Some(Instant::now() + ttl);
                    Ok(true)
                }
                _ => Ok(false),
            },
            None => Ok(false),
        }
    }

    async fn add_to_set(&self, set_key: &str, member: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        Self::purge_expired(&mut entries, set_key);
        let floor = Instant::now() + ttl;
        match entries.get_mut(set_key) {
            Some(entry) => {
                match &mut entry.stored {
                    Stored::Set(members) => {
                        members.insert(member.to_string());
                    }
                    Stored::Bytes(_) => {
                        return Err(Error::remote("set key holds a plain value"));
                    }
                }
                // Push the expiry out, never pull it in.
                entry.expires_at = Some(entry.expires_at.map_or(floor, |at| at.max(floor)));
            }
            None => {
                let mut members = HashSet::new();
                members.insert(member.to_string());
                entries.insert(
                    set_key.to_string(),
                    MemEntry {
                        stored: Stored::Set(members),
                        expires_at: Some(floor),
                    },
                );
            }
        }
        Ok(())
    }

    async fn members_of(&self, set_key: &str) -> Result<Vec<String>> {
        let mut entries = self.entries.write().unwrap();
        Self::purge_expired(&mut entries, set_key);
        match entries.get(set_key) {
            Some(MemEntry {
                stored: Stored::Set(members),
                ..
            }) => Ok(members.iter().cloned().collect()),
            _ => Ok(Vec::new()),
        }
    }

    async fn clear_namespace(&self, prefix: &str) -> Result<u64> {
        let mut entries = self.entries.write().unwrap();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }

    async fn key_count(&self) -> Result<u64> {
        let entries = self.entries.read().unwrap();
        Ok(entries.values().filter(|e| !e.is_expired()).count() as u64)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
