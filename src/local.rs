//! Process-local fallback store.
//!
//! A private in-process tier that keeps a process serving from its own
//! memory while the remote store is unreachable. It is not shared across
//! processes and is no substitute for multi-process consistency; each
//! process sees only its own writes.
//!
//! Growth is bounded two ways: expired entries are swept probabilistically
//! on writes (no background thread), and when the map is still full after a
//! sweep, the entry closest to expiry is evicted.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

struct LocalEntry {
    data: Vec<u8>,
    expires_at: Instant,
    tags: Vec<String>,
}

impl LocalEntry {
    fn is_expired(&self) -> bool {
        self.expires_at <= Instant::now()
    }
}

pub struct LocalStore {
    entries: RwLock<HashMap<String, LocalEntry>>,
    max_entries: usize,
    sweep_probability: f64,
}

impl LocalStore {
    pub fn new(max_entries: usize, sweep_probability: f64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
            sweep_probability,
        }
    }

    /// Returns the stored bytes if the entry is still live. An expired entry
    /// that the sweep has not reached yet reads as absent.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut entries = self.entries.write().unwrap();
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.data.clone()),
            None => None,
        }
    }

    pub fn set(&self, key: &str, data: Vec<u8>, ttl: Duration, tags: &[String]) {
        let mut entries = self.entries.write().unwrap();
        if rand::random::<f64>() < self.sweep_probability {
            Self::sweep(&mut entries);
        }
        if entries.len() >= self.max_entries && !entries.contains_key(key) {
            Self::sweep(&mut entries);
            while entries.len() >= self.max_entries {
                let soonest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.expires_at)
                    .map(|(k, _)| k.clone());
                match soonest {
                    Some(victim) => {
                        entries.remove(&victim);
                    }
                    None => break,
                }
            }
        }
        entries.insert(
            key.to_string(),
            LocalEntry {
                data,
                expires_at: Instant::now() + ttl,
                tags: tags.to_vec(),
            },
        );
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries.write().unwrap().remove(key).is_some()
    }

    /// Keys of live entries carrying `tag`; used for local tag invalidation
    /// when the remote tag index is unreachable.
    pub fn keys_with_tag(&self, tag: &str) -> Vec<String> {
        let entries = self.entries.read().unwrap();
        entries
            .iter()
            .filter(|(_, e)| !e.is_expired() && e.tags.iter().any(|t| t == tag))
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap();
        entries.values().filter(|e| !e.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sweep(entries: &mut HashMap<String, LocalEntry>) {
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired());
        let swept = before - entries.len();
        if swept > 0 {
            debug!(swept, "swept expired local cache entries");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn expired_entry_reads_as_absent() {
        let store = LocalStore::new(100, 0.0);
        store.set("k", b"v".to_vec(), Duration::from_secs(10), &[]);
        assert_eq!(store.get("k"), Some(b"v".to_vec()));
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn full_store_evicts_entry_closest_to_expiry() {
        let store = LocalStore::new(2, 0.0);
        store.set("short", b"a".to_vec(), Duration::from_secs(1), &[]);
        store.set("long", b"b".to_vec(), Duration::from_secs(100), &[]);
        store.set("new", b"c".to_vec(), Duration::from_secs(50), &[]);
        assert_eq!(store.get("short"), None);
        assert_eq!(store.get("long"), Some(b"b".to_vec()));
        assert_eq!(store.get("new"), Some(b"c".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_runs_on_write_when_probability_is_one() {
        let store = LocalStore::new(100, 1.0);
        store.set("old", b"a".to_vec(), Duration::from_secs(1), &[]);
        tokio::time::advance(Duration::from_secs(2)).await;
        store.set("fresh", b"b".to_vec(), Duration::from_secs(60), &[]);
        // The expired entry is gone without ever being read.
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn keys_with_tag_filters_by_tag() {
        let store = LocalStore::new(100, 0.0);
        store.set(
            "a",
            b"1".to_vec(),
            Duration::from_secs(60),
            &["users".to_string()],
        );
        store.set(
            "b",
            b"2".to_vec(),
            Duration::from_secs(60),
            &["orders".to_string()],
        );
        assert_eq!(store.keys_with_tag("users"), vec!["a".to_string()]);
    }

    #[test]
    fn overwrite_does_not_trigger_eviction() {
        let store = LocalStore::new(1, 0.0);
        store.set("k", b"1".to_vec(), Duration::from_secs(60), &[]);
        store.set("k", b"2".to_vec(), Duration::from_secs(60), &[]);
        assert_eq!(store.get("k"), Some(b"2".to_vec()));
        assert_eq!(store.len(), 1);
    }
}
