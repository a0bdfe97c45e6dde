//! Tag index: per-tag membership sets enabling bulk invalidation without a
//! key scan.
//!
//! The remote side keeps a set of entry keys under `{ns}:tag:{tag}`; the
//! local store records tag names on each entry. Stale members (keys that
//! have since expired) are tolerated everywhere — invalidation deletes what
//! it can and never fails because a key is already gone.

use crate::local::LocalStore;
use crate::store::RemoteStore;
use crate::Result;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct TagIndex {
    remote: Arc<dyn RemoteStore>,
    local: Arc<LocalStore>,
    namespace: String,
}

impl TagIndex {
    pub fn new(remote: Arc<dyn RemoteStore>, local: Arc<LocalStore>, namespace: String) -> Self {
        Self {
            remote,
            local,
            namespace,
        }
    }

    fn tag_key(&self, tag: &str) -> String {
        format!("{}:tag:{}", self.namespace, tag)
    }

    /// Register `entry_key` under `tag`. The tag set's expiry is pushed out
    /// to at least `ttl` so the index never dies before the entries it
    /// references.
    pub async fn tag(&self, tag: &str, entry_key: &str, ttl: Duration) -> Result<()> {
        self.remote
            .add_to_set(&self.tag_key(tag), entry_key, ttl)
            .await
    }

    /// Delete every entry registered under `tag` from both tiers, then drop
    /// the tag set itself. Best-effort: a remote outage downgrades to
    /// local-only invalidation. Returns the number of distinct keys
    /// targeted.
    pub async fn invalidate(&self, tag: &str) -> Result<usize> {
        let tag_key = self.tag_key(tag);
        let mut keys: HashSet<String> = HashSet::new();

        match self.remote.members_of(&tag_key).await {
            Ok(members) => keys.extend(members),
            Err(e) if e.is_remote_unavailable() => {
                warn!(tag, error = %e, "tag index unreachable, invalidating local tier only");
            }
            Err(e) => return Err(e),
        }
        keys.extend(self.local.keys_with_tag(tag));

        let targets: Vec<String> = keys.into_iter().collect();
        if targets.is_empty() {
            return Ok(0);
        }

        match self.remote.del(&targets).await {
            Ok(removed) => {
                debug!(tag, targeted = targets.len(), removed, "invalidated tag remotely");
            }
            Err(e) if e.is_remote_unavailable() => {
                warn!(tag, error = %e, "remote delete failed during tag invalidation");
            }
            Err(e) => return Err(e),
        }
        for key in &targets {
            self.local.delete(key);
        }

        // Clearing the member set is also best-effort; leftover members are
        // stale references the next invalidation tolerates.
        if let Err(e) = self.remote.del(&[tag_key]).await {
            warn!(tag, error = %e, "failed to clear tag member set");
        }

        Ok(targets.len())
    }
}
