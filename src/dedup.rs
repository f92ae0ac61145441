//! Time bounded memory of published alert ids
//!
//! Entries keep the time an id was first marked. Expiry happens only in
//! [`DedupStore::sweep`], so an entry can outlive the TTL by up to one sweep
//! interval.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Default)]
pub struct DedupStore {
    seen: HashMap<String, Instant>,
}

impl DedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_seen(&self, id: &str) -> bool {
        self.seen.contains_key(id)
    }

    /// Remember `id` as seen at `now`
    ///
    /// Marking an id again overwrites its timestamp. The monitor loop only
    /// marks ids that are not present, so the window runs from the first
    /// sighting.
    pub fn mark_seen(&mut self, id: impl Into<String>, now: Instant) {
        self.seen.insert(id.into(), now);
    }

    /// Drop every entry older than `ttl` at `now`
    ///
    /// Returns the number of removed entries.
    pub fn sweep(&mut self, now: Instant, ttl: Duration) -> usize {
        let before = self.seen.len();
        self.seen
            .retain(|_, first_seen| now.saturating_duration_since(*first_seen) <= ttl);

        let removed = before - self.seen.len();
        debug!("dedup sweep removed {removed} entries, {} remaining", self.seen.len());
        removed
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
