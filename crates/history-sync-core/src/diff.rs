use history_sync_models::{IdentityKey, WatchEvent};
use std::collections::HashSet;
use tracing::debug;

/// Identity keys of every watch already known
#[derive(Debug, Default)]
pub struct IdentityIndex {
    keys: HashSet<IdentityKey>,
}

impl IdentityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events(events: &[WatchEvent]) -> Self {
        let mut index = Self::new();
        for event in events {
            index.insert(event);
        }
        index
    }

    /// A watch is known if any of its keys is
    pub fn contains(&self, event: &WatchEvent) -> bool {
        event.identity_keys().iter().any(|key| self.keys.contains(key))
    }

    pub fn insert(&mut self, event: &WatchEvent) {
        self.keys.extend(event.identity_keys());
    }

    /// Number of distinct keys, not events
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Select the new watches to append to the log.
///
/// Existing records are never touched; a fetched watch that matches one of
/// them, or an earlier watch in the same batch, is dropped even when it
/// carries more metadata. The result is ordered oldest first.
pub fn reconcile(existing: &[WatchEvent], new: Vec<WatchEvent>) -> Vec<WatchEvent> {
    let mut index = IdentityIndex::from_events(existing);
    let fetched = new.len();

    let mut to_append = Vec::new();
    for event in new {
        if index.contains(&event) {
            continue;
        }
        index.insert(&event);
        to_append.push(event);
    }
    to_append.sort_by_key(|event| event.watched_at());

    debug!(
        existing = existing.len(),
        fetched,
        to_append = to_append.len(),
        "Reconciled fetched watches against the log"
    );
    to_append
}
