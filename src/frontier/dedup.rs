//! Sharded dedup store
//!
//! The store is the single source of truth for "has this canonical URL ever
//! been scheduled in this job". Entries are never removed. Each shard has
//! its own lock, and that lock is the only writer of the entries in it, so
//! state transitions of one entry are linearized.

use crate::state::EntryState;
use chrono::{DateTime, Utc};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard};

/// Everything the Frontier knows about one canonical URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub canonical_url: String,
    pub depth: u32,
    pub origin_domain: String,
    pub discovered_at: DateTime<Utc>,
    pub state: EntryState,
}

impl FrontierEntry {
    pub fn new(canonical_url: impl Into<String>, depth: u32, origin_domain: impl Into<String>) -> Self {
        Self {
            canonical_url: canonical_url.into(),
            depth,
            origin_domain: origin_domain.into(),
            discovered_at: Utc::now(),
            state: EntryState::Pending,
        }
    }

    pub fn with_state(mut self, state: EntryState) -> Self {
        self.state = state;
        self
    }
}

/// Result of a state transition request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The entry moved from `previous` to the requested state
    Applied { previous: EntryState, depth: u32 },
    /// The entry exists but cannot move to the requested state
    Refused { current: EntryState },
    /// No entry for this URL
    Unknown,
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

type Shard = HashMap<String, FrontierEntry>;

/// Dedup set keyed by canonical URL, sharded by hash
pub struct DedupStore {
    shards: Vec<Mutex<Shard>>,
}

impl DedupStore {
    /// Creates a store with `shards` independently locked shards (at least one)
    pub fn new(shards: usize) -> Self {
        let shards = (0..shards.max(1)).map(|_| Mutex::new(Shard::new())).collect();
        Self { shards }
    }

    fn shard(&self, url: &str) -> MutexGuard<'_, Shard> {
        let mut hasher = DefaultHasher::new();
        url.hash(&mut hasher);
        let index = (hasher.finish() % self.shards.len() as u64) as usize;
        self.shards[index]
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn contains(&self, url: &str) -> bool {
        self.shard(url).contains_key(url)
    }

    /// Inserts `entry` unless its URL is already known
    ///
    /// # Returns
    ///
    /// `true` if the entry was inserted, `false` if the URL was seen before.
    pub fn insert_if_absent(&self, entry: FrontierEntry) -> bool {
        let mut shard = self.shard(&entry.canonical_url);
        if shard.contains_key(&entry.canonical_url) {
            return false;
        }
        shard.insert(entry.canonical_url.clone(), entry);
        true
    }

    pub fn get(&self, url: &str) -> Option<FrontierEntry> {
        self.shard(url).get(url).cloned()
    }

    /// Moves the entry for `url` to `next` if the transition is legal
    pub fn transition(&self, url: &str, next: EntryState) -> Transition {
        let mut shard = self.shard(url);
        let Some(entry) = shard.get_mut(url) else {
            return Transition::Unknown;
        };

        if !entry.state.can_transition_to(next) {
            return Transition::Refused {
                current: entry.state,
            };
        }

        let previous = entry.state;
        entry.state = next;
        Transition::Applied {
            previous,
            depth: entry.depth,
        }
    }

    /// Total number of entries
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().map(|s| s.len()).unwrap_or(0))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries per state
    pub fn count_by_state(&self) -> HashMap<EntryState, usize> {
        let mut counts: HashMap<EntryState, usize> =
            EntryState::all_states().into_iter().map(|s| (s, 0)).collect();
        for shard in &self.shards {
            let shard = shard.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            for entry in shard.values() {
                *counts.entry(entry.state).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Copies of every entry, sorted by depth then URL
    pub fn entries(&self) -> Vec<FrontierEntry> {
        let mut all: Vec<FrontierEntry> = self
            .shards
            .iter()
            .flat_map(|shard| {
                shard
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .values()
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        all.sort_by(|a, b| (a.depth, &a.canonical_url).cmp(&(b.depth, &b.canonical_url)));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_insert_if_absent() {
        let store = DedupStore::new(4);
        assert!(store.insert_if_absent(FrontierEntry::new("http://a.test/", 0, "a.test")));
        assert!(!store.insert_if_absent(FrontierEntry::new("http://a.test/", 1, "a.test")));

        assert!(store.contains("http://a.test/"));
        assert_eq!(store.get("http://a.test/").unwrap().depth, 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_transitions_are_monotonic() {
        let store = DedupStore::new(1);
        store.insert_if_absent(FrontierEntry::new("http://a.test/", 2, "a.test"));

        assert_eq!(
            store.transition("http://a.test/", EntryState::Dispatched),
            Transition::Applied {
                previous: EntryState::Pending,
                depth: 2
            }
        );
        assert!(store
            .transition("http://a.test/", EntryState::Done)
            .is_applied());
        assert_eq!(
            store.transition("http://a.test/", EntryState::Failed),
            Transition::Refused {
                current: EntryState::Done
            }
        );
        assert_eq!(
            store.transition("http://b.test/", EntryState::Done),
            Transition::Unknown
        );
    }

    #[test]
    fn test_count_by_state() {
        let store = DedupStore::new(8);
        store.insert_if_absent(FrontierEntry::new("http://a.test/", 0, "a.test"));
        store.insert_if_absent(
            FrontierEntry::new("http://ads.test/x", 1, "ads.test").with_state(EntryState::Excluded),
        );

        let counts = store.count_by_state();
        assert_eq!(counts[&EntryState::Pending], 1);
        assert_eq!(counts[&EntryState::Excluded], 1);
        assert_eq!(counts[&EntryState::Done], 0);
    }

    #[test]
    fn test_concurrent_discovery_inserts_once() {
        let store = Arc::new(DedupStore::new(16));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    (0..100)
                        .filter(|i| {
                            store.insert_if_absent(FrontierEntry::new(
                                format!("http://a.test/{}", i),
                                1,
                                "a.test",
                            ))
                        })
                        .count()
                })
            })
            .collect();

        let inserted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(inserted, 100);
        assert_eq!(store.len(), 100);
    }
}
