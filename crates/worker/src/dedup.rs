use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use shepherd_core::ItemKey;

/// Default bound on the number of keys held at once.
pub const DEFAULT_DEDUP_CAPACITY: usize = 10_000;

/// Keys that are queued or in flight in this process.
///
/// A fast local filter against enqueueing the same key twice from repeated
/// polls. It is not the cross-process guard; that is the
/// [`Gate`](crate::Gate). Each entry records when the key was accepted.
#[derive(Debug)]
pub struct DedupSet {
    entries: DashMap<ItemKey, Instant>,
    capacity: usize,
}

impl Default for DedupSet {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_DEDUP_CAPACITY)
    }
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A set holding at most `capacity` keys.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
        }
    }

    pub fn contains(&self, key: &ItemKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Mark `key` as present, refreshing its timestamp if it already was.
    pub fn insert(&self, key: ItemKey) {
        self.entries.insert(key, Instant::now());
    }

    /// Insert `key` only if it is absent and the set has room.
    ///
    /// Returns `true` if this call inserted it. Check and insert are one
    /// step, so two pollers racing on the same key cannot both win.
    pub fn try_insert(&self, key: ItemKey) -> bool {
        if self.entries.len() >= self.capacity {
            return false;
        }
        match self.entries.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(Instant::now());
                true
            }
        }
    }

    /// Forget `key`. Returns when it was accepted, if it was present.
    pub fn remove(&self, key: &ItemKey) -> Option<Instant> {
        self.entries.remove(key).map(|(_, accepted_at)| accepted_at)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether no further keys can be accepted.
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }
}
