use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use parking_lot::Mutex;
use tokio::time::Instant;

use shepherd_state::{RefreshOutcome, SemaphoreOutcome, StateError, StateKey, StateStore};

/// The typed payload stored under a key.
#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Set(HashSet<String>),
    Hash(HashMap<String, i64>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Set(_) => "set",
            Self::Hash(_) => "hash",
        }
    }
}

/// A single entry in the in-memory store.
#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
        }
    }

    /// Returns `true` if this entry has passed its TTL deadline.
    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

fn wrong_type(key: &str, expected: &str, found: &Value) -> StateError {
    StateError::Backend(format!(
        "WRONGTYPE key {key} holds a {} value, expected {expected}",
        found.type_name()
    ))
}

fn overflow(key: &str) -> StateError {
    StateError::Backend(format!("increment on {key} would overflow"))
}

/// In-memory [`StateStore`] backed by a [`DashMap`].
///
/// Entries are lazily evicted when touched after their TTL has elapsed.
/// Single-key operations are atomic through the map's shard locks; the
/// semaphore scripts span two keys and are serialised on their own mutex.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    data: DashMap<String, Entry>,
    script: Mutex<()>,
}

impl MemoryStateStore {
    /// Create a new, empty in-memory state store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop `key` if its TTL has passed.
    fn evict(&self, key: &str) {
        self.data.remove_if(key, |_, entry| entry.is_expired());
    }

    /// Remove `member` from the set stored under `rendered`, dropping the set
    /// once it is empty.
    fn remove_member(&self, rendered: &str, member: &str) -> Result<bool, StateError> {
        self.evict(rendered);

        let Some(mut entry) = self.data.get_mut(rendered) else {
            return Ok(false);
        };
        let (removed, now_empty) = match &mut entry.value {
            Value::Set(members) => (members.remove(member), members.is_empty()),
            other => return Err(wrong_type(rendered, "set", other)),
        };
        drop(entry);

        // An empty set does not exist.
        if now_empty {
            self.data.remove_if(rendered, |_, entry| {
                matches!(&entry.value, Value::Set(members) if members.is_empty())
            });
        }
        Ok(removed)
    }

    fn is_member(&self, rendered: &str, member: &str) -> Result<bool, StateError> {
        self.evict(rendered);
        match self.data.get(rendered) {
            None => Ok(false),
            Some(entry) => match &entry.value {
                Value::Set(members) => Ok(members.contains(member)),
                other => Err(wrong_type(rendered, "set", other)),
            },
        }
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn check_and_set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StateError> {
        let rendered = key.canonical();
        self.evict(rendered);

        let was_inserted = match self.data.entry(rendered.to_owned()) {
            MapEntry::Occupied(_) => false,
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry::new(Value::Str(value.to_owned()), ttl));
                true
            }
        };

        Ok(was_inserted)
    }

    async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError> {
        let rendered = key.canonical();
        self.evict(rendered);

        match self.data.get(rendered) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Value::Str(s) => Ok(Some(s.clone())),
                other => Err(wrong_type(rendered, "string", other)),
            },
        }
    }

    async fn set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StateError> {
        self.data.insert(
            key.canonical().to_owned(),
            Entry::new(Value::Str(value.to_owned()), ttl),
        );
        Ok(())
    }

    async fn delete(&self, key: &StateKey) -> Result<bool, StateError> {
        // Expired entries count as "not found".
        match self.data.remove(key.canonical()) {
            Some((_, entry)) => Ok(!entry.is_expired()),
            None => Ok(false),
        }
    }

    async fn delete_if_value(&self, key: &StateKey, expected: &str) -> Result<bool, StateError> {
        let rendered = key.canonical();
        self.evict(rendered);

        let removed = self
            .data
            .remove_if(rendered, |_, entry| {
                matches!(&entry.value, Value::Str(current) if current == expected)
            })
            .is_some();
        Ok(removed)
    }

    async fn refresh_if_value(
        &self,
        key: &StateKey,
        expected: &str,
        ttl: Duration,
    ) -> Result<RefreshOutcome, StateError> {
        let rendered = key.canonical();

        match self.data.entry(rendered.to_owned()) {
            MapEntry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.is_expired() {
                    *entry = Entry::new(Value::Str(expected.to_owned()), Some(ttl));
                    return Ok(RefreshOutcome::Restored);
                }
                match &entry.value {
                    Value::Str(current) if current == expected => {
                        entry.expires_at = Some(Instant::now() + ttl);
                        Ok(RefreshOutcome::Extended)
                    }
                    _ => Ok(RefreshOutcome::Lost),
                }
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry::new(Value::Str(expected.to_owned()), Some(ttl)));
                Ok(RefreshOutcome::Restored)
            }
        }
    }

    async fn exists(&self, key: &StateKey) -> Result<bool, StateError> {
        let rendered = key.canonical();
        self.evict(rendered);
        Ok(self.data.contains_key(rendered))
    }

    async fn increment_with_expiry(
        &self,
        key: &StateKey,
        ttl: Duration,
    ) -> Result<i64, StateError> {
        let rendered = key.canonical();
        self.evict(rendered);

        let mut entry = self
            .data
            .entry(rendered.to_owned())
            .or_insert_with(|| Entry::new(Value::Str("0".to_owned()), None));

        let next = match &mut entry.value {
            Value::Str(raw) => {
                let current: i64 = raw.parse().map_err(|e: std::num::ParseIntError| {
                    StateError::Serialization(format!("counter value is not an integer: {e}"))
                })?;
                let next = current.checked_add(1).ok_or_else(|| overflow(rendered))?;
                *raw = next.to_string();
                next
            }
            other => return Err(wrong_type(rendered, "string", other)),
        };

        if next == 1 {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(next)
    }

    async fn expire_if_unset(&self, key: &StateKey, ttl: Duration) -> Result<bool, StateError> {
        let rendered = key.canonical();
        self.evict(rendered);

        match self.data.get_mut(rendered) {
            Some(mut entry) if entry.expires_at.is_none() => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_members(&self, key: &StateKey) -> Result<Vec<String>, StateError> {
        let rendered = key.canonical();
        self.evict(rendered);

        match self.data.get(rendered) {
            None => Ok(Vec::new()),
            Some(entry) => match &entry.value {
                Value::Set(members) => Ok(members.iter().cloned().collect()),
                other => Err(wrong_type(rendered, "set", other)),
            },
        }
    }

    async fn set_remove(&self, key: &StateKey, member: &str) -> Result<bool, StateError> {
        self.remove_member(key.canonical(), member)
    }

    async fn semaphore_acquire(
        &self,
        set_key: &StateKey,
        heartbeat_key: &StateKey,
        member: &str,
        max: u64,
        ttl: Duration,
    ) -> Result<SemaphoreOutcome, StateError> {
        let _script = self.script.lock();
        let set_rendered = set_key.canonical();
        self.evict(set_rendered);

        let occupancy = match self.data.get(set_rendered) {
            None => 0,
            Some(entry) => match &entry.value {
                Value::Set(members) if members.contains(member) => {
                    return Ok(SemaphoreOutcome::Duplicate);
                }
                Value::Set(members) => members.len(),
                other => return Err(wrong_type(set_rendered, "set", other)),
            },
        };

        if u64::try_from(occupancy).unwrap_or(u64::MAX) >= max {
            return Ok(SemaphoreOutcome::Full);
        }

        // Heartbeat first: a member observed by a reconciler always has one.
        self.data.insert(
            heartbeat_key.canonical().to_owned(),
            Entry::new(Value::Str("1".to_owned()), Some(ttl)),
        );

        let mut entry = self
            .data
            .entry(set_rendered.to_owned())
            .or_insert_with(|| Entry::new(Value::Set(HashSet::new()), None));
        match &mut entry.value {
            Value::Set(members) => {
                members.insert(member.to_owned());
                Ok(SemaphoreOutcome::Acquired)
            }
            other => Err(wrong_type(set_rendered, "set", other)),
        }
    }

    async fn semaphore_keep_alive(
        &self,
        set_key: &StateKey,
        heartbeat_key: &StateKey,
        member: &str,
        ttl: Duration,
    ) -> Result<bool, StateError> {
        let _script = self.script.lock();
        if !self.is_member(set_key.canonical(), member)? {
            return Ok(false);
        }
        self.data.insert(
            heartbeat_key.canonical().to_owned(),
            Entry::new(Value::Str("1".to_owned()), Some(ttl)),
        );
        Ok(true)
    }

    async fn semaphore_remove_stale(
        &self,
        set_key: &StateKey,
        heartbeat_key: &StateKey,
        member: &str,
    ) -> Result<bool, StateError> {
        let _script = self.script.lock();
        let heartbeat = heartbeat_key.canonical();
        self.evict(heartbeat);
        if self.data.contains_key(heartbeat) {
            return Ok(false);
        }
        self.remove_member(set_key.canonical(), member)
    }

    async fn hash_get(&self, key: &StateKey, field: &str) -> Result<Option<i64>, StateError> {
        let rendered = key.canonical();
        self.evict(rendered);

        match self.data.get(rendered) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Value::Hash(fields) => Ok(fields.get(field).copied()),
                other => Err(wrong_type(rendered, "hash", other)),
            },
        }
    }

    async fn hash_increment(
        &self,
        key: &StateKey,
        field: &str,
        delta: i64,
    ) -> Result<i64, StateError> {
        let rendered = key.canonical();
        self.evict(rendered);

        let mut entry = self
            .data
            .entry(rendered.to_owned())
            .or_insert_with(|| Entry::new(Value::Hash(HashMap::new()), None));

        match &mut entry.value {
            Value::Hash(fields) => {
                let slot = fields.entry(field.to_owned()).or_insert(0);
                *slot = slot.checked_add(delta).ok_or_else(|| overflow(rendered))?;
                Ok(*slot)
            }
            other => Err(wrong_type(rendered, "hash", other)),
        }
    }

    async fn hash_check_and_increment(
        &self,
        key: &StateKey,
        field: &str,
        limit: i64,
    ) -> Result<bool, StateError> {
        let rendered = key.canonical();
        self.evict(rendered);

        match self.data.entry(rendered.to_owned()) {
            MapEntry::Occupied(mut occupied) => match &mut occupied.get_mut().value {
                Value::Hash(fields) => {
                    let slot = fields.entry(field.to_owned()).or_insert(0);
                    if *slot >= limit {
                        return Ok(false);
                    }
                    *slot += 1;
                    Ok(true)
                }
                other => Err(wrong_type(rendered, "hash", other)),
            },
            MapEntry::Vacant(vacant) => {
                if limit <= 0 {
                    return Ok(false);
                }
                vacant.insert(Entry::new(
                    Value::Hash(HashMap::from([(field.to_owned(), 1)])),
                    None,
                ));
                Ok(true)
            }
        }
    }
}
