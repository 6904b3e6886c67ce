use std::time::Duration;

use crate::error::StateError;
use crate::key::{KeyKind, StateKey};
use crate::store::{RefreshOutcome, SemaphoreOutcome, StateStore};

fn test_key(kind: KeyKind, id: &str) -> StateKey {
    StateKey::new(kind, format!("conformance:{id}"))
}

/// Run the full shared-store conformance test suite.
///
/// Call this from your backend's test module with a fresh store instance.
///
/// # Errors
///
/// Returns an error if any backend call fails. Assertion failures panic.
pub async fn run_store_conformance_tests(store: &dyn StateStore) -> Result<(), StateError> {
    test_get_missing(store).await?;
    test_set_and_get(store).await?;
    test_check_and_set_new(store).await?;
    test_check_and_set_existing(store).await?;
    test_delete(store).await?;
    test_delete_if_value(store).await?;
    test_refresh_if_value(store).await?;
    test_increment_with_expiry(store).await?;
    test_expire_if_unset(store).await?;
    test_semaphore_acquire(store).await?;
    test_semaphore_keep_alive(store).await?;
    test_semaphore_remove_stale(store).await?;
    test_set_remove(store).await?;
    test_hash_counters(store).await?;
    test_hash_check_and_increment(store).await?;
    Ok(())
}

async fn test_get_missing(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Lock, "missing");
    assert!(store.get(&key).await?.is_none(), "get on missing key should return None");
    assert!(!store.exists(&key).await?, "missing key should not exist");
    Ok(())
}

async fn test_set_and_get(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Lock, "set-get");
    store.set(&key, "hello", Some(Duration::from_secs(3600))).await?;
    assert_eq!(store.get(&key).await?.as_deref(), Some("hello"));
    assert!(store.exists(&key).await?);
    store.set(&key, "again", None).await?;
    assert_eq!(store.get(&key).await?.as_deref(), Some("again"));
    Ok(())
}

async fn test_check_and_set_new(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Lock, "cas-new");
    let created = store.check_and_set(&key, "v1", None).await?;
    assert!(created, "check_and_set on new key should return true");
    assert_eq!(store.get(&key).await?.as_deref(), Some("v1"));
    Ok(())
}

async fn test_check_and_set_existing(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Lock, "cas-existing");
    store.set(&key, "v1", None).await?;
    let created = store.check_and_set(&key, "v2", None).await?;
    assert!(!created, "check_and_set on existing key should return false");
    assert_eq!(
        store.get(&key).await?.as_deref(),
        Some("v1"),
        "original value should remain"
    );
    Ok(())
}

async fn test_delete(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Lock, "to-delete");
    store.set(&key, "bye", None).await?;
    assert!(store.delete(&key).await?, "delete should return true for existing key");
    assert!(store.get(&key).await?.is_none(), "get after delete should return None");
    assert!(!store.delete(&key).await?, "delete on missing key should return false");
    Ok(())
}

async fn test_delete_if_value(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Lock, "fenced");
    store.set(&key, "owner-a", None).await?;
    assert!(
        !store.delete_if_value(&key, "owner-b").await?,
        "fenced delete with a foreign token should not delete"
    );
    assert!(store.exists(&key).await?);
    assert!(store.delete_if_value(&key, "owner-a").await?);
    assert!(!store.exists(&key).await?);
    Ok(())
}

async fn test_refresh_if_value(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Lock, "refresh");
    let ttl = Duration::from_secs(60);

    assert_eq!(
        store.refresh_if_value(&key, "owner-a", ttl).await?,
        RefreshOutcome::Restored,
        "absent key should be written again"
    );
    assert_eq!(store.get(&key).await?.as_deref(), Some("owner-a"));
    assert_eq!(
        store.refresh_if_value(&key, "owner-a", ttl).await?,
        RefreshOutcome::Extended
    );

    store.set(&key, "owner-b", Some(ttl)).await?;
    assert_eq!(
        store.refresh_if_value(&key, "owner-a", ttl).await?,
        RefreshOutcome::Lost,
        "a foreign value must not be overwritten"
    );
    assert_eq!(store.get(&key).await?.as_deref(), Some("owner-b"));
    Ok(())
}

async fn test_increment_with_expiry(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::RateLimit, "counter");
    let ttl = Duration::from_secs(60);
    assert_eq!(store.increment_with_expiry(&key, ttl).await?, 1);
    assert_eq!(store.increment_with_expiry(&key, ttl).await?, 2);
    assert_eq!(store.increment_with_expiry(&key, ttl).await?, 3);
    Ok(())
}

async fn test_expire_if_unset(store: &dyn StateStore) -> Result<(), StateError> {
    let missing = test_key(KeyKind::Counters, "expire-missing");
    assert!(
        !store.expire_if_unset(&missing, Duration::from_secs(60)).await?,
        "missing key cannot receive an expiry"
    );

    let key = test_key(KeyKind::Counters, "expire-once");
    store.hash_increment(&key, "f", 1).await?;
    assert!(store.expire_if_unset(&key, Duration::from_secs(60)).await?);
    assert!(
        !store.expire_if_unset(&key, Duration::from_secs(120)).await?,
        "second call must keep the original window"
    );
    Ok(())
}

async fn test_semaphore_acquire(store: &dyn StateStore) -> Result<(), StateError> {
    let set = test_key(KeyKind::ActiveTrackers, "sem");
    let ttl = Duration::from_secs(60);
    let hb = |m: &str| test_key(KeyKind::Heartbeat, &format!("sem:{m}"));

    let first = store.semaphore_acquire(&set, &hb("a"), "a", 2, ttl).await?;
    assert_eq!(first, SemaphoreOutcome::Acquired);
    assert!(store.exists(&hb("a")).await?, "heartbeat should be created");

    let dup = store.semaphore_acquire(&set, &hb("a"), "a", 2, ttl).await?;
    assert_eq!(dup, SemaphoreOutcome::Duplicate);

    let second = store.semaphore_acquire(&set, &hb("b"), "b", 2, ttl).await?;
    assert_eq!(second, SemaphoreOutcome::Acquired);

    let full = store.semaphore_acquire(&set, &hb("c"), "c", 2, ttl).await?;
    assert_eq!(full, SemaphoreOutcome::Full);
    assert!(!store.exists(&hb("c")).await?, "rejected member gets no heartbeat");

    let mut members = store.set_members(&set).await?;
    members.sort();
    assert_eq!(members, vec!["a".to_owned(), "b".to_owned()]);
    Ok(())
}

async fn test_semaphore_keep_alive(store: &dyn StateStore) -> Result<(), StateError> {
    let set = test_key(KeyKind::ActiveTrackers, "keep-alive");
    let hb = test_key(KeyKind::Heartbeat, "keep-alive:m");
    let ttl = Duration::from_secs(60);

    store.semaphore_acquire(&set, &hb, "m", 1, ttl).await?;
    store.delete(&hb).await?;
    assert!(store.semaphore_keep_alive(&set, &hb, "m", ttl).await?);
    assert!(store.exists(&hb).await?, "member's heartbeat should be rewritten");

    store.set_remove(&set, "m").await?;
    store.delete(&hb).await?;
    assert!(
        !store.semaphore_keep_alive(&set, &hb, "m", ttl).await?,
        "removed member must not be kept alive"
    );
    assert!(
        !store.exists(&hb).await?,
        "no heartbeat may exist for a member outside the set"
    );
    Ok(())
}

async fn test_semaphore_remove_stale(store: &dyn StateStore) -> Result<(), StateError> {
    let set = test_key(KeyKind::ActiveTrackers, "stale");
    let live = test_key(KeyKind::Heartbeat, "stale:live");
    let dead = test_key(KeyKind::Heartbeat, "stale:dead");
    let ttl = Duration::from_secs(60);

    store.semaphore_acquire(&set, &live, "live", 2, ttl).await?;
    store.semaphore_acquire(&set, &dead, "dead", 2, ttl).await?;
    store.delete(&dead).await?;

    assert!(!store.semaphore_remove_stale(&set, &live, "live").await?);
    assert!(store.semaphore_remove_stale(&set, &dead, "dead").await?);
    assert!(!store.semaphore_remove_stale(&set, &dead, "dead").await?);
    assert_eq!(store.set_members(&set).await?, vec!["live".to_owned()]);
    Ok(())
}

async fn test_set_remove(store: &dyn StateStore) -> Result<(), StateError> {
    let set = test_key(KeyKind::ActiveTrackers, "remove");
    let hb = test_key(KeyKind::Heartbeat, "remove:x");
    store
        .semaphore_acquire(&set, &hb, "x", 1, Duration::from_secs(60))
        .await?;
    assert!(store.set_remove(&set, "x").await?);
    assert!(!store.set_remove(&set, "x").await?);
    assert!(store.set_members(&set).await?.is_empty());
    Ok(())
}

async fn test_hash_counters(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Counters, "hash");
    assert_eq!(store.hash_get(&key, "insights").await?, None);
    assert_eq!(store.hash_increment(&key, "insights", 5).await?, 5);
    assert_eq!(store.hash_increment(&key, "insights", -2).await?, 3);
    assert_eq!(store.hash_get(&key, "insights").await?, Some(3));
    Ok(())
}

async fn test_hash_check_and_increment(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Counters, "quota");
    assert!(store.hash_check_and_increment(&key, "runs", 2).await?);
    assert!(store.hash_check_and_increment(&key, "runs", 2).await?);
    assert!(
        !store.hash_check_and_increment(&key, "runs", 2).await?,
        "third increment should be denied at limit 2"
    );
    assert_eq!(
        store.hash_get(&key, "runs").await?,
        Some(2),
        "denied call must not mutate"
    );
    Ok(())
}
