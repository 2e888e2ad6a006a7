//! In-memory update storage backed by Moka.

use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::sync::Cache;

use super::UpdateStorage;

/// Each entry remembers the TTL it was stored with; the cache expires it
/// that long after creation (or after a re-mark).
#[derive(Clone)]
struct Entry {
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// Bounded in-memory processed-update set.
///
/// Thread-safe and cheap to clone (clones share the underlying cache).
/// Entries expire individually after the TTL they were marked with; once
/// the capacity bound is hit the cache evicts entries by its own policy,
/// which may drop an id before its TTL, so at-most-once dispatch stays
/// best-effort under eviction, matching the storage contract.
pub struct InMemoryStorage {
    inner: Arc<Cache<String, Entry>>,
}

impl Clone for InMemoryStorage {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl InMemoryStorage {
    /// Default capacity bound, plenty for the 24h the service itself
    /// retains undelivered updates.
    const DEFAULT_CAPACITY: u64 = 10_000;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Create a store holding at most `capacity` ids.
    pub fn with_capacity(capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .expire_after(PerEntryTtl)
            .build();
        Self {
            inner: Arc::new(cache),
        }
    }

    /// Number of live entries.
    ///
    /// Approximate under concurrent access, exact in tests after
    /// `run_pending_tasks`.
    pub fn len(&self) -> u64 {
        self.inner.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateStorage for InMemoryStorage {
    fn has(&self, id: &str) -> bool {
        self.inner.contains_key(id)
    }

    fn mark_processed(&self, id: &str, ttl: Duration) {
        self.inner.insert(id.to_string(), Entry { ttl });
    }
}

impl std::fmt::Debug for InMemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStorage")
            .field("entry_count", &self.inner.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marked_ids_are_reported() {
        let storage = InMemoryStorage::new();
        assert!(!storage.has("42"));

        storage.mark_processed("42", Duration::from_secs(60));
        assert!(storage.has("42"));
        assert!(!storage.has("43"));
    }

    #[test]
    fn test_entries_expire_after_ttl() {
        let storage = InMemoryStorage::new();
        storage.mark_processed("42", Duration::from_millis(20));
        assert!(storage.has("42"));

        std::thread::sleep(Duration::from_millis(50));
        assert!(!storage.has("42"));
    }

    #[test]
    fn test_remark_extends_ttl() {
        let storage = InMemoryStorage::new();
        storage.mark_processed("42", Duration::from_millis(40));
        std::thread::sleep(Duration::from_millis(25));

        storage.mark_processed("42", Duration::from_millis(60));
        std::thread::sleep(Duration::from_millis(30));
        assert!(storage.has("42"));
    }

    #[test]
    fn test_capacity_bound_evicts() {
        let storage = InMemoryStorage::with_capacity(10);
        for id in 0..1000 {
            storage.mark_processed(&id.to_string(), Duration::from_secs(600));
        }
        storage.inner.run_pending_tasks();
        assert!(storage.len() <= 10);
    }
}
