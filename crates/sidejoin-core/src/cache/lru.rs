//! Bounded LRU cache with per-entry TTL.
//!
//! Exact least-recently-used eviction: a probe hit refreshes recency, an
//! insert beyond capacity drops the entry touched longest ago. Entries
//! older than the TTL are invisible to [`LruSideCache::probe`] and are
//! removed when a probe finds them.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use ::lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::entry::CacheEntry;

/// Configuration for [`LruSideCache`].
#[derive(Debug, Clone, Copy)]
pub struct LruSideCacheConfig {
    /// Maximum number of keys held.
    pub capacity: NonZeroUsize,
    /// Entry lifetime; `None` keeps entries until evicted.
    pub ttl: Option<Duration>,
}

#[derive(Debug)]
struct TimedEntry {
    entry: CacheEntry,
    inserted_at: Instant,
}

impl TimedEntry {
    fn is_expired(&self, ttl: Option<Duration>, now: Instant) -> bool {
        ttl.is_some_and(|ttl| now.saturating_duration_since(self.inserted_at) >= ttl)
    }
}

/// Capacity- and TTL-bounded key → [`CacheEntry`] store.
///
/// # Thread safety
///
/// All access goes through one `parking_lot::Mutex`; critical sections
/// are a hash lookup plus a list splice, so contention stays low even
/// with many lookups in flight.
pub struct LruSideCache {
    inner: Mutex<LruCache<String, TimedEntry>>,
    ttl: Option<Duration>,
    evictions: AtomicU64,
}

impl LruSideCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new(config: LruSideCacheConfig) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(config.capacity)),
            ttl: config.ttl,
            evictions: AtomicU64::new(0),
        }
    }

    /// Looks up a key and marks it most recently used.
    ///
    /// Expired entries are removed and reported as absent. Hit and miss
    /// totals are counted by the caller in `JoinMetrics`.
    pub fn probe(&self, key: &str) -> Option<CacheEntry> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let live = inner
            .get(key)
            .map(|timed| (!timed.is_expired(self.ttl, now)).then(|| timed.entry.clone()));
        match live {
            Some(Some(entry)) => Some(entry),
            Some(None) => {
                inner.pop(key);
                None
            }
            None => None,
        }
    }

    /// Inserts or replaces an entry, evicting the LRU key on overflow.
    pub fn insert(&self, key: String, entry: CacheEntry) {
        let timed = TimedEntry {
            entry,
            inserted_at: Instant::now(),
        };
        let evicted = self.inner.lock().push(key.clone(), timed);
        if matches!(evicted, Some((ref old, _)) if *old != key) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Removes a key.
    pub fn invalidate(&self, key: &str) {
        self.inner.lock().pop(key);
    }

    /// Whether a live entry exists, without touching recency.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.inner
            .lock()
            .peek(key)
            .is_some_and(|t| !t.is_expired(self.ttl, now))
    }

    /// Number of stored entries, including expired ones not yet removed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.lock().cap().get()
    }

    /// Total capacity evictions since creation.
    #[must_use]
    pub fn eviction_count(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for LruSideCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruSideCache")
            .field("entries", &self.len())
            .field("capacity", &self.capacity())
            .field("ttl", &self.ttl)
            .field("evictions", &self.eviction_count())
            .finish_non_exhaustive()
    }
}
