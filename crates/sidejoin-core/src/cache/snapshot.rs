//! Fully materialized side-table snapshot.
//!
//! The whole side table is held in memory, grouped by cache key. A
//! refresh builds a brand-new [`Snapshot`] off to the side and swaps the
//! shared pointer; the write lock is held only for that pointer store,
//! so probes never wait on a rebuild and never see a half-built map.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::time::Instant;

use crate::entry::CacheEntry;
use crate::key::side_key;
use crate::value::SideRow;

/// One immutable generation of the side table.
#[derive(Debug)]
pub struct Snapshot {
    entries: FxHashMap<String, CacheEntry>,
    row_count: usize,
    built_at: Instant,
}

impl Snapshot {
    /// An empty snapshot.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: FxHashMap::default(),
            row_count: 0,
            built_at: Instant::now(),
        }
    }

    /// Groups scanned rows by the key formed from `key_fields`.
    ///
    /// Rows whose key fields are null or missing are dropped; no driving
    /// row can reach them.
    #[must_use]
    pub fn from_rows(rows: impl IntoIterator<Item = SideRow>, key_fields: &[String]) -> Self {
        let mut grouped: FxHashMap<String, Vec<SideRow>> = FxHashMap::default();
        let mut row_count = 0;
        for row in rows {
            if let Some(key) = side_key(&row, key_fields) {
                grouped.entry(key).or_default().push(row);
                row_count += 1;
            }
        }
        let entries = grouped
            .into_iter()
            .map(|(k, rows)| (k, CacheEntry::from_rows(rows)))
            .collect();
        Self {
            entries,
            row_count,
            built_at: Instant::now(),
        }
    }

    /// Entry for a key, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of rows across all keys.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// When this generation finished building.
    #[must_use]
    pub fn built_at(&self) -> Instant {
        self.built_at
    }
}

/// Shared, atomically replaceable snapshot holder.
pub struct SnapshotCache {
    current: RwLock<Arc<Snapshot>>,
    generation: AtomicU64,
}

impl SnapshotCache {
    /// Create a holder seeded with an initial snapshot (generation 1).
    #[must_use]
    pub fn new(initial: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            generation: AtomicU64::new(1),
        }
    }

    /// Looks a key up in the current snapshot.
    ///
    /// Never falls back to the backend: a key absent from the snapshot is
    /// reported as [`CacheEntry::Miss`].
    #[must_use]
    pub fn probe(&self, key: &str) -> CacheEntry {
        self.load()
            .get(key)
            .cloned()
            .unwrap_or(CacheEntry::Miss)
    }

    /// The current snapshot. Holding the returned `Arc` pins that
    /// generation even if a refresh swaps in a newer one.
    #[must_use]
    pub fn load(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }

    /// Publishes a new snapshot and returns the new generation number.
    pub fn replace(&self, next: Snapshot) -> u64 {
        let next = Arc::new(next);
        let previous = std::mem::replace(&mut *self.current.write(), next);
        // Drop the old map outside the lock.
        drop(previous);
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// How many snapshots have been published, including the initial one.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for SnapshotCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snap = self.load();
        f.debug_struct("SnapshotCache")
            .field("generation", &self.generation())
            .field("keys", &snap.key_count())
            .field("rows", &snap.row_count())
            .finish()
    }
}
