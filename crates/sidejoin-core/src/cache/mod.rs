//! Side-table caching strategies.
//!
//! One capability, three variants, chosen once when the join opens:
//!
//! | Variant | probe | insert | refresh |
//! |---------|-------|--------|---------|
//! | [`SideCache::Disabled`] | always `None` | no-op | n/a |
//! | [`SideCache::Lru`] | LRU + TTL | per record | n/a |
//! | [`SideCache::Snapshot`] | current snapshot, absent = `Miss` | no-op | wholesale swap |

/// Bounded LRU cache.
pub mod lru;
/// Full-table snapshot cache.
pub mod snapshot;

use std::sync::Arc;

pub use self::lru::{LruSideCache, LruSideCacheConfig};
pub use self::snapshot::{Snapshot, SnapshotCache};

use crate::entry::CacheEntry;

/// The cache in front of a lookup source.
#[derive(Debug)]
pub enum SideCache {
    /// No caching; every record goes to the backend.
    Disabled,
    /// Bounded per-key cache filled by record lookups.
    Lru(LruSideCache),
    /// Whole side table in memory, refreshed on a timer.
    Snapshot(Arc<SnapshotCache>),
}

impl SideCache {
    /// Looks up a key.
    ///
    /// `None` means the cache cannot answer and the backend must be
    /// asked. The snapshot variant always answers.
    #[must_use]
    pub fn probe(&self, key: &str) -> Option<CacheEntry> {
        match self {
            Self::Disabled => None,
            Self::Lru(cache) => cache.probe(key),
            Self::Snapshot(cache) => Some(cache.probe(key)),
        }
    }

    /// Records a resolved lookup. Only the LRU variant stores it.
    pub fn insert(&self, key: &str, entry: CacheEntry) {
        if let Self::Lru(cache) = self {
            cache.insert(key.to_string(), entry);
        }
    }

    /// Replaces the snapshot; returns the new generation, or `None` for
    /// variants that are not refreshed wholesale.
    pub fn refresh(&self, next: Snapshot) -> Option<u64> {
        match self {
            Self::Snapshot(cache) => Some(cache.replace(next)),
            Self::Disabled | Self::Lru(_) => None,
        }
    }

    /// Whether per-record results are written back.
    #[must_use]
    pub fn stores_lookups(&self) -> bool {
        matches!(self, Self::Lru(_))
    }

    /// Short name for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Disabled => "none",
            Self::Lru(_) => "lru",
            Self::Snapshot(_) => "all",
        }
    }
}
