//! # sidejoin-core
//!
//! Async lookup joins: enrich a changelog stream with rows from a slower
//! external side table.
//!
//! Each driving record is keyed on its equality columns, probed against
//! a cache and, on a miss, looked up in the backend with a bounded
//! timeout. Hits, misses and multi-row matches are cached; a fully
//! materialized cache can be kept fresh by a background reload task.
//!
//! ## Module Overview
//!
//! - [`join`]: [`LookupJoin`], the per-record orchestrator
//! - [`cache`]: LRU and full-snapshot caches behind [`SideCache`]
//! - [`source`]: [`LookupSource`] backend trait
//! - [`key`], [`predicate`]: lookup keys and pushdown filters
//! - [`merge`]: output row projection
//! - [`reload`]: periodic snapshot refresh
//! - [`config`], [`metadata`]: join configuration and planner metadata

pub mod cache;
/// Lookup join configuration.
pub mod config;
pub mod entry;
/// Fatal join errors.
pub mod error;
pub mod join;
pub mod key;
pub mod merge;
pub mod metadata;
/// Lock-free join counters.
pub mod metrics;
pub mod predicate;
pub mod reload;
/// Async side-table backend trait.
pub mod source;
pub mod value;

// Re-export commonly used types
pub use cache::{LruSideCache, LruSideCacheConfig, SideCache, Snapshot, SnapshotCache};
pub use config::{CacheMode, LookupJoinConfig};
pub use entry::CacheEntry;
pub use error::JoinError;
pub use join::LookupJoin;
pub use key::{build_key, side_key, LookupKey, KEY_DELIMITER};
pub use merge::RowMerger;
pub use metadata::{EqualityField, FieldSource, JoinMetadata, JoinType, OutputField, PredicateInfo};
pub use metrics::{JoinMetrics, JoinMetricsSnapshot};
pub use predicate::{build_filter, filter_matches, predicate_to_sql, Predicate, PredicateError};
pub use reload::{load_snapshot, ReloadSupervisor};
pub use source::{LookupError, LookupSource};
pub use value::{DrivingRecord, OutputRecord, Record, Row, ScalarValue, SideRow};
