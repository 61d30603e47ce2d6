//! Async lookup orchestration.
//!
//! [`LookupJoin`] turns one driving record into zero or more enriched
//! records:
//!
//! ```text
//! record ─► build_key ─┬─ null ───────────────────────────► missing-key policy
//!                      └─ key ─► cache probe ─┬─ hit ─────► merge cached rows
//!                                             └─ miss ────► backend lookup
//!                                                            ├─ rows  ─► cache + merge
//!                                                            ├─ none  ─► cache Miss + policy
//!                                                            ├─ error ─► empty (not cached)
//!                                                            └─ timeout ► breaker
//! ```
//!
//! `process` takes `&self`, so any number of records can be in flight on
//! one join; backend concurrency is capped by a semaphore.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::{Stream, StreamExt, TryStreamExt};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::cache::{LruSideCache, LruSideCacheConfig, SideCache, SnapshotCache};
use crate::config::{CacheMode, LookupJoinConfig};
use crate::entry::CacheEntry;
use crate::error::JoinError;
use crate::key::{build_key, LookupKey};
use crate::merge::RowMerger;
use crate::metadata::JoinMetadata;
use crate::metrics::{JoinMetrics, JoinMetricsSnapshot};
use crate::predicate::{build_filter, filter_matches, Predicate};
use crate::reload::{load_snapshot, ReloadSupervisor};
use crate::source::{LookupError, LookupSource};
use crate::value::{DrivingRecord, OutputRecord, SideRow};

/// Outcome of one bounded backend lookup.
enum Lookup {
    Rows(Vec<SideRow>),
    Failed(LookupError),
    TimedOut,
}

/// A lookup join against one side table.
pub struct LookupJoin<S: LookupSource + 'static> {
    metadata: Arc<JoinMetadata>,
    config: LookupJoinConfig,
    source: Arc<S>,
    cache: SideCache,
    filter: Vec<Predicate>,
    merger: RowMerger,
    timeouts: AtomicU64,
    metrics: Arc<JoinMetrics>,
    permits: Semaphore,
    reloader: Mutex<Option<ReloadSupervisor>>,
    closed: AtomicBool,
}

impl<S: LookupSource + 'static> LookupJoin<S> {
    /// Validates the configuration, builds the cache and, for the `all`
    /// cache mode, loads the side table and starts the reload task.
    ///
    /// # Errors
    ///
    /// - [`JoinError::Config`] / [`JoinError::Metadata`] on invalid input
    /// - [`JoinError::SnapshotLoad`] if the initial full scan fails
    pub async fn open(
        config: LookupJoinConfig,
        metadata: JoinMetadata,
        source: Arc<S>,
    ) -> Result<Self, JoinError> {
        config.validate()?;
        metadata.validate()?;

        let filter = match build_filter(&metadata.predicates) {
            Ok(filter) => filter,
            Err(e) => {
                tracing::warn!(
                    source = source.source_name(),
                    error = %e,
                    "ignoring side table predicates"
                );
                Vec::new()
            }
        };

        let metrics = Arc::new(JoinMetrics::default());
        let mut reloader = None;
        let cache = match config.cache_mode {
            CacheMode::None => SideCache::Disabled,
            CacheMode::Lru => {
                let capacity = NonZeroUsize::new(config.cache_capacity).ok_or_else(|| {
                    JoinError::Config("cache.size must be greater than 0".into())
                })?;
                SideCache::Lru(LruSideCache::new(LruSideCacheConfig {
                    capacity,
                    ttl: config.lru_ttl(),
                }))
            }
            CacheMode::All => {
                let key_fields = metadata.side_key_fields();
                let initial = load_snapshot(source.as_ref(), &key_fields, &filter)
                    .await
                    .map_err(JoinError::SnapshotLoad)?;
                tracing::info!(
                    source = source.source_name(),
                    keys = initial.key_count(),
                    rows = initial.row_count(),
                    "side table snapshot loaded"
                );
                let snapshot = Arc::new(SnapshotCache::new(initial));
                reloader = Some(ReloadSupervisor::spawn(
                    Arc::clone(&source),
                    Arc::clone(&snapshot),
                    key_fields,
                    filter.clone(),
                    config.cache_ttl,
                    Arc::clone(&metrics),
                ));
                SideCache::Snapshot(snapshot)
            }
        };

        tracing::info!(
            source = source.source_name(),
            join_type = %metadata.join_type,
            cache = cache.kind(),
            predicates = filter.len(),
            max_in_flight = config.max_in_flight,
            "lookup join opened"
        );

        Ok(Self {
            merger: RowMerger::new(&metadata.output, metadata.join_type),
            metadata: Arc::new(metadata),
            permits: Semaphore::new(config.max_in_flight),
            config,
            source,
            cache,
            filter,
            timeouts: AtomicU64::new(0),
            metrics,
            reloader: Mutex::new(reloader),
            closed: AtomicBool::new(false),
        })
    }

    /// Joins one driving record.
    ///
    /// Resolves once the output for this record is known. Outputs carry
    /// the record's insert/retract flag.
    ///
    /// # Errors
    ///
    /// - [`JoinError::Closed`] after [`close`](Self::close)
    /// - [`JoinError::TimeoutLimitExceeded`] when this record's lookup
    ///   timed out and pushed the timeout count over the limit
    pub async fn process(&self, record: &DrivingRecord) -> Result<Vec<OutputRecord>, JoinError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(JoinError::Closed);
        }
        JoinMetrics::incr(&self.metrics.records_in);

        let Some(key) = build_key(record, &self.metadata) else {
            JoinMetrics::incr(&self.metrics.null_keys);
            return Ok(self.emit(self.merger.unmatched(record)));
        };

        if let Some(entry) = self.cache.probe(key.cache_key()) {
            self.metrics.record_probe(true);
            return Ok(self.emit(self.merger.from_entry(record, &entry)));
        }
        if !matches!(self.cache, SideCache::Disabled) {
            self.metrics.record_probe(false);
        }

        match self.lookup(&key).await? {
            Lookup::Rows(rows) => {
                self.metrics.record_backend(rows.len() as u64);
                let entry = CacheEntry::from_rows(rows);
                let out = self.merger.from_entry(record, &entry);
                self.cache.insert(key.cache_key(), entry);
                Ok(self.emit(out))
            }
            Lookup::Failed(e) => {
                JoinMetrics::incr(&self.metrics.parse_errors);
                tracing::warn!(
                    source = self.source.source_name(),
                    key = key.cache_key(),
                    error = %e,
                    "side table lookup failed, dropping record"
                );
                Ok(Vec::new())
            }
            Lookup::TimedOut => self.on_timeout(record),
        }
    }

    /// One backend lookup, bounded by the in-flight cap and the timeout.
    ///
    /// On timeout the lookup future is dropped, so late rows are never
    /// observed.
    async fn lookup(&self, key: &LookupKey) -> Result<Lookup, JoinError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| JoinError::Closed)?;
        JoinMetrics::incr(&self.metrics.backend_calls);

        let rows = self
            .source
            .lookup(key, &self.filter)
            .try_filter(|row| futures::future::ready(filter_matches(&self.filter, row)))
            .try_collect::<Vec<SideRow>>();

        Ok(match tokio::time::timeout(self.config.async_timeout, rows).await {
            Ok(Ok(rows)) => Lookup::Rows(rows),
            Ok(Err(e)) => Lookup::Failed(e),
            Err(_elapsed) => Lookup::TimedOut,
        })
    }

    /// Handles a lookup that did not finish within the timeout.
    ///
    /// Every `timeout_log_every`-th timeout is logged. The record yields
    /// no output while the total stays within `async_timeout_limit`.
    /// Hosts that enforce their own deadline call this directly and must
    /// drop the pending [`process`](Self::process) future for the record.
    ///
    /// # Errors
    ///
    /// Returns [`JoinError::TimeoutLimitExceeded`] once the count exceeds
    /// the limit; the host must treat it as fatal.
    pub fn on_timeout(&self, record: &DrivingRecord) -> Result<Vec<OutputRecord>, JoinError> {
        let previous = self.timeouts.fetch_add(1, Ordering::AcqRel);
        let count = previous.saturating_add(1);
        JoinMetrics::incr(&self.metrics.timeouts);

        if previous % self.config.timeout_log_every == 0 {
            tracing::warn!(
                source = self.source.source_name(),
                timeout = ?self.config.async_timeout,
                count,
                insert = record.insert,
                "side table lookup timed out"
            );
        }

        let limit = self.config.async_timeout_limit;
        if count > limit {
            tracing::error!(
                source = self.source.source_name(),
                count,
                limit,
                "lookup timeouts beyond limit"
            );
            return Err(JoinError::TimeoutLimitExceeded { count, limit });
        }
        Ok(Vec::new())
    }

    /// Joins a stream of records with up to `max_in_flight` records in
    /// progress. Results arrive in completion order, not input order.
    pub fn run<'a, St>(
        &'a self,
        records: St,
    ) -> impl Stream<Item = Result<Vec<OutputRecord>, JoinError>> + 'a
    where
        St: Stream<Item = DrivingRecord> + 'a,
    {
        records
            .map(move |record| async move { self.process(&record).await })
            .buffer_unordered(self.config.max_in_flight)
    }

    /// Stops the reload task and rejects further records. Idempotent.
    ///
    /// Takes `&self` so a join shared through an `Arc` can be closed
    /// while other tasks still hold it.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.permits.close();
        let reloader = self.reloader.lock().take();
        if let Some(mut reloader) = reloader {
            reloader.shutdown().await;
        }
        tracing::info!(
            source = self.source.source_name(),
            timeouts = self.timeout_count(),
            "lookup join closed"
        );
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Current metric values.
    #[must_use]
    pub fn metrics(&self) -> JoinMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Lookups that have timed out so far.
    #[must_use]
    pub fn timeout_count(&self) -> u64 {
        self.timeouts.load(Ordering::Acquire)
    }

    /// The active cache.
    #[must_use]
    pub fn cache(&self) -> &SideCache {
        &self.cache
    }

    /// The predicates sent with every lookup.
    #[must_use]
    pub fn filter(&self) -> &[Predicate] {
        &self.filter
    }

    /// The join metadata.
    #[must_use]
    pub fn metadata(&self) -> &JoinMetadata {
        &self.metadata
    }

    fn emit(&self, out: Vec<OutputRecord>) -> Vec<OutputRecord> {
        self.metrics.record_output(out.len());
        out
    }
}

impl<S: LookupSource + 'static> std::fmt::Debug for LookupJoin<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupJoin")
            .field("source", &self.source.source_name())
            .field("join_type", &self.metadata.join_type)
            .field("cache", &self.cache)
            .field("timeouts", &self.timeout_count())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::stream;

    use super::*;
    use crate::metadata::{EqualityField, JoinType, OutputField, PredicateInfo};
    use crate::value::Record;

    /// Source that must never be called.
    struct Unreachable;

    impl LookupSource for Unreachable {
        fn lookup<'a>(
            &'a self,
            _key: &'a LookupKey,
            _filter: &'a [Predicate],
        ) -> impl Stream<Item = Result<SideRow, LookupError>> + Send + 'a {
            stream::iter(vec![Err::<SideRow, _>(LookupError::Internal(
                "unexpected lookup".into(),
            ))])
        }

        fn full_scan<'a>(
            &'a self,
            _filter: &'a [Predicate],
        ) -> impl Stream<Item = Result<SideRow, LookupError>> + Send + 'a {
            stream::empty()
        }

        fn source_name(&self) -> &str {
            "unreachable"
        }
    }

    fn meta(join_type: JoinType) -> JoinMetadata {
        JoinMetadata {
            join_type,
            input_arity: 1,
            equality: vec![EqualityField::new(0, "id")],
            output: vec![OutputField::driving("id", 0), OutputField::side("v", "v")],
            predicates: vec![],
        }
    }

    fn config(limit: u64, log_every: u64) -> LookupJoinConfig {
        LookupJoinConfig {
            async_timeout: Duration::from_millis(10),
            async_timeout_limit: limit,
            timeout_log_every: log_every,
            ..LookupJoinConfig::default()
        }
    }

    async fn open(config: LookupJoinConfig, meta: JoinMetadata) -> LookupJoin<Unreachable> {
        LookupJoin::open(config, meta, Arc::new(Unreachable))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_on_timeout_breaker() {
        let join = open(config(2, 1), meta(JoinType::Left)).await;
        let rec = Record::insert(vec![1_i64.into()]);

        assert!(join.on_timeout(&rec).unwrap().is_empty());
        assert!(join.on_timeout(&rec).unwrap().is_empty());
        let err = join.on_timeout(&rec).unwrap_err();
        assert!(matches!(
            err,
            JoinError::TimeoutLimitExceeded { count: 3, limit: 2 }
        ));
        assert_eq!(join.timeout_count(), 3);
        assert_eq!(join.metrics().timeouts, 3);
    }

    #[tokio::test]
    async fn test_null_key_skips_backend() {
        let join = open(config(u64::MAX, 10), meta(JoinType::Left)).await;
        let out = join
            .process(&Record::insert(vec![crate::value::ScalarValue::Null]))
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].row.iter().all(crate::value::ScalarValue::is_null));

        let m = join.metrics();
        assert_eq!(m.null_keys, 1);
        assert_eq!(m.backend_calls, 0);
    }

    #[tokio::test]
    async fn test_invalid_predicates_degrade_to_no_filter() {
        let mut m = meta(JoinType::Inner);
        m.predicates = vec![PredicateInfo::new("v", "LIKE", "'a%'")];
        let join = open(config(u64::MAX, 10), m).await;
        assert!(join.filter().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_fails_open() {
        let cfg = LookupJoinConfig {
            max_in_flight: 0,
            ..LookupJoinConfig::default()
        };
        let err = LookupJoin::open(cfg, meta(JoinType::Inner), Arc::new(Unreachable))
            .await
            .unwrap_err();
        assert!(matches!(err, JoinError::Config(_)));
    }

    #[tokio::test]
    async fn test_process_after_close() {
        let join = open(config(u64::MAX, 10), meta(JoinType::Left)).await;
        join.close().await;
        join.close().await;
        assert!(join.is_closed());
        let err = join
            .process(&Record::insert(vec![1_i64.into()]))
            .await
            .unwrap_err();
        assert!(matches!(err, JoinError::Closed));
    }
}
