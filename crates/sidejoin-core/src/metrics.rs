//! Lock-free lookup-join counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-join counters using atomics (no locks on the data path).
#[derive(Debug, Default)]
pub struct JoinMetrics {
    /// Driving records processed.
    pub records_in: AtomicU64,
    /// Output records emitted.
    pub records_out: AtomicU64,
    /// Cache probes answered by the cache.
    pub cache_hits: AtomicU64,
    /// Cache probes that fell through to the backend.
    pub cache_misses: AtomicU64,
    /// Backend lookups issued.
    pub backend_calls: AtomicU64,
    /// Rows returned by backend lookups (after local filtering).
    pub backend_rows: AtomicU64,
    /// Backend lookups that ended in an error.
    pub parse_errors: AtomicU64,
    /// Backend lookups that timed out.
    pub timeouts: AtomicU64,
    /// Driving records with a null equality value.
    pub null_keys: AtomicU64,
    /// Successful snapshot refreshes.
    pub snapshot_reloads: AtomicU64,
    /// Failed snapshot refreshes.
    pub snapshot_reload_failures: AtomicU64,
}

impl JoinMetrics {
    /// Records one cache probe outcome.
    pub fn record_probe(&self, hit: bool) {
        if hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a completed backend lookup.
    pub fn record_backend(&self, rows: u64) {
        self.backend_rows.fetch_add(rows, Ordering::Relaxed);
    }

    /// Records emitted output rows.
    pub fn record_output(&self, rows: usize) {
        self.records_out.fetch_add(rows as u64, Ordering::Relaxed);
    }

    /// Increments a single counter.
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of the current metrics.
    #[must_use]
    pub fn snapshot(&self) -> JoinMetricsSnapshot {
        JoinMetricsSnapshot {
            records_in: self.records_in.load(Ordering::Relaxed),
            records_out: self.records_out.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            backend_calls: self.backend_calls.load(Ordering::Relaxed),
            backend_rows: self.backend_rows.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            null_keys: self.null_keys.load(Ordering::Relaxed),
            snapshot_reloads: self.snapshot_reloads.load(Ordering::Relaxed),
            snapshot_reload_failures: self.snapshot_reload_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of [`JoinMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinMetricsSnapshot {
    /// Driving records processed.
    pub records_in: u64,
    /// Output records emitted.
    pub records_out: u64,
    /// Cache hits.
    pub cache_hits: u64,
    /// Cache misses.
    pub cache_misses: u64,
    /// Backend lookups issued.
    pub backend_calls: u64,
    /// Rows returned by the backend.
    pub backend_rows: u64,
    /// Backend errors.
    pub parse_errors: u64,
    /// Backend timeouts.
    pub timeouts: u64,
    /// Null-key records.
    pub null_keys: u64,
    /// Successful snapshot refreshes.
    pub snapshot_reloads: u64,
    /// Failed snapshot refreshes.
    pub snapshot_reload_failures: u64,
}

impl JoinMetricsSnapshot {
    /// Fraction of probes answered from cache, or `None` before any probe.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_ratio(&self) -> Option<f64> {
        let total = self.cache_hits + self.cache_misses;
        (total > 0).then(|| self.cache_hits as f64 / total as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let m = JoinMetrics::default();
        m.record_probe(true);
        m.record_probe(true);
        m.record_probe(false);
        m.record_backend(3);
        m.record_output(2);
        JoinMetrics::incr(&m.timeouts);

        let s = m.snapshot();
        assert_eq!(s.cache_hits, 2);
        assert_eq!(s.cache_misses, 1);
        assert_eq!(s.backend_rows, 3);
        assert_eq!(s.records_out, 2);
        assert_eq!(s.timeouts, 1);
        assert_eq!(s.null_keys, 0);
    }

    #[test]
    fn test_hit_ratio() {
        assert_eq!(JoinMetricsSnapshot::default().hit_ratio(), None);
        let s = JoinMetricsSnapshot {
            cache_hits: 3,
            cache_misses: 1,
            ..JoinMetricsSnapshot::default()
        };
        assert_eq!(s.hit_ratio(), Some(0.75));
    }
}
