//! Shared fixtures for lookup join integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{stream, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::Notify;

use sidejoin_core::{
    EqualityField, JoinMetadata, JoinType, LookupError, LookupKey, LookupSource, OutputField,
    Predicate, SideRow,
};

/// In-memory side table with call counters and fault injection.
///
/// Ignores the pushed-down filter, so every filtering test also checks
/// that the join re-applies it locally.
#[derive(Default)]
pub struct MemorySource {
    rows: Mutex<Vec<SideRow>>,
    delay: Mutex<Option<Duration>>,
    key_delays: Mutex<HashMap<String, Duration>>,
    scan_gate: Mutex<Option<Arc<Notify>>>,
    fail_lookups: AtomicBool,
    fail_scans: AtomicBool,
    lookups: AtomicUsize,
    scans: AtomicUsize,
}

impl MemorySource {
    pub fn new(rows: Vec<SideRow>) -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(rows),
            ..Self::default()
        })
    }

    pub fn set_rows(&self, rows: Vec<SideRow>) {
        *self.rows.lock() = rows;
    }

    /// Delay applied to every lookup.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Delay applied to lookups for one cache key (e.g. `"3_"`).
    pub fn set_key_delay(&self, cache_key: &str, delay: Duration) {
        self.key_delays.lock().insert(cache_key.to_string(), delay);
    }

    /// Makes the next full scans wait until the gate is notified.
    pub fn gate_scans(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.scan_gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn fail_scans(&self, fail: bool) {
        self.fail_scans.store(fail, Ordering::SeqCst);
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    fn delayed(
        delay: Option<Duration>,
        gate: Option<Arc<Notify>>,
        result: Result<Vec<SideRow>, LookupError>,
    ) -> impl Stream<Item = Result<SideRow, LookupError>> + Send {
        stream::once(async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            result
        })
        .map(|result| {
            stream::iter(match result {
                Ok(rows) => rows.into_iter().map(Ok).collect::<Vec<_>>(),
                Err(e) => vec![Err(e)],
            })
        })
        .flatten()
    }
}

impl LookupSource for MemorySource {
    fn lookup<'a>(
        &'a self,
        key: &'a LookupKey,
        _filter: &'a [Predicate],
    ) -> impl Stream<Item = Result<SideRow, LookupError>> + Send + 'a {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let delay = self
            .key_delays
            .lock()
            .get(key.cache_key())
            .copied()
            .or(*self.delay.lock());
        let result = if self.fail_lookups.load(Ordering::SeqCst) {
            Err(LookupError::Query("injected failure".into()))
        } else {
            Ok(self
                .rows
                .lock()
                .iter()
                .filter(|row| {
                    key.equalities()
                        .iter()
                        .all(|(field, value)| row.get(field) == Some(value))
                })
                .cloned()
                .collect())
        };
        Self::delayed(delay, None, result)
    }

    fn full_scan<'a>(
        &'a self,
        _filter: &'a [Predicate],
    ) -> impl Stream<Item = Result<SideRow, LookupError>> + Send + 'a {
        self.scans.fetch_add(1, Ordering::SeqCst);
        let gate = self.scan_gate.lock().clone();
        let result = if self.fail_scans.load(Ordering::SeqCst) {
            Err(LookupError::Connection("injected failure".into()))
        } else {
            Ok(self.rows.lock().clone())
        };
        Self::delayed(None, gate, result)
    }

    fn source_name(&self) -> &str {
        "memory"
    }
}

pub fn user(id: i64, name: &str) -> SideRow {
    SideRow::new().with("id", id).with("name", name)
}

/// `driving[0] = side.id`, output `(id, name)`.
pub fn metadata(join_type: JoinType) -> JoinMetadata {
    JoinMetadata {
        join_type,
        input_arity: 2,
        equality: vec![EqualityField::new(0, "id")],
        output: vec![OutputField::driving("id", 0), OutputField::side("name", "name")],
        predicates: vec![],
    }
}

/// Lets spawned tasks run after the paused clock moves.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
