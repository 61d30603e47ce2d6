//! Periodic full-table reload for the snapshot cache.
//!
//! One background task per join. Each tick scans the whole side table,
//! builds a fresh [`Snapshot`] and swaps it into the shared
//! [`SnapshotCache`]. Probes keep reading the previous generation until
//! the swap; a failed cycle leaves it in place.

use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::cache::{Snapshot, SnapshotCache};
use crate::metrics::JoinMetrics;
use crate::predicate::{filter_matches, Predicate};
use crate::source::{LookupError, LookupSource};
use crate::value::SideRow;

/// Scans the whole side table into a new snapshot.
///
/// The filter is applied locally as well, so sources that ignore it
/// still produce a correct snapshot.
///
/// # Errors
///
/// Returns the first [`LookupError`] produced by the scan.
pub async fn load_snapshot<S: LookupSource>(
    source: &S,
    key_fields: &[String],
    filter: &[Predicate],
) -> Result<Snapshot, LookupError> {
    let rows: Vec<SideRow> = source.full_scan(filter).try_collect().await?;
    let rows = rows.into_iter().filter(|row| filter_matches(filter, row));
    Ok(Snapshot::from_rows(rows, key_fields))
}

/// Handle to the background reload task.
#[derive(Debug)]
pub struct ReloadSupervisor {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ReloadSupervisor {
    /// Starts reloading `cache` every `period`.
    ///
    /// The first reload runs one full period after this call; the
    /// caller is expected to have loaded the initial snapshot already.
    #[must_use]
    pub fn spawn<S: LookupSource + 'static>(
        source: Arc<S>,
        cache: Arc<SnapshotCache>,
        key_fields: Vec<String>,
        filter: Vec<Predicate>,
        period: Duration,
        metrics: Arc<JoinMetrics>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Self::run(
            source,
            cache,
            key_fields,
            filter,
            period,
            metrics,
            cancel.clone(),
        ));
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    async fn run<S: LookupSource>(
        source: Arc<S>,
        cache: Arc<SnapshotCache>,
        key_fields: Vec<String>,
        filter: Vec<Predicate>,
        period: Duration,
        metrics: Arc<JoinMetrics>,
        cancel: CancellationToken,
    ) {
        let period = period.max(Duration::from_millis(1));
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let result = tokio::select! {
                () = cancel.cancelled() => break,
                result = load_snapshot(source.as_ref(), &key_fields, &filter) => result,
            };

            match result {
                Ok(snapshot) => {
                    let keys = snapshot.key_count();
                    let rows = snapshot.row_count();
                    let generation = cache.replace(snapshot);
                    JoinMetrics::incr(&metrics.snapshot_reloads);
                    tracing::debug!(
                        source = source.source_name(),
                        generation,
                        keys,
                        rows,
                        "side table snapshot reloaded"
                    );
                }
                Err(e) => {
                    JoinMetrics::incr(&metrics.snapshot_reload_failures);
                    tracing::warn!(
                        source = source.source_name(),
                        error = %e,
                        generation = cache.generation(),
                        "side table reload failed, keeping previous snapshot"
                    );
                }
            }
        }

        tracing::debug!(source = source.source_name(), "snapshot reload task stopped");
    }

    /// Whether the background task is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the task and waits for it to exit. Idempotent.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "snapshot reload task ended abnormally");
            }
        }
    }
}

impl Drop for ReloadSupervisor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
