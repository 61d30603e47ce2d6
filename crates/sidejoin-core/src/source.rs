//! Async side-table backend trait.
//!
//! [`LookupSource`] is the only thing the join needs from a backend
//! (document store, relational database, key-value store). It uses RPITIT
//! (Rust 1.75+) for zero-overhead async, no `async_trait` boxing.
//!
//! Both operations return a stream of rows. The end of the stream is the
//! explicit "no more rows" signal; an `Err` item aborts the operation.

use std::future::Future;
use std::time::Duration;

use futures::Stream;

use crate::key::LookupKey;
use crate::predicate::Predicate;
use crate::value::SideRow;

/// Errors from lookup source operations.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// Connection to the external system failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Query execution failed.
    #[error("query failed: {0}")]
    Query(String),

    /// The operation timed out.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The source is not available (e.g., not initialized).
    #[error("not available: {0}")]
    NotAvailable(String),

    /// Internal error (decode failure, driver bug, etc.).
    #[error("internal: {0}")]
    Internal(String),
}

/// Async side-table backend.
///
/// ## Implementing
///
/// `lookup` must return every row whose equality fields equal the key's
/// values. Sources should push `filter` down when they can; the join
/// re-checks it on every returned row, so ignoring it is correct but
/// slower.
pub trait LookupSource: Send + Sync {
    /// Rows matching one key.
    ///
    /// # Arguments
    ///
    /// * `key` - Equality `(field, value)` pairs, see [`LookupKey::equalities`]
    /// * `filter` - Extra predicates ANDed into the query (may be empty)
    fn lookup<'a>(
        &'a self,
        key: &'a LookupKey,
        filter: &'a [Predicate],
    ) -> impl Stream<Item = Result<SideRow, LookupError>> + Send + 'a;

    /// Every row of the side table that passes `filter`.
    ///
    /// Used to build and refresh the full snapshot cache.
    fn full_scan<'a>(
        &'a self,
        filter: &'a [Predicate],
    ) -> impl Stream<Item = Result<SideRow, LookupError>> + Send + 'a;

    /// Source name for logging and metrics.
    fn source_name(&self) -> &str;

    /// Health check. Default: always healthy.
    fn health_check(&self) -> impl Future<Output = Result<(), LookupError>> + Send {
        async { Ok(()) }
    }
}
