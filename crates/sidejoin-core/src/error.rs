//! Errors surfaced to the host engine.
//!
//! Everything here is fatal for the join. Recoverable backend failures
//! stay inside [`LookupError`] and only show up in metrics and logs.

use crate::source::LookupError;

/// Fatal lookup-join errors.
#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    /// Invalid configuration value or unsupported cache mode.
    #[error("configuration error: {0}")]
    Config(String),

    /// Inconsistent join metadata.
    #[error("invalid join metadata: {0}")]
    Metadata(String),

    /// The initial full-table load failed.
    #[error("initial snapshot load failed: {0}")]
    SnapshotLoad(#[source] LookupError),

    /// More lookups timed out than the configured limit allows.
    #[error("lookup timeout limit exceeded: {count} timeouts, limit {limit}")]
    TimeoutLimitExceeded {
        /// Timeouts observed so far, including this one.
        count: u64,
        /// Configured limit.
        limit: u64,
    },

    /// The join was closed.
    #[error("lookup join is closed")]
    Closed,
}
