//! Cached lookup results.

use std::sync::Arc;

use crate::value::SideRow;

/// What the cache knows about one key.
///
/// The "nothing cached yet" state is the `None` of a probe; an entry
/// only exists once the key has been resolved at least once.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry {
    /// The key is confirmed absent upstream.
    Miss,
    /// Exactly one side row matches.
    Single(Arc<SideRow>),
    /// Several side rows match, in backend order.
    Multi(Arc<[SideRow]>),
}

impl CacheEntry {
    /// Builds the entry for a resolved row set.
    ///
    /// All rows for a key are kept in one entry, never one entry per row.
    #[must_use]
    pub fn from_rows(mut rows: Vec<SideRow>) -> Self {
        match rows.len() {
            0 => Self::Miss,
            1 => Self::Single(Arc::new(rows.remove(0))),
            _ => Self::Multi(rows.into()),
        }
    }

    /// Returns `true` for the miss marker.
    #[must_use]
    pub const fn is_miss(&self) -> bool {
        matches!(self, Self::Miss)
    }

    /// Matching rows; empty for the miss marker.
    #[must_use]
    pub fn rows(&self) -> &[SideRow] {
        match self {
            Self::Miss => &[],
            Self::Single(row) => std::slice::from_ref(&**row),
            Self::Multi(rows) => rows,
        }
    }

    /// Number of matching rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows().len()
    }

    /// Whether the entry holds no rows (i.e. is a miss marker).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.is_miss()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64) -> SideRow {
        SideRow::new().with("id", id)
    }

    #[test]
    fn test_from_rows_shapes() {
        assert!(CacheEntry::from_rows(vec![]).is_miss());

        let single = CacheEntry::from_rows(vec![row(1)]);
        assert!(matches!(single, CacheEntry::Single(_)));
        assert_eq!(single.rows(), &[row(1)]);

        let multi = CacheEntry::from_rows(vec![row(1), row(2), row(3)]);
        assert!(matches!(multi, CacheEntry::Multi(_)));
        assert_eq!(multi.len(), 3);
        assert_eq!(multi.rows()[2], row(3));
    }

    #[test]
    fn test_miss_has_no_rows() {
        let miss = CacheEntry::Miss;
        assert!(miss.is_empty());
        assert_eq!(miss.len(), 0);
        assert!(miss.rows().is_empty());
    }
}
