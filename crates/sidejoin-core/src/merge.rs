//! Builds output rows from a driving row and side rows.

use std::sync::Arc;

use crate::entry::CacheEntry;
use crate::metadata::{FieldSource, JoinType, OutputField};
use crate::value::{DrivingRecord, OutputRecord, Row, ScalarValue, SideRow};

/// Projects driving and side values into the output schema.
#[derive(Debug, Clone)]
pub struct RowMerger {
    fields: Arc<[OutputField]>,
    join_type: JoinType,
}

impl RowMerger {
    /// Create a merger for an output schema.
    #[must_use]
    pub fn new(fields: &[OutputField], join_type: JoinType) -> Self {
        Self {
            fields: fields.into(),
            join_type,
        }
    }

    /// Number of output columns.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.fields.len()
    }

    /// Builds one output row.
    ///
    /// `side == None` fills every side-sourced column with null.
    #[must_use]
    pub fn merge(&self, driving: &Row, side: Option<&SideRow>) -> Row {
        self.fields
            .iter()
            .map(|field| match &field.source {
                FieldSource::Driving(idx) => {
                    let value = driving.get(*idx).cloned().unwrap_or(ScalarValue::Null);
                    if field.time_indicator {
                        value.into_timestamp()
                    } else {
                        value
                    }
                }
                FieldSource::Side(name) => side
                    .and_then(|row| row.get(name))
                    .cloned()
                    .unwrap_or(ScalarValue::Null),
            })
            .collect()
    }

    /// Output for a record with no matching side row.
    ///
    /// LEFT joins emit the driving row padded with nulls; INNER joins
    /// emit nothing.
    #[must_use]
    pub fn unmatched(&self, record: &DrivingRecord) -> Vec<OutputRecord> {
        match self.join_type {
            JoinType::Left => vec![OutputRecord::new(record.insert, self.merge(&record.row, None))],
            JoinType::Inner => Vec::new(),
        }
    }

    /// One output per side row, keeping the driving record's change flag.
    #[must_use]
    pub fn fan_out(&self, record: &DrivingRecord, rows: &[SideRow]) -> Vec<OutputRecord> {
        if rows.is_empty() {
            return self.unmatched(record);
        }
        rows.iter()
            .map(|side| OutputRecord::new(record.insert, self.merge(&record.row, Some(side))))
            .collect()
    }

    /// Output for a resolved cache entry.
    #[must_use]
    pub fn from_entry(&self, record: &DrivingRecord, entry: &CacheEntry) -> Vec<OutputRecord> {
        self.fan_out(record, entry.rows())
    }
}
