//! Static join metadata produced by the planner.
//!
//! A [`JoinMetadata`] is built once per query plan, validated by
//! [`LookupJoin::open`](crate::join::LookupJoin::open), and then shared
//! read-only by every in-flight lookup.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::JoinError;

/// Supported join kinds.
///
/// RIGHT and FULL OUTER joins cannot be expressed as a lookup join and
/// are rejected by the planner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    /// Emit only driving rows that found a match.
    #[default]
    Inner,
    /// Keep every driving row; side fields are null when unmatched.
    Left,
}

impl FromStr for JoinType {
    type Err = JoinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inner" | "join" => Ok(Self::Inner),
            "left" | "left outer" => Ok(Self::Left),
            other => Err(JoinError::Config(format!(
                "unsupported join type '{other}': expected 'inner' or 'left'"
            ))),
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inner => write!(f, "INNER"),
            Self::Left => write!(f, "LEFT"),
        }
    }
}

/// One equality condition: `driving[driving_index] = side.side_field`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EqualityField {
    /// Position of the key value in the driving row.
    pub driving_index: usize,
    /// Side-table field the value is matched against.
    pub side_field: String,
}

impl EqualityField {
    /// Create an equality pair.
    #[must_use]
    pub fn new(driving_index: usize, side_field: impl Into<String>) -> Self {
        Self {
            driving_index,
            side_field: side_field.into(),
        }
    }
}

/// Where an output column takes its value from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    /// Copied from the driving row at this position.
    Driving(usize),
    /// Copied from the named side-table field.
    Side(String),
}

/// One column of the output schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputField {
    /// Column name in the output schema.
    pub name: String,
    /// Value origin.
    pub source: FieldSource,
    /// Whether the column is an event-time or processing-time attribute.
    ///
    /// Time attributes are carried as canonical timestamps, so date-time
    /// values copied into them are normalized.
    #[serde(default)]
    pub time_indicator: bool,
}

impl OutputField {
    /// Output column copied from the driving row.
    #[must_use]
    pub fn driving(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            source: FieldSource::Driving(index),
            time_indicator: false,
        }
    }

    /// Output column copied from the side table.
    #[must_use]
    pub fn side(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: FieldSource::Side(field.into()),
            time_indicator: false,
        }
    }

    /// Marks this column as a time attribute.
    #[must_use]
    pub fn time_indicator(mut self) -> Self {
        self.time_indicator = true;
        self
    }
}

/// A planner-supplied side-table filter in raw form.
///
/// Converted into a typed [`Predicate`](crate::predicate::Predicate) by
/// [`build_filter`](crate::predicate::build_filter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredicateInfo {
    /// Side-table field name.
    pub field: String,
    /// Operator as written in SQL (`=`, `<>`, `IN`, `IS NULL`, ...).
    pub operator: String,
    /// Literal operand; empty for unary operators.
    #[serde(default)]
    pub condition: String,
}

impl PredicateInfo {
    /// Create a raw predicate.
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        operator: impl Into<String>,
        condition: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            condition: condition.into(),
        }
    }
}

/// Everything the lookup join needs to know about one join clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinMetadata {
    /// Join kind.
    pub join_type: JoinType,
    /// Number of fields in a driving row.
    pub input_arity: usize,
    /// Equality conditions, in key order.
    pub equality: Vec<EqualityField>,
    /// Output schema, in column order.
    pub output: Vec<OutputField>,
    /// Extra filters ANDed into every backend query.
    #[serde(default)]
    pub predicates: Vec<PredicateInfo>,
}

impl JoinMetadata {
    /// Checks internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`JoinError::Metadata`] if there are no equality fields, no
    /// output fields, an index outside the driving row, or an empty field
    /// name.
    pub fn validate(&self) -> Result<(), JoinError> {
        if self.equality.is_empty() {
            return Err(JoinError::Metadata(
                "lookup join requires at least one equality field".into(),
            ));
        }
        if self.output.is_empty() {
            return Err(JoinError::Metadata("output schema is empty".into()));
        }
        for eq in &self.equality {
            if eq.driving_index >= self.input_arity {
                return Err(JoinError::Metadata(format!(
                    "equality index {} out of range for input arity {}",
                    eq.driving_index, self.input_arity
                )));
            }
            if eq.side_field.is_empty() {
                return Err(JoinError::Metadata(
                    "equality side field name is empty".into(),
                ));
            }
        }
        for field in &self.output {
            match &field.source {
                FieldSource::Driving(idx) if *idx >= self.input_arity => {
                    return Err(JoinError::Metadata(format!(
                        "output column '{}' reads driving index {idx}, input arity is {}",
                        field.name, self.input_arity
                    )));
                }
                FieldSource::Side(name) if name.is_empty() => {
                    return Err(JoinError::Metadata(format!(
                        "output column '{}' has an empty side field name",
                        field.name
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Side-table field names of the equality conditions, in key order.
    #[must_use]
    pub fn side_key_fields(&self) -> Vec<String> {
        self.equality.iter().map(|e| e.side_field.clone()).collect()
    }
}
