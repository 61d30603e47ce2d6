//! Filter predicates ANDed into side-table queries.
//!
//! The planner hands over raw `(field, operator, literal)` triples
//! ([`PredicateInfo`]). [`build_filter`] turns them into typed
//! [`Predicate`]s once, when the join opens. Backends either push them
//! down (see [`predicate_to_sql`]) or leave them to the join, which
//! re-checks every returned row with [`Predicate::matches`].
//!
//! ## Filter Flow
//!
//! 1. Planner extracts extra WHERE conditions on the side table
//! 2. [`build_filter`] parses them into [`Predicate`]s
//! 3. The filter is passed to `LookupSource::lookup()` / `full_scan()`
//! 4. Rows that fail [`Predicate::matches`] are dropped locally

use std::cmp::Ordering;

use crate::metadata::PredicateInfo;
use crate::value::{ScalarValue, SideRow};

/// Errors from turning a raw predicate into a typed one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PredicateError {
    /// The operator is not one the lookup join understands.
    #[error("unsupported operator '{operator}' on field '{field}'")]
    UnsupportedOperator {
        /// Field the predicate applies to.
        field: String,
        /// Operator as written.
        operator: String,
    },

    /// The literal could not be parsed for the operator.
    #[error("invalid literal '{literal}' for field '{field}': {reason}")]
    InvalidLiteral {
        /// Field the predicate applies to.
        field: String,
        /// Literal as written.
        literal: String,
        /// What went wrong.
        reason: String,
    },
}

/// A filter predicate for side-table queries.
///
/// Each variant maps directly to a SQL comparison operator. The `column`
/// field names the side-table field and the value(s) are literals from
/// the query plan.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column = value`
    Eq {
        /// Column name
        column: String,
        /// Value to compare against
        value: ScalarValue,
    },
    /// `column != value`
    NotEq {
        /// Column name
        column: String,
        /// Value to compare against
        value: ScalarValue,
    },
    /// `column < value`
    Lt {
        /// Column name
        column: String,
        /// Value to compare against
        value: ScalarValue,
    },
    /// `column <= value`
    LtEq {
        /// Column name
        column: String,
        /// Value to compare against
        value: ScalarValue,
    },
    /// `column > value`
    Gt {
        /// Column name
        column: String,
        /// Value to compare against
        value: ScalarValue,
    },
    /// `column >= value`
    GtEq {
        /// Column name
        column: String,
        /// Value to compare against
        value: ScalarValue,
    },
    /// `column IN (values...)`
    In {
        /// Column name
        column: String,
        /// Set of values to match against
        values: Vec<ScalarValue>,
    },
    /// `column NOT IN (values...)`
    NotIn {
        /// Column name
        column: String,
        /// Set of values to exclude
        values: Vec<ScalarValue>,
    },
    /// `column IS NULL`
    IsNull {
        /// Column name
        column: String,
    },
    /// `column IS NOT NULL`
    IsNotNull {
        /// Column name
        column: String,
    },
}

impl Predicate {
    /// Returns the column name this predicate references.
    #[must_use]
    pub fn column(&self) -> &str {
        match self {
            Self::Eq { column, .. }
            | Self::NotEq { column, .. }
            | Self::Lt { column, .. }
            | Self::LtEq { column, .. }
            | Self::Gt { column, .. }
            | Self::GtEq { column, .. }
            | Self::In { column, .. }
            | Self::NotIn { column, .. }
            | Self::IsNull { column }
            | Self::IsNotNull { column } => column,
        }
    }

    /// Evaluates the predicate against a side row.
    ///
    /// Follows SQL three-valued logic collapsed to `false`: a missing or
    /// null field only satisfies `IS NULL`, and incomparable types never
    /// match.
    #[must_use]
    pub fn matches(&self, row: &SideRow) -> bool {
        let field = row.get(self.column()).filter(|v| !v.is_null());
        match (self, field) {
            (Self::IsNull { .. }, f) => f.is_none(),
            (Self::IsNotNull { .. }, f) => f.is_some(),
            (_, None) => false,
            (Self::Eq { value, .. }, Some(v)) => v.compare(value) == Some(Ordering::Equal),
            (Self::NotEq { value, .. }, Some(v)) => {
                matches!(v.compare(value), Some(Ordering::Less | Ordering::Greater))
            }
            (Self::Lt { value, .. }, Some(v)) => v.compare(value) == Some(Ordering::Less),
            (Self::LtEq { value, .. }, Some(v)) => {
                matches!(v.compare(value), Some(Ordering::Less | Ordering::Equal))
            }
            (Self::Gt { value, .. }, Some(v)) => v.compare(value) == Some(Ordering::Greater),
            (Self::GtEq { value, .. }, Some(v)) => {
                matches!(v.compare(value), Some(Ordering::Greater | Ordering::Equal))
            }
            (Self::In { values, .. }, Some(v)) => values
                .iter()
                .any(|c| v.compare(c) == Some(Ordering::Equal)),
            (Self::NotIn { values, .. }, Some(v)) => values
                .iter()
                .all(|c| matches!(v.compare(c), Some(Ordering::Less | Ordering::Greater))),
        }
    }
}

/// Returns `true` if the row satisfies every predicate of the filter.
#[must_use]
pub fn filter_matches(filter: &[Predicate], row: &SideRow) -> bool {
    filter.iter().all(|p| p.matches(row))
}

/// Converts raw planner predicates into a typed filter.
///
/// # Errors
///
/// Returns the first [`PredicateError`] encountered. Callers treat any
/// failure as "no extra filter" rather than failing the join.
pub fn build_filter(infos: &[PredicateInfo]) -> Result<Vec<Predicate>, PredicateError> {
    infos.iter().map(build_predicate).collect()
}

fn build_predicate(info: &PredicateInfo) -> Result<Predicate, PredicateError> {
    let column = info.field.clone();
    let op = info
        .operator
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase();
    let scalar = || parse_literal(&info.field, info.condition.trim());

    let predicate = match op.as_str() {
        "=" | "==" => Predicate::Eq {
            column,
            value: scalar()?,
        },
        "!=" | "<>" => Predicate::NotEq {
            column,
            value: scalar()?,
        },
        "<" => Predicate::Lt {
            column,
            value: scalar()?,
        },
        "<=" => Predicate::LtEq {
            column,
            value: scalar()?,
        },
        ">" => Predicate::Gt {
            column,
            value: scalar()?,
        },
        ">=" => Predicate::GtEq {
            column,
            value: scalar()?,
        },
        "IN" => Predicate::In {
            column,
            values: parse_list(&info.field, &info.condition)?,
        },
        "NOT IN" => Predicate::NotIn {
            column,
            values: parse_list(&info.field, &info.condition)?,
        },
        "IS NULL" => Predicate::IsNull { column },
        "IS NOT NULL" => Predicate::IsNotNull { column },
        _ => {
            return Err(PredicateError::UnsupportedOperator {
                field: info.field.clone(),
                operator: info.operator.clone(),
            })
        }
    };
    Ok(predicate)
}

fn parse_list(field: &str, literal: &str) -> Result<Vec<ScalarValue>, PredicateError> {
    let trimmed = literal.trim();
    let inner = trimmed
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(trimmed);
    if inner.trim().is_empty() {
        return Err(PredicateError::InvalidLiteral {
            field: field.to_string(),
            literal: literal.to_string(),
            reason: "empty IN list".into(),
        });
    }
    split_list(inner)
        .into_iter()
        .map(|item| parse_literal(field, item.trim()))
        .collect()
}

/// Splits on commas that are not inside single quotes.
fn split_list(s: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in s.char_indices() {
        match c {
            '\'' => quoted = !quoted,
            ',' if !quoted => {
                items.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(&s[start..]);
    items
}

fn parse_literal(field: &str, literal: &str) -> Result<ScalarValue, PredicateError> {
    if literal.is_empty() {
        return Err(PredicateError::InvalidLiteral {
            field: field.to_string(),
            literal: literal.to_string(),
            reason: "missing operand".into(),
        });
    }
    if let Some(body) = literal.strip_prefix('\'') {
        let Some(body) = body.strip_suffix('\'') else {
            return Err(PredicateError::InvalidLiteral {
                field: field.to_string(),
                literal: literal.to_string(),
                reason: "unterminated string".into(),
            });
        };
        return Ok(ScalarValue::Utf8(body.replace("''", "'")));
    }
    if literal.eq_ignore_ascii_case("null") {
        return Ok(ScalarValue::Null);
    }
    if literal.eq_ignore_ascii_case("true") {
        return Ok(ScalarValue::Bool(true));
    }
    if literal.eq_ignore_ascii_case("false") {
        return Ok(ScalarValue::Bool(false));
    }
    if let Ok(v) = literal.parse::<i64>() {
        return Ok(ScalarValue::Int64(v));
    }
    if let Ok(v) = literal.parse::<f64>() {
        return Ok(ScalarValue::Float64(v));
    }
    Ok(ScalarValue::Utf8(literal.to_string()))
}

/// Convert a predicate to a SQL WHERE clause fragment.
///
/// Used by relational backends to build the pushed-down query.
///
/// # Returns
///
/// A SQL string fragment like `"column = 42"` or `"column IN (1, 2, 3)"`.
#[must_use]
pub fn predicate_to_sql(predicate: &Predicate) -> String {
    let list = |values: &[ScalarValue]| {
        values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };
    match predicate {
        Predicate::Eq { column, value } => format!("{column} = {value}"),
        Predicate::NotEq { column, value } => format!("{column} != {value}"),
        Predicate::Lt { column, value } => format!("{column} < {value}"),
        Predicate::LtEq { column, value } => format!("{column} <= {value}"),
        Predicate::Gt { column, value } => format!("{column} > {value}"),
        Predicate::GtEq { column, value } => format!("{column} >= {value}"),
        Predicate::In { column, values } => format!("{column} IN ({})", list(values)),
        Predicate::NotIn { column, values } => format!("{column} NOT IN ({})", list(values)),
        Predicate::IsNull { column } => format!("{column} IS NULL"),
        Predicate::IsNotNull { column } => format!("{column} IS NOT NULL"),
    }
}
