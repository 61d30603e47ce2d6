//! Row and value types shared by the lookup join.
//!
//! Driving rows are positional ([`Row`]); side-table rows are keyed by
//! field name ([`SideRow`]) because that is how document and key-value
//! backends hand them back. Both carry [`ScalarValue`]s.

use std::cmp::Ordering;
use std::fmt;

use chrono::NaiveDateTime;
use rustc_hash::FxHashMap;

use crate::key::{KEY_DELIMITER, KEY_ESCAPE};

/// A single typed field value.
///
/// Covers the value types a side table can be filtered and joined on.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    /// SQL NULL
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer (covers i8/i16/i32/i64)
    Int64(i64),
    /// 64-bit float (covers f32/f64)
    Float64(f64),
    /// UTF-8 string
    Utf8(String),
    /// Raw binary data
    Binary(Vec<u8>),
    /// Timestamp as microseconds since Unix epoch
    Timestamp(i64),
    /// Wall-clock date-time without zone, as produced by backends and
    /// by the engine for non-attribute columns.
    DateTime(NaiveDateTime),
}

impl ScalarValue {
    /// Returns `true` for [`ScalarValue::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Appends the cache-key form of this value to `out`.
    ///
    /// Unlike [`Display`](fmt::Display) this does not quote strings, so
    /// `Int64(7)` and `Utf8("7")` render the same. The key delimiter and
    /// the escape character are backslash-escaped, so a rendered
    /// component never contains an unescaped delimiter.
    pub fn write_key(&self, out: &mut String) {
        match self {
            Self::Null => out.push_str("null"),
            Self::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
            Self::Int64(v) | Self::Timestamp(v) => out.push_str(&v.to_string()),
            Self::Float64(v) => push_escaped(out, &v.to_string()),
            Self::Utf8(v) => push_escaped(out, v),
            Self::Binary(v) => out.push_str(&hex_encode(v)),
            Self::DateTime(v) => push_escaped(out, &v.to_string()),
        }
    }

    /// Converts a date-time into the canonical timestamp representation.
    ///
    /// Every other variant is returned unchanged.
    #[must_use]
    pub fn into_timestamp(self) -> Self {
        match self {
            Self::DateTime(dt) => Self::Timestamp(dt.and_utc().timestamp_micros()),
            other => other,
        }
    }

    /// Compares two values of compatible types.
    ///
    /// Integers and floats compare numerically with each other; a
    /// date-time compares against a timestamp through its microsecond
    /// value. Nulls and mismatched types are incomparable.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int64(a), Self::Int64(b)) | (Self::Timestamp(a), Self::Timestamp(b)) => {
                Some(a.cmp(b))
            }
            (Self::Float64(a), Self::Float64(b)) => a.partial_cmp(b),
            (Self::Int64(a), Self::Float64(b)) => (*a as f64).partial_cmp(b),
            (Self::Float64(a), Self::Int64(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Utf8(a), Self::Utf8(b)) => Some(a.cmp(b)),
            (Self::Binary(a), Self::Binary(b)) => Some(a.cmp(b)),
            (Self::DateTime(a), Self::DateTime(b)) => Some(a.cmp(b)),
            (Self::DateTime(_), Self::Timestamp(_)) => self.clone().into_timestamp().compare(other),
            (Self::Timestamp(_), Self::DateTime(_)) => self.compare(&other.clone().into_timestamp()),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "'{}'", v.replace('\'', "''")),
            Self::Binary(v) => write!(f, "X'{}'", hex_encode(v)),
            Self::Timestamp(us) => write!(f, "TIMESTAMP '{us}'"),
            Self::DateTime(dt) => write!(f, "TIMESTAMP '{}'", dt.format("%Y-%m-%d %H:%M:%S%.f")),
        }
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        Self::Utf8(v.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        Self::Utf8(v)
    }
}

impl<T: Into<ScalarValue>> From<Option<T>> for ScalarValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Appends `s`, escaping the key delimiter and the escape character.
fn push_escaped(out: &mut String, s: &str) {
    for c in s.chars() {
        if c == KEY_ESCAPE || c == KEY_DELIMITER {
            out.push(KEY_ESCAPE);
        }
        out.push(c);
    }
}

/// Encode bytes as lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
            let _ = write!(s, "{b:02x}");
            s
        })
}

/// Positional row of typed fields.
pub type Row = Vec<ScalarValue>;

/// A changelog record: a row plus its insert/retract flag.
///
/// Used both for driving records handed in by the engine and for the
/// enriched records handed back.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// `true` for an insert, `false` for a retraction.
    pub insert: bool,
    /// The row payload.
    pub row: Row,
}

impl Record {
    /// Create a record.
    #[must_use]
    pub fn new(insert: bool, row: Row) -> Self {
        Self { insert, row }
    }

    /// Shorthand for an insert record.
    #[must_use]
    pub fn insert(row: Row) -> Self {
        Self::new(true, row)
    }

    /// Shorthand for a retraction record.
    #[must_use]
    pub fn retract(row: Row) -> Self {
        Self::new(false, row)
    }
}

/// A record flowing in from the engine.
pub type DrivingRecord = Record;
/// An enriched record flowing back to the engine.
pub type OutputRecord = Record;

/// A side-table row as returned by a backend: field name → value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SideRow {
    fields: FxHashMap<String, ScalarValue>,
}

impl SideRow {
    /// Create an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.insert(field, value);
        self
    }

    /// Set a field, replacing any previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<ScalarValue>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Look up a field by name.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&ScalarValue> {
        self.fields.get(field)
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the row has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<ScalarValue>> FromIterator<(K, V)> for SideRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn dt(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(h, 0, 0))
            .unwrap()
    }

    #[test]
    fn test_scalar_value_display() {
        assert_eq!(ScalarValue::Null.to_string(), "NULL");
        assert_eq!(ScalarValue::Bool(true).to_string(), "true");
        assert_eq!(ScalarValue::Int64(42).to_string(), "42");
        assert_eq!(ScalarValue::Utf8("it's".into()).to_string(), "'it''s'");
        assert_eq!(
            ScalarValue::Binary(vec![0xDE, 0xAD]).to_string(),
            "X'dead'"
        );
        assert_eq!(
            ScalarValue::DateTime(dt(1)).to_string(),
            "TIMESTAMP '2024-01-01 01:00:00'"
        );
    }

    #[test]
    fn test_key_form_is_unquoted() {
        let mut out = String::new();
        ScalarValue::Utf8("abc".into()).write_key(&mut out);
        ScalarValue::Int64(7).write_key(&mut out);
        ScalarValue::Binary(vec![0x0f]).write_key(&mut out);
        assert_eq!(out, "abc70f");
    }

    #[test]
    fn test_key_form_escapes_delimiter() {
        let mut out = String::new();
        ScalarValue::Utf8(r"a_b\c".into()).write_key(&mut out);
        assert_eq!(out, r"a\_b\\c");
    }

    #[test]
    fn test_into_timestamp() {
        let ts = ScalarValue::DateTime(dt(0)).into_timestamp();
        assert_eq!(ts, ScalarValue::Timestamp(1_704_067_200_000_000));
        assert_eq!(
            ScalarValue::Int64(5).into_timestamp(),
            ScalarValue::Int64(5)
        );
    }

    #[test]
    fn test_compare_mixed_numeric() {
        assert_eq!(
            ScalarValue::Int64(2).compare(&ScalarValue::Float64(2.5)),
            Some(Ordering::Less)
        );
        assert_eq!(
            ScalarValue::Utf8("b".into()).compare(&ScalarValue::Utf8("a".into())),
            Some(Ordering::Greater)
        );
        assert_eq!(ScalarValue::Null.compare(&ScalarValue::Null), None);
        assert_eq!(
            ScalarValue::Int64(1).compare(&ScalarValue::Utf8("1".into())),
            None
        );
    }

    #[test]
    fn test_compare_datetime_with_timestamp() {
        let a = ScalarValue::DateTime(dt(0));
        let b = ScalarValue::Timestamp(1_704_067_200_000_001);
        assert_eq!(a.compare(&b), Some(Ordering::Less));
        assert_eq!(b.compare(&a), Some(Ordering::Greater));
    }

    #[test]
    fn test_side_row_builder() {
        let row = SideRow::new().with("id", 1_i64).with("name", "a");
        assert_eq!(row.len(), 2);
        assert_eq!(row.get("id"), Some(&ScalarValue::Int64(1)));
        assert_eq!(row.get("missing"), None);

        let collected: SideRow = vec![("x", ScalarValue::Null)].into_iter().collect();
        assert!(collected.get("x").is_some_and(ScalarValue::is_null));
    }

    #[test]
    fn test_option_into_scalar() {
        let none: Option<i64> = None;
        assert_eq!(ScalarValue::from(none), ScalarValue::Null);
        assert_eq!(ScalarValue::from(Some("x")), ScalarValue::Utf8("x".into()));
    }
}
