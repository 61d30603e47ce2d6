//! Lookup key derivation.
//!
//! A driving row and a side row that should join produce the same
//! [`LookupKey::cache_key`]: both render their equality values with
//! [`ScalarValue::write_key`] in equality order, each followed by
//! [`KEY_DELIMITER`]. Delimiters inside a component are escaped with
//! [`KEY_ESCAPE`], so distinct value tuples never share a key.

use crate::metadata::JoinMetadata;
use crate::value::{DrivingRecord, ScalarValue, SideRow};

/// Separator appended after every key component.
pub const KEY_DELIMITER: char = '_';

/// Escapes [`KEY_DELIMITER`] and itself inside a key component.
pub const KEY_ESCAPE: char = '\\';

/// Cache key plus the equality values sent to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupKey {
    cache_key: String,
    equalities: Vec<(String, ScalarValue)>,
}

impl LookupKey {
    /// The deterministic cache key string.
    #[must_use]
    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    /// `(side field, value)` pairs in equality order.
    #[must_use]
    pub fn equalities(&self) -> &[(String, ScalarValue)] {
        &self.equalities
    }

    /// Value for one side field, if it is part of the key.
    #[must_use]
    pub fn value_of(&self, side_field: &str) -> Option<&ScalarValue> {
        self.equalities
            .iter()
            .find(|(f, _)| f == side_field)
            .map(|(_, v)| v)
    }
}

/// Builds the lookup key for a driving record.
///
/// Returns `None` if any equality value is null (or missing from a short
/// row). Such a record can never match and goes straight to the
/// missing-key policy without touching the cache or the backend.
#[must_use]
pub fn build_key(record: &DrivingRecord, metadata: &JoinMetadata) -> Option<LookupKey> {
    let mut cache_key = String::new();
    let mut equalities = Vec::with_capacity(metadata.equality.len());
    for eq in &metadata.equality {
        let value = record.row.get(eq.driving_index).filter(|v| !v.is_null())?;
        value.write_key(&mut cache_key);
        cache_key.push(KEY_DELIMITER);
        equalities.push((eq.side_field.clone(), value.clone()));
    }
    Some(LookupKey {
        cache_key,
        equalities,
    })
}

/// Builds the cache key a side row is stored under.
///
/// Used when grouping a full scan into a snapshot. Rows with a null or
/// missing key field are unreachable from any driving row and yield
/// `None`.
#[must_use]
pub fn side_key(row: &SideRow, key_fields: &[String]) -> Option<String> {
    let mut key = String::new();
    for field in key_fields {
        let value = row.get(field).filter(|v| !v.is_null())?;
        value.write_key(&mut key);
        key.push(KEY_DELIMITER);
    }
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{EqualityField, JoinType, OutputField};
    use crate::value::Record;

    fn meta() -> JoinMetadata {
        JoinMetadata {
            join_type: JoinType::Inner,
            input_arity: 3,
            equality: vec![EqualityField::new(2, "region"), EqualityField::new(0, "id")],
            output: vec![OutputField::driving("id", 0)],
            predicates: vec![],
        }
    }

    #[test]
    fn test_key_in_equality_order() {
        let rec = Record::insert(vec![7_i64.into(), "x".into(), "eu".into()]);
        let key = build_key(&rec, &meta()).unwrap();
        assert_eq!(key.cache_key(), "eu_7_");
        assert_eq!(
            key.equalities(),
            &[
                ("region".to_string(), ScalarValue::Utf8("eu".into())),
                ("id".to_string(), ScalarValue::Int64(7)),
            ]
        );
        assert_eq!(key.value_of("id"), Some(&ScalarValue::Int64(7)));
        assert_eq!(key.value_of("x"), None);
    }

    #[test]
    fn test_identical_values_identical_keys() {
        let a = Record::insert(vec![1_i64.into(), "a".into(), "us".into()]);
        let b = Record::retract(vec![1_i64.into(), "zzz".into(), "us".into()]);
        assert_eq!(
            build_key(&a, &meta()).unwrap().cache_key(),
            build_key(&b, &meta()).unwrap().cache_key()
        );
    }

    #[test]
    fn test_null_equality_value_has_no_key() {
        let rec = Record::insert(vec![ScalarValue::Null, "x".into(), "eu".into()]);
        assert!(build_key(&rec, &meta()).is_none());

        let short = Record::insert(vec![1_i64.into()]);
        assert!(build_key(&short, &meta()).is_none());
    }

    #[test]
    fn test_side_key_matches_driving_key() {
        let rec = Record::insert(vec![7_i64.into(), "x".into(), "eu".into()]);
        let side = SideRow::new().with("id", 7_i64).with("region", "eu").with("n", 1_i64);
        let fields = meta().side_key_fields();
        assert_eq!(
            side_key(&side, &fields).as_deref(),
            build_key(&rec, &meta()).as_ref().map(LookupKey::cache_key)
        );

        let no_region = SideRow::new().with("id", 7_i64);
        assert!(side_key(&no_region, &fields).is_none());
    }

    fn two_field_meta() -> JoinMetadata {
        JoinMetadata {
            join_type: JoinType::Left,
            input_arity: 2,
            equality: vec![EqualityField::new(0, "a"), EqualityField::new(1, "b")],
            output: vec![OutputField::driving("a", 0)],
            predicates: vec![],
        }
    }

    #[test]
    fn test_delimiter_inside_value_does_not_collide() {
        let meta = two_field_meta();
        let left = Record::insert(vec!["x_".into(), "y".into()]);
        let right = Record::insert(vec!["x".into(), "_y".into()]);
        let left_key = build_key(&left, &meta).unwrap();
        let right_key = build_key(&right, &meta).unwrap();
        assert_ne!(left_key.cache_key(), right_key.cache_key());
        assert_eq!(left_key.cache_key(), r"x\__y_");
        assert_eq!(right_key.cache_key(), r"x_\_y_");

        let escaped = Record::insert(vec![r"x\".into(), "y".into()]);
        let plain = Record::insert(vec!["x".into(), r"\y".into()]);
        assert_ne!(
            build_key(&escaped, &meta).unwrap().cache_key(),
            build_key(&plain, &meta).unwrap().cache_key()
        );
    }

    #[test]
    fn test_side_key_escapes_like_driving_key() {
        let meta = two_field_meta();
        let fields = meta.side_key_fields();
        let side = SideRow::new().with("a", "x_").with("b", "y");
        let matching = Record::insert(vec!["x_".into(), "y".into()]);
        let shifted = Record::insert(vec!["x".into(), "_y".into()]);
        let stored = side_key(&side, &fields).unwrap();
        assert_eq!(stored, build_key(&matching, &meta).unwrap().cache_key());
        assert_ne!(stored, build_key(&shifted, &meta).unwrap().cache_key());
    }
}
