//! Promotion-aware equality and ordering of values.
//!
//! Two families of promotion are applied before comparing:
//! - numeric: `Integer` against `Number` compares as `f64`
//! - temporal: `Date` against `DateTime` promotes the date to midnight UTC,
//!   and a `String` against either is parsed as ISO-8601 first
//!
//! No other cross-type promotion exists. `Null` orders before everything.

use crate::error::{CodecError, CodecResult};
use crate::value::{date_to_datetime, parse_date, parse_datetime, Value};
use std::cmp::Ordering;

/// Compares two values for equality after promotion.
///
/// Arrays compare element-wise in order. Maps compare by size, key set and
/// per-key equality. Binary compares by content.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Integer(x), Value::Number(y)) | (Value::Number(y), Value::Integer(x)) => {
            (*x as f64) == *y
        }
        (Value::Date(d), Value::DateTime(dt)) | (Value::DateTime(dt), Value::Date(d)) => {
            date_to_datetime(*d) == *dt
        }
        (Value::String(s), Value::Date(d)) | (Value::Date(d), Value::String(s)) => {
            parse_date(s) == Some(*d)
        }
        (Value::String(s), Value::DateTime(dt)) | (Value::DateTime(dt), Value::String(s)) => {
            parse_datetime(s) == Some(*dt)
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| equals(l, r))
        }
        (Value::Map(x), Value::Map(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| equals(v, other)))
        }
        _ => a == b,
    }
}

/// Orders two values after promotion.
///
/// # Errors
///
/// Returns [`CodecError::Incomparable`] when the types have no common
/// ordering (for example a map against a string, or a string that is not
/// ISO-8601 against a date).
#[allow(clippy::cast_precision_loss)]
pub fn compare(a: &Value, b: &Value) -> CodecResult<Ordering> {
    let incomparable = || CodecError::incomparable(a.type_name(), b.type_name());
    match (a, b) {
        (Value::Null, Value::Null) => Ok(Ordering::Equal),
        (Value::Null, _) => Ok(Ordering::Less),
        (_, Value::Null) => Ok(Ordering::Greater),
        (Value::Bool(x), Value::Bool(y)) => Ok(x.cmp(y)),
        (Value::Integer(x), Value::Integer(y)) => Ok(x.cmp(y)),
        (Value::Integer(x), Value::Number(y)) => Ok((*x as f64).total_cmp(y)),
        (Value::Number(x), Value::Integer(y)) => Ok(x.total_cmp(&(*y as f64))),
        (Value::Number(x), Value::Number(y)) => Ok(x.total_cmp(y)),
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        (Value::Binary(x), Value::Binary(y)) => Ok(x.cmp(y)),
        (Value::Secret(x), Value::Secret(y)) => Ok(x.cmp(y)),
        (Value::Date(x), Value::Date(y)) => Ok(x.cmp(y)),
        (Value::DateTime(x), Value::DateTime(y)) => Ok(x.cmp(y)),
        (Value::Date(x), Value::DateTime(y)) => Ok(date_to_datetime(*x).cmp(y)),
        (Value::DateTime(x), Value::Date(y)) => Ok(x.cmp(&date_to_datetime(*y))),
        (Value::String(s), Value::Date(d)) => {
            parse_date(s).map(|p| p.cmp(d)).ok_or_else(incomparable)
        }
        (Value::Date(d), Value::String(s)) => {
            parse_date(s).map(|p| d.cmp(&p)).ok_or_else(incomparable)
        }
        (Value::String(s), Value::DateTime(dt)) => {
            parse_datetime(s).map(|p| p.cmp(dt)).ok_or_else(incomparable)
        }
        (Value::DateTime(dt), Value::String(s)) => {
            parse_datetime(s).map(|p| dt.cmp(&p)).ok_or_else(incomparable)
        }
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y) {
                let ord = compare(l, r)?;
                if ord != Ordering::Equal {
                    return Ok(ord);
                }
            }
            Ok(x.len().cmp(&y.len()))
        }
        _ => Err(incomparable()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn numeric_promotion() {
        assert!(equals(&Value::Integer(2), &Value::Number(2.0)));
        assert!(!equals(&Value::Integer(2), &Value::Number(2.5)));
        assert_eq!(
            compare(&Value::Integer(2), &Value::Number(2.5)).unwrap(),
            Ordering::Less
        );
    }

    #[test]
    fn temporal_promotion() {
        let d = date(2024, 1, 1);
        assert!(equals(&Value::Date(d), &Value::DateTime(date_to_datetime(d))));
        assert!(equals(&Value::from("2024-01-01"), &Value::Date(d)));
        assert!(equals(
            &Value::from("2024-01-01T00:00:00Z"),
            &Value::DateTime(date_to_datetime(d))
        ));
        assert_eq!(
            compare(&Value::from("2023-12-31"), &Value::Date(d)).unwrap(),
            Ordering::Less
        );
    }

    #[test]
    fn non_iso_string_is_incomparable_with_date() {
        let err = compare(&Value::from("soon"), &Value::Date(date(2024, 1, 1))).unwrap_err();
        assert!(matches!(err, CodecError::Incomparable { .. }));
        assert!(!equals(&Value::from("soon"), &Value::Date(date(2024, 1, 1))));
    }

    #[test]
    fn number_against_string_is_incomparable() {
        assert!(compare(&Value::Integer(1), &Value::from("1")).is_err());
        assert!(!equals(&Value::Integer(1), &Value::from("1")));
    }

    #[test]
    fn binary_compares_by_content() {
        assert!(equals(&Value::Binary(vec![1, 2]), &Value::Binary(vec![1, 2])));
        assert_eq!(
            compare(&Value::Binary(vec![1, 2]), &Value::Binary(vec![1, 3])).unwrap(),
            Ordering::Less
        );
    }

    #[test]
    fn null_sorts_first() {
        assert_eq!(
            compare(&Value::Null, &Value::Integer(i64::MIN)).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            compare(&Value::from("a"), &Value::Null).unwrap(),
            Ordering::Greater
        );
    }

    #[test]
    fn arrays_are_order_sensitive() {
        let a = Value::Array(vec![Value::Integer(1), Value::Integer(2)]);
        let b = Value::Array(vec![Value::Integer(2), Value::Integer(1)]);
        assert!(!equals(&a, &b));
        assert!(equals(
            &a,
            &Value::Array(vec![Value::Number(1.0), Value::Integer(2)])
        ));
    }

    #[test]
    fn maps_compare_by_keys_and_values() {
        let a = Value::map([("x", Value::Integer(1)), ("y", Value::Integer(2))]);
        let b = Value::map([("y", Value::Number(2.0)), ("x", Value::Integer(1))]);
        let c = Value::map([("x", Value::Integer(1)), ("z", Value::Integer(2))]);
        assert!(equals(&a, &b));
        assert!(!equals(&a, &c));
        assert!(compare(&a, &b).is_err());
    }
}
