//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use chrono::{DateTime, NaiveDate};
use proptest::prelude::*;
use std::collections::BTreeMap;
use strata_codec::Value;
use strata_schema::{Instance, Use};

/// Strategy for generating valid object ids.
pub fn id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{1,12}").expect("Invalid regex")
}

/// Strategy for generating member names that are never reserved.
pub fn member_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("m_[a-z]{1,8}").expect("Invalid regex")
}

/// Strategy for dates within years 1..=9999.
pub fn date_strategy() -> impl Strategy<Value = NaiveDate> {
    (1i32..=3_652_059).prop_filter_map("Date out of range", NaiveDate::from_num_days_from_ce_opt)
}

/// Strategy for values of one scalar type, paired with that type.
pub fn scalar_strategy() -> impl Strategy<Value = (Use, Value)> {
    prop_oneof![
        any::<bool>().prop_map(|b| (Use::Boolean, Value::Bool(b))),
        any::<i64>().prop_map(|n| (Use::Integer, Value::Integer(n))),
        (-1.0e12f64..1.0e12).prop_map(|n| (Use::Number, Value::Number(n))),
        ".{0,24}".prop_map(|s| (Use::String, Value::String(s))),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(|b| (Use::Binary, Value::Binary(b))),
        date_strategy().prop_map(|d| (Use::Date, Value::Date(d))),
        (-62_000_000_000_000i64..250_000_000_000_000).prop_filter_map(
            "Instant out of range",
            |ms| DateTime::from_timestamp_millis(ms).map(|t| (Use::DateTime, Value::DateTime(t)))
        ),
    ]
}

/// Strategy for arbitrary self-describing values, nested up to three
/// levels.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        scalar_strategy().prop_map(|(_, value)| value),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map(member_name_strategy(), inner, 0..6).prop_map(Value::Map),
        ]
    })
}

/// Strategy for a typed collection: an `array`, `set` or `map` of one
/// scalar type, with a matching value.
pub fn collection_strategy() -> impl Strategy<Value = (Use, Value)> {
    scalar_strategy().prop_flat_map(|(typ, sample)| {
        let item = typ.clone();
        let values = prop::collection::vec(Just(sample), 0..4);
        prop_oneof![
            values.clone().prop_map({
                let item = item.clone();
                move |v| (Use::array(item.clone()), Value::Array(v))
            }),
            values.clone().prop_map({
                let item = item.clone();
                move |v| (Use::set(item.clone()), Value::Array(v))
            }),
            values.prop_map(move |v| {
                let map: BTreeMap<String, Value> = v
                    .into_iter()
                    .enumerate()
                    .map(|(i, value)| (format!("k{i}"), value))
                    .collect();
                (Use::map(item.clone()), Value::Map(map))
            }),
        ]
    })
}

/// Strategy for sorted sources of `(score, id)` records, as a pager
/// sees them: every source ordered by score then id, ids unique across
/// all sources.
pub fn sorted_sources_strategy(
    max_sources: usize,
    max_items: usize,
) -> impl Strategy<Value = Vec<Vec<Instance>>> {
    prop::collection::vec(
        prop::collection::vec(0i64..20, 0..=max_items),
        0..=max_sources,
    )
    .prop_map(|sources| {
        sources
            .into_iter()
            .enumerate()
            .map(|(s, mut scores)| {
                scores.sort_unstable();
                scores
                    .into_iter()
                    .enumerate()
                    .map(|(i, score)| {
                        Instance::reference(format!("s{s:02}i{i:04}")).with("score", score)
                    })
                    .collect()
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::test_runner::TestRunner;

    #[test]
    fn scalar_values_match_their_type() {
        let ns = strata_schema::Namespace::builder().build().unwrap();
        let mut runner = TestRunner::default();
        runner
            .run(&scalar_strategy(), |(typ, value)| {
                prop_assert_eq!(typ.create(&ns, &value, None, false).unwrap(), value);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn sources_are_sorted() {
        let mut runner = TestRunner::default();
        runner
            .run(&sorted_sources_strategy(4, 10), |sources| {
                for source in &sources {
                    let scores: Vec<_> = source
                        .iter()
                        .filter_map(|i| i.get("score").and_then(Value::as_integer))
                        .collect();
                    prop_assert!(scores.windows(2).all(|w| w[0] <= w[1]));
                }
                Ok(())
            })
            .unwrap();
    }
}
