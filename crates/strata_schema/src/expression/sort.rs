//! Sort keys.

use super::eval::resolve;
use crate::error::{SchemaError, SchemaResult};
use crate::name::Name;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use strata_codec::{compare, Value};

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Order {
    /// Smallest first.
    #[default]
    Asc,
    /// Largest first.
    Desc,
}

/// A sort key: a member path and a direction. Written `path` or
/// `path:desc`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sort {
    name: Name,
    order: Order,
}

impl Sort {
    /// Ascending sort on `name`.
    pub fn asc(name: impl Into<Name>) -> Self {
        Self {
            name: name.into(),
            order: Order::Asc,
        }
    }

    /// Descending sort on `name`.
    pub fn desc(name: impl Into<Name>) -> Self {
        Self {
            name: name.into(),
            order: Order::Desc,
        }
    }

    /// The sorted path.
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// The direction.
    pub fn order(&self) -> Order {
        self.order
    }

    /// Orders two values by this key.
    ///
    /// Values with no common ordering fall back to their type code so the
    /// result is always total.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        let left = resolve(a, self.name.parts());
        let right = resolve(b, self.name.parts());
        self.order_values(&left, &right)
    }

    /// Orders two records (such as instances) by this key.
    pub fn compare_maps(&self, a: &BTreeMap<String, Value>, b: &BTreeMap<String, Value>) -> Ordering {
        let lookup = |map: &BTreeMap<String, Value>| match self.name.parts().split_first() {
            Some((head, rest)) => map.get(head).map_or(Value::Null, |v| resolve(v, rest)),
            None => Value::Null,
        };
        self.order_values(&lookup(a), &lookup(b))
    }

    /// Orders two records by a list of keys, first key first.
    pub fn compare_all_maps(
        sorts: &[Sort],
        a: &BTreeMap<String, Value>,
        b: &BTreeMap<String, Value>,
    ) -> Ordering {
        sorts
            .iter()
            .map(|s| s.compare_maps(a, b))
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    fn order_values(&self, left: &Value, right: &Value) -> Ordering {
        let ord = compare(left, right)
            .unwrap_or_else(|_| left.code().as_u8().cmp(&right.code().as_u8()));
        match self.order {
            Order::Asc => ord,
            Order::Desc => ord.reverse(),
        }
    }

    /// Orders two values by a list of keys, first key first.
    pub fn compare_all(sorts: &[Sort], a: &Value, b: &Value) -> Ordering {
        sorts
            .iter()
            .map(|s| s.compare(a, b))
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.order {
            Order::Asc => write!(f, "{}", self.name),
            Order::Desc => write!(f, "{}:desc", self.name),
        }
    }
}

impl FromStr for Sort {
    type Err = SchemaError;

    fn from_str(text: &str) -> SchemaResult<Self> {
        let (path, order) = match text.rsplit_once(':') {
            Some((path, "asc")) => (path, Order::Asc),
            Some((path, "desc")) => (path, Order::Desc),
            Some((_, other)) => {
                return Err(SchemaError::validation(format!(
                    "invalid sort order '{other}'"
                )))
            }
            None => (text, Order::Asc),
        };
        let name = Name::parse(path.trim());
        if name.is_empty() {
            return Err(SchemaError::validation(format!("invalid sort '{text}'")));
        }
        Ok(Self { name, order })
    }
}

impl Serialize for Sort {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Sort {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let sort: Sort = "created:desc".parse().unwrap();
        assert_eq!(sort, Sort::desc("created"));
        assert_eq!(sort.to_string(), "created:desc");
        assert_eq!("a.b".parse::<Sort>().unwrap(), Sort::asc("a.b"));
        assert!("a:sideways".parse::<Sort>().is_err());
        assert!(":desc".parse::<Sort>().is_err());
    }

    #[test]
    fn compare_by_keys() {
        let a = Value::map([("n", Value::Integer(1)), ("s", Value::from("x"))]);
        let b = Value::map([("n", Value::Integer(1)), ("s", Value::from("y"))]);
        let sorts = [Sort::desc("n"), Sort::asc("s")];
        assert_eq!(Sort::compare_all(&sorts, &a, &b), Ordering::Less);
        assert_eq!(Sort::compare_all(&[Sort::desc("s")], &a, &b), Ordering::Greater);
    }

    #[test]
    fn null_sorts_first_ascending() {
        let a = Value::map([("n", Value::Null)]);
        let b = Value::map([("n", Value::Integer(0))]);
        assert_eq!(Sort::asc("n").compare(&a, &b), Ordering::Less);
    }

    #[test]
    fn compare_records_by_nested_key() {
        let inner = |n: i64| Value::map([("n", Value::Integer(n))]);
        let a = BTreeMap::from([("p".to_string(), inner(2))]);
        let b = BTreeMap::from([("p".to_string(), inner(1))]);
        assert_eq!(Sort::asc("p.n").compare_maps(&a, &b), Ordering::Greater);
        assert_eq!(
            Sort::compare_all_maps(&[Sort::desc("p.n")], &a, &b),
            Ordering::Less
        );
    }
}
