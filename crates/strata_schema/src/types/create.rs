//! Coercion of raw values into typed values.

use super::{normalize_set, Use};
use crate::error::{SchemaError, SchemaResult};
use crate::instance::{ID, KEY, SCHEMA};
use crate::name::Expand;
use crate::namespace::Namespace;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::DateTime;
use std::collections::BTreeMap;
use strata_codec::{format_datetime, parse_date, parse_datetime, Secret, Value};

impl Use {
    /// Coerces `value` to this type.
    ///
    /// `expand` controls references: `None` collapses an object reference
    /// to `{id}`, `Some(sub)` creates the full referenced instance with
    /// `sub` as its own expand set. With `suppress`, failing struct and
    /// object members become `Null` instead of failing the whole value.
    ///
    /// `Null` is accepted by every type.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidType`] when the value cannot be
    /// coerced, or a lookup error when a referenced schema is missing.
    pub fn create(
        &self,
        ns: &Namespace,
        value: &Value,
        expand: Option<&Expand>,
        suppress: bool,
    ) -> SchemaResult<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match self {
            Self::Boolean => self.create_boolean(value),
            Self::Integer => self.create_integer(value),
            Self::Number => self.create_number(value),
            Self::String => self.create_string(value),
            Self::Binary => match value {
                Value::Binary(_) => Ok(value.clone()),
                Value::String(text) => STANDARD
                    .decode(text)
                    .map(Value::Binary)
                    .map_err(|_| self.mismatch(value)),
                _ => Err(self.mismatch(value)),
            },
            Self::Date => match value {
                Value::Date(_) => Ok(value.clone()),
                Value::DateTime(dt) => Ok(Value::Date(dt.date_naive())),
                Value::String(text) => parse_date(text)
                    .map(Value::Date)
                    .ok_or_else(|| self.mismatch(value)),
                _ => Err(self.mismatch(value)),
            },
            Self::DateTime => self.create_datetime(value),
            Self::Secret => match value {
                Value::Secret(_) => Ok(value.clone()),
                Value::String(text) => Ok(Value::Secret(Secret::new(text.as_bytes().to_vec()))),
                Value::Binary(bytes) => Ok(Value::Secret(Secret::new(bytes.clone()))),
                _ => Err(self.mismatch(value)),
            },
            Self::Any => Ok(value.clone()),
            Self::Enum(name) => {
                let schema = ns.require_enum(name)?;
                let text = value.as_str().ok_or_else(|| self.mismatch(value))?;
                if schema.contains(text) {
                    Ok(value.clone())
                } else {
                    Err(SchemaError::invalid_type(name, format!("'{text}'")))
                }
            }
            Self::Struct(name) => {
                let schema = ns.require_struct(name)?;
                Ok(Value::Map(schema.create(ns, value, expand, suppress)?))
            }
            Self::Ref(name) => self.create_ref(ns, name, value, expand, suppress),
            Self::View(name) => {
                let map = value.as_map().ok_or_else(|| self.mismatch(value))?;
                match expand {
                    Some(_) => {
                        let schema = ns.require_view(name)?;
                        Ok(Value::Map(schema.create(ns, value, suppress)?.into_inner()))
                    }
                    None => {
                        let key = map.get(KEY).cloned().unwrap_or_default();
                        Ok(Value::map([(KEY, key)]))
                    }
                }
            }
            Self::Array(item) => {
                let items = value.as_array().ok_or_else(|| self.mismatch(value))?;
                items
                    .iter()
                    .map(|v| item.create(ns, v, expand, suppress))
                    .collect::<SchemaResult<Vec<_>>>()
                    .map(Value::Array)
            }
            Self::Set(item) => {
                let items = value.as_array().ok_or_else(|| self.mismatch(value))?;
                let mut items = items
                    .iter()
                    .map(|v| item.create(ns, v, expand, suppress))
                    .collect::<SchemaResult<Vec<_>>>()?;
                normalize_set(&mut items);
                Ok(Value::Array(items))
            }
            Self::Map(item) => {
                let entries = value.as_map().ok_or_else(|| self.mismatch(value))?;
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), item.create(ns, v, expand, suppress)?)))
                    .collect::<SchemaResult<BTreeMap<_, _>>>()
                    .map(Value::Map)
            }
        }
    }

    fn create_boolean(&self, value: &Value) -> SchemaResult<Value> {
        match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(text) => Ok(Value::Bool(!(text.is_empty() || text == "false"))),
            Value::Integer(n) => Ok(Value::Bool(*n != 0)),
            Value::Number(n) => Ok(Value::Bool(*n != 0.0)),
            _ => Err(self.mismatch(value)),
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn create_integer(&self, value: &Value) -> SchemaResult<Value> {
        match value {
            Value::Integer(_) => Ok(value.clone()),
            Value::Number(n) if *n >= i64::MIN as f64 && *n < i64::MAX as f64 => {
                Ok(Value::Integer(n.trunc() as i64))
            }
            Value::String(text) => text
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| self.mismatch(value)),
            _ => Err(self.mismatch(value)),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn create_number(&self, value: &Value) -> SchemaResult<Value> {
        match value {
            Value::Number(_) => Ok(value.clone()),
            Value::Integer(n) => Ok(Value::Number(*n as f64)),
            Value::String(text) => text
                .trim()
                .parse::<f64>()
                .map(Value::Number)
                .map_err(|_| self.mismatch(value)),
            _ => Err(self.mismatch(value)),
        }
    }

    fn create_string(&self, value: &Value) -> SchemaResult<Value> {
        match value {
            Value::String(_) => Ok(value.clone()),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            Value::Integer(n) => Ok(Value::String(n.to_string())),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Date(d) => Ok(Value::String(d.to_string())),
            Value::DateTime(dt) => Ok(Value::String(format_datetime(dt))),
            _ => Err(self.mismatch(value)),
        }
    }

    fn create_datetime(&self, value: &Value) -> SchemaResult<Value> {
        let instant = match value {
            Value::DateTime(dt) => Some(*dt),
            Value::Date(d) => Some(strata_codec::date_to_datetime(*d)),
            Value::Integer(millis) => DateTime::from_timestamp_millis(*millis),
            Value::String(text) => parse_datetime(text),
            _ => None,
        };
        // Stored instants keep millisecond precision only.
        instant
            .and_then(|dt| DateTime::from_timestamp_millis(dt.timestamp_millis()))
            .map(Value::DateTime)
            .ok_or_else(|| self.mismatch(value))
    }

    fn create_ref(
        &self,
        ns: &Namespace,
        name: &str,
        value: &Value,
        expand: Option<&Expand>,
        suppress: bool,
    ) -> SchemaResult<Value> {
        let map = match value {
            Value::String(id) => return Ok(Value::map([(ID, Value::String(id.clone()))])),
            Value::Map(map) => map,
            _ => return Err(self.mismatch(value)),
        };
        let id = map.get(ID).ok_or_else(|| SchemaError::missing_member(name, ID))?;
        let id = Use::String.create(ns, id, None, false)?;
        match expand {
            None => Ok(Value::map([(ID, id)])),
            Some(sub) => {
                // A subtype instance keeps its own shape.
                let target = match map.get(SCHEMA).and_then(Value::as_str) {
                    Some(actual) if ns.is_subtype(actual, name) => ns.require_object(actual)?,
                    _ => ns.require_object(name)?,
                };
                Ok(Value::Map(
                    target.create(ns, value, sub, suppress)?.into_inner(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::Namespace;

    fn ns() -> Namespace {
        Namespace::from_yaml(
            r#"
Color:
  type: enum
  values: [red, green]
Point:
  type: struct
  properties:
    x: integer
    y: integer
Post:
  type: object
  properties:
    title: string
    ref: Post
"#,
        )
        .unwrap()
    }

    fn create(ty: &Use, value: Value) -> SchemaResult<Value> {
        ty.create(&ns(), &value, None, false)
    }

    #[test]
    fn boolean_coercion() {
        assert_eq!(create(&Use::Boolean, "yes".into()).unwrap(), Value::Bool(true));
        assert_eq!(create(&Use::Boolean, "false".into()).unwrap(), Value::Bool(false));
        assert_eq!(create(&Use::Boolean, "".into()).unwrap(), Value::Bool(false));
        assert_eq!(create(&Use::Boolean, Value::Integer(0)).unwrap(), Value::Bool(false));
        assert_eq!(create(&Use::Boolean, Value::Number(0.5)).unwrap(), Value::Bool(true));
    }

    #[test]
    fn numeric_coercion() {
        assert_eq!(create(&Use::Integer, "42".into()).unwrap(), Value::Integer(42));
        assert_eq!(create(&Use::Number, "1.5".into()).unwrap(), Value::Number(1.5));
        assert_eq!(create(&Use::Number, Value::Integer(2)).unwrap(), Value::Number(2.0));
        assert!(matches!(
            create(&Use::Integer, "abc".into()),
            Err(SchemaError::InvalidType { .. })
        ));
    }

    #[test]
    fn integer_from_number_covers_the_full_range() {
        assert_eq!(
            create(&Use::Integer, Value::Number(i64::MIN as f64)).unwrap(),
            Value::Integer(i64::MIN)
        );
        assert_eq!(create(&Use::Integer, Value::Number(-2.9)).unwrap(), Value::Integer(-2));
        assert!(create(&Use::Integer, Value::Number(i64::MAX as f64)).is_err());
        assert!(create(&Use::Integer, Value::Number(f64::NAN)).is_err());
        assert!(create(&Use::Integer, Value::Number(f64::NEG_INFINITY)).is_err());
    }

    #[test]
    fn temporal_coercion() {
        let dt = create(&Use::DateTime, Value::Integer(1_700_000_000_123)).unwrap();
        assert_eq!(
            dt,
            Value::DateTime(DateTime::from_timestamp_millis(1_700_000_000_123).unwrap())
        );
        let date = create(&Use::Date, "2024-02-29".into()).unwrap();
        assert_eq!(date.to_string(), "2024-02-29");
        assert!(create(&Use::Date, "tomorrow".into()).is_err());
    }

    #[test]
    fn datetime_truncates_to_millis() {
        let precise = DateTime::parse_from_rfc3339("2024-01-01T00:00:00.123456789Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let created = create(&Use::DateTime, Value::DateTime(precise)).unwrap();
        assert_eq!(created.to_string(), "2024-01-01T00:00:00.123Z");
    }

    #[test]
    fn binary_from_base64() {
        assert_eq!(
            create(&Use::Binary, "AAH/".into()).unwrap(),
            Value::Binary(vec![0, 1, 255])
        );
        assert!(create(&Use::Binary, "not base64!".into()).is_err());
    }

    #[test]
    fn enum_membership() {
        let color = Use::Enum("Color".into());
        assert_eq!(create(&color, "red".into()).unwrap(), Value::from("red"));
        assert!(create(&color, "blue".into()).is_err());
    }

    #[test]
    fn set_is_sorted_and_unique() {
        let ty = Use::set(Use::Integer);
        let value = Value::Array(vec!["3".into(), Value::Integer(1), Value::Integer(3)]);
        assert_eq!(
            create(&ty, value).unwrap(),
            Value::Array(vec![Value::Integer(1), Value::Integer(3)])
        );
    }

    #[test]
    fn null_passes_through() {
        for ty in [Use::Boolean, Use::Ref("Post".into()), Use::array(Use::String)] {
            assert_eq!(create(&ty, Value::Null).unwrap(), Value::Null);
        }
    }

    #[test]
    fn collapsed_ref_keeps_only_id() {
        let value = Value::map([("id", Value::from("p1")), ("title", Value::from("t"))]);
        assert_eq!(
            create(&Use::Ref("Post".into()), value).unwrap(),
            Value::map([("id", Value::from("p1"))])
        );
    }

    #[test]
    fn expanded_ref_creates_instance() {
        let ns = ns();
        let value = Value::map([
            ("id", Value::from("p1")),
            ("title", Value::Integer(5)),
            ("ref", Value::map([("id", Value::from("p2"))])),
        ]);
        let created = Use::Ref("Post".into())
            .create(&ns, &value, Some(&Expand::empty()), false)
            .unwrap();
        assert_eq!(created.get("title"), Some(&Value::from("5")));
        assert_eq!(created.get("schema"), Some(&Value::from("Post")));
        assert_eq!(
            created.get("ref"),
            Some(&Value::map([("id", Value::from("p2"))]))
        );
    }

    #[test]
    fn struct_coerces_members() {
        let value = Value::map([("x", Value::from("1")), ("y", Value::Integer(2))]);
        assert_eq!(
            create(&Use::Struct("Point".into()), value).unwrap(),
            Value::map([("x", Value::Integer(1)), ("y", Value::Integer(2))])
        );
    }
}
