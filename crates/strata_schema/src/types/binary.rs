//! Schema-directed binary serialization.
//!
//! Every typed value is written as its [`Code`] byte followed by the
//! payload. Unlike the self-describing codec form, struct members are
//! written positionally in property-name order and references carry only
//! their identity, so the reader needs the same [`Namespace`].

use super::Use;
use crate::error::{SchemaError, SchemaResult};
use crate::instance::{ID, KEY};
use crate::namespace::Namespace;
use std::collections::BTreeMap;
use strata_codec::{BinaryDecoder, BinaryEncoder, Code, Secret, Value};

impl Use {
    /// Writes `value` as code byte plus payload. `Null` is written as the
    /// null code alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the value does not have this type.
    pub fn serialize(
        &self,
        ns: &Namespace,
        value: &Value,
        out: &mut BinaryEncoder,
    ) -> SchemaResult<()> {
        if value.is_null() {
            out.write_code(Code::Null);
            return Ok(());
        }
        out.write_code(self.code());
        self.serialize_value(ns, value, out)
    }

    /// Writes the payload of a non-null `value`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value does not have this type.
    pub fn serialize_value(
        &self,
        ns: &Namespace,
        value: &Value,
        out: &mut BinaryEncoder,
    ) -> SchemaResult<()> {
        let mismatch = || self.mismatch(value);
        match (self, value) {
            (Self::Boolean, Value::Bool(b)) => out.write_bool(*b),
            (Self::Integer, Value::Integer(n)) => out.write_i64(*n),
            (Self::Number, Value::Number(n)) => out.write_f64(*n),
            (Self::String | Self::Enum(_), Value::String(s)) => out.write_string(s)?,
            (Self::Binary, Value::Binary(b)) => out.write_bytes(b)?,
            (Self::Secret, Value::Secret(s)) => out.write_bytes(s.as_bytes())?,
            (Self::Date, Value::Date(d)) => out.write_date(*d),
            (Self::DateTime, Value::DateTime(dt)) => out.write_datetime(dt),
            (Self::Any, _) => out.encode(value)?,
            (Self::Struct(name), Value::Map(map)) => {
                let schema = ns.require_struct(name)?;
                for (member, property) in schema.properties() {
                    let item = map.get(member).unwrap_or(&Value::Null);
                    property.typ().serialize(ns, item, out)?;
                }
            }
            (Self::Ref(_), Value::Map(map)) => {
                let id = map.get(ID).and_then(Value::as_str).ok_or_else(mismatch)?;
                out.write_string(id)?;
            }
            (Self::View(_), Value::Map(map)) => {
                out.encode(map.get(KEY).unwrap_or(&Value::Null))?;
            }
            (Self::Array(item) | Self::Set(item), Value::Array(items)) => {
                out.write_len(items.len())?;
                for v in items {
                    item.serialize(ns, v, out)?;
                }
            }
            (Self::Map(item), Value::Map(entries)) => {
                out.write_len(entries.len())?;
                for (k, v) in entries {
                    out.write_string(k)?;
                    item.serialize(ns, v, out)?;
                }
            }
            _ => return Err(mismatch()),
        }
        Ok(())
    }

    /// Reads a value written by [`Use::serialize`].
    ///
    /// # Errors
    ///
    /// Returns an error on truncated input or when the code byte is neither
    /// null nor this type's code.
    pub fn deserialize(&self, ns: &Namespace, input: &mut BinaryDecoder<'_>) -> SchemaResult<Value> {
        match input.read_code()? {
            Code::Null => Ok(Value::Null),
            code if code == self.code() => self.deserialize_value(ns, input),
            code => Err(SchemaError::invalid_type(self.to_string(), code.to_string())),
        }
    }

    /// Reads the payload of a non-null value.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated or malformed input.
    pub fn deserialize_value(
        &self,
        ns: &Namespace,
        input: &mut BinaryDecoder<'_>,
    ) -> SchemaResult<Value> {
        Ok(match self {
            Self::Boolean => Value::Bool(input.read_bool()?),
            Self::Integer => Value::Integer(input.read_i64()?),
            Self::Number => Value::Number(input.read_f64()?),
            Self::String | Self::Enum(_) => Value::String(input.read_string()?),
            Self::Binary => Value::Binary(input.read_bytes()?),
            Self::Secret => Value::Secret(Secret::new(input.read_bytes()?)),
            Self::Date => Value::Date(input.read_date()?),
            Self::DateTime => Value::DateTime(input.read_datetime()?),
            Self::Any => input.decode()?,
            Self::Struct(name) => {
                let schema = ns.require_struct(name)?;
                let mut out = BTreeMap::new();
                for (member, property) in schema.properties() {
                    out.insert(member.clone(), property.typ().deserialize(ns, input)?);
                }
                Value::Map(out)
            }
            Self::Ref(_) => Value::map([(ID, Value::String(input.read_string()?))]),
            Self::View(_) => Value::map([(KEY, input.decode()?)]),
            Self::Array(item) | Self::Set(item) => {
                let len = input.read_len()?;
                let mut items = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    items.push(item.deserialize(ns, input)?);
                }
                Value::Array(items)
            }
            Self::Map(item) => {
                let len = input.read_len()?;
                let mut entries = BTreeMap::new();
                for _ in 0..len {
                    let key = input.read_string()?;
                    entries.insert(key, item.deserialize(ns, input)?);
                }
                Value::Map(entries)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveDate};

    fn ns() -> Namespace {
        Namespace::from_yaml(
            r#"
Color:
  type: enum
  values: [red, green]
Point:
  type: struct
  properties:
    y: number
    x: integer
Segment:
  type: struct
  properties:
    label: string
    from: Point
    to: Point
Path:
  type: struct
  properties:
    start: Segment
    rest: array<Segment>
Post:
  type: object
  properties:
    title: string
"#,
        )
        .unwrap()
    }

    fn roundtrip(ty: &Use, value: &Value) -> Value {
        let ns = ns();
        let mut out = BinaryEncoder::new();
        ty.serialize(&ns, value, &mut out).unwrap();
        let bytes = out.into_bytes();
        let mut input = BinaryDecoder::new(&bytes);
        let back = ty.deserialize(&ns, &mut input).unwrap();
        assert!(input.is_empty());
        back
    }

    #[test]
    fn every_variant_roundtrips() {
        let cases = vec![
            (Use::Boolean, Value::Bool(true)),
            (Use::Integer, Value::Integer(-7)),
            (Use::Number, Value::Number(2.5)),
            (Use::String, Value::from("hello")),
            (Use::Binary, Value::Binary(vec![1, 2, 3])),
            (
                Use::Date,
                Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()),
            ),
            (
                Use::DateTime,
                Value::DateTime(DateTime::from_timestamp_millis(1_700_000_000_001).unwrap()),
            ),
            (Use::Secret, Value::Secret(Secret::new(b"pw".to_vec()))),
            (Use::Any, Value::map([("k", Value::Integer(1))])),
            (Use::Enum("Color".into()), Value::from("green")),
            (
                Use::Struct("Point".into()),
                Value::map([("x", Value::Integer(1)), ("y", Value::Number(2.0))]),
            ),
            (Use::Ref("Post".into()), Value::map([("id", Value::from("p1"))])),
            (
                Use::array(Use::String),
                Value::Array(vec![Value::from("a"), Value::Null]),
            ),
            (
                Use::set(Use::Integer),
                Value::Array(vec![Value::Integer(1), Value::Integer(2)]),
            ),
            (
                Use::map(Use::Boolean),
                Value::map([("on", Value::Bool(true))]),
            ),
        ];
        for (ty, value) in cases {
            assert_eq!(roundtrip(&ty, &value), value, "{ty}");
            assert_eq!(roundtrip(&ty, &Value::Null), Value::Null, "{ty}");
        }
    }

    #[test]
    fn boundary_scalars_roundtrip() {
        let cases = vec![
            (Use::String, Value::from("")),
            (Use::Integer, Value::Integer(0)),
            (Use::Integer, Value::Integer(i64::MIN)),
            (Use::Integer, Value::Integer(i64::MAX)),
            (Use::Number, Value::Number(0.0)),
            (Use::Number, Value::Number(f64::MIN)),
            (Use::Number, Value::Number(f64::MAX)),
            (Use::Binary, Value::Binary(Vec::new())),
            (Use::Secret, Value::Secret(Secret::new(Vec::new()))),
        ];
        for (ty, value) in cases {
            assert_eq!(roundtrip(&ty, &value), value, "{ty}");
        }
    }

    #[test]
    fn empty_collections_roundtrip() {
        let cases = vec![
            (Use::array(Use::String), Value::Array(Vec::new())),
            (Use::set(Use::Integer), Value::Array(Vec::new())),
            (Use::map(Use::Boolean), Value::Map(Default::default())),
            (Use::Any, Value::Array(Vec::new())),
            (Use::array(Use::array(Use::Integer)), Value::Array(vec![Value::Array(Vec::new())])),
        ];
        for (ty, value) in cases {
            assert_eq!(roundtrip(&ty, &value), value, "{ty}");
        }
    }

    #[test]
    fn nested_structs_roundtrip() {
        let point = |x: i64, y: f64| Value::map([("x", Value::Integer(x)), ("y", Value::Number(y))]);
        let segment = |label: &str, from: Value, to: Value| {
            Value::map([("label", Value::from(label)), ("from", from), ("to", to)])
        };
        let first = segment("", point(i64::MIN, 0.0), point(i64::MAX, -1.5));
        let second = segment("b", point(0, 2.0), Value::Null);
        assert_eq!(roundtrip(&Use::Struct("Segment".into()), &first), first);

        let path = Value::map([
            ("start", first.clone()),
            ("rest", Value::Array(vec![second, first])),
        ]);
        assert_eq!(roundtrip(&Use::Struct("Path".into()), &path), path);

        let empty = Value::map([("start", Value::Null), ("rest", Value::Array(Vec::new()))]);
        assert_eq!(roundtrip(&Use::Struct("Path".into()), &empty), empty);

        let many = Value::Array(vec![
            segment("a", point(1, 1.0), point(2, 2.0)),
            segment("", Value::Null, Value::Null),
        ]);
        assert_eq!(roundtrip(&Use::array(Use::Struct("Segment".into())), &many), many);
    }

    #[test]
    fn struct_members_are_written_in_name_order() {
        let ns = ns();
        let value = Value::map([("y", Value::Number(0.0)), ("x", Value::Integer(1))]);
        let mut out = BinaryEncoder::new();
        Use::Struct("Point".into())
            .serialize_value(&ns, &value, &mut out)
            .unwrap();
        let bytes = out.into_bytes();
        assert_eq!(bytes[0], Code::Integer.as_u8());
        assert_eq!(bytes[9], Code::Number.as_u8());
    }

    #[test]
    fn wrong_code_is_rejected() {
        let ns = ns();
        let mut out = BinaryEncoder::new();
        Use::String
            .serialize(&ns, &Value::from("x"), &mut out)
            .unwrap();
        let bytes = out.into_bytes();
        let err = Use::Integer
            .deserialize(&ns, &mut BinaryDecoder::new(&bytes))
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidType { .. }));
    }

    #[test]
    fn mismatched_value_fails_to_serialize() {
        let mut out = BinaryEncoder::new();
        assert!(Use::Integer
            .serialize(&ns(), &Value::from("1"), &mut out)
            .is_err());
    }
}
