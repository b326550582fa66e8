//! Runtime type descriptors.
//!
//! [`Use`] is the closed set of field types. Composite variants nest other
//! `Use`s; schema-backed variants (`Enum`, `Struct`, `Ref`, `View`) carry
//! the name of the schema they point at and are resolved through a
//! [`Namespace`](crate::Namespace), which keeps cyclic graphs (a `Post`
//! with a `ref: Post` field) free of ownership cycles.

mod binary;
mod create;
mod syntax;
mod visitor;

pub use syntax::TypeRef;
pub use visitor::{DefaultValue, TypeSyntax, UseVisitor};

use crate::error::{SchemaError, SchemaResult};
use crate::namespace::Namespace;
use crate::schema::Schema;
use std::fmt;
use strata_codec::{compare, equals, Code, Value};

/// The type of a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Use {
    /// `true` / `false`
    Boolean,
    /// 64-bit signed integer.
    Integer,
    /// 64-bit float.
    Number,
    /// UTF-8 text.
    String,
    /// Raw bytes.
    Binary,
    /// Calendar date.
    Date,
    /// UTC instant with millisecond precision.
    DateTime,
    /// Bytes that are never displayed.
    Secret,
    /// Any self-describing value.
    Any,
    /// Member of an enum schema.
    Enum(String),
    /// Embedded struct.
    Struct(String),
    /// Reference to an object.
    Ref(String),
    /// Reference to a view record.
    View(String),
    /// Ordered list.
    Array(Box<Use>),
    /// Sorted, duplicate-free list.
    Set(Box<Use>),
    /// String-keyed map.
    Map(Box<Use>),
}

impl Use {
    /// Shorthand for `array<item>`.
    pub fn array(item: Use) -> Self {
        Self::Array(Box::new(item))
    }

    /// Shorthand for `set<item>`.
    pub fn set(item: Use) -> Self {
        Self::Set(Box::new(item))
    }

    /// Shorthand for `map<item>`.
    pub fn map(item: Use) -> Self {
        Self::Map(Box::new(item))
    }

    /// Returns the binary discriminant of this type.
    pub fn code(&self) -> Code {
        match self {
            Self::Boolean => Code::Boolean,
            Self::Integer => Code::Integer,
            Self::Number => Code::Number,
            Self::String => Code::String,
            Self::Binary => Code::Binary,
            Self::Date => Code::Date,
            Self::DateTime => Code::DateTime,
            Self::Secret => Code::Secret,
            Self::Any => Code::Any,
            Self::Enum(_) => Code::Enum,
            Self::Struct(_) => Code::Struct,
            Self::Ref(_) => Code::Ref,
            Self::View(_) => Code::View,
            Self::Array(_) => Code::Array,
            Self::Set(_) => Code::Set,
            Self::Map(_) => Code::Map,
        }
    }

    /// Dispatches to the visitor method for this variant.
    pub fn visit<R, V: UseVisitor<R> + ?Sized>(&self, visitor: &mut V) -> R {
        match self {
            Self::Boolean => visitor.visit_boolean(),
            Self::Integer => visitor.visit_integer(),
            Self::Number => visitor.visit_number(),
            Self::String => visitor.visit_string(),
            Self::Binary => visitor.visit_binary(),
            Self::Date => visitor.visit_date(),
            Self::DateTime => visitor.visit_date_time(),
            Self::Secret => visitor.visit_secret(),
            Self::Any => visitor.visit_any(),
            Self::Enum(schema) => visitor.visit_enum(schema),
            Self::Struct(schema) => visitor.visit_struct(schema),
            Self::Ref(schema) => visitor.visit_ref(schema),
            Self::View(schema) => visitor.visit_view(schema),
            Self::Array(item) => visitor.visit_array(item),
            Self::Set(item) => visitor.visit_set(item),
            Self::Map(item) => visitor.visit_map(item),
        }
    }

    /// Returns the name of the schema this type points at, if any.
    pub fn schema_name(&self) -> Option<&str> {
        match self {
            Self::Enum(s) | Self::Struct(s) | Self::Ref(s) | Self::View(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the innermost item type of nested collections.
    pub fn item(&self) -> &Use {
        match self {
            Self::Array(item) | Self::Set(item) | Self::Map(item) => item.item(),
            other => other,
        }
    }

    /// Returns the unresolved form of this type.
    pub fn to_type_ref(&self) -> TypeRef {
        match self {
            Self::Array(item) => TypeRef::Array(Box::new(item.to_type_ref())),
            Self::Set(item) => TypeRef::Set(Box::new(item.to_type_ref())),
            Self::Map(item) => TypeRef::Map(Box::new(item.to_type_ref())),
            other => TypeRef::Named(other.to_string()),
        }
    }

    /// Returns the builtin scalar named `name`.
    pub fn builtin(name: &str) -> Option<Use> {
        Some(match name {
            "boolean" => Self::Boolean,
            "integer" => Self::Integer,
            "number" => Self::Number,
            "string" => Self::String,
            "binary" => Self::Binary,
            "date" => Self::Date,
            "datetime" => Self::DateTime,
            "secret" => Self::Secret,
            "any" => Self::Any,
            _ => return None,
        })
    }

    /// Builds the type for a schema according to its kind.
    pub fn for_schema(schema: &Schema) -> Use {
        let name = schema.name().to_string();
        match schema {
            Schema::Enum(_) => Self::Enum(name),
            Schema::Struct(_) => Self::Struct(name),
            Schema::Object(_) => Self::Ref(name),
            Schema::View(_) => Self::View(name),
        }
    }

    /// Returns the default value for this type.
    ///
    /// Enums default to their first value, collections to empty, temporal
    /// types to the epoch and structs to a struct of property defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a referenced schema is missing.
    pub fn default_value(&self, ns: &Namespace) -> SchemaResult<Value> {
        self.visit(&mut DefaultValue::new(ns))
    }

    /// Compares two values of this type.
    ///
    /// Sets compare order-insensitively; everything else uses the
    /// promotion-aware [`equals`].
    pub fn are_equal(&self, a: &Value, b: &Value) -> bool {
        match (self, a, b) {
            (Self::Set(item), Value::Array(x), Value::Array(y)) => {
                x.len() == y.len()
                    && x.iter().all(|l| y.iter().any(|r| item.are_equal(l, r)))
                    && y.iter().all(|r| x.iter().any(|l| item.are_equal(l, r)))
            }
            (Self::Array(item), Value::Array(x), Value::Array(y)) => {
                x.len() == y.len() && x.iter().zip(y).all(|(l, r)| item.are_equal(l, r))
            }
            _ => equals(a, b),
        }
    }

    pub(crate) fn mismatch(&self, value: &Value) -> SchemaError {
        SchemaError::invalid_type(self.to_string(), value.type_name())
    }
}

impl fmt::Display for Use {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.visit(&mut TypeSyntax))
    }
}

/// Sorts and de-duplicates set members in place.
pub(crate) fn normalize_set(items: &mut Vec<Value>) {
    items.sort_by(|a, b| {
        compare(a, b).unwrap_or_else(|_| a.code().as_u8().cmp(&b.code().as_u8()))
    });
    items.dedup_by(|a, b| equals(a, b));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_type_syntax() {
        assert_eq!(Use::array(Use::Ref("Post".into())).to_string(), "array<Post>");
        assert_eq!(Use::map(Use::set(Use::String)).to_string(), "map<set<string>>");
        assert_eq!(Use::DateTime.to_string(), "datetime");
    }

    #[test]
    fn type_ref_roundtrip() {
        let ty = Use::set(Use::Enum("Color".into()));
        assert_eq!(ty.to_type_ref().to_string(), "set<Color>");
    }

    #[test]
    fn set_equality_ignores_order() {
        let ty = Use::set(Use::Integer);
        let a = Value::Array(vec![Value::Integer(1), Value::Integer(2)]);
        let b = Value::Array(vec![Value::Integer(2), Value::Integer(1)]);
        assert!(ty.are_equal(&a, &b));
        assert!(!Use::array(Use::Integer).are_equal(&a, &b));
    }

    #[test]
    fn normalize_set_sorts_and_dedups() {
        let mut items = vec![
            Value::Integer(3),
            Value::Integer(1),
            Value::Number(3.0),
            Value::Integer(2),
        ];
        normalize_set(&mut items);
        assert_eq!(
            items,
            vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]
        );
    }
}
