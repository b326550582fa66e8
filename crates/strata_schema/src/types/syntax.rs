//! Textual type references used by descriptors.
//!
//! ```text
//! string | integer | Post | array<Post> | set<string> | map<array<Tag>>
//! ```

use crate::error::{SchemaError, SchemaResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// An unresolved type reference as written in a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    /// A builtin scalar (`string`, `datetime`, ...) or a schema name.
    Named(String),
    /// `array<T>`
    Array(Box<TypeRef>),
    /// `set<T>`
    Set(Box<TypeRef>),
    /// `map<T>`
    Map(Box<TypeRef>),
}

impl TypeRef {
    /// Shorthand for a named reference.
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Array(item) => write!(f, "array<{item}>"),
            Self::Set(item) => write!(f, "set<{item}>"),
            Self::Map(item) => write!(f, "map<{item}>"),
        }
    }
}

impl FromStr for TypeRef {
    type Err = SchemaError;

    fn from_str(text: &str) -> SchemaResult<Self> {
        let text = text.trim();
        let Some(open) = text.find('<') else {
            if text.is_empty() || text.contains('>') {
                return Err(SchemaError::validation(format!("invalid type '{text}'")));
            }
            return Ok(Self::Named(text.to_string()));
        };
        let inner = text[open + 1..]
            .strip_suffix('>')
            .ok_or_else(|| SchemaError::validation(format!("unbalanced type '{text}'")))?;
        let item = Box::new(inner.parse()?);
        match text[..open].trim() {
            "array" => Ok(Self::Array(item)),
            "set" => Ok(Self::Set(item)),
            "map" => Ok(Self::Map(item)),
            other => Err(SchemaError::validation(format!(
                "unknown collection type '{other}'"
            ))),
        }
    }
}

impl Serialize for TypeRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TypeRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_nested_collections() {
        let parsed: TypeRef = "map<array<Post>>".parse().unwrap();
        assert_eq!(
            parsed,
            TypeRef::Map(Box::new(TypeRef::Array(Box::new(TypeRef::named("Post")))))
        );
        assert_eq!(parsed.to_string(), "map<array<Post>>");
    }

    #[test]
    fn reject_malformed() {
        assert!("array<string".parse::<TypeRef>().is_err());
        assert!("list<string>".parse::<TypeRef>().is_err());
        assert!("".parse::<TypeRef>().is_err());
    }
}
