//! Schema definitions.

mod enum_schema;
mod member;
mod object_schema;
mod struct_schema;
mod view_schema;

pub use enum_schema::EnumSchema;
pub use member::{History, Index, Link, Permission, Property, Transient};
pub use object_schema::ObjectSchema;
pub use struct_schema::StructSchema;
pub use view_schema::{ViewFrom, ViewSchema};

use std::collections::BTreeMap;
use std::fmt;
use strata_codec::Value;

/// The kind of a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    /// [`EnumSchema`]
    Enum,
    /// [`StructSchema`]
    Struct,
    /// [`ObjectSchema`]
    Object,
    /// [`ViewSchema`]
    View,
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Enum => "enum",
            Self::Struct => "struct",
            Self::Object => "object",
            Self::View => "view",
        })
    }
}

/// A resolved schema.
#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    /// Enumeration.
    Enum(EnumSchema),
    /// Embedded struct.
    Struct(StructSchema),
    /// Persisted object.
    Object(ObjectSchema),
    /// Derived view.
    View(ViewSchema),
}

macro_rules! common {
    ($self:ident, $field:ident) => {
        match $self {
            Schema::Enum(s) => &s.$field,
            Schema::Struct(s) => &s.$field,
            Schema::Object(s) => &s.$field,
            Schema::View(s) => &s.$field,
        }
    };
}

impl Schema {
    /// Qualified name in the namespace.
    pub fn name(&self) -> &str {
        common!(self, name)
    }

    /// Stable ordinal, the rank of the name among all schema names.
    pub fn slot(&self) -> usize {
        *common!(self, slot)
    }

    /// Declared schema version.
    pub fn version(&self) -> Option<u64> {
        *common!(self, version)
    }

    /// Free-form description.
    pub fn description(&self) -> Option<&str> {
        common!(self, description).as_deref()
    }

    /// Opaque descriptor extensions.
    pub fn extensions(&self) -> &BTreeMap<String, Value> {
        common!(self, extensions)
    }

    /// The schema kind.
    pub fn kind(&self) -> SchemaKind {
        match self {
            Self::Enum(_) => SchemaKind::Enum,
            Self::Struct(_) => SchemaKind::Struct,
            Self::Object(_) => SchemaKind::Object,
            Self::View(_) => SchemaKind::View,
        }
    }

    /// Returns the object schema, if this is one.
    pub fn as_object(&self) -> Option<&ObjectSchema> {
        match self {
            Self::Object(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the struct schema, if this is one.
    pub fn as_struct(&self) -> Option<&StructSchema> {
        match self {
            Self::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the enum schema, if this is one.
    pub fn as_enum(&self) -> Option<&EnumSchema> {
        match self {
            Self::Enum(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the view schema, if this is one.
    pub fn as_view(&self) -> Option<&ViewSchema> {
        match self {
            Self::View(s) => Some(s),
            _ => None,
        }
    }
}
