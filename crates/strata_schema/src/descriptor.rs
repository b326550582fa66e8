//! Declarative schema descriptors.
//!
//! Descriptors are the serde form of schemas, read from and written to
//! YAML or JSON documents:
//!
//! ```yaml
//! Post:
//!   type: object
//!   properties:
//!     title: string
//!     ref: Post
//!     tags:
//!       type: set<string>
//!       required: true
//! ```

use crate::consistency::Consistency;
use crate::expression::{Expression, Sort};
use crate::name::{Expand, Name};
use crate::schema::{
    EnumSchema, Index, Link, ObjectSchema, Permission, Property, Schema, StructSchema,
    Transient, ViewSchema,
};
use crate::types::TypeRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strata_codec::Value;

/// A document of named schema descriptors.
pub type NamespaceDescriptor = BTreeMap<String, SchemaDescriptor>;

fn is_false(value: &bool) -> bool {
    !*value
}

/// Any schema descriptor, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SchemaDescriptor {
    /// `type: enum`
    Enum(EnumDescriptor),
    /// `type: struct`
    Struct(StructDescriptor),
    /// `type: object`
    Object(ObjectDescriptor),
    /// `type: view`
    View(ViewDescriptor),
}

/// Descriptor of an [`EnumSchema`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnumDescriptor {
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Schema version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// Enum values in order.
    pub values: Vec<String>,
    /// Opaque metadata carried through unchanged.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, Value>,
}

/// Descriptor of a [`StructSchema`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StructDescriptor {
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Schema version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// Properties by name.
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyDescriptor>,
    /// Opaque metadata carried through unchanged.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, Value>,
}

/// Descriptor of an [`ObjectSchema`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectDescriptor {
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Schema version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// Parent object schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extend: Option<String>,
    /// False for abstract base schemas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concrete: Option<bool>,
    /// Properties by name.
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyDescriptor>,
    /// Transients by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub transients: BTreeMap<String, TransientDescriptor>,
    /// Links by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, LinkDescriptor>,
    /// Indexes by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub indexes: BTreeMap<String, IndexDescriptor>,
    /// Permissions by operation.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub permissions: BTreeMap<String, PermissionDescriptor>,
    /// History settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<HistoryDescriptor>,
    /// Opaque metadata carried through unchanged.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, Value>,
}

/// Descriptor of a [`ViewSchema`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ViewDescriptor {
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Schema version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// Source schema.
    pub from: FromDescriptor,
    /// Source filter, written `where`.
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Expression>,
    /// Group paths.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group: Vec<Name>,
    /// Properties by name.
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyDescriptor>,
    /// Sort keys.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<Sort>,
    /// Opaque metadata carried through unchanged.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, Value>,
}

/// The `from` clause of a view: a schema name, optionally with an expand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "FromRepr")]
pub struct FromDescriptor {
    /// Target schema name.
    pub schema: String,
    /// Members to expand.
    #[serde(default, skip_serializing_if = "Expand::is_empty")]
    pub expand: Expand,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FromRepr {
    Short(String),
    Full {
        schema: String,
        #[serde(default)]
        expand: Expand,
    },
}

impl From<FromRepr> for FromDescriptor {
    fn from(repr: FromRepr) -> Self {
        match repr {
            FromRepr::Short(schema) => Self {
                schema,
                expand: Expand::empty(),
            },
            FromRepr::Full { schema, expand } => Self { schema, expand },
        }
    }
}

/// Descriptor of a [`Property`]. A bare type string is shorthand for a
/// property with only a type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PropertyRepr")]
pub struct PropertyDescriptor {
    /// Type reference.
    #[serde(rename = "type")]
    pub typ: TypeRef,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Must be non-null on write.
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    /// May not change after creation.
    #[serde(default, skip_serializing_if = "is_false")]
    pub immutable: bool,
    /// Expression text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<Expression>,
    /// Visibility rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Expression>,
    /// Value used in place of null.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl PropertyDescriptor {
    /// A property with only a type.
    pub fn of(typ: TypeRef) -> Self {
        Self {
            typ,
            description: None,
            required: false,
            immutable: false,
            expression: None,
            visibility: None,
            default: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FullProperty {
    #[serde(rename = "type")]
    typ: TypeRef,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    immutable: bool,
    #[serde(default)]
    expression: Option<Expression>,
    #[serde(default)]
    visibility: Option<Expression>,
    #[serde(default)]
    default: Option<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PropertyRepr {
    Short(TypeRef),
    Full(FullProperty),
}

impl From<PropertyRepr> for PropertyDescriptor {
    fn from(repr: PropertyRepr) -> Self {
        match repr {
            PropertyRepr::Short(typ) => Self::of(typ),
            PropertyRepr::Full(full) => Self {
                typ: full.typ,
                description: full.description,
                required: full.required,
                immutable: full.immutable,
                expression: full.expression,
                visibility: full.visibility,
                default: full.default,
            },
        }
    }
}

/// Descriptor of a [`Transient`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransientDescriptor {
    /// Type reference.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<TypeRef>,
    /// Expression text.
    pub expression: Expression,
    /// Members to expand.
    #[serde(default, skip_serializing_if = "Expand::is_empty")]
    pub expand: Expand,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Descriptor of a [`Link`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkDescriptor {
    /// Target schema name.
    pub schema: String,
    /// Expression text.
    pub expression: Expression,
    /// Sort keys.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<Sort>,
    /// Yields one value instead of a list.
    #[serde(default, skip_serializing_if = "is_false")]
    pub single: bool,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Descriptor of an [`Index`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexDescriptor {
    /// Partition key paths.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partition: Vec<Name>,
    /// Sort keys.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<Sort>,
    /// At most one object per key.
    #[serde(default, skip_serializing_if = "is_false")]
    pub unique: bool,
    /// Requested consistency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consistency: Option<Consistency>,
}

/// Descriptor of a [`Permission`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionDescriptor {
    /// Expression text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<Expression>,
    /// Applies to unauthenticated callers.
    #[serde(default, skip_serializing_if = "is_false")]
    pub anonymous: bool,
    /// Members to expand.
    #[serde(default, skip_serializing_if = "Expand::is_empty")]
    pub expand: Expand,
}

/// Descriptor of [`History`](crate::schema::History) settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryDescriptor {
    /// Retain past versions.
    #[serde(default)]
    pub enabled: bool,
    /// Requested consistency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consistency: Option<Consistency>,
}

impl Property {
    /// Recovers the descriptor of this property.
    pub fn descriptor(&self) -> PropertyDescriptor {
        PropertyDescriptor {
            typ: self.typ.to_type_ref(),
            description: self.description.clone(),
            required: self.required,
            immutable: self.immutable,
            expression: self.expression.clone(),
            visibility: self.visibility.clone(),
            default: self.default.clone(),
        }
    }
}

fn properties(map: &BTreeMap<String, Property>) -> BTreeMap<String, PropertyDescriptor> {
    map.iter().map(|(k, p)| (k.clone(), p.descriptor())).collect()
}

impl Transient {
    /// Recovers the descriptor of this transient.
    pub fn descriptor(&self) -> TransientDescriptor {
        TransientDescriptor {
            typ: self.typ.as_ref().map(crate::types::Use::to_type_ref),
            expression: self.expression.clone(),
            expand: self.expand.clone(),
            description: self.description.clone(),
        }
    }
}

impl Link {
    /// Recovers the descriptor of this link.
    pub fn descriptor(&self) -> LinkDescriptor {
        LinkDescriptor {
            schema: self.schema.clone(),
            expression: self.expression.clone(),
            sort: self.sort.clone(),
            single: self.single,
            description: self.description.clone(),
        }
    }
}

impl Index {
    /// Recovers the descriptor of this index.
    pub fn descriptor(&self) -> IndexDescriptor {
        IndexDescriptor {
            partition: self.partition.clone(),
            sort: self.sort.clone(),
            unique: self.unique,
            consistency: self.consistency,
        }
    }
}

impl Permission {
    /// Recovers the descriptor of this permission.
    pub fn descriptor(&self) -> PermissionDescriptor {
        PermissionDescriptor {
            expression: self.expression.clone(),
            anonymous: self.anonymous,
            expand: self.expand.clone(),
        }
    }
}

impl EnumSchema {
    /// Recovers the descriptor of this schema.
    pub fn descriptor(&self) -> EnumDescriptor {
        EnumDescriptor {
            description: self.description.clone(),
            version: self.version,
            values: self.values.clone(),
            extensions: self.extensions.clone(),
        }
    }
}

impl StructSchema {
    /// Recovers the descriptor of this schema.
    pub fn descriptor(&self) -> StructDescriptor {
        StructDescriptor {
            description: self.description.clone(),
            version: self.version,
            properties: properties(&self.properties),
            extensions: self.extensions.clone(),
        }
    }
}

impl ObjectSchema {
    /// Recovers the descriptor of this schema. Only declared members are
    /// described; inherited members come back through `extend`.
    pub fn descriptor(&self) -> ObjectDescriptor {
        ObjectDescriptor {
            description: self.description.clone(),
            version: self.version,
            extend: self.extend.clone(),
            concrete: self.concrete,
            properties: properties(&self.declared_properties),
            transients: self
                .declared_transients
                .iter()
                .map(|(k, t)| (k.clone(), t.descriptor()))
                .collect(),
            links: self
                .declared_links
                .iter()
                .map(|(k, l)| (k.clone(), l.descriptor()))
                .collect(),
            indexes: self
                .declared_indexes
                .iter()
                .map(|(k, i)| (k.clone(), i.descriptor()))
                .collect(),
            permissions: self
                .declared_permissions
                .iter()
                .map(|(k, p)| (k.clone(), p.descriptor()))
                .collect(),
            history: self.history.map(|h| HistoryDescriptor {
                enabled: h.enabled,
                consistency: h.consistency,
            }),
            extensions: self.extensions.clone(),
        }
    }
}

impl ViewSchema {
    /// Recovers the descriptor of this schema.
    pub fn descriptor(&self) -> ViewDescriptor {
        ViewDescriptor {
            description: self.description.clone(),
            version: self.version,
            from: FromDescriptor {
                schema: self.from.schema.clone(),
                expand: self.from.expand.clone(),
            },
            filter: self.filter.clone(),
            group: self.group.clone(),
            properties: properties(&self.properties),
            sort: self.sort.clone(),
            extensions: self.extensions.clone(),
        }
    }
}

impl Schema {
    /// Recovers the descriptor of this schema.
    pub fn descriptor(&self) -> SchemaDescriptor {
        match self {
            Self::Enum(s) => SchemaDescriptor::Enum(s.descriptor()),
            Self::Struct(s) => SchemaDescriptor::Struct(s.descriptor()),
            Self::Object(s) => SchemaDescriptor::Object(s.descriptor()),
            Self::View(s) => SchemaDescriptor::View(s.descriptor()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_shorthand_and_full_form() {
        let yaml = r#"
type: object
properties:
  title: string
  tags:
    type: set<string>
    required: true
"#;
        let SchemaDescriptor::Object(object) = serde_yaml::from_str(yaml).unwrap() else {
            panic!("expected object descriptor");
        };
        assert_eq!(
            object.properties["title"],
            PropertyDescriptor::of(TypeRef::named("string"))
        );
        assert!(object.properties["tags"].required);
        assert_eq!(object.properties["tags"].typ.to_string(), "set<string>");
    }

    #[test]
    fn view_from_shorthand() {
        let yaml = r#"
type: view
from: Post
where: "score > 1"
properties:
  title: string
"#;
        let SchemaDescriptor::View(view) = serde_yaml::from_str(yaml).unwrap() else {
            panic!("expected view descriptor");
        };
        assert_eq!(view.from.schema, "Post");
        assert!(view.from.expand.is_empty());
        assert_eq!(view.filter.unwrap().to_string(), "score > 1");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let yaml = "type: enum\nvalues: [a]\nbogus: 1\n";
        assert!(serde_yaml::from_str::<SchemaDescriptor>(yaml).is_err());
    }

    #[test]
    fn bad_expression_is_rejected() {
        let yaml = r#"
type: object
links:
  posts:
    schema: Post
    expression: "author.id == "
"#;
        assert!(serde_yaml::from_str::<SchemaDescriptor>(yaml).is_err());
    }
}
