use super::member::{History, Index, Link, Permission, Property, Transient};
use crate::error::{SchemaError, SchemaResult};
use crate::expression::Context;
use crate::instance::{Instance, CREATED, HASH, ID, SCHEMA, UPDATED, VERSION};
use crate::name::Expand;
use crate::namespace::Namespace;
use crate::types::Use;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use strata_codec::{BinaryDecoder, BinaryEncoder, Value};

/// Metadata members in serialization order, with their types.
const METADATA: [(&str, Use); 6] = [
    (ID, Use::String),
    (SCHEMA, Use::String),
    (VERSION, Use::Integer),
    (CREATED, Use::DateTime),
    (UPDATED, Use::DateTime),
    (HASH, Use::String),
];

/// A persisted entity type with identity and version.
///
/// Members come in two views: `declared_*` holds what the descriptor
/// declared, the unprefixed accessors hold the effective members after
/// merging the parent chain (declared wins).
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSchema {
    pub(crate) name: String,
    pub(crate) slot: usize,
    pub(crate) version: Option<u64>,
    pub(crate) description: Option<String>,
    pub(crate) extend: Option<String>,
    pub(crate) concrete: Option<bool>,
    pub(crate) declared_properties: BTreeMap<String, Property>,
    pub(crate) declared_transients: BTreeMap<String, Transient>,
    pub(crate) declared_links: BTreeMap<String, Link>,
    pub(crate) declared_indexes: BTreeMap<String, Index>,
    pub(crate) declared_permissions: BTreeMap<String, Permission>,
    pub(crate) history: Option<History>,
    pub(crate) properties: BTreeMap<String, Property>,
    pub(crate) transients: BTreeMap<String, Transient>,
    pub(crate) links: BTreeMap<String, Link>,
    pub(crate) indexes: BTreeMap<String, Index>,
    pub(crate) permissions: BTreeMap<String, Permission>,
    pub(crate) extensions: BTreeMap<String, Value>,
}

impl ObjectSchema {
    /// Schema name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent schema name.
    pub fn extend(&self) -> Option<&str> {
        self.extend.as_deref()
    }

    /// False for abstract base schemas that cannot be instantiated.
    pub fn is_concrete(&self) -> bool {
        self.concrete.unwrap_or(true)
    }

    /// Effective properties.
    pub fn properties(&self) -> &BTreeMap<String, Property> {
        &self.properties
    }

    /// Properties declared on this schema only.
    pub fn declared_properties(&self) -> &BTreeMap<String, Property> {
        &self.declared_properties
    }

    /// Effective transients.
    pub fn transients(&self) -> &BTreeMap<String, Transient> {
        &self.transients
    }

    /// Effective links.
    pub fn links(&self) -> &BTreeMap<String, Link> {
        &self.links
    }

    /// Effective indexes.
    pub fn indexes(&self) -> &BTreeMap<String, Index> {
        &self.indexes
    }

    /// Effective permissions by operation name.
    pub fn permissions(&self) -> &BTreeMap<String, Permission> {
        &self.permissions
    }

    /// History settings, defaulting to disabled.
    pub fn history(&self) -> History {
        self.history.unwrap_or_default()
    }

    /// Looks up an effective property.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::MissingMember`] if there is none.
    pub fn property(&self, name: &str) -> SchemaResult<&Property> {
        self.properties
            .get(name)
            .ok_or_else(|| SchemaError::missing_member(&self.name, name))
    }

    /// Looks up an effective link.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::MissingMember`] if there is none.
    pub fn link(&self, name: &str) -> SchemaResult<&Link> {
        self.links
            .get(name)
            .ok_or_else(|| SchemaError::missing_member(&self.name, name))
    }

    /// Coerces raw data into an instance of this schema.
    ///
    /// Metadata members present in `value` are coerced and kept; `schema`
    /// is always set to this schema's name. Links and transients are not
    /// persisted and are never copied from raw data.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is not a map or a member fails to
    /// coerce (unless `suppress` is set).
    pub fn create(
        &self,
        ns: &Namespace,
        value: &Value,
        expand: &Expand,
        suppress: bool,
    ) -> SchemaResult<Instance> {
        let raw = value
            .as_map()
            .ok_or_else(|| SchemaError::invalid_type(&self.name, value.type_name()))?;
        let mut out = Instance::new();
        for (name, typ) in &METADATA {
            if let Some(item) = raw.get(*name) {
                out.insert((*name).to_string(), typ.create(ns, item, None, false)?);
            }
        }
        out.set_schema(&self.name);
        for (name, property) in &self.properties {
            let child = expand.child(name);
            let item = raw.get(name).unwrap_or(&Value::Null);
            out.insert(
                name.clone(),
                property.create(ns, item, child.as_ref(), suppress)?,
            );
        }
        Ok(out)
    }

    /// Adds the declared dependencies of every requested transient to
    /// `expand`.
    pub fn expand_with_transients(&self, expand: &Expand) -> Expand {
        self.transients
            .values()
            .filter(|t| expand.contains(&t.name))
            .fold(expand.clone(), |acc, t| acc.union(&t.expand))
    }

    /// Computes expression-backed properties in place.
    ///
    /// # Errors
    ///
    /// Returns an error if an expression fails or its result does not
    /// coerce to the property type.
    pub fn evaluate_properties(&self, ns: &Namespace, instance: &mut Instance) -> SchemaResult<()> {
        let computed = {
            let snapshot = Value::Map(instance.clone().into_inner());
            let ctx = Context::new(&snapshot);
            let mut computed = Vec::new();
            for (name, property) in &self.properties {
                if let Some(expression) = &property.expression {
                    let value = expression.evaluate(&ctx)?;
                    computed.push((name.clone(), property.create(ns, &value, None, false)?));
                }
            }
            computed
        };
        instance.extend(computed);
        Ok(())
    }

    /// Checks that every required property is non-null.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the missing properties.
    pub fn validate_required(&self, instance: &Instance) -> SchemaResult<()> {
        let missing: Vec<&str> = self
            .properties
            .values()
            .filter(|p| p.required && instance.get(&p.name).map_or(true, Value::is_null))
            .map(|p| p.name.as_str())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::validation(format!(
                "{} requires {}",
                self.name,
                missing.join(", ")
            )))
        }
    }

    /// Checks that no immutable property changed between versions.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the first changed property.
    pub fn check_immutable(&self, before: &Instance, after: &Instance) -> SchemaResult<()> {
        for property in self.properties.values().filter(|p| p.immutable) {
            let old = before.get(&property.name).unwrap_or(&Value::Null);
            let new = after.get(&property.name).unwrap_or(&Value::Null);
            if !property.typ.are_equal(old, new) {
                return Err(SchemaError::validation(format!(
                    "{}.{} is immutable",
                    self.name, property.name
                )));
            }
        }
        Ok(())
    }

    /// SHA-256 over the serialized non-metadata properties, as hex.
    ///
    /// # Errors
    ///
    /// Returns an error if a property value does not match its type.
    pub fn hash(&self, ns: &Namespace, instance: &Instance) -> SchemaResult<String> {
        let mut out = BinaryEncoder::new();
        self.serialize_properties(ns, instance, &mut out)?;
        let digest = Sha256::digest(out.as_bytes());
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            let _ = write!(hex, "{byte:02x}");
        }
        Ok(hex)
    }

    fn serialize_properties(
        &self,
        ns: &Namespace,
        instance: &Instance,
        out: &mut BinaryEncoder,
    ) -> SchemaResult<()> {
        for (name, property) in &self.properties {
            let value = instance.get(name).unwrap_or(&Value::Null);
            property.typ.serialize(ns, value, out)?;
        }
        Ok(())
    }

    /// Writes metadata then properties in name order.
    ///
    /// # Errors
    ///
    /// Returns an error if a member value does not match its type.
    pub fn serialize(
        &self,
        ns: &Namespace,
        instance: &Instance,
        out: &mut BinaryEncoder,
    ) -> SchemaResult<()> {
        for (name, typ) in &METADATA {
            typ.serialize(ns, instance.get(*name).unwrap_or(&Value::Null), out)?;
        }
        self.serialize_properties(ns, instance, out)
    }

    /// Reads an instance written by [`ObjectSchema::serialize`].
    ///
    /// # Errors
    ///
    /// Returns an error on truncated or malformed input.
    pub fn deserialize(&self, ns: &Namespace, input: &mut BinaryDecoder<'_>) -> SchemaResult<Instance> {
        let mut out = Instance::new();
        for (name, typ) in &METADATA {
            let value = typ.deserialize(ns, input)?;
            if !value.is_null() {
                out.insert((*name).to_string(), value);
            }
        }
        for (name, property) in &self.properties {
            out.insert(name.clone(), property.typ.deserialize(ns, input)?);
        }
        Ok(out)
    }
}
