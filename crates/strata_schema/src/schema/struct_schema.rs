use super::member::Property;
use crate::error::{SchemaError, SchemaResult};
use crate::name::Expand;
use crate::namespace::Namespace;
use std::collections::BTreeMap;
use strata_codec::Value;

/// An embedded record type with no identity.
///
/// Struct properties are plain data: they may not be immutable, computed
/// by an expression or guarded by a visibility rule.
#[derive(Debug, Clone, PartialEq)]
pub struct StructSchema {
    pub(crate) name: String,
    pub(crate) slot: usize,
    pub(crate) version: Option<u64>,
    pub(crate) description: Option<String>,
    pub(crate) properties: BTreeMap<String, Property>,
    pub(crate) extensions: BTreeMap<String, Value>,
}

impl StructSchema {
    /// Schema name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Properties by name.
    pub fn properties(&self) -> &BTreeMap<String, Property> {
        &self.properties
    }

    pub(crate) fn validate(&self) -> SchemaResult<()> {
        for property in self.properties.values() {
            let rule = if property.immutable {
                "immutable"
            } else if property.expression.is_some() {
                "an expression"
            } else if property.visibility.is_some() {
                "a visibility rule"
            } else {
                continue;
            };
            return Err(SchemaError::validation(format!(
                "struct {} property {} may not have {rule}",
                self.name, property.name
            )));
        }
        Ok(())
    }

    /// Coerces a raw map into struct members. Unknown keys are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is not a map or a member fails to
    /// coerce (unless `suppress` is set).
    pub fn create(
        &self,
        ns: &Namespace,
        value: &Value,
        expand: Option<&Expand>,
        suppress: bool,
    ) -> SchemaResult<BTreeMap<String, Value>> {
        let raw = value
            .as_map()
            .ok_or_else(|| SchemaError::invalid_type(&self.name, value.type_name()))?;
        let mut out = BTreeMap::new();
        for (name, property) in &self.properties {
            let child = expand.and_then(|e| e.child(name));
            let item = raw.get(name).unwrap_or(&Value::Null);
            out.insert(
                name.clone(),
                property.create(ns, item, child.as_ref(), suppress)?,
            );
        }
        Ok(out)
    }
}
