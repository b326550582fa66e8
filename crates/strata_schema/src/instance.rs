//! Typed object data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use strata_codec::Value;

/// Object identity.
pub const ID: &str = "id";
/// Concrete schema name of an object.
pub const SCHEMA: &str = "schema";
/// Monotonic object version, starting at 1.
pub const VERSION: &str = "version";
/// Creation instant.
pub const CREATED: &str = "created";
/// Last update instant.
pub const UPDATED: &str = "updated";
/// Content hash of the non-metadata properties.
pub const HASH: &str = "hash";
/// Identity key of a view record.
pub const KEY: &str = "__key";

/// Member names that schemas may not declare.
pub const RESERVED: [&str; 7] = [ID, SCHEMA, VERSION, CREATED, UPDATED, HASH, KEY];

/// True if `name` is reserved for metadata.
pub fn is_reserved(name: &str) -> bool {
    RESERVED.contains(&name)
}

/// The typed data of an object, struct or view record.
///
/// Instances are produced by a schema's `create`, which coerces every
/// member to its declared type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Instance(BTreeMap<String, Value>);

impl Instance {
    /// An empty instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an already coerced map.
    pub fn from_map(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }

    /// A reference-shaped instance carrying only an id.
    pub fn reference(id: impl Into<String>) -> Self {
        Self(BTreeMap::from([(ID.to_string(), Value::String(id.into()))]))
    }

    /// Unwraps the member map.
    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }

    /// Converts to a map value.
    pub fn into_value(self) -> Value {
        Value::Map(self.0)
    }

    /// Object id.
    pub fn id(&self) -> Option<&str> {
        self.0.get(ID).and_then(Value::as_str)
    }

    /// Concrete schema name.
    pub fn schema(&self) -> Option<&str> {
        self.0.get(SCHEMA).and_then(Value::as_str)
    }

    /// Object version.
    pub fn version(&self) -> Option<i64> {
        self.0.get(VERSION).and_then(Value::as_integer)
    }

    /// Creation instant.
    pub fn created(&self) -> Option<DateTime<Utc>> {
        match self.0.get(CREATED) {
            Some(Value::DateTime(dt)) => Some(*dt),
            _ => None,
        }
    }

    /// Last update instant.
    pub fn updated(&self) -> Option<DateTime<Utc>> {
        match self.0.get(UPDATED) {
            Some(Value::DateTime(dt)) => Some(*dt),
            _ => None,
        }
    }

    /// Content hash.
    pub fn hash(&self) -> Option<&str> {
        self.0.get(HASH).and_then(Value::as_str)
    }

    /// View record key.
    pub fn key(&self) -> Option<&Value> {
        self.0.get(KEY)
    }

    /// Sets a member, returning `self` for chaining.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Sets the object id.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.0.insert(ID.to_string(), Value::String(id.into()));
    }

    /// Sets the concrete schema name.
    pub fn set_schema(&mut self, schema: impl Into<String>) {
        self.0.insert(SCHEMA.to_string(), Value::String(schema.into()));
    }

    /// Sets the object version.
    pub fn set_version(&mut self, version: i64) {
        self.0.insert(VERSION.to_string(), Value::Integer(version));
    }
}

impl Deref for Instance {
    type Target = BTreeMap<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Instance {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Instance> for Value {
    fn from(instance: Instance) -> Self {
        instance.into_value()
    }
}

impl From<BTreeMap<String, Value>> for Instance {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Instance {
    type Error = crate::error::SchemaError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Map(map) => Ok(Self(map)),
            other => Err(crate::error::SchemaError::invalid_type(
                "object",
                other.type_name(),
            )),
        }
    }
}
