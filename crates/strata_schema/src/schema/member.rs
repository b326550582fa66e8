//! Schema members: properties, transients, links, indexes, permissions.

use crate::consistency::Consistency;
use crate::error::SchemaResult;
use crate::expression::{Expression, Sort};
use crate::name::{Expand, Name};
use crate::namespace::Namespace;
use crate::types::Use;
use strata_codec::Value;
use tracing::debug;

/// A persisted, typed member.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub(crate) name: String,
    pub(crate) typ: Use,
    pub(crate) description: Option<String>,
    pub(crate) required: bool,
    pub(crate) immutable: bool,
    pub(crate) expression: Option<Expression>,
    pub(crate) visibility: Option<Expression>,
    pub(crate) default: Option<Value>,
}

impl Property {
    /// Creates a plain property of type `typ`.
    pub fn new(name: impl Into<String>, typ: Use) -> Self {
        Self {
            name: name.into(),
            typ,
            description: None,
            required: false,
            immutable: false,
            expression: None,
            visibility: None,
            default: None,
        }
    }

    /// Member name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type.
    pub fn typ(&self) -> &Use {
        &self.typ
    }

    /// Free-form description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Must be non-null on write.
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// May not change after creation.
    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    /// Expression computing this property on write.
    pub fn expression(&self) -> Option<&Expression> {
        self.expression.as_ref()
    }

    /// Expression deciding whether a reader may see this property.
    pub fn visibility(&self) -> Option<&Expression> {
        self.visibility.as_ref()
    }

    /// Value used when the raw value is null.
    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Coerces a raw member value.
    ///
    /// With `suppress`, a coercion failure is logged and yields `Null`.
    ///
    /// # Errors
    ///
    /// Returns the coercion error when `suppress` is false.
    pub fn create(
        &self,
        ns: &Namespace,
        value: &Value,
        expand: Option<&Expand>,
        suppress: bool,
    ) -> SchemaResult<Value> {
        let value = match (value, &self.default) {
            (Value::Null, Some(default)) => default,
            _ => value,
        };
        match self.typ.create(ns, value, expand, suppress) {
            Ok(created) => Ok(created),
            Err(err) if suppress => {
                debug!(property = %self.name, error = %err, "suppressed coercion failure");
                Ok(Value::Null)
            }
            Err(err) => Err(err),
        }
    }
}

/// A computed member evaluated at read time and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Transient {
    pub(crate) name: String,
    pub(crate) typ: Option<Use>,
    pub(crate) expression: Expression,
    pub(crate) expand: Expand,
    pub(crate) description: Option<String>,
}

impl Transient {
    /// Member name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared result type, if any.
    pub fn typ(&self) -> Option<&Use> {
        self.typ.as_ref()
    }

    /// The computing expression.
    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    /// Members that must be expanded before evaluating.
    pub fn expand(&self) -> &Expand {
        &self.expand
    }

    /// Free-form description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// A virtual relationship resolved by querying another schema with an
/// expression over `this`.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub(crate) name: String,
    pub(crate) schema: String,
    pub(crate) expression: Expression,
    pub(crate) sort: Vec<Sort>,
    pub(crate) single: bool,
    pub(crate) description: Option<String>,
}

impl Link {
    /// Member name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target schema.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Query over the target, with `this` bound to the owner.
    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    /// Result ordering.
    pub fn sort(&self) -> &[Sort] {
        &self.sort
    }

    /// Yields one value (or null) rather than a page.
    pub fn is_single(&self) -> bool {
        self.single
    }

    /// Free-form description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// A declared secondary index.
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    pub(crate) name: String,
    pub(crate) partition: Vec<Name>,
    pub(crate) sort: Vec<Sort>,
    pub(crate) unique: bool,
    pub(crate) consistency: Option<Consistency>,
}

impl Index {
    /// Index name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Partition key paths.
    pub fn partition(&self) -> &[Name] {
        &self.partition
    }

    /// Sort key paths.
    pub fn sort(&self) -> &[Sort] {
        &self.sort
    }

    /// At most one object per key.
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Requested maintenance consistency.
    pub fn consistency(&self) -> Option<Consistency> {
        self.consistency
    }
}

/// An access rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Permission {
    pub(crate) expression: Option<Expression>,
    pub(crate) anonymous: bool,
    pub(crate) expand: Expand,
}

impl Permission {
    /// Rule expression; `None` allows everything.
    pub fn expression(&self) -> Option<&Expression> {
        self.expression.as_ref()
    }

    /// Applies to unauthenticated callers.
    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }

    /// Members to expand before evaluating the rule.
    pub fn expand(&self) -> &Expand {
        &self.expand
    }
}

/// History retention settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct History {
    pub(crate) enabled: bool,
    pub(crate) consistency: Option<Consistency>,
}

impl History {
    /// Whether past versions are retained.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Requested history consistency.
    pub fn consistency(&self) -> Option<Consistency> {
        self.consistency
    }
}
