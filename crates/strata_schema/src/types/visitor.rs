//! Double dispatch over [`Use`] variants.

use super::Use;
use crate::error::SchemaResult;
use crate::namespace::Namespace;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use strata_codec::{date_to_datetime, Value};

/// A visitor with one method per [`Use`] variant.
///
/// Adding a variant to `Use` breaks every visitor at compile time, which is
/// how new types are kept total across the crate.
pub trait UseVisitor<R> {
    /// `boolean`
    fn visit_boolean(&mut self) -> R;
    /// `integer`
    fn visit_integer(&mut self) -> R;
    /// `number`
    fn visit_number(&mut self) -> R;
    /// `string`
    fn visit_string(&mut self) -> R;
    /// `binary`
    fn visit_binary(&mut self) -> R;
    /// `date`
    fn visit_date(&mut self) -> R;
    /// `datetime`
    fn visit_date_time(&mut self) -> R;
    /// `secret`
    fn visit_secret(&mut self) -> R;
    /// `any`
    fn visit_any(&mut self) -> R;
    /// Enum schema reference.
    fn visit_enum(&mut self, schema: &str) -> R;
    /// Struct schema reference.
    fn visit_struct(&mut self, schema: &str) -> R;
    /// Object reference.
    fn visit_ref(&mut self, schema: &str) -> R;
    /// View reference.
    fn visit_view(&mut self, schema: &str) -> R;
    /// `array<item>`
    fn visit_array(&mut self, item: &Use) -> R;
    /// `set<item>`
    fn visit_set(&mut self, item: &Use) -> R;
    /// `map<item>`
    fn visit_map(&mut self, item: &Use) -> R;
}

/// Renders the descriptor syntax of a type.
#[derive(Debug, Default, Clone, Copy)]
pub struct TypeSyntax;

impl UseVisitor<String> for TypeSyntax {
    fn visit_boolean(&mut self) -> String {
        "boolean".into()
    }

    fn visit_integer(&mut self) -> String {
        "integer".into()
    }

    fn visit_number(&mut self) -> String {
        "number".into()
    }

    fn visit_string(&mut self) -> String {
        "string".into()
    }

    fn visit_binary(&mut self) -> String {
        "binary".into()
    }

    fn visit_date(&mut self) -> String {
        "date".into()
    }

    fn visit_date_time(&mut self) -> String {
        "datetime".into()
    }

    fn visit_secret(&mut self) -> String {
        "secret".into()
    }

    fn visit_any(&mut self) -> String {
        "any".into()
    }

    fn visit_enum(&mut self, schema: &str) -> String {
        schema.into()
    }

    fn visit_struct(&mut self, schema: &str) -> String {
        schema.into()
    }

    fn visit_ref(&mut self, schema: &str) -> String {
        schema.into()
    }

    fn visit_view(&mut self, schema: &str) -> String {
        schema.into()
    }

    fn visit_array(&mut self, item: &Use) -> String {
        format!("array<{}>", item.visit(self))
    }

    fn visit_set(&mut self, item: &Use) -> String {
        format!("set<{}>", item.visit(self))
    }

    fn visit_map(&mut self, item: &Use) -> String {
        format!("map<{}>", item.visit(self))
    }
}

/// Computes default values.
pub struct DefaultValue<'a> {
    ns: &'a Namespace,
}

impl<'a> DefaultValue<'a> {
    /// Creates a visitor resolving schemas through `ns`.
    pub fn new(ns: &'a Namespace) -> Self {
        Self { ns }
    }
}

impl UseVisitor<SchemaResult<Value>> for DefaultValue<'_> {
    fn visit_boolean(&mut self) -> SchemaResult<Value> {
        Ok(Value::Bool(false))
    }

    fn visit_integer(&mut self) -> SchemaResult<Value> {
        Ok(Value::Integer(0))
    }

    fn visit_number(&mut self) -> SchemaResult<Value> {
        Ok(Value::Number(0.0))
    }

    fn visit_string(&mut self) -> SchemaResult<Value> {
        Ok(Value::String(String::new()))
    }

    fn visit_binary(&mut self) -> SchemaResult<Value> {
        Ok(Value::Binary(Vec::new()))
    }

    fn visit_date(&mut self) -> SchemaResult<Value> {
        Ok(Value::Date(NaiveDate::default()))
    }

    fn visit_date_time(&mut self) -> SchemaResult<Value> {
        Ok(Value::DateTime(date_to_datetime(NaiveDate::default())))
    }

    fn visit_secret(&mut self) -> SchemaResult<Value> {
        Ok(Value::Null)
    }

    fn visit_any(&mut self) -> SchemaResult<Value> {
        Ok(Value::Null)
    }

    fn visit_enum(&mut self, schema: &str) -> SchemaResult<Value> {
        let schema = self.ns.require_enum(schema)?;
        Ok(schema
            .values()
            .first()
            .map_or(Value::Null, |v| Value::String(v.clone())))
    }

    fn visit_struct(&mut self, schema: &str) -> SchemaResult<Value> {
        let schema = self.ns.require_struct(schema)?;
        let mut out = BTreeMap::new();
        for (name, property) in schema.properties() {
            let value = match property.default() {
                Some(value) => value.clone(),
                None => property.typ().visit(self)?,
            };
            out.insert(name.clone(), value);
        }
        Ok(Value::Map(out))
    }

    fn visit_ref(&mut self, schema: &str) -> SchemaResult<Value> {
        self.ns.require_object(schema)?;
        Ok(Value::Null)
    }

    fn visit_view(&mut self, schema: &str) -> SchemaResult<Value> {
        self.ns.require_view(schema)?;
        Ok(Value::Null)
    }

    fn visit_array(&mut self, _item: &Use) -> SchemaResult<Value> {
        Ok(Value::Array(Vec::new()))
    }

    fn visit_set(&mut self, _item: &Use) -> SchemaResult<Value> {
        Ok(Value::Array(Vec::new()))
    }

    fn visit_map(&mut self, _item: &Use) -> SchemaResult<Value> {
        Ok(Value::Map(BTreeMap::new()))
    }
}
