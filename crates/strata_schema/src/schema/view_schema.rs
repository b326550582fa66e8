use super::member::Property;
use crate::error::{SchemaError, SchemaResult};
use crate::expression::{Context, Expression, Sort};
use crate::instance::{Instance, ID, KEY, SCHEMA};
use crate::name::{Expand, Name};
use crate::namespace::Namespace;
use std::collections::BTreeMap;
use strata_codec::{to_binary, Value};
use tracing::warn;

/// The source of a view.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewFrom {
    pub(crate) schema: String,
    pub(crate) expand: Expand,
}

impl ViewFrom {
    /// Source object schema.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Members of the source to expand before projecting.
    pub fn expand(&self) -> &Expand {
        &self.expand
    }
}

/// A derived, read-only projection of an object schema.
///
/// A view filters its source with `where`, then either maps each source
/// object to one record (keyed by the source id) or, when it groups or
/// aggregates, folds each group into one record keyed by the serialized
/// group values.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewSchema {
    pub(crate) name: String,
    pub(crate) slot: usize,
    pub(crate) version: Option<u64>,
    pub(crate) description: Option<String>,
    pub(crate) from: ViewFrom,
    pub(crate) filter: Option<Expression>,
    pub(crate) group: Vec<Name>,
    pub(crate) properties: BTreeMap<String, Property>,
    pub(crate) sort: Vec<Sort>,
    pub(crate) extensions: BTreeMap<String, Value>,
}

impl ViewSchema {
    /// Schema name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source schema and expand.
    pub fn from(&self) -> &ViewFrom {
        &self.from
    }

    /// Source filter.
    pub fn filter(&self) -> Option<&Expression> {
        self.filter.as_ref()
    }

    /// Group paths.
    pub fn group(&self) -> &[Name] {
        &self.group
    }

    /// Projected properties.
    pub fn properties(&self) -> &BTreeMap<String, Property> {
        &self.properties
    }

    /// Record ordering.
    pub fn sort(&self) -> &[Sort] {
        &self.sort
    }

    /// True if the view declares group paths.
    pub fn is_grouping(&self) -> bool {
        !self.group.is_empty()
    }

    /// True if any property uses an aggregate function.
    pub fn is_aggregating(&self) -> bool {
        self.properties
            .values()
            .any(|p| p.expression.as_ref().is_some_and(Expression::is_aggregate))
    }

    fn selector(name: &str, property: &Property) -> Expression {
        property
            .expression
            .clone()
            .unwrap_or_else(|| Expression::Path(Name::parse(name)))
    }

    /// Materializes view records from source instances.
    ///
    /// Sources whose filter fails to evaluate are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a property expression fails.
    pub fn evaluate(&self, ns: &Namespace, sources: &[Instance]) -> SchemaResult<Vec<Instance>> {
        let mut rows = Vec::with_capacity(sources.len());
        for source in sources {
            let value = Value::Map(source.clone().into_inner());
            let keep = match &self.filter {
                None => true,
                Some(filter) => match filter.matches(&Context::new(&value)) {
                    Ok(keep) => keep,
                    Err(err) => {
                        warn!(view = %self.name, id = source.id(), error = %err, "skipping source row");
                        false
                    }
                },
            };
            if keep {
                rows.push(value);
            }
        }

        let mut records = if self.is_grouping() || self.is_aggregating() {
            self.aggregate(ns, &rows)?
        } else {
            rows.iter()
                .map(|row| self.project(ns, row))
                .collect::<SchemaResult<Vec<_>>>()?
        };
        records.sort_by(|a, b| Sort::compare_all(&self.sort, a, b));
        records
            .into_iter()
            .map(Instance::try_from)
            .collect()
    }

    fn project(&self, ns: &Namespace, row: &Value) -> SchemaResult<Value> {
        let ctx = Context::new(row);
        let mut out = BTreeMap::new();
        for (name, property) in &self.properties {
            let value = Self::selector(name, property).evaluate(&ctx)?;
            out.insert(name.clone(), property.create(ns, &value, None, true)?);
        }
        out.insert(KEY.to_string(), row.get(ID).cloned().unwrap_or_default());
        out.insert(SCHEMA.to_string(), Value::String(self.name.clone()));
        Ok(Value::Map(out))
    }

    fn aggregate(&self, ns: &Namespace, rows: &[Value]) -> SchemaResult<Vec<Value>> {
        let mut groups: BTreeMap<Vec<u8>, Vec<Context<'_>>> = BTreeMap::new();
        for row in rows {
            let ctx = Context::new(row);
            let key: Vec<Value> = self.group.iter().map(|g| ctx.lookup(g)).collect();
            groups
                .entry(to_binary(&Value::Array(key))?)
                .or_default()
                .push(ctx);
        }
        if groups.is_empty() && !self.is_grouping() {
            groups.insert(to_binary(&Value::Array(Vec::new()))?, Vec::new());
        }
        let mut out = Vec::with_capacity(groups.len());
        for (key, contexts) in groups {
            let mut record = BTreeMap::new();
            for (name, property) in &self.properties {
                let value = Self::selector(name, property).evaluate_aggregate(&contexts)?;
                record.insert(name.clone(), property.create(ns, &value, None, true)?);
            }
            record.insert(KEY.to_string(), Value::Binary(key));
            record.insert(SCHEMA.to_string(), Value::String(self.name.clone()));
            out.push(Value::Map(record));
        }
        Ok(out)
    }

    /// Coerces a raw view record, keeping its key.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is not a map or a member fails to
    /// coerce (unless `suppress` is set).
    pub fn create(&self, ns: &Namespace, value: &Value, suppress: bool) -> SchemaResult<Instance> {
        let raw = value
            .as_map()
            .ok_or_else(|| SchemaError::invalid_type(&self.name, value.type_name()))?;
        let mut out = Instance::new();
        for (name, property) in &self.properties {
            let item = raw.get(name).unwrap_or(&Value::Null);
            out.insert(name.clone(), property.create(ns, item, None, suppress)?);
        }
        if let Some(key) = raw.get(KEY) {
            out.insert(KEY.to_string(), key.clone());
        }
        out.set_schema(&self.name);
        Ok(out)
    }
}
