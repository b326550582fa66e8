//! Namespaces: immutable, resolved sets of schemas.
//!
//! A namespace is built from a map of descriptors. Resolution is a
//! memoized depth-first walk: building a schema first registers it as
//! under construction, so a reference back to it (directly or through a
//! cycle) resolves to its name instead of recursing. Extension is
//! stricter: a parent must be fully built before its child, which makes
//! cyclic extension a validation error.

use crate::descriptor::{
    EnumDescriptor, NamespaceDescriptor, ObjectDescriptor, PropertyDescriptor, SchemaDescriptor,
    StructDescriptor, ViewDescriptor,
};
use crate::error::{SchemaError, SchemaResult};
use crate::instance::is_reserved;
use crate::schema::{
    EnumSchema, History, Index, Link, ObjectSchema, Permission, Property, Schema, SchemaKind,
    StructSchema, Transient, ViewFrom, ViewSchema,
};
use crate::types::{TypeRef, Use};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;
use tracing::debug;

/// Names that collide with builtin type syntax.
const RESERVED_SCHEMA_NAMES: [&str; 12] = [
    "boolean", "integer", "number", "string", "binary", "date", "datetime", "secret", "any",
    "array", "set", "map",
];

/// An immutable set of resolved schemas.
///
/// Lookups return the same `Arc<Schema>` every time, so schema identity
/// can be compared with [`Arc::ptr_eq`].
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    schemas: BTreeMap<String, Arc<Schema>>,
}

impl Namespace {
    /// Starts building a namespace.
    pub fn builder() -> NamespaceBuilder {
        NamespaceBuilder::default()
    }

    /// Builds a namespace from a YAML descriptor document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not parse or does not resolve.
    pub fn from_yaml(text: &str) -> SchemaResult<Self> {
        let descriptors: NamespaceDescriptor =
            serde_yaml::from_str(text).map_err(|e| SchemaError::descriptor(e.to_string()))?;
        Self::builder().schemas(descriptors).build()
    }

    /// Builds a namespace from a JSON descriptor document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not parse or does not resolve.
    pub fn from_json(text: &str) -> SchemaResult<Self> {
        let descriptors: NamespaceDescriptor =
            serde_json::from_str(text).map_err(|e| SchemaError::descriptor(e.to_string()))?;
        Self::builder().schemas(descriptors).build()
    }

    /// Recovers the descriptors of every schema.
    pub fn descriptors(&self) -> NamespaceDescriptor {
        self.schemas
            .iter()
            .map(|(name, schema)| (name.clone(), schema.descriptor()))
            .collect()
    }

    /// Writes every descriptor as a YAML document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> SchemaResult<String> {
        serde_yaml::to_string(&self.descriptors()).map_err(|e| SchemaError::descriptor(e.to_string()))
    }

    /// Number of schemas.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// True if there are no schemas.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Iterates schemas in name order.
    pub fn schemas(&self) -> impl Iterator<Item = &Arc<Schema>> {
        self.schemas.values()
    }

    /// Looks up a schema.
    pub fn get(&self, name: &str) -> Option<&Arc<Schema>> {
        self.schemas.get(name)
    }

    /// Looks up a schema.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::MissingType`] if there is none.
    pub fn require(&self, name: &str) -> SchemaResult<&Arc<Schema>> {
        self.get(name).ok_or_else(|| SchemaError::missing_type(name))
    }

    fn require_kind<'a, T>(
        &'a self,
        name: &str,
        kind: SchemaKind,
        pick: fn(&'a Schema) -> Option<&'a T>,
    ) -> SchemaResult<&'a T> {
        let schema = self.require(name)?;
        pick(schema).ok_or_else(|| SchemaError::invalid_type(kind.to_string(), schema.kind().to_string()))
    }

    /// Looks up an object schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema is missing or is not an object.
    pub fn require_object(&self, name: &str) -> SchemaResult<&ObjectSchema> {
        self.require_kind(name, SchemaKind::Object, Schema::as_object)
    }

    /// Looks up a struct schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema is missing or is not a struct.
    pub fn require_struct(&self, name: &str) -> SchemaResult<&StructSchema> {
        self.require_kind(name, SchemaKind::Struct, Schema::as_struct)
    }

    /// Looks up an enum schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema is missing or is not an enum.
    pub fn require_enum(&self, name: &str) -> SchemaResult<&EnumSchema> {
        self.require_kind(name, SchemaKind::Enum, Schema::as_enum)
    }

    /// Looks up a view schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema is missing or is not a view.
    pub fn require_view(&self, name: &str) -> SchemaResult<&ViewSchema> {
        self.require_kind(name, SchemaKind::View, Schema::as_view)
    }

    /// The parent chain of an object schema, nearest parent first.
    ///
    /// # Errors
    ///
    /// Returns an error if a schema in the chain is missing.
    pub fn ancestors(&self, name: &str) -> SchemaResult<Vec<&ObjectSchema>> {
        let mut out = Vec::new();
        let mut current = self.require_object(name)?;
        while let Some(parent) = current.extend() {
            current = self.require_object(parent)?;
            out.push(current);
        }
        Ok(out)
    }

    /// True if `name` is `ancestor` or extends it, directly or not.
    pub fn is_subtype(&self, name: &str, ancestor: &str) -> bool {
        name == ancestor
            || self
                .ancestors(name)
                .is_ok_and(|chain| chain.iter().any(|s| s.name() == ancestor))
    }
}

impl PartialEq for Namespace {
    fn eq(&self, other: &Self) -> bool {
        self.schemas.len() == other.schemas.len()
            && self
                .schemas
                .iter()
                .zip(&other.schemas)
                .all(|((a, x), (b, y))| a == b && x == y)
    }
}

/// Builder for [`Namespace`].
#[derive(Default)]
pub struct NamespaceBuilder {
    schemas: NamespaceDescriptor,
    external: Option<Arc<Namespace>>,
    rename: Option<Box<dyn Fn(&str) -> String + Send + Sync>>,
}

impl fmt::Debug for NamespaceBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamespaceBuilder")
            .field("schemas", &self.schemas.keys().collect::<Vec<_>>())
            .field("external", &self.external.as_ref().map(|ns| ns.len()))
            .field("rename", &self.rename.is_some())
            .finish()
    }
}

impl NamespaceBuilder {
    /// Adds one descriptor.
    #[must_use]
    pub fn schema(mut self, name: impl Into<String>, descriptor: SchemaDescriptor) -> Self {
        self.schemas.insert(name.into(), descriptor);
        self
    }

    /// Adds descriptors.
    #[must_use]
    pub fn schemas(mut self, schemas: NamespaceDescriptor) -> Self {
        self.schemas.extend(schemas);
        self
    }

    /// Resolves names missing from the descriptors against `external`.
    #[must_use]
    pub fn external(mut self, external: Arc<Namespace>) -> Self {
        self.external = Some(external);
        self
    }

    /// Renames every schema (and every reference to it).
    #[must_use]
    pub fn rename(mut self, rename: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.rename = Some(Box::new(rename));
        self
    }

    /// Resolves all descriptors.
    ///
    /// # Errors
    ///
    /// Returns a validation error on renaming collisions, reserved names,
    /// cyclic extension or invalid members, and
    /// [`SchemaError::MissingType`] for unresolvable references.
    pub fn build(self) -> SchemaResult<Namespace> {
        let mut names = BTreeMap::new();
        let mut seen: BTreeMap<String, &str> = BTreeMap::new();
        for input in self.schemas.keys() {
            let output = match &self.rename {
                Some(rename) => rename(input),
                None => input.clone(),
            };
            if let Some(previous) = seen.insert(output.clone(), input) {
                return Err(SchemaError::validation(format!(
                    "schemas {previous} and {input} both rename to {output}"
                )));
            }
            names.insert(input.clone(), output);
        }
        for output in names.values() {
            if RESERVED_SCHEMA_NAMES.contains(&output.as_str())
                || is_reserved(output)
                || output.is_empty()
            {
                return Err(SchemaError::ReservedName {
                    name: output.clone(),
                });
            }
        }

        let mut resolver = Resolver {
            input: &self.schemas,
            names: &names,
            external: self.external.as_deref(),
            constructing: BTreeSet::new(),
            out: BTreeMap::new(),
        };
        for input in self.schemas.keys() {
            resolver.build(input)?;
        }
        debug!(schemas = resolver.out.len(), "namespace built");
        Ok(Namespace {
            schemas: resolver.out,
        })
    }
}

struct Resolver<'a> {
    input: &'a NamespaceDescriptor,
    names: &'a BTreeMap<String, String>,
    external: Option<&'a Namespace>,
    constructing: BTreeSet<String>,
    out: BTreeMap<String, Arc<Schema>>,
}

fn descriptor_kind(descriptor: &SchemaDescriptor) -> SchemaKind {
    match descriptor {
        SchemaDescriptor::Enum(_) => SchemaKind::Enum,
        SchemaDescriptor::Struct(_) => SchemaKind::Struct,
        SchemaDescriptor::Object(_) => SchemaKind::Object,
        SchemaDescriptor::View(_) => SchemaKind::View,
    }
}

fn use_of(kind: SchemaKind, name: String) -> Use {
    match kind {
        SchemaKind::Enum => Use::Enum(name),
        SchemaKind::Struct => Use::Struct(name),
        SchemaKind::Object => Use::Ref(name),
        SchemaKind::View => Use::View(name),
    }
}

fn check_member(schema: &str, member: &str) -> SchemaResult<()> {
    if is_reserved(member) {
        Err(SchemaError::ReservedName {
            name: format!("{schema}.{member}"),
        })
    } else {
        Ok(())
    }
}

impl Resolver<'_> {
    /// Resolves a referenced schema name to its output name and kind,
    /// building it if needed. Schemas under construction resolve
    /// immediately.
    fn reference(&mut self, input: &str) -> SchemaResult<(String, SchemaKind)> {
        if let (Some(descriptor), Some(output)) = (self.input.get(input), self.names.get(input)) {
            if !self.out.contains_key(output) && !self.constructing.contains(output) {
                self.build(input)?;
            }
            return Ok((output.clone(), descriptor_kind(descriptor)));
        }
        let external = self
            .external
            .and_then(|ns| ns.get(input))
            .ok_or_else(|| SchemaError::missing_type(input))?;
        self.out
            .entry(input.to_string())
            .or_insert_with(|| Arc::clone(external));
        Ok((input.to_string(), external.kind()))
    }

    /// Resolves a completely built object schema, for extension.
    fn parent(&mut self, child: &str, input: &str) -> SchemaResult<Arc<Schema>> {
        let (output, kind) = self.reference(input)?;
        if kind != SchemaKind::Object {
            return Err(SchemaError::validation(format!(
                "{child} extends {input}, which is a {kind}"
            )));
        }
        self.out.get(&output).cloned().ok_or_else(|| {
            SchemaError::validation(format!("cyclic extension between {child} and {input}"))
        })
    }

    fn resolve_type(&mut self, typ: &TypeRef) -> SchemaResult<Use> {
        Ok(match typ {
            TypeRef::Named(name) => match Use::builtin(name) {
                Some(builtin) => builtin,
                None => {
                    let (output, kind) = self.reference(name)?;
                    use_of(kind, output)
                }
            },
            TypeRef::Array(item) => Use::array(self.resolve_type(item)?),
            TypeRef::Set(item) => Use::set(self.resolve_type(item)?),
            TypeRef::Map(item) => Use::map(self.resolve_type(item)?),
        })
    }

    fn slot(&self, input: &str) -> usize {
        self.input
            .range::<str, _>((Bound::Unbounded, Bound::Excluded(input)))
            .count()
    }

    fn build(&mut self, input: &str) -> SchemaResult<()> {
        let output = self
            .names
            .get(input)
            .cloned()
            .ok_or_else(|| SchemaError::missing_type(input))?;
        if self.out.contains_key(&output) {
            return Ok(());
        }
        let descriptor = self
            .input
            .get(input)
            .ok_or_else(|| SchemaError::missing_type(input))?;
        self.constructing.insert(output.clone());
        let slot = self.slot(input);
        let schema = match descriptor {
            SchemaDescriptor::Enum(d) => Schema::Enum(Self::build_enum(output.clone(), slot, d)),
            SchemaDescriptor::Struct(d) => {
                Schema::Struct(self.build_struct(output.clone(), slot, d)?)
            }
            SchemaDescriptor::Object(d) => {
                Schema::Object(self.build_object(output.clone(), slot, d)?)
            }
            SchemaDescriptor::View(d) => Schema::View(self.build_view(output.clone(), slot, d)?),
        };
        self.constructing.remove(&output);
        self.out.insert(output, Arc::new(schema));
        Ok(())
    }

    fn build_enum(name: String, slot: usize, d: &EnumDescriptor) -> EnumSchema {
        EnumSchema {
            name,
            slot,
            version: d.version,
            description: d.description.clone(),
            values: d.values.clone(),
            extensions: d.extensions.clone(),
        }
    }

    fn build_property(
        &mut self,
        schema: &str,
        name: &str,
        d: &PropertyDescriptor,
    ) -> SchemaResult<Property> {
        check_member(schema, name)?;
        Ok(Property {
            name: name.to_string(),
            typ: self.resolve_type(&d.typ)?,
            description: d.description.clone(),
            required: d.required,
            immutable: d.immutable,
            expression: d.expression.clone(),
            visibility: d.visibility.clone(),
            default: d.default.clone(),
        })
    }

    fn build_properties(
        &mut self,
        schema: &str,
        properties: &BTreeMap<String, PropertyDescriptor>,
    ) -> SchemaResult<BTreeMap<String, Property>> {
        properties
            .iter()
            .map(|(name, d)| Ok((name.clone(), self.build_property(schema, name, d)?)))
            .collect()
    }

    fn build_struct(
        &mut self,
        name: String,
        slot: usize,
        d: &StructDescriptor,
    ) -> SchemaResult<StructSchema> {
        let schema = StructSchema {
            properties: self.build_properties(&name, &d.properties)?,
            name,
            slot,
            version: d.version,
            description: d.description.clone(),
            extensions: d.extensions.clone(),
        };
        schema.validate()?;
        Ok(schema)
    }

    fn build_object(
        &mut self,
        name: String,
        slot: usize,
        d: &ObjectDescriptor,
    ) -> SchemaResult<ObjectSchema> {
        let parent = match &d.extend {
            Some(extend) => Some(self.parent(&name, extend)?),
            None => None,
        };
        let parent = parent.as_deref().and_then(Schema::as_object);

        let declared_properties = self.build_properties(&name, &d.properties)?;
        let mut declared_transients = BTreeMap::new();
        for (member, t) in &d.transients {
            check_member(&name, member)?;
            let typ = match &t.typ {
                Some(typ) => Some(self.resolve_type(typ)?),
                None => None,
            };
            declared_transients.insert(
                member.clone(),
                Transient {
                    name: member.clone(),
                    typ,
                    expression: t.expression.clone(),
                    expand: t.expand.clone(),
                    description: t.description.clone(),
                },
            );
        }
        let mut declared_links = BTreeMap::new();
        for (member, l) in &d.links {
            check_member(&name, member)?;
            let (target, kind) = self.reference(&l.schema)?;
            if !matches!(kind, SchemaKind::Object | SchemaKind::View) {
                return Err(SchemaError::validation(format!(
                    "link {name}.{member} targets {target}, which is a {kind}"
                )));
            }
            declared_links.insert(
                member.clone(),
                Link {
                    name: member.clone(),
                    schema: target,
                    expression: l.expression.clone(),
                    sort: l.sort.clone(),
                    single: l.single,
                    description: l.description.clone(),
                },
            );
        }
        let declared_indexes: BTreeMap<String, Index> = d
            .indexes
            .iter()
            .map(|(member, i)| {
                (
                    member.clone(),
                    Index {
                        name: member.clone(),
                        partition: i.partition.clone(),
                        sort: i.sort.clone(),
                        unique: i.unique,
                        consistency: i.consistency,
                    },
                )
            })
            .collect();
        let declared_permissions: BTreeMap<String, Permission> = d
            .permissions
            .iter()
            .map(|(op, p)| {
                (
                    op.clone(),
                    Permission {
                        expression: p.expression.clone(),
                        anonymous: p.anonymous,
                        expand: p.expand.clone(),
                    },
                )
            })
            .collect();

        fn merge<T: Clone>(
            inherited: Option<&BTreeMap<String, T>>,
            declared: &BTreeMap<String, T>,
        ) -> BTreeMap<String, T> {
            let mut out = inherited.cloned().unwrap_or_default();
            out.extend(declared.iter().map(|(k, v)| (k.clone(), v.clone())));
            out
        }

        let schema = ObjectSchema {
            properties: merge(parent.map(|p| &p.properties), &declared_properties),
            transients: merge(parent.map(|p| &p.transients), &declared_transients),
            links: merge(parent.map(|p| &p.links), &declared_links),
            indexes: merge(parent.map(|p| &p.indexes), &declared_indexes),
            permissions: merge(parent.map(|p| &p.permissions), &declared_permissions),
            history: d
                .history
                .map(|h| History {
                    enabled: h.enabled,
                    consistency: h.consistency,
                })
                .or_else(|| parent.and_then(|p| p.history)),
            name,
            slot,
            version: d.version,
            description: d.description.clone(),
            extend: d
                .extend
                .as_ref()
                .map(|e| self.names.get(e).cloned().unwrap_or_else(|| e.clone())),
            concrete: d.concrete,
            declared_properties,
            declared_transients,
            declared_links,
            declared_indexes,
            declared_permissions,
            extensions: d.extensions.clone(),
        };

        let mut members = BTreeSet::new();
        for member in schema
            .properties
            .keys()
            .chain(schema.transients.keys())
            .chain(schema.links.keys())
        {
            if !members.insert(member) {
                return Err(SchemaError::validation(format!(
                    "{} declares {member} more than once",
                    schema.name
                )));
            }
        }
        Ok(schema)
    }

    fn build_view(
        &mut self,
        name: String,
        slot: usize,
        d: &ViewDescriptor,
    ) -> SchemaResult<ViewSchema> {
        let (from, kind) = self.reference(&d.from.schema)?;
        if kind != SchemaKind::Object {
            return Err(SchemaError::validation(format!(
                "view {name} selects from {from}, which is a {kind}"
            )));
        }
        Ok(ViewSchema {
            properties: self.build_properties(&name, &d.properties)?,
            name,
            slot,
            version: d.version,
            description: d.description.clone(),
            from: ViewFrom {
                schema: from,
                expand: d.from.expand.clone(),
            },
            filter: d.filter.clone(),
            group: d.group.clone(),
            sort: d.sort.clone(),
            extensions: d.extensions.clone(),
        })
    }
}
