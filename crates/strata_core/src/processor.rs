//! The read pipeline.
//!
//! Every read goes through the same rounds:
//!
//! 1. read raw records from storage
//! 2. cast records stored under a subtype to their concrete schema,
//!    re-reading all of them in one transaction
//! 3. collect the references and links the expand set asks for
//! 4. fetch every distinct reference in one transaction while link
//!    queries run alongside
//! 5. expand the fetched references to their own sub-expand sets
//! 6. substitute the expansions back and evaluate requested transients
//!
//! Each level of expansion costs one batched read regardless of how many
//! objects or fields point at the same targets.

use futures::future::{try_join_all, BoxFuture, FutureExt};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use strata_codec::Value;
use strata_schema::{
    Consistency, Context, Expand, Expression, Instance, Link, Namespace, ObjectSchema, Sort, Use,
    ViewSchema, ID,
};
use strata_storage::{
    with_id_tiebreak, ListSource, Page, Pager, PagedSource, PagingToken, ReadResponse, RefKey,
    Storage,
};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::key::ExpandKey;

type Resolved = BTreeMap<ExpandKey<RefKey>, Instance>;

/// Walks `value` (typed `typ`) collecting references selected by `expand`.
fn collect_refs(
    ns: &Namespace,
    typ: &Use,
    value: &Value,
    expand: &Expand,
    out: &mut BTreeSet<ExpandKey<RefKey>>,
) -> CoreResult<()> {
    match (typ, value) {
        (_, Value::Null) => {}
        (Use::Ref(target), _) => {
            if let Some(id) = value.get(ID).and_then(Value::as_str) {
                out.insert(ExpandKey::new(RefKey::new(target.as_str(), id), expand.clone()));
            }
        }
        (Use::Array(item) | Use::Set(item), Value::Array(values)) => {
            for value in values {
                collect_refs(ns, item, value, expand, out)?;
            }
        }
        (Use::Map(item), Value::Map(values)) => {
            for value in values.values() {
                collect_refs(ns, item, value, expand, out)?;
            }
        }
        (Use::Struct(name), Value::Map(members)) => {
            for (member, property) in ns.require_struct(name)?.properties() {
                if let (Some(sub), Some(value)) = (expand.child(member), members.get(member)) {
                    collect_refs(ns, property.typ(), value, &sub, out)?;
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// Replaces the references selected by `expand` with their expansions.
/// References that did not resolve become `null`.
fn substitute(
    ns: &Namespace,
    typ: &Use,
    value: &mut Value,
    expand: &Expand,
    resolved: &Resolved,
) -> CoreResult<()> {
    match typ {
        Use::Ref(target) => {
            let id = value.get(ID).and_then(Value::as_str).map(str::to_string);
            if let Some(id) = id {
                let key = ExpandKey::new(RefKey::new(target.as_str(), id), expand.clone());
                *value = resolved
                    .get(&key)
                    .map_or(Value::Null, |found| found.clone().into_value());
            }
        }
        Use::Array(item) | Use::Set(item) => {
            if let Value::Array(values) = value {
                for value in values {
                    substitute(ns, item, value, expand, resolved)?;
                }
            }
        }
        Use::Map(item) => {
            if let Value::Map(values) = value {
                for value in values.values_mut() {
                    substitute(ns, item, value, expand, resolved)?;
                }
            }
        }
        Use::Struct(name) => {
            if let Value::Map(members) = value {
                for (member, property) in ns.require_struct(name)?.properties() {
                    if let (Some(sub), Some(value)) = (expand.child(member), members.get_mut(member))
                    {
                        substitute(ns, property.typ(), value, &sub, resolved)?;
                    }
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// Reads, casts and expands objects.
///
/// Cheap to clone; clones share the namespace and storage.
#[derive(Clone)]
pub struct ReadProcessor {
    namespace: Arc<Namespace>,
    storage: Arc<dyn Storage>,
    consistency: Consistency,
    link_count: usize,
    scan_count: usize,
}

impl std::fmt::Debug for ReadProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadProcessor")
            .field("schemas", &self.namespace.len())
            .field("consistency", &self.consistency)
            .field("link_count", &self.link_count)
            .finish()
    }
}

impl ReadProcessor {
    /// Creates a processor reading from `storage`.
    pub fn new(namespace: Arc<Namespace>, storage: Arc<dyn Storage>, config: &Config) -> Self {
        Self {
            namespace,
            storage,
            consistency: config.read_consistency,
            link_count: config.link_count,
            scan_count: config.max_count.max(1),
        }
    }

    /// The namespace objects are read against.
    pub fn namespace(&self) -> &Arc<Namespace> {
        &self.namespace
    }

    /// Reads the latest version of an object, or `None` if it does not
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema is unknown or storage fails.
    pub async fn read_object(
        &self,
        schema: &str,
        id: &str,
        expand: &Expand,
    ) -> CoreResult<Option<Instance>> {
        self.namespace.require_object(schema)?;
        let raw = self
            .storage
            .read_object(self.consistency, schema, id, expand)
            .await?;
        self.finish_one(schema, raw, None, expand).await
    }

    /// Reads one version of an object, or `None` if it is not retained.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema is unknown or storage fails.
    pub async fn read_object_version(
        &self,
        schema: &str,
        id: &str,
        version: i64,
        expand: &Expand,
    ) -> CoreResult<Option<Instance>> {
        self.namespace.require_object(schema)?;
        let raw = self
            .storage
            .read_object_version(self.consistency, schema, id, version, expand)
            .await?;
        self.finish_one(schema, raw, Some(version), expand).await
    }

    async fn finish_one(
        &self,
        schema: &str,
        raw: Option<Instance>,
        version: Option<i64>,
        expand: &Expand,
    ) -> CoreResult<Option<Instance>> {
        let Some(raw) = raw else {
            return Ok(None);
        };
        let cast = self
            .cast_all(vec![(schema.to_string(), raw)], version)
            .await?;
        Ok(self.expand(schema, cast, expand).await?.into_iter().next())
    }

    /// Queries objects (or view records) of `schema` matching `expression`.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema is unknown, the paging token is not
    /// from this query, or storage fails. Items whose filter fails to
    /// evaluate are logged and left out.
    pub async fn query(
        &self,
        schema: &str,
        expression: &Expression,
        sort: &[Sort],
        count: usize,
        paging: Option<PagingToken>,
        expand: &Expand,
    ) -> CoreResult<Page<Instance>> {
        match self.namespace.require(schema)?.as_view() {
            Some(view) => self.query_view(view, expression, sort, count, paging).await,
            None => {
                self.query_objects(schema, expression, sort, count, paging, expand)
                    .await
            }
        }
    }

    async fn query_objects(
        &self,
        schema: &str,
        expression: &Expression,
        sort: &[Sort],
        count: usize,
        paging: Option<PagingToken>,
        expand: &Expand,
    ) -> CoreResult<Page<Instance>> {
        self.namespace.require_object(schema)?;
        let sort = with_id_tiebreak(sort);
        let sources = self
            .storage
            .query(self.consistency, schema, expression, &sort, expand)
            .await?;
        let (items, paging) = Pager::sorted(&sort, sources, paging)
            .page(count)
            .await?
            .into_parts();
        let items = Self::filter(schema, expression, items);
        let items = self.cast(schema, items).await?;
        let items = self.expand(schema, items, expand).await?;
        Ok(Page::new(items, paging))
    }

    /// Materializes a view from its source objects, then filters, sorts
    /// and pages the records.
    async fn query_view(
        &self,
        view: &ViewSchema,
        expression: &Expression,
        sort: &[Sort],
        count: usize,
        paging: Option<PagingToken>,
    ) -> CoreResult<Page<Instance>> {
        let from = view.from();
        let everything = Expression::constant(true);
        let mut sources = Vec::new();
        let mut next = None;
        loop {
            let page = self
                .query_objects(
                    from.schema(),
                    &everything,
                    &[],
                    self.scan_count,
                    next,
                    from.expand(),
                )
                .await?;
            let (items, token) = page.into_parts();
            sources.extend(items);
            match token {
                Some(token) => next = Some(token),
                None => break,
            }
        }
        debug!(view = view.name(), sources = sources.len(), "materializing view");

        let records = view.evaluate(&self.namespace, &sources)?;
        let mut records = Self::filter(view.name(), expression, records);
        records.sort_by(|a, b| Sort::compare_all_maps(sort, a, b));
        let source: Box<dyn PagedSource> = Box::new(ListSource::new(records));
        let page = Pager::new(|_: &Instance, _: &Instance| Ordering::Equal, vec![source], paging)
            .page(count)
            .await?;
        Ok(page)
    }

    /// Evaluates `link` for `owner`: binds `this` and queries the target.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn query_link(
        &self,
        owner: &Instance,
        link: &Link,
        count: usize,
        paging: Option<PagingToken>,
        expand: &Expand,
    ) -> CoreResult<Page<Instance>> {
        let this = owner.clone().into_value();
        let expression = link.expression().bind_this(&this);
        self.query(link.schema(), &expression, link.sort(), count, paging, expand)
            .await
    }

    fn filter(schema: &str, expression: &Expression, items: Vec<Instance>) -> Vec<Instance> {
        items
            .into_iter()
            .filter(|item| {
                let value = item.clone().into_value();
                match expression.matches(&Context::new(&value)) {
                    Ok(keep) => keep,
                    Err(err) => {
                        warn!(schema, id = item.id(), error = %err, "excluding item whose filter failed");
                        false
                    }
                }
            })
            .collect()
    }

    /// Converts raw records into instances of their concrete schema.
    ///
    /// Records stored under a subtype of `schema` are re-read from the
    /// subtype, all in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails or a schema is unknown.
    pub async fn cast(&self, schema: &str, items: Vec<Instance>) -> CoreResult<Vec<Instance>> {
        let items = items
            .into_iter()
            .map(|item| (schema.to_string(), item))
            .collect();
        self.cast_all(items, None).await
    }

    async fn cast_all(
        &self,
        items: Vec<(String, Instance)>,
        version: Option<i64>,
    ) -> CoreResult<Vec<Instance>> {
        let ns = &*self.namespace;
        let mut pending: BTreeMap<usize, RefKey> = BTreeMap::new();
        let response = {
            let mut tx = self.storage.read(self.consistency);
            for (i, (expected, item)) in items.iter().enumerate() {
                let (Some(actual), Some(id)) = (item.schema(), item.id()) else {
                    continue;
                };
                if actual != expected && ns.is_subtype(actual, expected) {
                    let key = RefKey::new(actual, id);
                    match version {
                        Some(version) => tx.read_object_version(key.clone(), version, Expand::empty()),
                        None => tx.read_object(key.clone(), Expand::empty()),
                    };
                    pending.insert(i, key);
                }
            }
            if tx.is_empty() {
                ReadResponse::new()
            } else {
                debug!(casts = pending.len(), "batched cast read");
                tx.read().await?
            }
        };

        let mut out = Vec::with_capacity(items.len());
        for (i, (expected, item)) in items.into_iter().enumerate() {
            let concrete = pending.get(&i).and_then(|key| match version {
                Some(version) => response.version(key, version),
                None => response.object(key),
            });
            let (schema, raw) = match concrete {
                Some(found) => (found.schema().unwrap_or(expected.as_str()).to_string(), found.clone()),
                None => (expected, item),
            };
            let object = ns.require_object(&schema)?;
            out.push(object.create(ns, &raw.into_value(), &Expand::empty(), true)?);
        }
        Ok(out)
    }

    /// Expands references and links of `items` selected by `expand` and
    /// evaluates requested transients. Items keep their order.
    ///
    /// `schema` is used for items that carry no schema name.
    pub fn expand<'a>(
        &'a self,
        schema: &'a str,
        items: Vec<Instance>,
        expand: &'a Expand,
    ) -> BoxFuture<'a, CoreResult<Vec<Instance>>> {
        async move {
            if expand.is_empty() || items.is_empty() {
                return Ok(items);
            }
            let ns = &*self.namespace;
            let mut plans: Vec<(&ObjectSchema, Expand)> = Vec::with_capacity(items.len());
            for item in &items {
                let object = ns.require_object(item.schema().unwrap_or(schema))?;
                plans.push((object, object.expand_with_transients(expand)));
            }

            let mut refs = BTreeSet::new();
            let mut links: Vec<(usize, &Link, Expand)> = Vec::new();
            for (i, (item, (object, plan))) in items.iter().zip(&plans).enumerate() {
                for (name, property) in object.properties() {
                    if let (Some(sub), Some(value)) = (plan.child(name), item.get(name)) {
                        collect_refs(ns, property.typ(), value, &sub, &mut refs)?;
                    }
                }
                for (name, link) in object.links() {
                    if let Some(sub) = plan.child(name) {
                        links.push((i, link, sub));
                    }
                }
            }

            let link_queries = try_join_all(links.iter().map(|(i, link, sub)| {
                let owner = &items[*i];
                async move {
                    let count = if link.is_single() { 1 } else { self.link_count };
                    let (found, _) = self
                        .query_link(owner, link, count, None, sub)
                        .await?
                        .into_parts();
                    let value = if link.is_single() {
                        found.into_iter().next().map_or(Value::Null, Instance::into_value)
                    } else {
                        Value::Array(found.into_iter().map(Instance::into_value).collect())
                    };
                    Ok::<_, CoreError>((*i, link.name().to_string(), value))
                }
            }));
            let (resolved, link_values) = futures::try_join!(self.resolve(&refs), link_queries)?;

            let mut link_values_by_item: BTreeMap<usize, Vec<(String, Value)>> = BTreeMap::new();
            for (i, name, value) in link_values {
                link_values_by_item.entry(i).or_default().push((name, value));
            }

            let mut out = Vec::with_capacity(items.len());
            for (i, (mut item, (object, plan))) in items.into_iter().zip(plans).enumerate() {
                for (name, property) in object.properties() {
                    if let (Some(sub), Some(value)) = (plan.child(name), item.get_mut(name)) {
                        substitute(ns, property.typ(), value, &sub, &resolved)?;
                    }
                }
                if let Some(values) = link_values_by_item.remove(&i) {
                    item.extend(values);
                }
                self.evaluate_transients(object, &mut item, expand);
                out.push(item);
            }
            Ok(out)
        }
        .boxed()
    }

    /// Fetches every distinct reference in one read, then expands each
    /// group of references sharing a sub-expand set.
    async fn resolve(&self, refs: &BTreeSet<ExpandKey<RefKey>>) -> CoreResult<Resolved> {
        if refs.is_empty() {
            return Ok(Resolved::new());
        }
        let keys: BTreeSet<&RefKey> = refs.iter().map(ExpandKey::key).collect();
        let response = {
            let mut tx = self.storage.read(self.consistency);
            for key in &keys {
                tx.read_object((*key).clone(), Expand::empty());
            }
            debug!(refs = keys.len(), "batched reference read");
            tx.read().await?
        };

        let mut found = Vec::new();
        let mut raw = Vec::new();
        for key in keys {
            if let Some(record) = response.object(key) {
                found.push(key.clone());
                raw.push((key.schema().to_string(), record.clone()));
            }
        }
        let objects: BTreeMap<RefKey, Instance> =
            found.into_iter().zip(self.cast_all(raw, None).await?).collect();

        let mut groups: BTreeMap<(&Expand, &str), Vec<&RefKey>> = BTreeMap::new();
        for key in refs {
            if objects.contains_key(key.key()) {
                groups
                    .entry((key.expand(), key.key().schema()))
                    .or_default()
                    .push(key.key());
            }
        }
        let expanded = try_join_all(groups.into_iter().map(|((sub, schema), keys)| {
            let items: Vec<Instance> = keys.iter().filter_map(|k| objects.get(*k).cloned()).collect();
            async move {
                let items = self.expand(schema, items, sub).await?;
                Ok::<_, CoreError>(
                    keys.into_iter()
                        .zip(items)
                        .map(|(key, item)| (ExpandKey::new(key.clone(), sub.clone()), item))
                        .collect::<Vec<_>>(),
                )
            }
        }))
        .await?;
        Ok(expanded.into_iter().flatten().collect())
    }

    fn evaluate_transients(&self, object: &ObjectSchema, item: &mut Instance, expand: &Expand) {
        let requested: Vec<_> = object
            .transients()
            .values()
            .filter(|t| expand.contains(t.name()))
            .collect();
        if requested.is_empty() {
            return;
        }
        let snapshot = item.clone().into_value();
        let ctx = Context::new(&snapshot);
        for transient in requested {
            let value = transient
                .expression()
                .evaluate(&ctx)
                .and_then(|value| match transient.typ() {
                    Some(typ) => typ.create(&self.namespace, &value, None, false),
                    None => Ok(value),
                })
                .unwrap_or_else(|err| {
                    warn!(
                        schema = object.name(),
                        transient = transient.name(),
                        error = %err,
                        "transient evaluation failed"
                    );
                    Value::Null
                });
            item.insert(transient.name().to_string(), value);
        }
    }
}
