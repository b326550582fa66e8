//! In-memory storage backend.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use strata_schema::{
    Consistency, Context, Expand, Expression, Instance, Namespace, SchemaError, Sort, ID,
};
use tracing::{debug, warn};

use crate::error::{StorageError, StorageResult};
use crate::key::RefKey;
use crate::pager::{sort_comparator, with_id_tiebreak};
use crate::source::{ListSource, PagedSource};
use crate::storage::Storage;
use crate::traits::{StorageTraits, Versioning};
use crate::transaction::{ReadRequest, ReadResponse, WriteAction};

/// One committed state. Never mutated once published.
#[derive(Debug, Clone, Default)]
struct Snapshot {
    /// Schema name to id to record. Records of a subtype also appear,
    /// projected to the base shape, in every ancestor's table; all copies
    /// carry the concrete schema name.
    tables: BTreeMap<String, BTreeMap<String, Instance>>,
    /// Past versions per table and id, for schemas with history.
    history: BTreeMap<RefKey, BTreeMap<i64, Instance>>,
}

impl Snapshot {
    fn get(&self, schema: &str, id: &str) -> Option<&Instance> {
        self.tables.get(schema).and_then(|t| t.get(id))
    }

    fn get_version(&self, key: &RefKey, version: i64) -> Option<&Instance> {
        self.history
            .get(key)
            .and_then(|versions| versions.get(&version))
            .or_else(|| {
                self.get(key.schema(), key.id())
                    .filter(|current| current.version() == Some(version))
            })
    }
}

/// An in-memory storage backend.
///
/// Every commit clones the current snapshot, applies the whole batch to
/// the copy and publishes it under the write lock, so a failed check
/// leaves no trace and readers always see a complete prior commit.
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads.
#[derive(Debug)]
pub struct MemoryStorage {
    namespace: Arc<Namespace>,
    traits: StorageTraits,
    state: RwLock<Arc<Snapshot>>,
}

impl MemoryStorage {
    /// Creates an empty store for the objects of `namespace`.
    #[must_use]
    pub fn new(namespace: Arc<Namespace>) -> Self {
        Self {
            namespace,
            traits: StorageTraits::default(),
            state: RwLock::new(Arc::new(Snapshot::default())),
        }
    }

    /// Declares narrower capabilities, for exercising callers.
    #[must_use]
    pub fn with_traits(mut self, traits: StorageTraits) -> Self {
        self.traits = traits;
        self
    }

    /// The namespace this store was created for.
    #[must_use]
    pub fn namespace(&self) -> &Arc<Namespace> {
        &self.namespace
    }

    /// Number of records readable through `schema`.
    #[must_use]
    pub fn count(&self, schema: &str) -> usize {
        self.snapshot().tables.get(schema).map_or(0, BTreeMap::len)
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.state.read())
    }

    /// The concrete schema followed by its ancestors.
    fn chain(&self, schema: &str) -> StorageResult<Vec<String>> {
        let mut out = vec![schema.to_string()];
        out.extend(
            self.namespace
                .ancestors(schema)?
                .into_iter()
                .map(|s| s.name().to_string()),
        );
        Ok(out)
    }

    /// Writes `after` into every table of the chain.
    fn store(&self, state: &mut Snapshot, concrete: &str, after: &Instance) -> StorageResult<()> {
        let id = after
            .id()
            .ok_or_else(|| SchemaError::missing_member(concrete, ID))?
            .to_string();
        for table in self.chain(concrete)? {
            let mut record = if table == concrete {
                after.clone()
            } else {
                let base = self.namespace.require_object(&table)?;
                base.create(
                    &self.namespace,
                    &after.clone().into_value(),
                    &Expand::empty(),
                    true,
                )?
            };
            record.set_schema(concrete);
            if self.namespace.require_object(&table)?.history().is_enabled() {
                if let Some(version) = record.version() {
                    state
                        .history
                        .entry(RefKey::new(table.as_str(), id.as_str()))
                        .or_default()
                        .insert(version, record.clone());
                }
            }
            state.tables.entry(table).or_default().insert(id.clone(), record);
        }
        Ok(())
    }

    fn remove(&self, state: &mut Snapshot, concrete: &str, id: &str) -> StorageResult<()> {
        for table in self.chain(concrete)? {
            if let Some(records) = state.tables.get_mut(&table) {
                records.remove(id);
            }
        }
        Ok(())
    }

    /// The stored record and its concrete schema, or `ObjectMissing`.
    fn current<'s>(
        state: &'s Snapshot,
        schema: &str,
        id: &str,
    ) -> StorageResult<(&'s Instance, String)> {
        let current = state
            .get(schema, id)
            .ok_or_else(|| StorageError::object_missing(schema, id))?;
        let concrete = current.schema().unwrap_or(schema).to_string();
        Ok((current, concrete))
    }

    fn check_version(
        versioning: Versioning,
        schema: &str,
        id: &str,
        current: &Instance,
        before: Option<&Instance>,
    ) -> StorageResult<()> {
        match before {
            Some(before)
                if versioning == Versioning::Checked && before.version() != current.version() =>
            {
                Err(StorageError::VersionMismatch {
                    schema: schema.to_string(),
                    id: id.to_string(),
                    expected: before.version(),
                    actual: current.version(),
                })
            }
            _ => Ok(()),
        }
    }

    fn apply(
        &self,
        state: &mut Snapshot,
        versioning: Versioning,
        action: &WriteAction,
    ) -> StorageResult<()> {
        match action {
            WriteAction::Create { schema, after } => {
                let id = after
                    .id()
                    .ok_or_else(|| SchemaError::missing_member(schema.as_str(), ID))?;
                for table in self.chain(schema)? {
                    if state.get(&table, id).is_some() {
                        return Err(StorageError::object_exists(schema.as_str(), id));
                    }
                }
                self.store(state, schema, after)
            }
            WriteAction::Update {
                schema,
                id,
                before,
                after,
            } => {
                let (current, concrete) = Self::current(state, schema, id)?;
                Self::check_version(versioning, schema, id, current, before.as_ref())?;
                let mut after = after.clone();
                after.set_id(id.as_str());
                self.remove(state, &concrete, id)?;
                self.store(state, &concrete, &after)
            }
            WriteAction::Delete { schema, id, before } => {
                let (current, concrete) = match Self::current(state, schema, id) {
                    Ok(found) => found,
                    Err(_) if before.is_none() => return Ok(()),
                    Err(err) => return Err(err),
                };
                Self::check_version(versioning, schema, id, current, before.as_ref())?;
                self.remove(state, &concrete, id)
            }
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn storage_traits(&self, _schema: &str) -> StorageTraits {
        self.traits
    }

    async fn read_batch(
        &self,
        consistency: Consistency,
        requests: &[ReadRequest],
    ) -> StorageResult<ReadResponse> {
        self.traits.check_object(consistency)?;
        let snapshot = self.snapshot();
        let mut response = ReadResponse::new();
        for request in requests {
            match request {
                ReadRequest::Object { key, .. } => {
                    if let Some(found) = snapshot.get(key.schema(), key.id()) {
                        response.insert_object(key.clone(), found.clone());
                    }
                }
                ReadRequest::Version { key, version, .. } => {
                    if let Some(found) = snapshot.get_version(key, *version) {
                        response.insert_version(key.clone(), *version, found.clone());
                    }
                }
            }
        }
        debug!(requests = requests.len(), found = response.len(), "read batch");
        Ok(response)
    }

    async fn write_batch(
        &self,
        consistency: Consistency,
        versioning: Versioning,
        actions: &[WriteAction],
    ) -> StorageResult<()> {
        self.traits.check_object(consistency)?;
        self.traits.check_versioning(versioning)?;
        if actions.len() > 1 && !self.traits.multi_object {
            return Err(StorageError::unsupported("multi-object transactions"));
        }
        let mut guard = self.state.write();
        let mut next = Snapshot::clone(&guard);
        for action in actions {
            self.apply(&mut next, versioning, action)?;
        }
        *guard = Arc::new(next);
        debug!(actions = actions.len(), "write committed");
        Ok(())
    }

    async fn query(
        &self,
        consistency: Consistency,
        schema: &str,
        expression: &Expression,
        sort: &[Sort],
        _expand: &Expand,
    ) -> StorageResult<Vec<Box<dyn PagedSource>>> {
        self.traits.check_object(consistency)?;
        self.namespace.require_object(schema)?;
        let snapshot = self.snapshot();

        // One source per concrete schema in the hierarchy, empty or not:
        // the source list depends on the namespace only.
        let mut partitions: BTreeMap<&str, Vec<Instance>> = self
            .namespace
            .schemas()
            .filter_map(|s| s.as_object())
            .filter(|o| o.is_concrete() && self.namespace.is_subtype(o.name(), schema))
            .map(|o| (o.name(), Vec::new()))
            .collect();
        let records = snapshot.tables.get(schema).into_iter().flat_map(BTreeMap::values);
        for record in records {
            let value = record.clone().into_value();
            match expression.matches(&Context::new(&value)) {
                Ok(true) => partitions
                    .entry(record.schema().unwrap_or(schema))
                    .or_default()
                    .push(record.clone()),
                Ok(false) => {}
                Err(err) => {
                    warn!(schema, id = record.id(), error = %err, "excluding record from query");
                }
            }
        }

        let compare = sort_comparator(with_id_tiebreak(sort));
        Ok(partitions
            .into_values()
            .map(|mut items| {
                items.sort_by(&compare);
                Box::new(ListSource::new(items)) as Box<dyn PagedSource>
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pager::Pager;
    use strata_codec::Value;

    const ZOO: &str = r#"
Animal:
  type: object
  concrete: false
  history:
    enabled: true
  properties:
    name: string
Dog:
  type: object
  extend: Animal
  properties:
    breed: string
Cat:
  type: object
  extend: Animal
  properties:
    lives: integer
"#;

    fn storage() -> MemoryStorage {
        MemoryStorage::new(Arc::new(Namespace::from_yaml(ZOO).unwrap()))
    }

    fn dog(id: &str, version: i64, name: &str) -> Instance {
        Instance::reference(id)
            .with("version", Value::Integer(version))
            .with("name", name)
            .with("breed", "lab")
    }

    async fn create(storage: &MemoryStorage, schema: &str, instance: Instance) -> StorageResult<()> {
        let storage: &dyn Storage = storage;
        let mut tx = storage.write(Consistency::Atomic, Versioning::Checked);
        tx.create_object(schema, instance);
        tx.write().await
    }

    #[tokio::test]
    async fn subtypes_are_readable_through_their_base() {
        let storage = storage();
        create(&storage, "Dog", dog("d1", 1, "Rex")).await.unwrap();
        let base = storage
            .read_object(Consistency::Atomic, "Animal", "d1", &Expand::empty())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(base.schema(), Some("Dog"));
        assert_eq!(base.get("name"), Some(&Value::from("Rex")));
        assert!(base.get("breed").is_none());
        assert_eq!(storage.count("Animal"), 1);
    }

    #[tokio::test]
    async fn ids_are_unique_across_the_hierarchy() {
        let storage = storage();
        create(&storage, "Dog", dog("x", 1, "Rex")).await.unwrap();
        let cat = Instance::reference("x").with("version", Value::Integer(1));
        let err = create(&storage, "Cat", cat).await.unwrap_err();
        assert_eq!(err, StorageError::object_exists("Cat", "x"));
    }

    #[tokio::test]
    async fn failed_batch_applies_nothing() {
        let storage = storage();
        create(&storage, "Dog", dog("d1", 1, "Rex")).await.unwrap();
        let dyn_storage: &dyn Storage = &storage;
        let mut tx = dyn_storage.write(Consistency::Atomic, Versioning::Checked);
        tx.create_object("Dog", dog("d2", 1, "Fido"))
            .create_object("Dog", dog("d1", 1, "Again"));
        assert!(tx.write().await.is_err());
        assert_eq!(storage.count("Dog"), 1);
    }

    #[tokio::test]
    async fn history_keeps_past_versions() {
        let storage = storage();
        create(&storage, "Dog", dog("d1", 1, "Rex")).await.unwrap();
        let dyn_storage: &dyn Storage = &storage;
        let mut tx = dyn_storage.write(Consistency::Atomic, Versioning::Checked);
        tx.update_object("Dog", "d1", Some(dog("d1", 1, "Rex")), dog("d1", 2, "Max"));
        tx.write().await.unwrap();

        let old = storage
            .read_object_version(Consistency::Atomic, "Dog", "d1", 1, &Expand::empty())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(old.get("name"), Some(&Value::from("Rex")));
        let base_old = storage
            .read_object_version(Consistency::Atomic, "Animal", "d1", 1, &Expand::empty())
            .await
            .unwrap();
        assert!(base_old.is_some());
    }

    #[tokio::test]
    async fn query_partitions_by_concrete_schema() {
        let storage = storage();
        create(&storage, "Dog", dog("d1", 1, "b")).await.unwrap();
        create(&storage, "Dog", dog("d2", 1, "d")).await.unwrap();
        let cat = Instance::reference("c1")
            .with("version", Value::Integer(1))
            .with("name", "c");
        create(&storage, "Cat", cat).await.unwrap();

        let sort = [Sort::asc("name")];
        let sources = storage
            .query(
                Consistency::Atomic,
                "Animal",
                &Expression::parse("name != 'd'").unwrap(),
                &sort,
                &Expand::empty(),
            )
            .await
            .unwrap();
        assert_eq!(sources.len(), 2);
        let page = Pager::sorted(&with_id_tiebreak(&sort), sources, None)
            .page(10)
            .await
            .unwrap();
        let ids: Vec<&str> = page.items().iter().filter_map(Instance::id).collect();
        assert_eq!(ids, ["d1", "c1"]);
    }

    #[tokio::test]
    async fn failing_predicate_excludes_record() {
        let storage = storage();
        create(&storage, "Dog", dog("d1", 1, "Rex")).await.unwrap();
        let sources = storage
            .query(
                Consistency::Atomic,
                "Dog",
                &Expression::parse("name > 3").unwrap(),
                &[],
                &Expand::empty(),
            )
            .await
            .unwrap();
        let page = Pager::sorted(&with_id_tiebreak(&[]), sources, None)
            .page(10)
            .await
            .unwrap();
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn sources_cover_every_concrete_subtype() {
        let storage = storage();
        let sources = storage
            .query(
                Consistency::Atomic,
                "Animal",
                &Expression::constant(true),
                &[],
                &Expand::empty(),
            )
            .await
            .unwrap();
        assert_eq!(sources.len(), 2);

        let dog_only = storage
            .query(
                Consistency::Atomic,
                "Dog",
                &Expression::constant(true),
                &[],
                &Expand::empty(),
            )
            .await
            .unwrap();
        assert_eq!(dog_only.len(), 1);
    }

    #[tokio::test]
    async fn paging_survives_a_first_record_of_another_subtype() {
        let storage = storage();
        for (id, name) in [("d1", "a"), ("d2", "b"), ("d3", "c")] {
            create(&storage, "Dog", dog(id, 1, name)).await.unwrap();
        }
        let sort = with_id_tiebreak(&[Sort::asc("name")]);
        let everything = Expression::constant(true);
        let expand = Expand::empty();
        let query = || {
            storage.query(Consistency::Atomic, "Animal", &everything, &sort, &expand)
        };

        let first = Pager::sorted(&sort, query().await.unwrap(), None)
            .page(2)
            .await
            .unwrap();
        let token = first.paging().cloned();
        assert!(token.is_some());

        let cat = Instance::reference("c1")
            .with("version", Value::Integer(1))
            .with("name", "z");
        create(&storage, "Cat", cat).await.unwrap();

        let rest = Pager::sorted(&sort, query().await.unwrap(), token)
            .page(10)
            .await
            .unwrap();
        let ids: Vec<&str> = rest.items().iter().filter_map(Instance::id).collect();
        assert_eq!(ids, ["d3"]);
        assert!(rest.paging().is_none());
    }

    #[tokio::test]
    async fn declared_traits_are_enforced() {
        let storage = storage().with_traits(StorageTraits {
            object_consistency: Consistency::Eventual,
            multi_object: false,
            ..StorageTraits::default()
        });
        let err = storage
            .read_object(Consistency::Atomic, "Dog", "d1", &Expand::empty())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Unsupported(_)));

        let dyn_storage: &dyn Storage = &storage;
        let mut tx = dyn_storage.write(Consistency::Eventual, Versioning::Checked);
        tx.create_object("Dog", dog("a", 1, "a"))
            .create_object("Dog", dog("b", 1, "b"));
        assert!(matches!(tx.write().await, Err(StorageError::Unsupported(_))));
    }
}
