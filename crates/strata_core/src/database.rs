//! The database facade.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use strata_codec::Value;
use strata_schema::{
    is_reserved, Expand, Expression, Instance, Namespace, ObjectSchema, Sort, CREATED, HASH,
    UPDATED,
};
use strata_storage::{Page, PagingToken, Storage};
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::processor::ReadProcessor;

/// Current time truncated to the millisecond precision `DateTime` values
/// carry.
fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// An object database over a namespace and a storage backend.
///
/// `Database` owns no data itself; every call reads or writes through the
/// backend, so several handles over the same storage see each other's
/// writes.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use strata_core::{Config, Database, Expand, MemoryStorage, Namespace};
///
/// let ns = Arc::new(Namespace::from_yaml(DESCRIPTORS)?);
/// let storage = Arc::new(MemoryStorage::new(Arc::clone(&ns)));
/// let db = Database::new(ns, storage, Config::default());
///
/// let post = db.create("Post", &serde_json::from_str(r#"{"title": "hi"}"#)?).await?;
/// let page = db.query("Post", "title == 'hi'", &[], None, None, &Expand::empty()).await?;
/// ```
pub struct Database {
    namespace: Arc<Namespace>,
    storage: Arc<dyn Storage>,
    config: Config,
    processor: ReadProcessor,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("schemas", &self.namespace.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Database {
    /// Creates a database reading and writing through `storage`.
    pub fn new(namespace: Arc<Namespace>, storage: Arc<dyn Storage>, config: Config) -> Self {
        let processor = ReadProcessor::new(Arc::clone(&namespace), Arc::clone(&storage), &config);
        Self {
            namespace,
            storage,
            config,
            processor,
        }
    }

    /// The namespace objects are validated against.
    pub fn namespace(&self) -> &Arc<Namespace> {
        &self.namespace
    }

    /// Returns the database configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The read pipeline used by this database.
    pub fn processor(&self) -> &ReadProcessor {
        &self.processor
    }

    fn concrete(&self, schema: &str) -> CoreResult<&ObjectSchema> {
        let object = self.namespace.require_object(schema)?;
        if object.is_concrete() {
            Ok(object)
        } else {
            Err(CoreError::NotConcrete {
                schema: schema.to_string(),
            })
        }
    }

    /// Computes derived properties, checks required ones and stamps the
    /// content hash.
    fn finish(&self, object: &ObjectSchema, instance: &mut Instance) -> CoreResult<()> {
        object.evaluate_properties(&self.namespace, instance)?;
        object.validate_required(instance)?;
        let hash = object.hash(&self.namespace, instance)?;
        instance.insert(HASH.to_string(), Value::String(hash));
        Ok(())
    }

    /// Creates an object from `data` and returns it as stored.
    ///
    /// A missing `id` is generated. Version, timestamps and hash are
    /// always assigned here.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotConcrete`] for abstract schemas, a schema
    /// error when `data` does not coerce or lacks required properties, and
    /// a storage error when the id is taken.
    pub async fn create(&self, schema: &str, data: &Value) -> CoreResult<Instance> {
        let object = self.concrete(schema)?;
        let mut instance = object.create(&self.namespace, data, &Expand::empty(), false)?;
        if instance.id().is_none() {
            instance.set_id(Uuid::new_v4().to_string());
        }
        let stamp = now();
        instance.set_version(1);
        instance.insert(CREATED.to_string(), Value::DateTime(stamp));
        instance.insert(UPDATED.to_string(), Value::DateTime(stamp));
        self.finish(object, &mut instance)?;

        let mut tx = self
            .storage
            .write(self.config.write_consistency, self.config.versioning);
        tx.create_object(schema, instance.clone());
        tx.write().await?;
        debug!(schema, id = instance.id(), "created object");
        Ok(instance)
    }

    /// Applies `patch` to an object and returns the new version.
    ///
    /// Members present in `patch` replace the stored ones; metadata in
    /// `patch` is ignored. With `expected_version`, the write fails unless
    /// the stored object is still at that version; without it, the write
    /// fails if the object changed since it was read here.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the object does not exist, a
    /// schema error if an immutable property changed or the result is
    /// invalid, and a storage error on a version conflict.
    pub async fn update(
        &self,
        schema: &str,
        id: &str,
        patch: &Value,
        expected_version: Option<i64>,
    ) -> CoreResult<Instance> {
        let current = self
            .processor
            .read_object(schema, id, &Expand::empty())
            .await?
            .ok_or_else(|| CoreError::not_found(schema, id))?;
        let concrete = current.schema().unwrap_or(schema).to_string();
        let object = self.concrete(&concrete)?;

        let mut merged = current.clone();
        if let Some(members) = patch.as_map() {
            for (name, value) in members {
                if !is_reserved(name) {
                    merged.insert(name.clone(), value.clone());
                }
            }
        }
        let mut after = object.create(&self.namespace, &merged.into_value(), &Expand::empty(), false)?;
        object.check_immutable(&current, &after)?;
        after.set_version(current.version().unwrap_or(0) + 1);
        after.insert(UPDATED.to_string(), Value::DateTime(now()));
        self.finish(object, &mut after)?;

        let mut before = current;
        if let Some(version) = expected_version {
            before.set_version(version);
        }
        let mut tx = self
            .storage
            .write(self.config.write_consistency, self.config.versioning);
        tx.update_object(concrete.as_str(), id, Some(before), after.clone());
        tx.write().await?;
        debug!(schema = %concrete, id, version = after.version(), "updated object");
        Ok(after)
    }

    /// Deletes an object. Returns `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns a storage error if `expected_version` is given and does not
    /// match the stored version.
    pub async fn delete(
        &self,
        schema: &str,
        id: &str,
        expected_version: Option<i64>,
    ) -> CoreResult<bool> {
        let Some(current) = self
            .processor
            .read_object(schema, id, &Expand::empty())
            .await?
        else {
            return Ok(false);
        };
        let concrete = current.schema().unwrap_or(schema).to_string();
        let before = expected_version.map(|version| {
            let mut before = current;
            before.set_version(version);
            before
        });
        let mut tx = self
            .storage
            .write(self.config.write_consistency, self.config.versioning);
        tx.delete_object(concrete.as_str(), id, before);
        tx.write().await?;
        debug!(schema = %concrete, id, "deleted object");
        Ok(true)
    }

    /// Reads the latest version of an object.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema is unknown or storage fails.
    pub async fn read(
        &self,
        schema: &str,
        id: &str,
        expand: &Expand,
    ) -> CoreResult<Option<Instance>> {
        self.processor.read_object(schema, id, expand).await
    }

    /// Reads a retained historic version of an object.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema is unknown or storage fails.
    pub async fn read_version(
        &self,
        schema: &str,
        id: &str,
        version: i64,
        expand: &Expand,
    ) -> CoreResult<Option<Instance>> {
        self.processor
            .read_object_version(schema, id, version, expand)
            .await
    }

    /// Queries `schema` with an expression in text form. Empty text
    /// matches everything.
    ///
    /// `count` defaults to [`Config::default_count`] and is capped at
    /// [`Config::max_count`].
    ///
    /// # Errors
    ///
    /// Returns an error if the expression does not parse, the paging token
    /// belongs to another query, or storage fails.
    pub async fn query(
        &self,
        schema: &str,
        expression: &str,
        sort: &[Sort],
        count: Option<usize>,
        paging: Option<PagingToken>,
        expand: &Expand,
    ) -> CoreResult<Page<Instance>> {
        let expression = if expression.trim().is_empty() {
            Expression::constant(true)
        } else {
            Expression::parse(expression)?
        };
        self.processor
            .query(
                schema,
                &expression,
                sort,
                self.config.page_count(count),
                paging,
                expand,
            )
            .await
    }

    /// Pages through the objects a link of one object points at.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the owner does not exist and a
    /// schema error if it has no such link.
    pub async fn query_link(
        &self,
        schema: &str,
        id: &str,
        link: &str,
        count: Option<usize>,
        paging: Option<PagingToken>,
        expand: &Expand,
    ) -> CoreResult<Page<Instance>> {
        let owner = self
            .processor
            .read_object(schema, id, &Expand::empty())
            .await?
            .ok_or_else(|| CoreError::not_found(schema, id))?;
        let object = self
            .namespace
            .require_object(owner.schema().unwrap_or(schema))?;
        let link = object.link(link)?;
        self.processor
            .query_link(&owner, link, self.config.page_count(count), paging, expand)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_storage::{MemoryStorage, StorageError};

    const NOTES: &str = r#"
Note:
  type: object
  properties:
    title:
      type: string
      required: true
    owner:
      type: string
      immutable: true
    words:
      type: integer
      expression: "size(title)"
    parent: Note
  links:
    children:
      schema: Note
      expression: "parent.id == this.id"
      sort: [title]
Base:
  type: object
  concrete: false
  properties:
    name: string
"#;

    fn db() -> Database {
        let ns = Arc::new(Namespace::from_yaml(NOTES).unwrap());
        let storage = Arc::new(MemoryStorage::new(Arc::clone(&ns)));
        Database::new(ns, storage, Config::default())
    }

    fn json(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    #[tokio::test]
    async fn create_assigns_metadata() {
        let db = db();
        let note = db
            .create("Note", &json(r#"{"title": "hello", "owner": "ada"}"#))
            .await
            .unwrap();
        assert!(note.id().is_some());
        assert_eq!(note.version(), Some(1));
        assert_eq!(note.created(), note.updated());
        assert_eq!(note.get("words"), Some(&Value::Integer(5)));
        assert_eq!(note.hash().map(str::len), Some(64));

        let read = db
            .read("Note", note.id().unwrap(), &Expand::empty())
            .await
            .unwrap();
        assert_eq!(read.as_ref(), Some(&note));
    }

    #[tokio::test]
    async fn create_validates() {
        let db = db();
        assert!(matches!(
            db.create("Note", &json(r#"{"owner": "ada"}"#)).await,
            Err(CoreError::Schema(_))
        ));
        assert!(matches!(
            db.create("Base", &json(r#"{"name": "x"}"#)).await,
            Err(CoreError::NotConcrete { .. })
        ));
        db.create("Note", &json(r#"{"id": "n1", "title": "a"}"#))
            .await
            .unwrap();
        let err = db
            .create("Note", &json(r#"{"id": "n1", "title": "b"}"#))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn update_merges_and_bumps_version() {
        let db = db();
        let note = db
            .create("Note", &json(r#"{"id": "n1", "title": "a", "owner": "ada"}"#))
            .await
            .unwrap();
        let updated = db
            .update("Note", "n1", &json(r#"{"title": "abc", "version": 40}"#), None)
            .await
            .unwrap();
        assert_eq!(updated.version(), Some(2));
        assert_eq!(updated.get("owner"), Some(&Value::from("ada")));
        assert_eq!(updated.get("words"), Some(&Value::Integer(3)));
        assert_eq!(updated.created(), note.created());
        assert_ne!(updated.hash(), note.hash());

        let first = db
            .read_version("Note", "n1", 2, &Expand::empty())
            .await
            .unwrap();
        assert_eq!(first.and_then(|n| n.version()), Some(2));
    }

    #[tokio::test]
    async fn update_checks_expected_version_and_immutables() {
        let db = db();
        db.create("Note", &json(r#"{"id": "n1", "title": "a", "owner": "ada"}"#))
            .await
            .unwrap();
        let err = db
            .update("Note", "n1", &json(r#"{"title": "b"}"#), Some(5))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Storage(StorageError::VersionMismatch {
                expected: Some(5),
                actual: Some(1),
                ..
            })
        ));
        assert!(matches!(
            db.update("Note", "n1", &json(r#"{"owner": "bob"}"#), Some(1))
                .await,
            Err(CoreError::Schema(_))
        ));
        assert_eq!(
            db.update("Note", "ghost", &json("{}"), None).await,
            Err(CoreError::not_found("Note", "ghost"))
        );
    }

    #[tokio::test]
    async fn delete_reports_whether_anything_was_removed() {
        let db = db();
        db.create("Note", &json(r#"{"id": "n1", "title": "a"}"#))
            .await
            .unwrap();
        assert!(db.delete("Note", "n1", Some(2)).await.unwrap_err().is_conflict());
        assert!(db.delete("Note", "n1", Some(1)).await.unwrap());
        assert!(!db.delete("Note", "n1", None).await.unwrap());
        assert_eq!(db.read("Note", "n1", &Expand::empty()).await, Ok(None));
    }

    #[tokio::test]
    async fn query_parses_text_and_clamps_count() {
        let ns = Arc::new(Namespace::from_yaml(NOTES).unwrap());
        let storage = Arc::new(MemoryStorage::new(Arc::clone(&ns)));
        let db = Database::new(ns, storage, Config::new().max_count(3));
        for i in 0..5 {
            db.create("Note", &json(&format!(r#"{{"id": "n{i}", "title": "t{i}"}}"#)))
                .await
                .unwrap();
        }
        let page = db
            .query("Note", "", &[], Some(50), None, &Expand::empty())
            .await
            .unwrap();
        assert_eq!(page.len(), 3);
        let page = db
            .query("Note", "title in ['t1', 't4']", &[], None, None, &Expand::empty())
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert!(matches!(
            db.query("Note", "title ==", &[], None, None, &Expand::empty())
                .await,
            Err(CoreError::Schema(_))
        ));
    }

    #[tokio::test]
    async fn query_link_pages_through_children() {
        let db = db();
        db.create("Note", &json(r#"{"id": "root", "title": "root"}"#))
            .await
            .unwrap();
        for title in ["c", "a", "b"] {
            db.create(
                "Note",
                &json(&format!(r#"{{"title": "{title}", "parent": "root"}}"#)),
            )
            .await
            .unwrap();
        }
        let first = db
            .query_link("Note", "root", "children", Some(2), None, &Expand::empty())
            .await
            .unwrap();
        let titles: Vec<_> = first.items().iter().filter_map(|n| n.get("title")).collect();
        assert_eq!(titles, [&Value::from("a"), &Value::from("b")]);
        let rest = db
            .query_link(
                "Note",
                "root",
                "children",
                Some(2),
                first.paging().cloned(),
                &Expand::empty(),
            )
            .await
            .unwrap();
        assert_eq!(rest.len(), 1);
        assert!(rest.paging().is_none());
        assert!(db
            .query_link("Note", "root", "nope", None, None, &Expand::empty())
            .await
            .is_err());
    }
}
