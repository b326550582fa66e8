//! Batched read and write transactions.

use std::collections::BTreeMap;
use strata_schema::{Consistency, Expand, Instance};

use crate::error::StorageResult;
use crate::key::RefKey;
use crate::storage::Storage;
use crate::traits::Versioning;

/// One object read inside a [`ReadTransaction`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReadRequest {
    /// Latest version.
    Object {
        /// Schema and id.
        key: RefKey,
        /// Members the caller will expand.
        expand: Expand,
    },
    /// A specific version.
    Version {
        /// Schema and id.
        key: RefKey,
        /// Requested version.
        version: i64,
        /// Members the caller will expand.
        expand: Expand,
    },
}

impl ReadRequest {
    /// Schema and id of the requested object.
    #[must_use]
    pub fn key(&self) -> &RefKey {
        match self {
            Self::Object { key, .. } | Self::Version { key, .. } => key,
        }
    }
}

/// Results of a [`ReadTransaction`]. Missing objects are absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadResponse {
    objects: BTreeMap<RefKey, Instance>,
    versions: BTreeMap<(RefKey, i64), Instance>,
}

impl ReadResponse {
    /// Creates an empty response.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the latest version of an object.
    pub fn insert_object(&mut self, key: RefKey, instance: Instance) {
        self.objects.insert(key, instance);
    }

    /// Records a specific version of an object.
    pub fn insert_version(&mut self, key: RefKey, version: i64, instance: Instance) {
        self.versions.insert((key, version), instance);
    }

    /// The latest version read for `key`.
    #[must_use]
    pub fn object(&self, key: &RefKey) -> Option<&Instance> {
        self.objects.get(key)
    }

    /// The given version read for `key`.
    #[must_use]
    pub fn version(&self, key: &RefKey, version: i64) -> Option<&Instance> {
        self.versions.get(&(key.clone(), version))
    }

    /// Number of objects found.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len() + self.versions.len()
    }

    /// True if nothing was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Collects object reads and executes them in one storage call.
pub struct ReadTransaction<'a> {
    storage: &'a dyn Storage,
    consistency: Consistency,
    requests: Vec<ReadRequest>,
}

impl std::fmt::Debug for ReadTransaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadTransaction")
            .field("consistency", &self.consistency)
            .field("requests", &self.requests)
            .finish()
    }
}

impl<'a> ReadTransaction<'a> {
    /// Starts an empty transaction.
    pub fn new(storage: &'a dyn Storage, consistency: Consistency) -> Self {
        Self {
            storage,
            consistency,
            requests: Vec::new(),
        }
    }

    /// Requests the latest version of an object.
    pub fn read_object(&mut self, key: RefKey, expand: Expand) -> &mut Self {
        self.requests.push(ReadRequest::Object { key, expand });
        self
    }

    /// Requests a specific version of an object.
    pub fn read_object_version(&mut self, key: RefKey, version: i64, expand: Expand) -> &mut Self {
        self.requests.push(ReadRequest::Version {
            key,
            version,
            expand,
        });
        self
    }

    /// Requested consistency.
    #[must_use]
    pub fn consistency(&self) -> Consistency {
        self.consistency
    }

    /// Requests collected so far.
    #[must_use]
    pub fn requests(&self) -> &[ReadRequest] {
        &self.requests
    }

    /// True if nothing was requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Executes every request in one call.
    ///
    /// # Errors
    ///
    /// Returns any error the backend raises.
    pub async fn read(self) -> StorageResult<ReadResponse> {
        if self.requests.is_empty() {
            return Ok(ReadResponse::new());
        }
        self.storage.read_batch(self.consistency, &self.requests).await
    }
}

/// One change inside a [`WriteTransaction`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteAction {
    /// Insert a new object.
    Create {
        /// Concrete schema.
        schema: String,
        /// The object, with id and version set.
        after: Instance,
    },
    /// Replace an object.
    Update {
        /// Concrete schema.
        schema: String,
        /// Object id.
        id: String,
        /// The version the caller read, or `None` for a blind write.
        before: Option<Instance>,
        /// The replacement.
        after: Instance,
    },
    /// Remove an object.
    Delete {
        /// Concrete schema.
        schema: String,
        /// Object id.
        id: String,
        /// The version the caller read, or `None` for a blind write.
        before: Option<Instance>,
    },
}

impl WriteAction {
    /// Schema written to.
    #[must_use]
    pub fn schema(&self) -> &str {
        match self {
            Self::Create { schema, .. } | Self::Update { schema, .. } | Self::Delete { schema, .. } => {
                schema
            }
        }
    }

    /// Id written to.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Create { after, .. } => after.id(),
            Self::Update { id, .. } | Self::Delete { id, .. } => Some(id),
        }
    }
}

/// Collects changes and commits them together.
///
/// A commit either applies every action or none of them.
pub struct WriteTransaction<'a> {
    storage: &'a dyn Storage,
    consistency: Consistency,
    versioning: Versioning,
    actions: Vec<WriteAction>,
}

impl std::fmt::Debug for WriteTransaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteTransaction")
            .field("consistency", &self.consistency)
            .field("versioning", &self.versioning)
            .field("actions", &self.actions.len())
            .finish()
    }
}

impl<'a> WriteTransaction<'a> {
    /// Starts an empty transaction.
    pub fn new(storage: &'a dyn Storage, consistency: Consistency, versioning: Versioning) -> Self {
        Self {
            storage,
            consistency,
            versioning,
            actions: Vec::new(),
        }
    }

    /// Inserts `after`, failing on commit if its id exists.
    pub fn create_object(&mut self, schema: impl Into<String>, after: Instance) -> &mut Self {
        self.actions.push(WriteAction::Create {
            schema: schema.into(),
            after,
        });
        self
    }

    /// Replaces an object, checking `before`'s version on commit.
    pub fn update_object(
        &mut self,
        schema: impl Into<String>,
        id: impl Into<String>,
        before: Option<Instance>,
        after: Instance,
    ) -> &mut Self {
        self.actions.push(WriteAction::Update {
            schema: schema.into(),
            id: id.into(),
            before,
            after,
        });
        self
    }

    /// Removes an object, checking `before`'s version on commit.
    pub fn delete_object(
        &mut self,
        schema: impl Into<String>,
        id: impl Into<String>,
        before: Option<Instance>,
    ) -> &mut Self {
        self.actions.push(WriteAction::Delete {
            schema: schema.into(),
            id: id.into(),
            before,
        });
        self
    }

    /// Actions collected so far.
    #[must_use]
    pub fn actions(&self) -> &[WriteAction] {
        &self.actions
    }

    /// Commits every action atomically.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ObjectExists`],
    /// [`crate::StorageError::VersionMismatch`] or
    /// [`crate::StorageError::ObjectMissing`] when a check fails; nothing
    /// is applied in that case.
    pub async fn write(self) -> StorageResult<()> {
        if self.actions.is_empty() {
            return Ok(());
        }
        self.storage
            .write_batch(self.consistency, self.versioning, &self.actions)
            .await
    }
}
