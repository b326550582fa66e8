//! The storage contract.

use async_trait::async_trait;
use strata_schema::{Consistency, Expand, Expression, Instance, Sort};

use crate::error::StorageResult;
use crate::key::RefKey;
use crate::source::PagedSource;
use crate::traits::{StorageTraits, Versioning};
use crate::transaction::{ReadRequest, ReadResponse, ReadTransaction, WriteAction, WriteTransaction};

/// A backend holding objects.
///
/// Backends store object instances with references collapsed to `{id}`;
/// expansion happens above this layer, so `expand` arguments are hints a
/// backend may use to prefetch but never change what is returned.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; every method may be called
/// concurrently.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Capabilities for `schema`.
    fn storage_traits(&self, schema: &str) -> StorageTraits;

    /// Executes a batch of reads in one logical request.
    async fn read_batch(
        &self,
        consistency: Consistency,
        requests: &[ReadRequest],
    ) -> StorageResult<ReadResponse>;

    /// Applies a batch of writes atomically.
    async fn write_batch(
        &self,
        consistency: Consistency,
        versioning: Versioning,
        actions: &[WriteAction],
    ) -> StorageResult<()>;

    /// Returns sorted, independently paged sources of the objects of
    /// `schema` matching `expression`.
    async fn query(
        &self,
        consistency: Consistency,
        schema: &str,
        expression: &Expression,
        sort: &[Sort],
        expand: &Expand,
    ) -> StorageResult<Vec<Box<dyn PagedSource>>>;

    /// Reads the latest version of one object.
    async fn read_object(
        &self,
        consistency: Consistency,
        schema: &str,
        id: &str,
        expand: &Expand,
    ) -> StorageResult<Option<Instance>> {
        let key = RefKey::new(schema, id);
        let request = ReadRequest::Object {
            key: key.clone(),
            expand: expand.clone(),
        };
        let response = self.read_batch(consistency, &[request]).await?;
        Ok(response.object(&key).cloned())
    }

    /// Reads one version of one object.
    async fn read_object_version(
        &self,
        consistency: Consistency,
        schema: &str,
        id: &str,
        version: i64,
        expand: &Expand,
    ) -> StorageResult<Option<Instance>> {
        let key = RefKey::new(schema, id);
        let request = ReadRequest::Version {
            key: key.clone(),
            version,
            expand: expand.clone(),
        };
        let response = self.read_batch(consistency, &[request]).await?;
        Ok(response.version(&key, version).cloned())
    }
}

impl<'s> dyn Storage + 's {
    /// Starts a batched read.
    pub fn read(&self, consistency: Consistency) -> ReadTransaction<'_> {
        ReadTransaction::new(self, consistency)
    }

    /// Starts a batched write.
    pub fn write(&self, consistency: Consistency, versioning: Versioning) -> WriteTransaction<'_> {
        WriteTransaction::new(self, consistency, versioning)
    }
}
