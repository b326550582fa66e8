//! A storage wrapper that records traffic.
//!
//! Used to assert how many round trips a read costs: wrap a backend,
//! run the operation, then inspect [`CountingStorage::batches`] and
//! [`CountingStorage::read_log`].

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use strata_schema::{Consistency, Expand, Expression, Sort};
use strata_storage::{
    PagedSource, ReadRequest, ReadResponse, RefKey, Storage, StorageResult, StorageTraits,
    Versioning, WriteAction,
};

/// Forwards every call to `inner`, counting reads, queries and writes.
#[derive(Debug)]
pub struct CountingStorage<S> {
    inner: S,
    reads: Mutex<Vec<Vec<RefKey>>>,
    queries: AtomicUsize,
    writes: AtomicUsize,
}

impl<S: Storage> CountingStorage<S> {
    /// Wraps `inner`.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            reads: Mutex::new(Vec::new()),
            queries: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// The wrapped backend.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of `read_batch` calls since the last reset.
    pub fn batches(&self) -> usize {
        self.reads.lock().len()
    }

    /// The keys requested by each `read_batch` call, in call order.
    pub fn read_log(&self) -> Vec<Vec<RefKey>> {
        self.reads.lock().clone()
    }

    /// Number of `query` calls since the last reset.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Number of `write_batch` calls since the last reset.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Forgets everything recorded so far.
    pub fn reset(&self) {
        self.reads.lock().clear();
        self.queries.store(0, Ordering::SeqCst);
        self.writes.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl<S: Storage> Storage for CountingStorage<S> {
    fn storage_traits(&self, schema: &str) -> StorageTraits {
        self.inner.storage_traits(schema)
    }

    async fn read_batch(
        &self,
        consistency: Consistency,
        requests: &[ReadRequest],
    ) -> StorageResult<ReadResponse> {
        self.reads
            .lock()
            .push(requests.iter().map(|r| r.key().clone()).collect());
        self.inner.read_batch(consistency, requests).await
    }

    async fn write_batch(
        &self,
        consistency: Consistency,
        versioning: Versioning,
        actions: &[WriteAction],
    ) -> StorageResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write_batch(consistency, versioning, actions).await
    }

    async fn query(
        &self,
        consistency: Consistency,
        schema: &str,
        expression: &Expression,
        sort: &[Sort],
        expand: &Expand,
    ) -> StorageResult<Vec<Box<dyn PagedSource>>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner
            .query(consistency, schema, expression, sort, expand)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::blog_namespace;
    use std::sync::Arc;
    use strata_storage::MemoryStorage;

    #[tokio::test]
    async fn records_each_batch() {
        let storage = CountingStorage::new(MemoryStorage::new(Arc::new(blog_namespace())));
        let dyn_storage: &dyn Storage = &storage;
        let mut tx = dyn_storage.read(Consistency::Atomic);
        tx.read_object(RefKey::new("Post", "a"), Expand::empty())
            .read_object(RefKey::new("Post", "b"), Expand::empty());
        tx.read().await.unwrap();
        dyn_storage
            .read_object(Consistency::Atomic, "User", "u", &Expand::empty())
            .await
            .unwrap();

        assert_eq!(storage.batches(), 2);
        assert_eq!(
            storage.read_log(),
            vec![
                vec![RefKey::new("Post", "a"), RefKey::new("Post", "b")],
                vec![RefKey::new("User", "u")],
            ]
        );
        storage.reset();
        assert_eq!(storage.batches(), 0);
    }
}
