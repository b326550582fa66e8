//! Independently paginated result sources.

use async_trait::async_trait;
use strata_codec::{BinaryDecoder, BinaryEncoder};
use strata_schema::Instance;

use crate::error::{StorageError, StorageResult};
use crate::page::{Page, PagingToken};

/// One sorted, paginated stream of query results.
///
/// A query may return several of these (for example one per index or per
/// partition); [`crate::Pager`] merges them.
#[async_trait]
pub trait PagedSource: Send + Sync {
    /// Fetches up to `count` items starting at `paging` (the beginning
    /// when `None`).
    async fn page(&self, count: usize, paging: Option<&PagingToken>) -> StorageResult<Page<Instance>>;
}

/// A source over an already sorted list, paged by offset.
#[derive(Debug, Clone, Default)]
pub struct ListSource {
    items: Vec<Instance>,
}

impl ListSource {
    /// Creates a source over sorted items.
    pub fn new(items: Vec<Instance>) -> Self {
        Self { items }
    }

    fn offset(paging: Option<&PagingToken>) -> StorageResult<usize> {
        let Some(token) = paging else {
            return Ok(0);
        };
        let bytes = token.to_bytes()?;
        let mut input = BinaryDecoder::new(&bytes);
        let offset = input
            .read_len()
            .map_err(|e| StorageError::invalid_paging_token(e.to_string()))?;
        if !input.is_empty() {
            return Err(StorageError::invalid_paging_token("trailing bytes"));
        }
        Ok(offset)
    }
}

#[async_trait]
impl PagedSource for ListSource {
    async fn page(&self, count: usize, paging: Option<&PagingToken>) -> StorageResult<Page<Instance>> {
        let start = Self::offset(paging)?.min(self.items.len());
        let end = start.saturating_add(count).min(self.items.len());
        let next = if end < self.items.len() {
            let mut out = BinaryEncoder::new();
            out.write_len(end)?;
            Some(PagingToken::from_bytes(out.as_bytes()))
        } else {
            None
        };
        Ok(Page::new(self.items[start..end].to_vec(), next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: usize) -> Vec<Instance> {
        (0..n).map(|i| Instance::reference(format!("{i:03}"))).collect()
    }

    #[tokio::test]
    async fn pages_until_exhausted() {
        let source = ListSource::new(items(5));
        let first = source.page(2, None).await.unwrap();
        assert_eq!(first.len(), 2);
        let second = source.page(2, first.paging()).await.unwrap();
        assert_eq!(second.items()[0].id(), Some("002"));
        let third = source.page(2, second.paging()).await.unwrap();
        assert_eq!(third.len(), 1);
        assert!(third.paging().is_none());
    }

    #[tokio::test]
    async fn exact_fit_has_no_token() {
        let source = ListSource::new(items(4));
        let page = source.page(4, None).await.unwrap();
        assert!(page.paging().is_none());
    }
}
