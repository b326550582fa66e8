//! Pages and paging tokens.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{StorageError, StorageResult};

/// An opaque continuation token.
///
/// Only meaningful to the query that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PagingToken(String);

impl PagingToken {
    /// Wraps token text received from a caller.
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Encodes raw state as URL-safe text.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Decodes the raw state.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidPagingToken`] if the text is not
    /// valid base64.
    pub fn to_bytes(&self) -> StorageResult<Vec<u8>> {
        URL_SAFE_NO_PAD
            .decode(&self.0)
            .map_err(|e| StorageError::invalid_paging_token(e.to_string()))
    }

    /// The token text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PagingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A bounded slice of results plus a token for the rest.
///
/// `paging` is `None` once the results are exhausted.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    items: Vec<T>,
    paging: Option<PagingToken>,
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Page<T> {
    /// Creates a page.
    pub fn new(items: Vec<T>, paging: Option<PagingToken>) -> Self {
        Self { items, paging }
    }

    /// An exhausted, empty page.
    pub fn empty() -> Self {
        Self::new(Vec::new(), None)
    }

    /// Items on this page.
    #[must_use]
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Token for the next page.
    #[must_use]
    pub fn paging(&self) -> Option<&PagingToken> {
        self.paging.as_ref()
    }

    /// Number of items on this page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if the page has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Splits into items and token.
    pub fn into_parts(self) -> (Vec<T>, Option<PagingToken>) {
        (self.items, self.paging)
    }

    /// Maps the items, keeping the token.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page::new(self.items.into_iter().map(f).collect(), self.paging)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_bytes_are_url_safe() {
        let token = PagingToken::from_bytes(&[0xfb, 0xff, 0x00, 0x3e]);
        assert!(!token.as_str().contains(['+', '/', '=']));
        assert_eq!(token.to_bytes().unwrap(), vec![0xfb, 0xff, 0x00, 0x3e]);
    }

    #[test]
    fn garbage_token_is_rejected() {
        let err = PagingToken::new("not base64!").to_bytes().unwrap_err();
        assert!(matches!(err, StorageError::InvalidPagingToken(_)));
    }
}
