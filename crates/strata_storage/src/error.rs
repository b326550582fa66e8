//! Error types for storage operations.

use strata_codec::CodecError;
use strata_schema::SchemaError;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StorageError {
    /// Create found an object with the same id.
    #[error("object {schema}/{id} already exists")]
    ObjectExists {
        /// Schema written to.
        schema: String,
        /// Conflicting id.
        id: String,
    },

    /// The stored version differs from the caller's `before` version.
    #[error("object {schema}/{id} is at version {actual:?}, expected {expected:?}")]
    VersionMismatch {
        /// Schema written to.
        schema: String,
        /// Object id.
        id: String,
        /// Version the caller expected.
        expected: Option<i64>,
        /// Version currently stored.
        actual: Option<i64>,
    },

    /// Update or delete of an object that does not exist.
    #[error("object {schema}/{id} does not exist")]
    ObjectMissing {
        /// Schema written to.
        schema: String,
        /// Missing id.
        id: String,
    },

    /// The backend cannot honour the request.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A paging token that this query did not produce.
    #[error("invalid paging token: {0}")]
    InvalidPagingToken(String),

    /// Schema lookup or coercion error.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Value encoding error.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl StorageError {
    /// Create an object exists error.
    pub fn object_exists(schema: impl Into<String>, id: impl Into<String>) -> Self {
        Self::ObjectExists {
            schema: schema.into(),
            id: id.into(),
        }
    }

    /// Create an object missing error.
    pub fn object_missing(schema: impl Into<String>, id: impl Into<String>) -> Self {
        Self::ObjectMissing {
            schema: schema.into(),
            id: id.into(),
        }
    }

    /// Create an unsupported error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// Create an invalid paging token error.
    pub fn invalid_paging_token(message: impl Into<String>) -> Self {
        Self::InvalidPagingToken(message.into())
    }
}
