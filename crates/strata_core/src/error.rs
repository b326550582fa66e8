//! Error types for Strata core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors returned to callers of the core API.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    /// Storage backend error, including concurrency failures.
    #[error("storage error: {0}")]
    Storage(#[from] strata_storage::StorageError),

    /// Schema, coercion or expression error.
    #[error("schema error: {0}")]
    Schema(#[from] strata_schema::SchemaError),

    /// Value codec error.
    #[error("codec error: {0}")]
    Codec(#[from] strata_codec::CodecError),

    /// The object does not exist.
    #[error("object not found: {schema}/{id}")]
    NotFound {
        /// Schema read from.
        schema: String,
        /// Requested id.
        id: String,
    },

    /// The schema is abstract.
    #[error("schema {schema} is not concrete")]
    NotConcrete {
        /// Schema name.
        schema: String,
    },
}

impl CoreError {
    /// Create a not found error.
    pub fn not_found(schema: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            schema: schema.into(),
            id: id.into(),
        }
    }

    /// True if this wraps a failed optimistic concurrency check.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::Storage(
                strata_storage::StorageError::ObjectExists { .. }
                    | strata_storage::StorageError::VersionMismatch { .. }
            )
        )
    }
}
