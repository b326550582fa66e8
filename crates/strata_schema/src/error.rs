//! Error types for the schema model.

use strata_codec::CodecError;
use thiserror::Error;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors raised while building schemas, coercing values or evaluating
/// expressions.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchemaError {
    /// A raw value cannot be coerced to its declared type.
    #[error("invalid type: expected {expected}, got {actual}")]
    InvalidType {
        /// The declared type.
        expected: String,
        /// The type (or value) that was supplied.
        actual: String,
    },

    /// A schema has no member with the requested name.
    #[error("schema {schema} has no member {member}")]
    MissingMember {
        /// Schema that was searched.
        schema: String,
        /// Member that was not found.
        member: String,
    },

    /// No schema with the requested name exists.
    #[error("missing type: {name}")]
    MissingType {
        /// Name that could not be resolved.
        name: String,
    },

    /// A schema or member uses a reserved metadata name.
    #[error("reserved name: {name}")]
    ReservedName {
        /// The offending name.
        name: String,
    },

    /// A descriptor violates a schema rule.
    #[error("schema validation failed: {message}")]
    Validation {
        /// Description of the violation.
        message: String,
    },

    /// An expression failed to parse or evaluate.
    #[error("expression error: {message}")]
    Expression {
        /// Description of the failure.
        message: String,
    },

    /// A descriptor document could not be read or written.
    #[error("descriptor error: {message}")]
    Descriptor {
        /// Description of the failure.
        message: String,
    },

    /// Binary codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl SchemaError {
    /// Creates an invalid type error.
    pub fn invalid_type(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::InvalidType {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a missing member error.
    pub fn missing_member(schema: impl Into<String>, member: impl Into<String>) -> Self {
        Self::MissingMember {
            schema: schema.into(),
            member: member.into(),
        }
    }

    /// Creates a missing type error.
    pub fn missing_type(name: impl Into<String>) -> Self {
        Self::MissingType { name: name.into() }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an expression error.
    pub fn expression(message: impl Into<String>) -> Self {
        Self::Expression {
            message: message.into(),
        }
    }

    /// Creates a descriptor error.
    pub fn descriptor(message: impl Into<String>) -> Self {
        Self::Descriptor {
            message: message.into(),
        }
    }
}
