//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding, decoding or value comparison.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode a value.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode bytes.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// Invalid UTF-8 string.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// Unexpected end of input.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Unknown type code in the input.
    #[error("unknown type code: {code}")]
    UnknownCode {
        /// The offending code byte.
        code: u8,
    },

    /// A length prefix exceeds the configured limit.
    #[error("size limit exceeded: claimed {claimed}, max allowed {max_allowed}")]
    SizeLimitExceeded {
        /// The size claimed by the input.
        claimed: u64,
        /// The maximum size accepted.
        max_allowed: u64,
    },

    /// Two values cannot be ordered against each other.
    #[error("cannot compare {left} with {right}")]
    Incomparable {
        /// Type name of the left operand.
        left: &'static str,
        /// Type name of the right operand.
        right: &'static str,
    },
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Create an incomparable-values error.
    pub fn incomparable(left: &'static str, right: &'static str) -> Self {
        Self::Incomparable { left, right }
    }
}
