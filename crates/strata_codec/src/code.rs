//! Type discriminant codes.

use crate::error::{CodecError, CodecResult};
use std::fmt;

/// Discriminant tag written ahead of every self-describing value.
///
/// The numeric values are part of the persisted format and must never be
/// reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Code {
    /// Absent value.
    Null = 0,
    /// Boolean.
    Boolean = 1,
    /// 64-bit signed integer.
    Integer = 2,
    /// 64-bit float.
    Number = 3,
    /// UTF-8 string.
    String = 4,
    /// Enum value (string encoded).
    Enum = 5,
    /// Reference to an object (id encoded).
    Ref = 6,
    /// Ordered collection.
    Array = 7,
    /// Unordered, deduplicated collection.
    Set = 8,
    /// String-keyed map.
    Map = 9,
    /// By-value struct.
    Struct = 10,
    /// Raw bytes.
    Binary = 11,
    /// Calendar date.
    Date = 12,
    /// UTC instant.
    DateTime = 13,
    /// View record reference.
    View = 14,
    /// Opaque secret bytes.
    Secret = 15,
    /// Self-describing value of any type.
    Any = 16,
}

impl Code {
    /// Returns the byte written for this code.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parses a code byte.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownCode`] for bytes outside the known range.
    pub fn from_u8(byte: u8) -> CodecResult<Self> {
        Ok(match byte {
            0 => Code::Null,
            1 => Code::Boolean,
            2 => Code::Integer,
            3 => Code::Number,
            4 => Code::String,
            5 => Code::Enum,
            6 => Code::Ref,
            7 => Code::Array,
            8 => Code::Set,
            9 => Code::Map,
            10 => Code::Struct,
            11 => Code::Binary,
            12 => Code::Date,
            13 => Code::DateTime,
            14 => Code::View,
            15 => Code::Secret,
            16 => Code::Any,
            code => return Err(CodecError::UnknownCode { code }),
        })
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Code::Null => "null",
            Code::Boolean => "boolean",
            Code::Integer => "integer",
            Code::Number => "number",
            Code::String => "string",
            Code::Enum => "enum",
            Code::Ref => "ref",
            Code::Array => "array",
            Code::Set => "set",
            Code::Map => "map",
            Code::Struct => "struct",
            Code::Binary => "binary",
            Code::Date => "date",
            Code::DateTime => "datetime",
            Code::View => "view",
            Code::Secret => "secret",
            Code::Any => "any",
        };
        f.write_str(name)
    }
}
