//! # Strata Codec
//!
//! Dynamic values and canonical binary encoding for Strata.
//!
//! This crate provides:
//! - [`Value`], the dynamic representation of every typed field
//! - promotion-aware [`equals`] and [`compare`]
//! - a deterministic big-endian binary encoder/decoder used for at-rest
//!   storage of typed values and for paging tokens
//!
//! ## Binary Layout
//!
//! - Scalars are fixed width (`bool` 1 byte, integers and floats 8 bytes)
//! - Strings and binary are `i32` length + bytes
//! - Collections are `i32` count + elements
//! - Dates are epoch days, instants are epoch milliseconds
//!
//! ## Usage
//!
//! ```
//! use strata_codec::{to_binary, from_binary, Value};
//!
//! let value = Value::Integer(42);
//! let bytes = to_binary(&value).unwrap();
//! assert_eq!(from_binary(&bytes).unwrap(), value);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod code;
mod compare;
mod decoder;
mod encoder;
mod error;
mod value;

pub use code::Code;
pub use compare::{compare, equals};
pub use decoder::{from_binary, BinaryDecoder};
pub use encoder::{to_binary, BinaryEncoder};
pub use error::{CodecError, CodecResult};
pub use value::{date_to_datetime, format_datetime, parse_date, parse_datetime, Secret, Value};

/// Trait for types that can be encoded to canonical bytes.
pub trait Encode {
    /// Encode this value to canonical bytes.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Trait for types that can be decoded from canonical bytes.
pub trait Decode: Sized {
    /// Decode this value from bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl Encode for Value {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_binary(self)
    }
}

impl Decode for Value {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_binary(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Integer),
            any::<f64>()
                .prop_filter("NaN never equals itself", |f| !f.is_nan())
                .prop_map(Value::Number),
            ".{0,16}".prop_map(Value::String),
            prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Binary),
        ]
    }

    fn nested() -> impl Strategy<Value = Value> {
        scalar().prop_recursive(3, 32, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(Value::Map),
            ]
        })
    }

    proptest! {
        #[test]
        fn binary_roundtrip(value in nested()) {
            let bytes = value.encode().unwrap();
            prop_assert_eq!(Value::decode(&bytes).unwrap(), value);
        }

        #[test]
        fn encoding_is_deterministic(value in nested()) {
            prop_assert_eq!(to_binary(&value).unwrap(), to_binary(&value.clone()).unwrap());
        }
    }
}
