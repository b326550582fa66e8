//! Canonical binary decoder.

use crate::code::Code;
use crate::encoder::EPOCH_DAYS_FROM_CE;
use crate::error::{CodecError, CodecResult};
use crate::value::{Secret, Value};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;

/// Decode a self-describing value.
///
/// # Errors
///
/// Returns an error if the bytes are truncated, carry an unknown code, or
/// leave trailing data.
pub fn from_binary(bytes: &[u8]) -> CodecResult<Value> {
    let mut decoder = BinaryDecoder::new(bytes);
    let value = decoder.decode()?;
    if !decoder.is_empty() {
        return Err(CodecError::decoding_failed(format!(
            "{} trailing bytes",
            decoder.remaining().len()
        )));
    }
    Ok(value)
}

/// Maximum allowed element count for arrays and maps.
/// This prevents allocation-based DoS from untrusted input.
const MAX_CONTAINER_ELEMENTS: u64 = 16 * 1024 * 1024;

/// Maximum allowed byte/string length.
const MAX_BYTES_LENGTH: u64 = 256 * 1024 * 1024;

/// A canonical binary decoder, the inverse of
/// [`BinaryEncoder`](crate::BinaryEncoder).
pub struct BinaryDecoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BinaryDecoder<'a> {
    /// Create a new decoder for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Check if all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get remaining bytes.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    fn take(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(CodecError::UnexpectedEof)?;
        if end > self.data.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Reads a single raw byte.
    pub fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.take_array::<1>()?[0])
    }

    /// Reads a type code byte.
    pub fn read_code(&mut self) -> CodecResult<Code> {
        Code::from_u8(self.read_u8()?)
    }

    /// Reads a one-byte boolean; only `0` and `1` are accepted.
    pub fn read_bool(&mut self) -> CodecResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::decoding_failed(format!(
                "invalid boolean byte {other}"
            ))),
        }
    }

    /// Reads a big-endian `i32`.
    pub fn read_i32(&mut self) -> CodecResult<i32> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    /// Reads a big-endian `i64`.
    pub fn read_i64(&mut self) -> CodecResult<i64> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    /// Reads a big-endian `f64`.
    pub fn read_f64(&mut self) -> CodecResult<f64> {
        Ok(f64::from_be_bytes(self.take_array()?))
    }

    fn read_prefix(&mut self, max: u64) -> CodecResult<usize> {
        let len = self.read_i32()?;
        let len = u64::try_from(len)
            .map_err(|_| CodecError::decoding_failed(format!("negative length {len}")))?;
        if len > max {
            return Err(CodecError::SizeLimitExceeded {
                claimed: len,
                max_allowed: max,
            });
        }
        usize::try_from(len).map_err(|_| CodecError::decoding_failed("length overflows usize"))
    }

    /// Reads a collection count prefix.
    pub fn read_len(&mut self) -> CodecResult<usize> {
        self.read_prefix(MAX_CONTAINER_ELEMENTS)
    }

    /// Reads a length-prefixed byte blob.
    pub fn read_bytes(&mut self) -> CodecResult<Vec<u8>> {
        let len = self.read_prefix(MAX_BYTES_LENGTH)?;
        Ok(self.take(len)?.to_vec())
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> CodecResult<String> {
        let len = self.read_prefix(MAX_BYTES_LENGTH)?;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| CodecError::InvalidUtf8)
    }

    /// Reads a date written as epoch days.
    pub fn read_date(&mut self) -> CodecResult<NaiveDate> {
        let days = self.read_i64()?;
        days.checked_add(EPOCH_DAYS_FROM_CE)
            .and_then(|ce| i32::try_from(ce).ok())
            .and_then(NaiveDate::from_num_days_from_ce_opt)
            .ok_or_else(|| CodecError::decoding_failed(format!("date out of range: {days}")))
    }

    /// Reads an instant written as epoch milliseconds.
    pub fn read_datetime(&mut self) -> CodecResult<DateTime<Utc>> {
        let millis = self.read_i64()?;
        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| CodecError::decoding_failed(format!("instant out of range: {millis}")))
    }

    /// Decodes the next self-describing value.
    pub fn decode(&mut self) -> CodecResult<Value> {
        let code = self.read_code()?;
        self.decode_payload(code)
    }

    fn decode_payload(&mut self, code: Code) -> CodecResult<Value> {
        match code {
            Code::Null => Ok(Value::Null),
            Code::Boolean => self.read_bool().map(Value::Bool),
            Code::Integer => self.read_i64().map(Value::Integer),
            Code::Number => self.read_f64().map(Value::Number),
            Code::String | Code::Enum => self.read_string().map(Value::String),
            Code::Binary => self.read_bytes().map(Value::Binary),
            Code::Secret => self.read_bytes().map(|b| Value::Secret(Secret::new(b))),
            Code::Date => self.read_date().map(Value::Date),
            Code::DateTime => self.read_datetime().map(Value::DateTime),
            Code::Array | Code::Set => {
                let len = self.read_len()?;
                let mut items = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    items.push(self.decode()?);
                }
                Ok(Value::Array(items))
            }
            Code::Map => {
                let len = self.read_len()?;
                let mut entries = BTreeMap::new();
                for _ in 0..len {
                    let key = self.read_string()?;
                    entries.insert(key, self.decode()?);
                }
                Ok(Value::Map(entries))
            }
            Code::Ref | Code::Struct | Code::View | Code::Any => Err(
                CodecError::decoding_failed(format!("code {code} requires a schema to decode")),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::to_binary;

    #[test]
    fn decode_truncated_input_fails() {
        assert_eq!(from_binary(&[0x02, 0, 0]), Err(CodecError::UnexpectedEof));
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        assert!(matches!(
            from_binary(&[0x00, 0x00]),
            Err(CodecError::DecodingFailed { .. })
        ));
    }

    #[test]
    fn decode_rejects_negative_length() {
        let bytes = [0x04, 0xff, 0xff, 0xff, 0xff];
        assert!(matches!(
            from_binary(&bytes),
            Err(CodecError::DecodingFailed { .. })
        ));
    }

    #[test]
    fn decode_rejects_invalid_bool() {
        assert!(from_binary(&[0x01, 0x02]).is_err());
    }

    #[test]
    fn decode_rejects_invalid_utf8() {
        let bytes = [0x04, 0, 0, 0, 1, 0xff];
        assert_eq!(from_binary(&bytes), Err(CodecError::InvalidUtf8));
    }

    #[test]
    fn scalar_boundaries_roundtrip() {
        for value in [
            Value::Integer(i64::MIN),
            Value::Integer(i64::MAX),
            Value::Integer(0),
            Value::Number(f64::MIN_POSITIVE),
            Value::Number(-0.5),
            Value::from(""),
        ] {
            assert_eq!(from_binary(&to_binary(&value).unwrap()).unwrap(), value);
        }
    }

    #[test]
    fn nested_roundtrip() {
        let value = Value::map([
            ("tags", Value::Array(vec![Value::from("a"), Value::from("b")])),
            ("empty", Value::Array(vec![])),
            ("blob", Value::Binary(vec![0, 255])),
            (
                "when",
                Value::DateTime(DateTime::from_timestamp_millis(1_700_000_000_123).unwrap()),
            ),
        ]);
        assert_eq!(from_binary(&to_binary(&value).unwrap()).unwrap(), value);
    }
}
