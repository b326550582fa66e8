//! Canonical binary encoder.

use crate::code::Code;
use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use bytes::{BufMut, BytesMut};
use chrono::{DateTime, Datelike, NaiveDate, Utc};

/// Days between 0001-01-01 (CE day 1) and the Unix epoch.
pub(crate) const EPOCH_DAYS_FROM_CE: i64 = 719_163;

/// Encode a value in the self-describing binary form.
///
/// Every node is written as its [`Code`] byte followed by the payload, so
/// the bytes can be decoded without a schema.
///
/// # Errors
///
/// Returns an error if a length does not fit the `i32` length prefix.
pub fn to_binary(value: &Value) -> CodecResult<Vec<u8>> {
    let mut encoder = BinaryEncoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}

/// A canonical binary encoder.
///
/// All multi-byte scalars are big-endian and fixed width. Variable length
/// payloads (strings, binary, collections) carry an `i32` length or count
/// prefix. Two encoders fed the same calls always produce identical bytes.
#[derive(Debug, Default)]
pub struct BinaryEncoder {
    buffer: BytesMut,
}

impl BinaryEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new encoder with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Consume this encoder and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer.to_vec()
    }

    /// Get a reference to the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Writes a type code byte.
    pub fn write_code(&mut self, code: Code) {
        self.buffer.put_u8(code.as_u8());
    }

    /// Writes a single raw byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.put_u8(value);
    }

    /// Writes a boolean as one byte (`0` or `1`).
    pub fn write_bool(&mut self, value: bool) {
        self.buffer.put_u8(u8::from(value));
    }

    /// Writes a big-endian `i32`.
    pub fn write_i32(&mut self, value: i32) {
        self.buffer.put_i32(value);
    }

    /// Writes a big-endian `i64`.
    pub fn write_i64(&mut self, value: i64) {
        self.buffer.put_i64(value);
    }

    /// Writes the IEEE-754 bits of an `f64`, big-endian.
    pub fn write_f64(&mut self, value: f64) {
        self.buffer.put_f64(value);
    }

    /// Writes a length or count prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if `len` does not fit in an `i32`.
    pub fn write_len(&mut self, len: usize) -> CodecResult<()> {
        let len = i32::try_from(len)
            .map_err(|_| CodecError::encoding_failed(format!("length {len} exceeds i32")))?;
        self.write_i32(len);
        Ok(())
    }

    /// Writes a length-prefixed UTF-8 string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is longer than `i32::MAX` bytes.
    pub fn write_string(&mut self, value: &str) -> CodecResult<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Writes a length-prefixed byte blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob is longer than `i32::MAX` bytes.
    pub fn write_bytes(&mut self, value: &[u8]) -> CodecResult<()> {
        self.write_len(value.len())?;
        self.buffer.put_slice(value);
        Ok(())
    }

    /// Writes a date as `i64` days since the Unix epoch.
    pub fn write_date(&mut self, value: NaiveDate) {
        self.write_i64(i64::from(value.num_days_from_ce()) - EPOCH_DAYS_FROM_CE);
    }

    /// Writes an instant as `i64` milliseconds since the Unix epoch.
    pub fn write_datetime(&mut self, value: &DateTime<Utc>) {
        self.write_i64(value.timestamp_millis());
    }

    /// Encodes a value in self-describing form (code + payload).
    ///
    /// # Errors
    ///
    /// Returns an error if a length prefix overflows.
    pub fn encode(&mut self, value: &Value) -> CodecResult<()> {
        self.write_code(value.code());
        match value {
            Value::Null => Ok(()),
            Value::Bool(b) => {
                self.write_bool(*b);
                Ok(())
            }
            Value::Integer(n) => {
                self.write_i64(*n);
                Ok(())
            }
            Value::Number(n) => {
                self.write_f64(*n);
                Ok(())
            }
            Value::String(s) => self.write_string(s),
            Value::Binary(b) => self.write_bytes(b),
            Value::Secret(s) => self.write_bytes(s.as_bytes()),
            Value::Date(d) => {
                self.write_date(*d);
                Ok(())
            }
            Value::DateTime(dt) => {
                self.write_datetime(dt);
                Ok(())
            }
            Value::Array(items) => {
                self.write_len(items.len())?;
                for item in items {
                    self.encode(item)?;
                }
                Ok(())
            }
            Value::Map(entries) => {
                self.write_len(entries.len())?;
                for (key, item) in entries {
                    self.write_string(key)?;
                    self.encode(item)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_null() {
        assert_eq!(to_binary(&Value::Null).unwrap(), vec![0x00]);
    }

    #[test]
    fn encode_bool() {
        assert_eq!(to_binary(&Value::Bool(false)).unwrap(), vec![0x01, 0x00]);
        assert_eq!(to_binary(&Value::Bool(true)).unwrap(), vec![0x01, 0x01]);
    }

    #[test]
    fn encode_integer_is_fixed_width_big_endian() {
        assert_eq!(
            to_binary(&Value::Integer(1)).unwrap(),
            vec![0x02, 0, 0, 0, 0, 0, 0, 0, 1]
        );
        assert_eq!(
            to_binary(&Value::Integer(-1)).unwrap(),
            vec![0x02, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
        );
    }

    #[test]
    fn encode_string_is_length_prefixed() {
        assert_eq!(
            to_binary(&Value::from("hi")).unwrap(),
            vec![0x04, 0, 0, 0, 2, b'h', b'i']
        );
        assert_eq!(
            to_binary(&Value::from("")).unwrap(),
            vec![0x04, 0, 0, 0, 0]
        );
    }

    #[test]
    fn encode_array_has_count_prefix() {
        let value = Value::Array(vec![Value::Bool(true), Value::Null]);
        assert_eq!(
            to_binary(&value).unwrap(),
            vec![0x07, 0, 0, 0, 2, 0x01, 0x01, 0x00]
        );
    }

    #[test]
    fn encode_date_as_epoch_days() {
        let date = NaiveDate::from_ymd_opt(1970, 1, 2).unwrap();
        assert_eq!(
            to_binary(&Value::Date(date)).unwrap(),
            vec![0x0c, 0, 0, 0, 0, 0, 0, 0, 1]
        );
    }

    #[test]
    fn deterministic_map_encoding() {
        let a = Value::map([("z", Value::Integer(1)), ("a", Value::Integer(2))]);
        let b = Value::map([("a", Value::Integer(2)), ("z", Value::Integer(1))]);
        assert_eq!(to_binary(&a).unwrap(), to_binary(&b).unwrap());
    }
}
