//! Wire primitives
//!
//! Shared building blocks for WAL records and snapshot payloads.
//!
//! ## Primitives
//! ```text
//! int32 / int64     fixed-width little-endian
//! string            [len+1: i32][utf-8 bytes]     (len field 0 = null)
//! bytes             [len+1: i32][raw bytes]       (len field 0 = null)
//! varint            zigzag, then base-128 groups, low group first
//! ```
//!
//! Decoding separates "ran out of bytes" from "bytes make no sense": a WAL
//! reader treats the first at the tail of a file as a torn write and the
//! second anywhere as corruption.

use bytes::{Buf, BufMut, Bytes};
use thiserror::Error;

/// Longest encoding of a 64-bit varint
const MAX_VARINT_LEN: usize = 10;

/// Decoding failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Input ended in the middle of a value
    #[error("incomplete input: {needed} more bytes required")]
    Incomplete { needed: usize },

    /// Input is structurally wrong
    #[error("invalid input: {0}")]
    Invalid(String),
}

// =============================================================================
// Encoding
// =============================================================================

pub fn put_i32(buf: &mut Vec<u8>, value: i32) {
    buf.put_i32_le(value);
}

pub fn put_i64(buf: &mut Vec<u8>, value: i64) {
    buf.put_i64_le(value);
}

/// Length-prefixed string, `None` encodes as a zero length field
pub fn put_string(buf: &mut Vec<u8>, value: Option<&str>) {
    put_bytes(buf, value.map(str::as_bytes));
}

/// Length-prefixed byte array, `None` encodes as a zero length field
pub fn put_bytes(buf: &mut Vec<u8>, value: Option<&[u8]>) {
    match value {
        None => buf.put_i32_le(0),
        Some(bytes) => {
            buf.put_i32_le(bytes.len() as i32 + 1);
            buf.put_slice(bytes);
        }
    }
}

/// ZigZag + base-128 variable-length signed integer
pub fn put_varint(buf: &mut Vec<u8>, value: i64) {
    let mut v = ((value << 1) ^ (value >> 63)) as u64;
    while v >= 0x80 {
        buf.put_u8((v as u8) | 0x80);
        v >>= 7;
    }
    buf.put_u8(v as u8);
}

// =============================================================================
// Decoding
// =============================================================================

/// Cursor over an encoded buffer
pub struct Decoder<'a> {
    buf: &'a [u8],
    consumed: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, consumed: 0 }
    }

    /// Bytes consumed so far
    pub fn position(&self) -> usize {
        self.consumed
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn need(&self, count: usize) -> Result<(), CodecError> {
        if self.buf.len() < count {
            return Err(CodecError::Incomplete {
                needed: count - self.buf.len(),
            });
        }
        Ok(())
    }

    pub fn get_u8(&mut self) -> Result<u8, CodecError> {
        self.need(1)?;
        self.consumed += 1;
        Ok(self.buf.get_u8())
    }

    pub fn get_i32(&mut self) -> Result<i32, CodecError> {
        self.need(4)?;
        self.consumed += 4;
        Ok(self.buf.get_i32_le())
    }

    pub fn get_i64(&mut self) -> Result<i64, CodecError> {
        self.need(8)?;
        self.consumed += 8;
        Ok(self.buf.get_i64_le())
    }

    /// Length-prefixed byte array (`None` for the null encoding)
    pub fn get_bytes(&mut self) -> Result<Option<Bytes>, CodecError> {
        let stored = self.get_i32()?;
        if stored < 0 {
            return Err(CodecError::Invalid(format!(
                "negative length field {}",
                stored
            )));
        }
        if stored == 0 {
            return Ok(None);
        }
        let len = (stored - 1) as usize;
        self.need(len)?;
        let bytes = Bytes::copy_from_slice(&self.buf[..len]);
        self.buf.advance(len);
        self.consumed += len;
        Ok(Some(bytes))
    }

    /// Length-prefixed string (`None` for the null encoding)
    pub fn get_string(&mut self) -> Result<Option<String>, CodecError> {
        match self.get_bytes()? {
            None => Ok(None),
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|e| CodecError::Invalid(format!("string is not utf-8: {}", e))),
        }
    }

    /// A string field that must not be null
    pub fn get_required_string(&mut self, field: &str) -> Result<String, CodecError> {
        self.get_string()?
            .ok_or_else(|| CodecError::Invalid(format!("{} must not be null", field)))
    }

    /// A byte array field that must not be null
    pub fn get_required_bytes(&mut self, field: &str) -> Result<Bytes, CodecError> {
        self.get_bytes()?
            .ok_or_else(|| CodecError::Invalid(format!("{} must not be null", field)))
    }

    pub fn get_varint(&mut self) -> Result<i64, CodecError> {
        let mut raw: u64 = 0;
        for i in 0..MAX_VARINT_LEN {
            let byte = self.get_u8()?;
            raw |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64));
            }
        }
        Err(CodecError::Invalid("varint longer than 10 bytes".to_string()))
    }

    /// A varint that must be a non-negative `u64`
    pub fn get_unsigned_varint(&mut self, field: &str) -> Result<u64, CodecError> {
        let value = self.get_varint()?;
        u64::try_from(value)
            .map_err(|_| CodecError::Invalid(format!("{} must not be negative: {}", field, value)))
    }
}
