//! Primitive field types and the offset-based codec.
//!
//! Every method field has one of nine wire types:
//!
//! | Type      | Wire form                              |
//! |-----------|----------------------------------------|
//! | Bit       | packed with adjacent bits, see `bits`  |
//! | Octet     | 1 byte                                 |
//! | Short     | 2 bytes, uint16 BE                     |
//! | Long      | 4 bytes, uint32 BE                     |
//! | LongLong  | 8 bytes, uint64 BE                     |
//! | ShortStr  | 1-byte length + UTF-8 bytes (max 255)  |
//! | LongStr   | 4-byte BE length + raw bytes           |
//! | Table     | 4-byte BE length + key/tag/value pairs |
//! | Timestamp | 8 bytes, uint64 BE (POSIX seconds)     |
//!
//! All multi-byte integers are Big Endian. The codec works at explicit
//! buffer offsets so callers can lay fields end to end without slicing.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WireError};
use crate::wire::table::FieldTable;

/// Wire-level type of a single method field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WireType {
    /// Single bit; consecutive bits share octets (see `wire::bits`).
    Bit,
    /// Unsigned 8-bit integer.
    Octet,
    /// Unsigned 16-bit integer.
    Short,
    /// Unsigned 32-bit integer.
    Long,
    /// Unsigned 64-bit integer.
    LongLong,
    /// Length-prefixed UTF-8 string, at most 255 bytes.
    ShortStr,
    /// 4-byte length-prefixed byte string.
    LongStr,
    /// Nested field table.
    Table,
    /// 64-bit POSIX timestamp.
    Timestamp,
}

impl WireType {
    /// Human-readable name, used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            WireType::Bit => "bit",
            WireType::Octet => "octet",
            WireType::Short => "short",
            WireType::Long => "long",
            WireType::LongLong => "longlong",
            WireType::ShortStr => "shortstr",
            WireType::LongStr => "longstr",
            WireType::Table => "table",
            WireType::Timestamp => "timestamp",
        }
    }
}

/// A runtime field value.
///
/// Mirrors [`WireType`], plus `Void` which is only legal inside field
/// tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Bit(bool),
    Octet(u8),
    Short(u16),
    Long(u32),
    LongLong(u64),
    ShortStr(String),
    LongStr(Bytes),
    Table(FieldTable),
    Timestamp(u64),
    /// No value. Legal only as a table entry.
    Void,
}

impl FieldValue {
    /// Whether this value is admissible for a field of type `ty`.
    pub fn matches(&self, ty: WireType) -> bool {
        matches!(
            (self, ty),
            (FieldValue::Bit(_), WireType::Bit)
                | (FieldValue::Octet(_), WireType::Octet)
                | (FieldValue::Short(_), WireType::Short)
                | (FieldValue::Long(_), WireType::Long)
                | (FieldValue::LongLong(_), WireType::LongLong)
                | (FieldValue::ShortStr(_), WireType::ShortStr)
                | (FieldValue::LongStr(_), WireType::LongStr)
                | (FieldValue::Table(_), WireType::Table)
                | (FieldValue::Timestamp(_), WireType::Timestamp)
        )
    }

    /// Human-readable name of the value's type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Bit(_) => "bit",
            FieldValue::Octet(_) => "octet",
            FieldValue::Short(_) => "short",
            FieldValue::Long(_) => "long",
            FieldValue::LongLong(_) => "longlong",
            FieldValue::ShortStr(_) => "shortstr",
            FieldValue::LongStr(_) => "longstr",
            FieldValue::Table(_) => "table",
            FieldValue::Timestamp(_) => "timestamp",
            FieldValue::Void => "void",
        }
    }

    /// Get the bool out of a `Bit` value.
    #[inline]
    pub fn as_bit(&self) -> Option<bool> {
        match self {
            FieldValue::Bit(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the u8 out of an `Octet` value.
    #[inline]
    pub fn as_octet(&self) -> Option<u8> {
        match self {
            FieldValue::Octet(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the u16 out of a `Short` value.
    #[inline]
    pub fn as_short(&self) -> Option<u16> {
        match self {
            FieldValue::Short(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the u32 out of a `Long` value.
    #[inline]
    pub fn as_long(&self) -> Option<u32> {
        match self {
            FieldValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the u64 out of a `LongLong` value.
    #[inline]
    pub fn as_long_long(&self) -> Option<u64> {
        match self {
            FieldValue::LongLong(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the string out of a `ShortStr` value.
    #[inline]
    pub fn as_short_str(&self) -> Option<&str> {
        match self {
            FieldValue::ShortStr(v) => Some(v),
            _ => None,
        }
    }

    /// Get the bytes out of a `LongStr` value.
    #[inline]
    pub fn as_long_str(&self) -> Option<&Bytes> {
        match self {
            FieldValue::LongStr(v) => Some(v),
            _ => None,
        }
    }

    /// Get the table out of a `Table` value.
    #[inline]
    pub fn as_table(&self) -> Option<&FieldTable> {
        match self {
            FieldValue::Table(v) => Some(v),
            _ => None,
        }
    }

    /// Get the u64 out of a `Timestamp` value.
    #[inline]
    pub fn as_timestamp(&self) -> Option<u64> {
        match self {
            FieldValue::Timestamp(v) => Some(*v),
            _ => None,
        }
    }
}

/// Exact wire size of a non-bit value in bytes.
///
/// `Bit` values occupy no standalone bytes; runs of them are sized by
/// [`crate::wire::bits::packed_len`]. `Void` is 0 (tag-only in tables).
pub fn encoded_size(value: &FieldValue) -> usize {
    match value {
        FieldValue::Bit(_) | FieldValue::Void => 0,
        FieldValue::Octet(_) => 1,
        FieldValue::Short(_) => 2,
        FieldValue::Long(_) => 4,
        FieldValue::LongLong(_) | FieldValue::Timestamp(_) => 8,
        FieldValue::ShortStr(s) => 1 + s.len(),
        FieldValue::LongStr(b) => 4 + b.len(),
        FieldValue::Table(t) => t.encoded_len(),
    }
}

/// Encode a single non-bit value at `offset`. Returns the offset just
/// past the written bytes.
///
/// Fails with `BufferTooSmall` when the buffer cannot hold the value
/// (recoverable: grow the buffer and retry) and `FieldTooLong` for a
/// short string over 255 bytes.
pub fn encode_value(buf: &mut [u8], offset: usize, value: &FieldValue) -> Result<usize> {
    match value {
        FieldValue::Bit(_) => Err(WireError::Protocol(
            "bit fields are packed in runs, not encoded individually".to_string(),
        )),
        FieldValue::Octet(v) => {
            ensure_space(buf, offset, 1)?;
            buf[offset] = *v;
            Ok(offset + 1)
        }
        FieldValue::Short(v) => put_bytes(buf, offset, &v.to_be_bytes()),
        FieldValue::Long(v) => put_bytes(buf, offset, &v.to_be_bytes()),
        FieldValue::LongLong(v) | FieldValue::Timestamp(v) => {
            put_bytes(buf, offset, &v.to_be_bytes())
        }
        FieldValue::ShortStr(s) => encode_short_str(buf, offset, s),
        FieldValue::LongStr(b) => {
            ensure_space(buf, offset, 4 + b.len())?;
            buf[offset..offset + 4].copy_from_slice(&(b.len() as u32).to_be_bytes());
            buf[offset + 4..offset + 4 + b.len()].copy_from_slice(b);
            Ok(offset + 4 + b.len())
        }
        FieldValue::Table(t) => t.encode(buf, offset),
        FieldValue::Void => Err(WireError::Protocol(
            "void is only legal inside field tables".to_string(),
        )),
    }
}

/// Decode a single non-bit value of type `ty` at `offset`. Returns the
/// value and the offset just past it.
///
/// A buffer that ends mid-value is malformed input, reported as
/// `Protocol` (decoding has no recoverable short-buffer case: the frame
/// envelope already delivered the complete payload).
pub fn decode_value(buf: &[u8], offset: usize, ty: WireType) -> Result<(FieldValue, usize)> {
    match ty {
        WireType::Bit => Err(WireError::Protocol(
            "bit fields are decoded from packed runs, not individually".to_string(),
        )),
        WireType::Octet => {
            ensure_bytes(buf, offset, 1)?;
            Ok((FieldValue::Octet(buf[offset]), offset + 1))
        }
        WireType::Short => {
            ensure_bytes(buf, offset, 2)?;
            let v = u16::from_be_bytes([buf[offset], buf[offset + 1]]);
            Ok((FieldValue::Short(v), offset + 2))
        }
        WireType::Long => {
            ensure_bytes(buf, offset, 4)?;
            let v = u32::from_be_bytes([
                buf[offset],
                buf[offset + 1],
                buf[offset + 2],
                buf[offset + 3],
            ]);
            Ok((FieldValue::Long(v), offset + 4))
        }
        WireType::LongLong => {
            let (v, next) = decode_u64(buf, offset)?;
            Ok((FieldValue::LongLong(v), next))
        }
        WireType::Timestamp => {
            let (v, next) = decode_u64(buf, offset)?;
            Ok((FieldValue::Timestamp(v), next))
        }
        WireType::ShortStr => {
            let (s, next) = decode_short_str(buf, offset)?;
            Ok((FieldValue::ShortStr(s), next))
        }
        WireType::LongStr => {
            ensure_bytes(buf, offset, 4)?;
            let len = u32::from_be_bytes([
                buf[offset],
                buf[offset + 1],
                buf[offset + 2],
                buf[offset + 3],
            ]) as usize;
            ensure_bytes(buf, offset + 4, len)?;
            let b = Bytes::copy_from_slice(&buf[offset + 4..offset + 4 + len]);
            Ok((FieldValue::LongStr(b), offset + 4 + len))
        }
        WireType::Table => {
            let (t, next) = FieldTable::decode(buf, offset)?;
            Ok((FieldValue::Table(t), next))
        }
    }
}

/// Encode a length-prefixed short string at `offset`.
pub(crate) fn encode_short_str(buf: &mut [u8], offset: usize, s: &str) -> Result<usize> {
    if s.len() > 255 {
        return Err(WireError::FieldTooLong { len: s.len() });
    }
    ensure_space(buf, offset, 1 + s.len())?;
    buf[offset] = s.len() as u8;
    buf[offset + 1..offset + 1 + s.len()].copy_from_slice(s.as_bytes());
    Ok(offset + 1 + s.len())
}

/// Decode a length-prefixed short string at `offset`.
pub(crate) fn decode_short_str(buf: &[u8], offset: usize) -> Result<(String, usize)> {
    ensure_bytes(buf, offset, 1)?;
    let len = buf[offset] as usize;
    ensure_bytes(buf, offset + 1, len)?;
    let s = std::str::from_utf8(&buf[offset + 1..offset + 1 + len])
        .map_err(|_| WireError::Protocol("short string is not valid UTF-8".to_string()))?;
    Ok((s.to_string(), offset + 1 + len))
}

fn decode_u64(buf: &[u8], offset: usize) -> Result<(u64, usize)> {
    ensure_bytes(buf, offset, 8)?;
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    Ok((u64::from_be_bytes(bytes), offset + 8))
}

fn put_bytes(buf: &mut [u8], offset: usize, bytes: &[u8]) -> Result<usize> {
    ensure_space(buf, offset, bytes.len())?;
    buf[offset..offset + bytes.len()].copy_from_slice(bytes);
    Ok(offset + bytes.len())
}

/// Check encode-side space past `offset`, reporting how much was needed.
pub(crate) fn ensure_space(buf: &[u8], offset: usize, needed: usize) -> Result<()> {
    let available = buf.len().saturating_sub(offset);
    if available < needed {
        return Err(WireError::BufferTooSmall { needed, available });
    }
    Ok(())
}

/// Check decode-side bytes past `offset`; a shortfall means a malformed
/// buffer.
pub(crate) fn ensure_bytes(buf: &[u8], offset: usize, needed: usize) -> Result<()> {
    if buf.len().saturating_sub(offset) < needed {
        return Err(WireError::Protocol(format!(
            "truncated field: need {} bytes at offset {}, buffer has {}",
            needed,
            offset,
            buf.len()
        )));
    }
    Ok(())
}
