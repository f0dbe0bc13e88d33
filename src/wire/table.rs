//! Field tables.
//!
//! A field table maps short-string keys to tagged values and may nest
//! arbitrarily. On the wire a table is a 4-byte BE byte-length prefix
//! followed by entries, each entry being:
//!
//! ```text
//! ┌────────────────┬───────┬──────────────┐
//! │ key (shortstr) │ tag   │ value bytes  │
//! │ 1 B len + key  │ 1 B   │ per tag      │
//! └────────────────┴───────┴──────────────┘
//! ```
//!
//! Tags cover the types this codec speaks: `t` bool, `B` octet, `u` short,
//! `i` long, `l` longlong, `S` long string, `T` timestamp, `F` nested
//! table, `V` void. Short strings are not legal table values (dropped from
//! the grammar by the 0-9-1 errata); unknown tags reject the whole buffer.
//!
//! Entries are kept ordered (BTreeMap) so encoding is deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WireError};
use crate::wire::field::{
    decode_short_str, decode_value, encode_short_str, encode_value, encoded_size, ensure_bytes,
    ensure_space, FieldValue, WireType,
};

/// Table value tag octets.
mod tag {
    pub const BOOL: u8 = b't';
    pub const OCTET: u8 = b'B';
    pub const SHORT: u8 = b'u';
    pub const LONG: u8 = b'i';
    pub const LONG_LONG: u8 = b'l';
    pub const LONG_STR: u8 = b'S';
    pub const TIMESTAMP: u8 = b'T';
    pub const TABLE: u8 = b'F';
    pub const VOID: u8 = b'V';
}

/// An ordered field table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldTable(BTreeMap<String, FieldValue>);

impl FieldTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, returning the previous value for the key, if any.
    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) -> Option<FieldValue> {
        self.0.insert(key.into(), value)
    }

    /// Look up an entry by key.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    /// Remove an entry by key.
    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.0.remove(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Total wire footprint in bytes, including the 4-byte length prefix.
    pub fn encoded_len(&self) -> usize {
        let entries: usize = self
            .0
            .iter()
            .map(|(key, value)| 1 + key.len() + tagged_size(value))
            .sum();
        4 + entries
    }

    /// Encode the table at `offset`. Returns the offset just past it.
    pub fn encode(&self, buf: &mut [u8], offset: usize) -> Result<usize> {
        let total = self.encoded_len();
        ensure_space(buf, offset, total)?;
        let inner = u32::try_from(total - 4)
            .map_err(|_| WireError::Protocol("field table exceeds 4 GiB".to_string()))?;
        buf[offset..offset + 4].copy_from_slice(&inner.to_be_bytes());
        let mut pos = offset + 4;
        for (key, value) in &self.0 {
            pos = encode_short_str(buf, pos, key)?;
            pos = encode_tagged(buf, pos, value)?;
        }
        debug_assert_eq!(pos, offset + total);
        Ok(pos)
    }

    /// Decode a table at `offset`. Returns the table and the offset just
    /// past it. Entries must fill the length prefix exactly.
    pub fn decode(buf: &[u8], offset: usize) -> Result<(Self, usize)> {
        ensure_bytes(buf, offset, 4)?;
        let inner = u32::from_be_bytes([
            buf[offset],
            buf[offset + 1],
            buf[offset + 2],
            buf[offset + 3],
        ]) as usize;
        ensure_bytes(buf, offset + 4, inner)?;
        let end = offset + 4 + inner;

        // Bound all entry reads to the declared table extent so an entry
        // claiming bytes past it fails as truncated instead of reading a
        // neighbouring field.
        let bounded = &buf[..end];
        let mut table = FieldTable::new();
        let mut pos = offset + 4;
        while pos < end {
            let (key, next) = decode_short_str(bounded, pos)?;
            let (value, next) = decode_tagged(bounded, next)?;
            table.0.insert(key, value);
            pos = next;
        }
        Ok((table, end))
    }
}

impl FromIterator<(String, FieldValue)> for FieldTable {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Wire size of a tagged value: 1 tag byte plus the value bytes.
fn tagged_size(value: &FieldValue) -> usize {
    match value {
        FieldValue::Bit(_) => 2, // tag + one octet
        FieldValue::Void => 1,   // tag only
        // ShortStr is rejected at encode time; sized as written so the
        // error surfaces there rather than as a length mismatch.
        FieldValue::ShortStr(s) => 2 + s.len(),
        other => 1 + encoded_size(other),
    }
}

fn encode_tagged(buf: &mut [u8], offset: usize, value: &FieldValue) -> Result<usize> {
    let put_tag = |buf: &mut [u8], offset: usize, t: u8| -> Result<usize> {
        ensure_space(buf, offset, 1)?;
        buf[offset] = t;
        Ok(offset + 1)
    };
    match value {
        FieldValue::Bit(v) => {
            let pos = put_tag(buf, offset, tag::BOOL)?;
            ensure_space(buf, pos, 1)?;
            buf[pos] = u8::from(*v);
            Ok(pos + 1)
        }
        FieldValue::Octet(_) => {
            let pos = put_tag(buf, offset, tag::OCTET)?;
            encode_value(buf, pos, value)
        }
        FieldValue::Short(_) => {
            let pos = put_tag(buf, offset, tag::SHORT)?;
            encode_value(buf, pos, value)
        }
        FieldValue::Long(_) => {
            let pos = put_tag(buf, offset, tag::LONG)?;
            encode_value(buf, pos, value)
        }
        FieldValue::LongLong(_) => {
            let pos = put_tag(buf, offset, tag::LONG_LONG)?;
            encode_value(buf, pos, value)
        }
        FieldValue::LongStr(_) => {
            let pos = put_tag(buf, offset, tag::LONG_STR)?;
            encode_value(buf, pos, value)
        }
        FieldValue::Timestamp(_) => {
            let pos = put_tag(buf, offset, tag::TIMESTAMP)?;
            encode_value(buf, pos, value)
        }
        FieldValue::Table(_) => {
            let pos = put_tag(buf, offset, tag::TABLE)?;
            encode_value(buf, pos, value)
        }
        FieldValue::Void => put_tag(buf, offset, tag::VOID),
        FieldValue::ShortStr(_) => Err(WireError::Protocol(
            "short strings are not legal field-table values".to_string(),
        )),
    }
}

fn decode_tagged(buf: &[u8], offset: usize) -> Result<(FieldValue, usize)> {
    ensure_bytes(buf, offset, 1)?;
    let t = buf[offset];
    let pos = offset + 1;
    match t {
        tag::BOOL => {
            ensure_bytes(buf, pos, 1)?;
            Ok((FieldValue::Bit(buf[pos] != 0), pos + 1))
        }
        tag::OCTET => decode_value(buf, pos, WireType::Octet),
        tag::SHORT => decode_value(buf, pos, WireType::Short),
        tag::LONG => decode_value(buf, pos, WireType::Long),
        tag::LONG_LONG => decode_value(buf, pos, WireType::LongLong),
        tag::LONG_STR => decode_value(buf, pos, WireType::LongStr),
        tag::TIMESTAMP => decode_value(buf, pos, WireType::Timestamp),
        tag::TABLE => decode_value(buf, pos, WireType::Table),
        tag::VOID => Ok((FieldValue::Void, pos)),
        other => Err(WireError::Protocol(format!(
            "unknown field-table tag: 0x{:02X}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn roundtrip(table: &FieldTable) -> FieldTable {
        let mut buf = vec![0u8; table.encoded_len()];
        let end = table.encode(&mut buf, 0).unwrap();
        assert_eq!(end, buf.len());
        let (decoded, consumed) = FieldTable::decode(&buf, 0).unwrap();
        assert_eq!(consumed, end);
        decoded
    }

    #[test]
    fn test_empty_table_is_four_bytes() {
        let table = FieldTable::new();
        assert_eq!(table.encoded_len(), 4);
        let mut buf = [0xEEu8; 4];
        table.encode(&mut buf, 0).unwrap();
        assert_eq!(buf, [0, 0, 0, 0]);
        assert_eq!(roundtrip(&table), table);
    }

    #[test]
    fn test_single_entry_layout() {
        let mut table = FieldTable::new();
        table.insert("x", FieldValue::Octet(7));
        let mut buf = vec![0u8; table.encoded_len()];
        table.encode(&mut buf, 0).unwrap();
        // 3 inner bytes: key "x" (1+1), tag 'B', value 7.
        assert_eq!(buf, [0, 0, 0, 4, 1, b'x', b'B', 7]);
    }

    #[test]
    fn test_all_value_kinds_roundtrip() {
        let mut table = FieldTable::new();
        table.insert("bool", FieldValue::Bit(true));
        table.insert("octet", FieldValue::Octet(255));
        table.insert("short", FieldValue::Short(1024));
        table.insert("long", FieldValue::Long(1 << 20));
        table.insert("longlong", FieldValue::LongLong(1 << 40));
        table.insert("str", FieldValue::LongStr(Bytes::from_static(b"payload")));
        table.insert("ts", FieldValue::Timestamp(1_700_000_000));
        table.insert("void", FieldValue::Void);
        assert_eq!(roundtrip(&table), table);
    }

    #[test]
    fn test_nested_tables_roundtrip() {
        let mut inner = FieldTable::new();
        inner.insert("depth", FieldValue::Octet(2));
        let mut middle = FieldTable::new();
        middle.insert("inner", FieldValue::Table(inner));
        middle.insert("depth", FieldValue::Octet(1));
        let mut outer = FieldTable::new();
        outer.insert("middle", FieldValue::Table(middle));
        assert_eq!(roundtrip(&outer), outer);
    }

    #[test]
    fn test_encoded_len_matches_encode() {
        let mut table = FieldTable::new();
        table.insert("a", FieldValue::Short(1));
        table.insert("bb", FieldValue::LongStr(Bytes::from_static(b"xyz")));
        let mut buf = vec![0u8; 256];
        let end = table.encode(&mut buf, 0).unwrap();
        assert_eq!(end, table.encoded_len());
    }

    #[test]
    fn test_short_str_value_rejected() {
        let mut table = FieldTable::new();
        table.insert("bad", FieldValue::ShortStr("nope".to_string()));
        let mut buf = vec![0u8; 64];
        let err = table.encode(&mut buf, 0).unwrap_err();
        assert!(matches!(err, WireError::Protocol(_)));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        // Inner length 7: key "k" (2 bytes), tag 's', 4 value bytes.
        let buf = [0, 0, 0, 7, 1, b'k', b's', 0, 0, 0, 0];
        let err = FieldTable::decode(&buf, 0).unwrap_err();
        match err {
            WireError::Protocol(msg) => assert!(msg.contains("tag"), "unexpected message: {msg}"),
            other => panic!("expected Protocol, got {other:?}"),
        }
    }

    #[test]
    fn test_entry_overrunning_table_extent_rejected() {
        // Table claims 4 inner bytes but the entry's long string wants
        // more than fits inside the extent.
        let buf = [0, 0, 0, 4, 1, b'k', b'S', 50, 0, 0, 0, 0, 0, 0];
        assert!(FieldTable::decode(&buf, 0).is_err());
    }

    #[test]
    fn test_truncated_prefix_rejected() {
        let buf = [0, 0, 0];
        assert!(FieldTable::decode(&buf, 0).is_err());
    }

    #[test]
    fn test_decode_at_offset_leaves_tail() {
        let mut table = FieldTable::new();
        table.insert("k", FieldValue::Octet(9));
        let mut buf = vec![0xAAu8; 2];
        buf.resize(2 + table.encoded_len() + 3, 0xBB);
        table.encode(&mut buf, 2).unwrap();
        let (decoded, consumed) = FieldTable::decode(&buf, 2).unwrap();
        assert_eq!(decoded, table);
        assert_eq!(consumed, 2 + table.encoded_len());
    }

    #[test]
    fn test_deterministic_encoding_is_key_ordered() {
        let mut a = FieldTable::new();
        a.insert("z", FieldValue::Octet(1));
        a.insert("a", FieldValue::Octet(2));
        let mut b = FieldTable::new();
        b.insert("a", FieldValue::Octet(2));
        b.insert("z", FieldValue::Octet(1));

        let mut buf_a = vec![0u8; a.encoded_len()];
        let mut buf_b = vec![0u8; b.encoded_len()];
        a.encode(&mut buf_a, 0).unwrap();
        b.encode(&mut buf_b, 0).unwrap();
        assert_eq!(buf_a, buf_b);
    }
}
