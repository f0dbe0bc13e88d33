//! Bit-run packing.
//!
//! Consecutive `Bit` fields do not get a byte each: a run of `n` adjacent
//! bits shares `ceil(n / 8)` octets, filled from the low bit of each octet
//! upward and overflowing into the next octet. A run ends at the first
//! non-bit field or at the end of the field list, so two bit fields
//! separated by another type land in separate octets.

use crate::error::{Result, WireError};

/// Number of bytes a run of `n` consecutive bit fields occupies.
#[inline]
pub fn packed_len(n: usize) -> usize {
    n.div_ceil(8)
}

/// Pack a run of bits at `offset`, low bit first. Returns the offset just
/// past the run. An empty run writes nothing.
pub fn pack_bits(buf: &mut [u8], offset: usize, bits: &[bool]) -> Result<usize> {
    if bits.is_empty() {
        return Ok(offset);
    }
    let len = packed_len(bits.len());
    let available = buf.len().saturating_sub(offset);
    if available < len {
        return Err(WireError::BufferTooSmall {
            needed: len,
            available,
        });
    }
    buf[offset..offset + len].fill(0);
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            buf[offset + i / 8] |= 1 << (i % 8);
        }
    }
    Ok(offset + len)
}

/// Unpack a run of `count` bits at `offset`, low bit first. Returns the
/// bits and the offset just past the run.
pub fn unpack_bits(buf: &[u8], offset: usize, count: usize) -> Result<(Vec<bool>, usize)> {
    if count == 0 {
        return Ok((Vec::new(), offset));
    }
    let len = packed_len(count);
    if buf.len().saturating_sub(offset) < len {
        return Err(WireError::Protocol(format!(
            "truncated bit run: need {} bytes at offset {}, buffer has {}",
            len,
            offset,
            buf.len()
        )));
    }
    let mut bits = Vec::with_capacity(count);
    for i in 0..count {
        bits.push(buf[offset + i / 8] & (1 << (i % 8)) != 0);
    }
    Ok((bits, offset + len))
}
