//! Wire-level field codec.
//!
//! The primitives every method is built from:
//! - typed values and the offset-based encode/decode (`field`)
//! - bit-run packing for adjacent bit fields (`bits`)
//! - nested field tables (`table`)

pub mod bits;
mod field;
mod proptest;
mod table;

pub use field::{decode_value, encode_value, encoded_size, FieldValue, WireType};
pub use table::FieldTable;
