//! Frame envelope and reassembly.
//!
//! Every frame on the wire is `[type: u8][channel: u16 BE][size: u32 BE]`
//! followed by `size` payload bytes and a fixed end octet. [`FrameHeader`]
//! encodes and decodes the fixed prefix, [`FrameAssembler`] turns an
//! arbitrary byte stream into complete [`Frame`]s.

mod assembler;
mod envelope;

pub use assembler::{Frame, FrameAssembler};
pub use envelope::{
    encode_frame, FrameHeader, FrameKind, DEFAULT_MAX_FRAME_SIZE, FRAME_END, FRAME_HEADER_SIZE,
    FRAME_MIN_SIZE,
};
