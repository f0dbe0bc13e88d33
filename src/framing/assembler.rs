//! Frame assembler for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForHeader`: need at least 7 bytes
//! - `WaitingForPayload`: header parsed, need payload + end octet
//!
//! # Example
//!
//! ```ignore
//! use methodwire::framing::FrameAssembler;
//!
//! let mut assembler = FrameAssembler::new();
//!
//! // Data arrives in chunks from the transport
//! let frames = assembler.push(&chunk)?;
//! for frame in frames {
//!     println!("frame on channel {}", frame.header.channel);
//! }
//! ```

use bytes::{Bytes, BytesMut};

use super::envelope::{FrameHeader, DEFAULT_MAX_FRAME_SIZE, FRAME_END, FRAME_HEADER_SIZE};
use crate::error::{Result, WireError};

/// A complete frame off the wire: envelope header plus raw payload.
///
/// The payload of a method frame is decoded further by
/// `MethodFrame::decode`; other kinds carry it opaquely.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded envelope header.
    pub header: FrameHeader,
    /// Payload bytes (zero-copy via `bytes::Bytes`), end octet stripped.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and payload.
    pub fn new(header: FrameHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }
}

/// State machine for frame parsing.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for a complete envelope header (7 bytes).
    WaitingForHeader,
    /// Header parsed, waiting for payload plus the end octet.
    WaitingForPayload { header: FrameHeader },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
///
/// All data is stored in a single `BytesMut` to minimize allocations;
/// payloads are split out without copying.
pub struct FrameAssembler {
    /// Accumulated bytes from transport reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed payload size.
    max_frame_size: u32,
}

impl FrameAssembler {
    /// Create a new assembler with the default maximum frame size.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a new assembler with a custom maximum frame size.
    pub fn with_max_frame_size(max_frame_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(16 * 1024),
            state: State::WaitingForHeader,
            max_frame_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Returns the complete frames found (possibly none); fragmented data
    /// is buffered for the next push.
    ///
    /// # Errors
    ///
    /// A header failing validation, an unknown frame type octet, or a
    /// wrong end octet poison the stream; the assembler is not usable
    /// after an error.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Try to extract a single frame from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` on a protocol violation
    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        match &self.state {
            State::WaitingForHeader => {
                let Some(header) = FrameHeader::decode(&self.buffer)? else {
                    return Ok(None);
                };
                header.validate(self.max_frame_size)?;

                // Consume header bytes
                let _ = self.buffer.split_to(FRAME_HEADER_SIZE);
                self.state = State::WaitingForPayload { header };

                // Try to get the payload immediately
                self.try_extract_one()
            }

            State::WaitingForPayload { header } => {
                // Payload plus the trailing end octet.
                let needed = header.size as usize + 1;
                if self.buffer.len() < needed {
                    return Ok(None);
                }

                let mut chunk = self.buffer.split_to(needed);
                let end = chunk[needed - 1];
                if end != FRAME_END {
                    return Err(WireError::Protocol(format!(
                        "bad frame-end octet: expected 0x{:02X}, got 0x{:02X}",
                        FRAME_END, end
                    )));
                }
                chunk.truncate(needed - 1);

                let header = *header;
                self.state = State::WaitingForHeader;

                Ok(Some(Frame::new(header, chunk.freeze())))
            }
        }
    }

    /// Get the number of buffered, not-yet-extracted bytes.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the assembler is between frames with nothing buffered.
    pub fn is_idle(&self) -> bool {
        self.buffer.is_empty() && matches!(self.state, State::WaitingForHeader)
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    /// Get the current state for debugging.
    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForPayload { .. } => "WaitingForPayload",
        }
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}
