//! Frame envelope encoding and decoding.
//!
//! Every frame on the shared byte stream wears the same envelope:
//!
//! ```text
//! ┌──────┬─────────┬──────────┬─────────────┬──────┐
//! │ Kind │ Channel │ Size     │ Payload     │ End  │
//! │ 1 B  │ 2 B BE  │ 4 B BE   │ Size bytes  │ 0xCE │
//! └──────┴─────────┴──────────┴─────────────┴──────┘
//! ```
//!
//! All multi-byte integers are Big Endian. The trailing end octet guards
//! against desynchronized streams: if it is wrong, the size field cannot
//! be trusted and the stream is unrecoverable.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, WireError};

/// Envelope header size in bytes (fixed, exactly 7).
pub const FRAME_HEADER_SIZE: usize = 7;

/// Frame-end octet closing every frame.
pub const FRAME_END: u8 = 0xCE;

/// Smallest maximum frame size a peer may impose.
pub const FRAME_MIN_SIZE: u32 = 4096;

/// Default maximum accepted payload size (128 KiB).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 131_072;

/// Frame type octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// Method frame, the only kind this crate decodes further.
    Method = 1,
    /// Content header frame (not handled here).
    ContentHeader = 2,
    /// Content body frame (not handled here).
    ContentBody = 3,
    /// Heartbeat frame; always channel 0, empty payload.
    Heartbeat = 8,
}

impl FrameKind {
    /// Parse the frame type octet.
    pub fn from_octet(octet: u8) -> Option<Self> {
        match octet {
            1 => Some(FrameKind::Method),
            2 => Some(FrameKind::ContentHeader),
            3 => Some(FrameKind::ContentBody),
            8 => Some(FrameKind::Heartbeat),
            _ => None,
        }
    }

    /// The wire octet for this kind.
    #[inline]
    pub fn as_octet(self) -> u8 {
        self as u8
    }
}

/// Decoded envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Frame type.
    pub kind: FrameKind,
    /// Channel the frame belongs to (0 = connection scope).
    pub channel: u16,
    /// Payload size in bytes, excluding the end octet.
    pub size: u32,
}

impl FrameHeader {
    /// Create a new header.
    pub fn new(kind: FrameKind, channel: u16, size: u32) -> Self {
        Self {
            kind,
            channel,
            size,
        }
    }

    /// Encode the header to bytes (Big Endian).
    pub fn encode(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut buf = [0u8; FRAME_HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode the header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is smaller than `FRAME_HEADER_SIZE` (7 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= FRAME_HEADER_SIZE);
        buf[0] = self.kind.as_octet();
        buf[1..3].copy_from_slice(&self.channel.to_be_bytes());
        buf[3..7].copy_from_slice(&self.size.to_be_bytes());
    }

    /// Decode a header from bytes (Big Endian).
    ///
    /// Returns `Ok(None)` if the buffer holds fewer than
    /// `FRAME_HEADER_SIZE` bytes; an unrecognized frame type octet is a
    /// protocol error, not an incomplete read.
    pub fn decode(buf: &[u8]) -> Result<Option<Self>> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }
        let kind = FrameKind::from_octet(buf[0]).ok_or_else(|| {
            WireError::Protocol(format!("unknown frame type octet: 0x{:02X}", buf[0]))
        })?;
        Ok(Some(Self {
            kind,
            channel: u16::from_be_bytes([buf[1], buf[2]]),
            size: u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]),
        }))
    }

    /// Validate the header for protocol compliance.
    ///
    /// Checks:
    /// - Payload size doesn't exceed `max_frame_size`
    /// - Heartbeat frames are on channel 0 and empty
    pub fn validate(&self, max_frame_size: u32) -> Result<()> {
        if self.size > max_frame_size {
            return Err(WireError::Protocol(format!(
                "frame size {} exceeds maximum {}",
                self.size, max_frame_size
            )));
        }

        if self.kind == FrameKind::Heartbeat {
            if self.channel != 0 {
                return Err(WireError::Protocol(format!(
                    "heartbeat frame on channel {}",
                    self.channel
                )));
            }
            if self.size != 0 {
                return Err(WireError::Protocol(
                    "heartbeat frame with payload".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Serialize one complete frame: header, payload, end octet.
///
/// The writer task assembles these three parts without copying; this
/// helper is for peers in tests and small tools.
pub fn encode_frame(kind: FrameKind, channel: u16, payload: &[u8]) -> Bytes {
    let header = FrameHeader::new(kind, channel, payload.len() as u32);
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len() + 1);
    buf.put_slice(&header.encode());
    buf.put_slice(payload);
    buf.put_u8(FRAME_END);
    buf.freeze()
}
