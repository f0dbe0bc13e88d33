//! Error types for methodwire.

use thiserror::Error;

/// Main error type for all methodwire operations.
#[derive(Debug, Error)]
pub enum WireError {
    /// I/O error on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encode buffer too small for the value being written. Recoverable:
    /// reallocate at least `needed` bytes past the write offset and retry.
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// Short string or table key exceeds the 255-byte wire limit.
    #[error("field too long: {len} bytes exceeds short-string limit of 255")]
    FieldTooLong { len: usize },

    /// A value does not match the wire type its field spec declares.
    #[error("type mismatch for field `{field}`: expected {expected}, got {found}")]
    TypeMismatch {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    /// Incoming frame names a (class, method) pair absent from the registry.
    /// Fatal for the channel: the field section cannot be decoded.
    #[error("unknown method: class {class_id}, method {method_id}")]
    UnknownMethod { class_id: u16, method_id: u16 },

    /// Incoming frame addresses a channel that is not open.
    #[error("unknown channel: {0}")]
    UnknownChannel(u16),

    /// A synchronous call was attempted while another is already pending
    /// on the same channel. Rejected without side effects.
    #[error("call already in progress on channel {0}")]
    CallInProgress(u16),

    /// Reply-class traffic arrived that matches no pending call. Protocol
    /// violation: the channel can no longer be trusted.
    #[error("unexpected response: class {class_id}, method {method_id}")]
    UnexpectedResponse { class_id: u16, method_id: u16 },

    /// Protocol error (malformed buffer, bad frame envelope, misuse).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Channel closed while an operation was pending on it.
    #[error("channel {0} closed")]
    ChannelClosed(u16),

    /// Synchronous call timed out; the pending call was cancelled.
    #[error("call timed out")]
    Timeout,

    /// Backpressure timeout - write buffer full.
    #[error("backpressure timeout")]
    BackpressureTimeout,
}

/// Result type alias using WireError.
pub type Result<T> = std::result::Result<T, WireError>;
