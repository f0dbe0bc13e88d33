//! # methodwire
//!
//! Binary method-frame codec and channel multiplexer in the AMQP 0-9-1
//! mold.
//!
//! Methods are described by static [`method::MethodSpec`] tables (class
//! id, method id, ordered typed fields, response set); frames built
//! against a spec encode to the classic big-endian wire form with
//! LSB-first bit packing, and travel inside the standard frame envelope
//! on a byte stream shared by numbered channels.
//!
//! ## Layers
//!
//! - **Codec** ([`wire`], [`method`]): typed field values, bit packing,
//!   field tables, method frame encode/decode against a registry
//! - **Framing** ([`framing`]): the `[type][channel][size]...[end]`
//!   envelope and a reassembly buffer for partial reads
//! - **Runtime** ([`Connection`], [`Multiplexer`], [`channel`], [`writer`]):
//!   channel multiplexing with one synchronous call window per channel
//!
//! The codec layers work standalone on in-memory buffers; the runtime is
//! tokio-based.
//!
//! ## Example
//!
//! ```
//! use methodwire::method::defs::channel;
//! use methodwire::{FieldValue, MethodFrame, MethodRegistry};
//!
//! let registry = MethodRegistry::amqp091();
//! let frame = MethodFrame::new(&channel::FLOW, 1, vec![FieldValue::Bit(true)]).unwrap();
//!
//! let bytes = frame.to_bytes().unwrap();
//! assert_eq!(&bytes[..], &[0x00, 0x14, 0x00, 0x14, 0x01]);
//!
//! let decoded = MethodFrame::decode(registry, 1, &bytes).unwrap();
//! assert_eq!(decoded.name(), "Channel.Flow");
//! ```

pub mod channel;
pub mod error;
pub mod framing;
pub mod method;
pub mod wire;
pub mod writer;

mod connection;
mod mux;

pub use connection::{ChannelHandle, Connection, ConnectionConfig, DEFAULT_INBOUND_CAPACITY};
pub use error::{Result, WireError};
pub use method::{MethodFrame, MethodRegistry, MethodSpec};
pub use mux::Multiplexer;
pub use wire::{FieldTable, FieldValue, WireType};
