//! Method frames: one decoded (or to-be-encoded) method instance.
//!
//! The payload of a method frame is a 4-byte class/method header followed
//! by the fields in spec order:
//!
//! ```text
//! ┌──────────┬───────────┬────────────────────────┐
//! │ Class ID │ Method ID │ Fields                 │
//! │ 2 B BE   │ 2 B BE    │ per spec, bits packed  │
//! └──────────┴───────────┴────────────────────────┘
//! ```
//!
//! One encoder and one decoder serve every method type: the spec drives
//! both. There is no per-method struct and no terminator; the length of
//! the field section is fully determined by the spec and the
//! length-prefixed values in it.

use bytes::Bytes;

use crate::error::{Result, WireError};
use crate::method::registry::MethodRegistry;
use crate::method::spec::{MethodId, MethodSpec};
use crate::wire::{bits, decode_value, encode_value, encoded_size, FieldValue, WireType};

/// Size of the class/method header in bytes.
pub const METHOD_HEADER_SIZE: usize = 4;

/// One method instance: a spec, a channel, and the field values.
///
/// Immutable once constructed; `new` validates the values against the
/// spec so every existing frame is encodable.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodFrame {
    spec: &'static MethodSpec,
    channel: u16,
    values: Vec<FieldValue>,
}

impl MethodFrame {
    /// Build a frame, checking arity and per-field value types against
    /// the spec.
    pub fn new(
        spec: &'static MethodSpec,
        channel: u16,
        values: Vec<FieldValue>,
    ) -> Result<Self> {
        if values.len() != spec.fields.len() {
            return Err(WireError::Protocol(format!(
                "{} takes {} fields, got {}",
                spec.name,
                spec.fields.len(),
                values.len()
            )));
        }
        for (field, value) in spec.fields.iter().zip(&values) {
            if !value.matches(field.ty) {
                return Err(WireError::TypeMismatch {
                    field: field.name,
                    expected: field.ty.name(),
                    found: value.type_name(),
                });
            }
        }
        Ok(Self {
            spec,
            channel,
            values,
        })
    }

    /// The spec this frame was built against.
    #[inline]
    pub fn spec(&self) -> &'static MethodSpec {
        self.spec
    }

    /// The channel the frame belongs to.
    #[inline]
    pub fn channel(&self) -> u16 {
        self.channel
    }

    /// The frame's `(class_id, method_id)`.
    #[inline]
    pub fn id(&self) -> MethodId {
        self.spec.id()
    }

    /// The method's display name.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    /// Whether this frame's method opens a synchronous call.
    #[inline]
    pub fn is_synchronous(&self) -> bool {
        self.spec.is_synchronous()
    }

    /// All field values in spec order.
    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    /// Consume the frame, yielding the field values.
    pub fn into_values(self) -> Vec<FieldValue> {
        self.values
    }

    /// Look up a field value by its wire name.
    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.spec
            .fields
            .iter()
            .position(|f| f.name == name)
            .map(|i| &self.values[i])
    }

    /// Exact wire size of the field section, not counting the 4-byte
    /// class/method header. Adjacent bit fields are sized as shared
    /// octets.
    pub fn payload_size(&self) -> usize {
        let mut size = 0;
        let mut run = 0usize;
        for (field, value) in self.spec.fields.iter().zip(&self.values) {
            if field.ty == WireType::Bit {
                run += 1;
                continue;
            }
            size += bits::packed_len(run);
            run = 0;
            size += encoded_size(value);
        }
        size + bits::packed_len(run)
    }

    /// Encode the frame payload into `buf`: class/method header, then
    /// fields in spec order. Returns the bytes written, always
    /// `payload_size() + 4`.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let needed = self.payload_size() + METHOD_HEADER_SIZE;
        if buf.len() < needed {
            return Err(WireError::BufferTooSmall {
                needed,
                available: buf.len(),
            });
        }
        buf[0..2].copy_from_slice(&self.spec.class_id.to_be_bytes());
        buf[2..4].copy_from_slice(&self.spec.method_id.to_be_bytes());
        let mut offset = METHOD_HEADER_SIZE;
        let mut run: Vec<bool> = Vec::new();
        for value in &self.values {
            if let FieldValue::Bit(bit) = value {
                run.push(*bit);
                continue;
            }
            offset = bits::pack_bits(buf, offset, &run)?;
            run.clear();
            offset = encode_value(buf, offset, value)?;
        }
        offset = bits::pack_bits(buf, offset, &run)?;
        debug_assert_eq!(offset, needed);
        Ok(offset)
    }

    /// Encode into a fresh, exactly-sized buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = vec![0u8; self.payload_size() + METHOD_HEADER_SIZE];
        self.encode(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    /// Decode a method payload addressed to `channel`.
    ///
    /// Looks the class/method pair up in `registry` (`UnknownMethod` if
    /// absent, leaving no partial frame behind) and decodes the fields in
    /// spec order. The buffer must be consumed exactly: trailing bytes
    /// mean the envelope length and the spec disagree, and the stream can
    /// no longer be trusted.
    pub fn decode(registry: &MethodRegistry, channel: u16, buf: &[u8]) -> Result<Self> {
        if buf.len() < METHOD_HEADER_SIZE {
            return Err(WireError::Protocol(format!(
                "method payload too short: {} bytes",
                buf.len()
            )));
        }
        let class_id = u16::from_be_bytes([buf[0], buf[1]]);
        let method_id = u16::from_be_bytes([buf[2], buf[3]]);
        let spec = registry
            .lookup(class_id, method_id)
            .ok_or(WireError::UnknownMethod {
                class_id,
                method_id,
            })?;

        let mut values = Vec::with_capacity(spec.fields.len());
        let mut offset = METHOD_HEADER_SIZE;
        let mut i = 0;
        while i < spec.fields.len() {
            if spec.fields[i].ty == WireType::Bit {
                let run = spec.fields[i..]
                    .iter()
                    .take_while(|f| f.ty == WireType::Bit)
                    .count();
                let (decoded, next) = bits::unpack_bits(buf, offset, run)?;
                values.extend(decoded.into_iter().map(FieldValue::Bit));
                offset = next;
                i += run;
            } else {
                let (value, next) = decode_value(buf, offset, spec.fields[i].ty)?;
                values.push(value);
                offset = next;
                i += 1;
            }
        }
        if offset != buf.len() {
            return Err(WireError::Protocol(format!(
                "{} payload is {} bytes but its fields end at {}",
                spec.name,
                buf.len(),
                offset
            )));
        }
        Ok(Self {
            spec,
            channel,
            values,
        })
    }
}
