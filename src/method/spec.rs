//! Static method descriptions.
//!
//! A `MethodSpec` is the single source of truth for one method type:
//! its identity, its ordered field list, and the methods that may answer
//! it. Specs are plain statics (see `method::defs` for the built-in
//! catalog); every frame of a given type borrows the same spec.

use crate::wire::WireType;

/// A `(class_id, method_id)` pair identifying a method on the wire.
pub type MethodId = (u16, u16);

/// Declaration of one field: wire name and type.
///
/// Order inside a spec's field list is significant: it is the
/// serialization order, and adjacent `Bit` fields pack into shared
/// octets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: WireType,
}

impl FieldSpec {
    /// Const constructor for static method tables.
    pub const fn new(name: &'static str, ty: WireType) -> Self {
        Self { name, ty }
    }
}

/// Immutable description of one method type.
#[derive(Debug, PartialEq, Eq)]
pub struct MethodSpec {
    pub class_id: u16,
    pub method_id: u16,
    /// Display name, e.g. `"Channel.Flow"`.
    pub name: &'static str,
    /// Ordered field declarations.
    pub fields: &'static [FieldSpec],
    /// Methods that complete a call to this one. Empty for asynchronous
    /// methods; sending a method with a non-empty set opens a
    /// synchronous call.
    pub responses: &'static [MethodId],
}

impl MethodSpec {
    /// Registry key for this spec.
    #[inline]
    pub const fn id(&self) -> MethodId {
        (self.class_id, self.method_id)
    }

    /// Whether sending this method opens a synchronous call. True exactly
    /// when `responses` is non-empty.
    #[inline]
    pub fn is_synchronous(&self) -> bool {
        !self.responses.is_empty()
    }

    /// Whether `id` completes a call to this method.
    pub fn expects_response(&self, id: MethodId) -> bool {
        self.responses.contains(&id)
    }
}
