//! Method layer: specs, frames, and the registry.
//!
//! A method is described once by a static [`MethodSpec`]; a
//! [`MethodFrame`] pairs a spec with concrete field values and a channel.
//! The [`MethodRegistry`] resolves `(class_id, method_id)` pairs on the
//! decode path. The built-in catalog lives in [`defs`].

pub mod defs;
mod frame;
mod registry;
mod spec;

pub use frame::{MethodFrame, METHOD_HEADER_SIZE};
pub use registry::MethodRegistry;
pub use spec::{FieldSpec, MethodId, MethodSpec};
