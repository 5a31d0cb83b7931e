//! # Serialisation Registry
//!
//! A connection only requires a pluggable "serialisation method" that
//! turns objects into byte blobs and back, identified by a numeric
//! method id. This module defines the [`Serializer`] trait, the two
//! built-in methods (portable JSON and compact bincode), and the
//! process-wide default registry connections copy from at construction
//! time (design document §4.2).

mod builtin;
mod registry;

pub use builtin::{CompactSerializer, PortableSerializer};
pub use registry::{default_registry, install_custom, Registered};

use crate::error::JennyError;

/// Method id reserved for the built-in portable (JSON) codec.
pub const METHOD_PORTABLE: u32 = 0;
/// Method id reserved for the built-in compact (bincode) codec.
pub const METHOD_COMPACT: u32 = 1;
/// Method id reserved for a user-supplied custom codec.
pub const METHOD_CUSTOM: u32 = 2;

/// Internal marker class name used for raw byte blocks sent over the
/// object channel. Never appears in `registered_classes()` — byte blocks
/// bypass class registration entirely (design document §4.1/§4.4).
pub const BYTE_BLOCK_CLASS: &str = "jennynet.internal.ByteBlock";

/// A pluggable serialisation method. A connection holds one instance for
/// sending and one for receiving, each obtained via [`Serializer::copy`]
/// from the process-wide default so that per-connection class
/// registration does not leak across connections.
pub trait Serializer: Send + Sync {
    /// Numeric method id this instance implements.
    fn method_id(&self) -> u32;

    /// Human-readable name, used in logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Register a class (identified by name) as serialisable through
    /// this method. Fails if the concrete codec declares the class
    /// non-serialisable (e.g. the compact codec only accepts classes it
    /// has a fixed-layout encoder for).
    fn register_class(&mut self, class: &str) -> Result<(), JennyError>;

    /// Whether `class` has been registered on this instance.
    fn is_registered(&self, class: &str) -> bool;

    /// All classes currently registered on this instance.
    fn registered_classes(&self) -> Vec<String>;

    /// Serialise a registered object into wire bytes. `value` is the
    /// object's canonical JSON encoding; the class name travels inside
    /// the returned bytes (this wire format carries no separate class
    /// field, only a numeric method id — see design document §3/§4.1),
    /// the way a Java-style serialisation stream embeds its own class
    /// descriptors. Fails with `UnregisteredObject` if the class was
    /// never registered, or `SerialisationError` for codec-level
    /// failures.
    fn serialise(&self, class: &str, value: &[u8]) -> Result<Vec<u8>, JennyError>;

    /// Inverse of [`Serializer::serialise`]: recovers both the class
    /// name and the object's canonical JSON encoding from wire bytes.
    fn deserialise(&self, bytes: &[u8]) -> Result<(String, Vec<u8>), JennyError>;

    /// Produce an independent copy with the same method id but an empty
    /// (or method-default) registration set, the way a connection's
    /// send/receive instances are obtained from the process-wide default.
    fn copy(&self) -> Box<dyn Serializer>;
}

/// Look up the default instance for `method_id` in the process-wide
/// registry and return a fresh [`Serializer::copy`] of it. Fails with
/// `SerialisationUnavailable` for method id 2 (custom) when no custom
/// codec has been installed via [`registry::install_custom`].
pub fn method_by_id(method_id: u32) -> Result<Box<dyn Serializer>, JennyError> {
    registry::default_registry().method(method_id)
}
