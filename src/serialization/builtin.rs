//! Built-in serialisation methods.
//!
//! Both built-ins accept the same canonical representation at their
//! trait boundary: a JSON byte encoding of the user value (produced by
//! [`crate::objects`] from a `serde::Serialize` type), which they wrap
//! in a small `(class, value)` envelope before encoding to wire bytes —
//! the wire header carries only a numeric method id, so the class name
//! has to travel inside the serialised blob itself, the way a
//! class-descriptor-carrying serialisation stream would. The portable
//! method keeps the envelope as JSON; the compact method re-encodes it
//! with `bincode` for a smaller wire footprint. This keeps
//! [`crate::serialization::Serializer`] object-safe (no generic
//! methods) while still letting each codec choose its own wire
//! representation, matching how the teacher's `Message::to_bytes`
//! commits to one concrete codec (`bincode`) behind a stable method.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::JennyError;
use crate::serialization::{Serializer, BYTE_BLOCK_CLASS, METHOD_COMPACT, METHOD_PORTABLE};

#[derive(Serialize, Deserialize)]
struct Envelope {
    class: String,
    value: Value,
}

fn envelope_of(class: &str, value: &[u8]) -> Result<Envelope, JennyError> {
    let value: Value =
        serde_json::from_slice(value).map_err(|e| JennyError::SerialisationError(e.to_string()))?;
    Ok(Envelope {
        class: class.to_string(),
        value,
    })
}

/// Method id 0: JSON envelope passthrough. Chosen as the "built-in
/// portable" method because JSON bytes are inspectable and stable
/// across platforms, matching the teacher's use of `serde_json` for
/// human-facing output.
#[derive(Default)]
pub struct PortableSerializer {
    classes: HashSet<String>,
}

impl PortableSerializer {
    pub fn new() -> Self {
        Self {
            classes: HashSet::new(),
        }
    }
}

impl Serializer for PortableSerializer {
    fn method_id(&self) -> u32 {
        METHOD_PORTABLE
    }

    fn name(&self) -> &'static str {
        "portable-json"
    }

    fn register_class(&mut self, class: &str) -> Result<(), JennyError> {
        self.classes.insert(class.to_string());
        Ok(())
    }

    fn is_registered(&self, class: &str) -> bool {
        class == BYTE_BLOCK_CLASS || self.classes.contains(class)
    }

    fn registered_classes(&self) -> Vec<String> {
        self.classes.iter().cloned().collect()
    }

    fn serialise(&self, class: &str, value: &[u8]) -> Result<Vec<u8>, JennyError> {
        if !self.is_registered(class) {
            return Err(JennyError::UnregisteredObject);
        }
        let envelope = envelope_of(class, value)?;
        serde_json::to_vec(&envelope).map_err(|e| JennyError::SerialisationError(e.to_string()))
    }

    fn deserialise(&self, bytes: &[u8]) -> Result<(String, Vec<u8>), JennyError> {
        let envelope: Envelope =
            serde_json::from_slice(bytes).map_err(|e| JennyError::SerialisationError(e.to_string()))?;
        let value_bytes = serde_json::to_vec(&envelope.value)
            .map_err(|e| JennyError::SerialisationError(e.to_string()))?;
        Ok((envelope.class, value_bytes))
    }

    fn copy(&self) -> Box<dyn Serializer> {
        Box::new(PortableSerializer::new())
    }
}

/// Method id 1: bincode re-encoding of the `(class, value)` envelope.
#[derive(Default)]
pub struct CompactSerializer {
    classes: HashSet<String>,
}

impl CompactSerializer {
    pub fn new() -> Self {
        Self {
            classes: HashSet::new(),
        }
    }
}

impl Serializer for CompactSerializer {
    fn method_id(&self) -> u32 {
        METHOD_COMPACT
    }

    fn name(&self) -> &'static str {
        "compact-bincode"
    }

    fn register_class(&mut self, class: &str) -> Result<(), JennyError> {
        self.classes.insert(class.to_string());
        Ok(())
    }

    fn is_registered(&self, class: &str) -> bool {
        class == BYTE_BLOCK_CLASS || self.classes.contains(class)
    }

    fn registered_classes(&self) -> Vec<String> {
        self.classes.iter().cloned().collect()
    }

    fn serialise(&self, class: &str, value: &[u8]) -> Result<Vec<u8>, JennyError> {
        if !self.is_registered(class) {
            return Err(JennyError::UnregisteredObject);
        }
        let envelope = envelope_of(class, value)?;
        bincode::serialize(&(envelope.class, envelope.value))
            .map_err(|e| JennyError::SerialisationError(e.to_string()))
    }

    fn deserialise(&self, bytes: &[u8]) -> Result<(String, Vec<u8>), JennyError> {
        let (class, value): (String, Value) =
            bincode::deserialize(bytes).map_err(|e| JennyError::SerialisationError(e.to_string()))?;
        let value_bytes =
            serde_json::to_vec(&value).map_err(|e| JennyError::SerialisationError(e.to_string()))?;
        Ok((class, value_bytes))
    }

    fn copy(&self) -> Box<dyn Serializer> {
        Box::new(CompactSerializer::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portable_roundtrips_registered_class() {
        let mut s = PortableSerializer::new();
        s.register_class("demo.Point").unwrap();
        let value = serde_json::to_vec(&serde_json::json!({"x": 1, "y": 2})).unwrap();
        let wire = s.serialise("demo.Point", &value).unwrap();
        let (class, back) = s.deserialise(&wire).unwrap();
        assert_eq!(class, "demo.Point");
        let back_value: Value = serde_json::from_slice(&back).unwrap();
        assert_eq!(back_value, serde_json::json!({"x": 1, "y": 2}));
    }

    #[test]
    fn unregistered_class_is_rejected() {
        let s = PortableSerializer::new();
        let value = serde_json::to_vec(&serde_json::json!(42)).unwrap();
        let err = s.serialise("demo.Unknown", &value).unwrap_err();
        assert!(matches!(err, JennyError::UnregisteredObject));
    }

    #[test]
    fn compact_reencodes_through_bincode() {
        let mut s = CompactSerializer::new();
        s.register_class("demo.Point").unwrap();
        let value = serde_json::to_vec(&serde_json::json!({"x": 1, "y": 2})).unwrap();
        let wire = s.serialise("demo.Point", &value).unwrap();
        let (class, back) = s.deserialise(&wire).unwrap();
        assert_eq!(class, "demo.Point");
        let back_value: Value = serde_json::from_slice(&back).unwrap();
        assert_eq!(back_value, serde_json::json!({"x": 1, "y": 2}));
    }

    #[test]
    fn byte_block_class_is_always_registered() {
        let s = PortableSerializer::new();
        assert!(s.is_registered(BYTE_BLOCK_CLASS));
    }
}
