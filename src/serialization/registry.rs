//! Process-wide default serialisation registry.
//!
//! Holds one template instance per method id. Connections never mutate
//! these templates directly; they call [`Serializer::copy`] to obtain a
//! private instance whose class registrations are scoped to that
//! connection and direction, the way the design document §3/§4.2
//! requires ("two serialisation instances (send/receive, each with
//! registered classes)").

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::error::JennyError;
use crate::serialization::{
    CompactSerializer, PortableSerializer, Serializer, METHOD_COMPACT, METHOD_CUSTOM,
    METHOD_PORTABLE,
};

/// A named handle a caller can hold onto and later swap out (installing
/// a custom method id 2 codec after the registry already exists).
pub struct Registered;

struct DefaultRegistry {
    custom: Mutex<Option<Box<dyn Fn() -> Box<dyn Serializer> + Send + Sync>>>,
}

static DEFAULT_REGISTRY: Lazy<DefaultRegistry> = Lazy::new(|| DefaultRegistry {
    custom: Mutex::new(None),
});

/// Access the process-wide default registry, initialising it lazily on
/// first use (design document §9, "Global state... initialise lazily on
/// first connection creation").
pub fn default_registry() -> &'static DefaultRegistryHandle {
    &DefaultRegistryHandle
}

/// Install a factory for the custom (method id 2) serialiser. Typically
/// called once at process start before any connection is created.
pub fn install_custom<F>(factory: F)
where
    F: Fn() -> Box<dyn Serializer> + Send + Sync + 'static,
{
    *DEFAULT_REGISTRY.custom.lock() = Some(Box::new(factory));
}

/// Zero-sized handle exposing the registry's public operations;
/// `&'static` so callers can hold it without a lock of their own.
pub struct DefaultRegistryHandle;

impl DefaultRegistryHandle {
    pub fn method(&self, method_id: u32) -> Result<Box<dyn Serializer>, JennyError> {
        match method_id {
            METHOD_PORTABLE => Ok(Box::new(PortableSerializer::new())),
            METHOD_COMPACT => Ok(Box::new(CompactSerializer::new())),
            METHOD_CUSTOM => {
                let guard = DEFAULT_REGISTRY.custom.lock();
                match guard.as_ref() {
                    Some(factory) => Ok(factory()),
                    None => Err(JennyError::SerialisationUnavailable),
                }
            }
            _ => Err(JennyError::SerialisationUnavailable),
        }
    }
}
