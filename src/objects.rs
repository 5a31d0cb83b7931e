//! # Logical Objects
//!
//! A logical object is one of the four kinds the design document §3
//! names: a user object, a raw byte block, a file, or a signal (signals
//! live in [`crate::signal`] since they never pass through the
//! serialisation registry). This module defines the user-facing trait
//! applications implement to make a type shippable, and the internal
//! tagged variant the send pipeline operates on — "a tagged variant...
//! not a class hierarchy" per the design notes.

use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::JennyError;

/// Implemented by application types that can be sent as user objects.
/// `CLASS_NAME` must be unique within a connection's registered set and
/// stable across the wire (it is not transmitted; both peers must agree
/// on it out of band, e.g. by shipping the same application binary).
pub trait UserObject: Serialize + DeserializeOwned + Send + Sync + 'static {
    const CLASS_NAME: &'static str;
}

/// Internal, type-erased representation of a send order's payload. Built
/// by [`crate::connection::Connection::send_object`]/`send_data`/
/// `send_file` from the typed public API before being handed to the
/// serialisation stage.
#[derive(Debug, Clone)]
pub enum OutgoingPayload {
    /// A registered user object: class name plus its canonical JSON
    /// byte encoding (see [`crate::serialization::builtin`] for why JSON
    /// is the canonical intermediate).
    User { class: String, json_bytes: Vec<u8> },
    /// A raw byte block, bypassing class registration entirely.
    Data(Vec<u8>),
    /// A file transfer: local source path and the path the receiver
    /// should materialise it under.
    File {
        source: PathBuf,
        remote_path: String,
    },
}

/// Encode a typed user object into its canonical JSON intermediate.
pub fn encode_user_object<T: UserObject>(value: &T) -> Result<OutgoingPayload, JennyError> {
    let json_bytes =
        serde_json::to_vec(value).map_err(|e| JennyError::SerialisationError(e.to_string()))?;
    Ok(OutgoingPayload::User {
        class: T::CLASS_NAME.to_string(),
        json_bytes,
    })
}

/// Decode a received user object's canonical JSON bytes back into `T`.
pub fn decode_user_object<T: UserObject>(json_bytes: &[u8]) -> Result<T, JennyError> {
    serde_json::from_slice(json_bytes).map_err(|e| JennyError::SerialisationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    impl UserObject for Point {
        const CLASS_NAME: &'static str = "jennynet.tests.Point";
    }

    #[test]
    fn roundtrips_through_canonical_json() {
        let p = Point { x: 3, y: 4 };
        let payload = encode_user_object(&p).unwrap();
        let OutgoingPayload::User { class, json_bytes } = payload else {
            panic!("expected a User payload");
        };
        assert_eq!(class, "jennynet.tests.Point");
        let back: Point = decode_user_object(&json_bytes).unwrap();
        assert_eq!(back, p);
    }
}
