//! # Wire Framing
//!
//! This module defines the atomic on-wire unit (the [`Parcel`]) and the
//! codec that encodes/decodes it from a byte stream. Layout follows the
//! design document §4.1/§6 exactly:
//!
//! ```text
//! 8-byte magic | 1-byte channel | 1-byte priority | 8-byte object-id
//!   | 4-byte sequence | 4-byte payload length (BE) | payload
//! ```
//!
//! When `sequence == 0` and `channel != SIGNAL`, the payload begins with
//! an [`ObjectHeader`] before the object's first data bytes.

pub mod codec;
pub mod parcel;

pub use codec::{decode_parcel, encode_parcel};
pub use parcel::{Channel, ObjectHeader, Parcel, Priority, MAGIC};
