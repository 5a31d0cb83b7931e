//! # Error Taxonomy
//!
//! All errors a caller or a connection's event stream can observe are
//! modelled by [`JennyError`]. The variants mirror the three error
//! families the protocol distinguishes: use errors (raised synchronously
//! from the public API), protocol errors (force a hard close), and
//! transfer/lifecycle errors (reported asynchronously as events, with a
//! numeric info code preserved across the wire so both ends agree).
//!
//! Numeric info codes are part of the external contract described in the
//! design document and must not be renumbered.

use std::fmt;

/// The unified error type returned by public `jennynet` APIs.
#[derive(Debug, thiserror::Error)]
pub enum JennyError {
    // --- use errors -----------------------------------------------------
    #[error("connection is not yet connected")]
    Unconnected,
    #[error("connection is closed")]
    ClosedConnection,
    #[error("object must not be null")]
    NullObject,
    #[error("remote path must not be null")]
    NullRemotePath,
    #[error("remote path must not be empty")]
    EmptyRemotePath,
    #[error("illegal argument: {0}")]
    IllegalArgument(String),
    #[error("send queue is full")]
    ListOverflow,
    #[error("object class is not registered with the serialisation method")]
    UnregisteredObject,
    #[error("requested serialisation method is unavailable")]
    SerialisationUnavailable,

    // --- protocol errors (force hard close) ------------------------------
    #[error("handshake failed: {0}")]
    HandshakeError(String),
    #[error("framing error: {0}")]
    FramingError(String),
    #[error("duplicate object id {0} from peer")]
    DuplicateObjectId(u64),
    #[error("unknown object id {0} referenced by peer")]
    UnknownObjectId(u64),

    // --- transfer errors --------------------------------------------------
    #[error("source file not found: {0}")]
    FileNotFound(String),
    #[error("file already in transmission: {0}")]
    FileInTransmission(String),
    #[error("destination path could not be resolved")]
    DestinationRealisationError,
    #[error("storage CRC mismatch")]
    StorageCrcError,
    #[error("transfer was broken by the remote peer")]
    RemoteTransferBreak,
    #[error("transfer was broken locally")]
    UserBreak,
    #[error("peer reported a serialisation error")]
    SerialisationErrorAtPeer,
    #[error("serialisation failed: {0}")]
    SerialisationError(String),

    // --- connection lifecycle ---------------------------------------------
    #[error("handshake was not confirmed in time")]
    ConfirmTimeout,
    #[error("connection was rejected by the peer")]
    ConnectionRejected,
    #[error("connection attempt timed out")]
    ConnectionTimeout,
    #[error("graceful shutdown did not complete in time")]
    ShutdownTimeout,

    /// Any lower-level IO failure that does not have a more specific
    /// classification above. Preserves the source error the way the
    /// teacher's transport layer threads `std::io::Error` through
    /// `anyhow::Error`.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Numeric info codes carried by `closed`/`file-aborted` events and by the
/// wire-level BREAK/FAIL signals. These are the external contract named in
/// the design document §4.4/§7 and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InfoCode {
    ClosedLocalInitiator = 0,
    ClosedServerBroadcastLocal = 1,
    ClosedPeerInitiator = 2,
    ClosedServerBroadcastPeer = 3,
    ClosedSocketFault = 6,
    ClosedHard = 10,
    DestinationRealisationError = 102,
    AbortOwnOut = 105,
    AbortPeerOut = 106,
    AbortPeerIn = 107,
    AbortOwnIn = 108,
    CloseAbortOwnOut = 113,
    CloseAbortPeerOut = 114,
    CloseAbortOwnIn = 115,
    CloseAbortPeerIn = 116,
}

impl fmt::Display for InfoCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

impl JennyError {
    /// Returns the spec-assigned numeric info code for errors that have
    /// one, or `None` for pure use-errors that never cross the wire.
    pub fn info_code(&self) -> Option<u8> {
        match self {
            JennyError::DestinationRealisationError => {
                Some(InfoCode::DestinationRealisationError as u8)
            }
            JennyError::UserBreak => Some(InfoCode::AbortOwnOut as u8),
            JennyError::RemoteTransferBreak => Some(InfoCode::AbortPeerOut as u8),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, JennyError>;
