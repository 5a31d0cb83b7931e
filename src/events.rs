//! # Events
//!
//! An [`Event`] is an immutable record describing something that
//! happened on a connection (design document §3). Listeners are values
//! held by value-typed sets rather than a deep trait-object hierarchy
//! (design notes §9): a single [`ConnectionListener`] trait with default
//! no-op methods covers on_event/on_object/on_transmission the way a
//! capability set would, while staying a plain object-safe trait.

use std::path::PathBuf;
use std::sync::Arc;

/// Kind of transmission-related progress being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmissionEventKind {
    FileSending,
    FileIncoming,
    FileReceived,
    FileConfirmed,
    FileAborted,
}

/// Direction a transfer-related event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// An immutable record describing something that happened on a
/// connection.
#[derive(Debug, Clone)]
pub enum Event {
    /// A user object (or raw byte block) finished reassembly.
    ObjectReceived {
        object_id: u64,
        class: String,
        json_bytes: Arc<Vec<u8>>,
    },
    /// A raw byte block finished reassembly.
    DataReceived { object_id: u64, bytes: Arc<Vec<u8>> },
    /// File transfer progress or terminal state.
    Transmission {
        kind: TransmissionEventKind,
        object_id: u64,
        direction: Direction,
        path: Option<PathBuf>,
        info: Option<u8>,
        message: Option<String>,
    },
    /// A PING this connection sent was echoed back.
    PingEcho { nonce: i64, rtt_ms: u64 },
    /// Idle state changed (edge-triggered).
    IdleChanged { idle: bool, exchange: u64 },
    /// Handshake completed successfully.
    Connected,
    /// The connection entered the SHUTDOWN state.
    Shutdown { message: Option<String> },
    /// The connection reached CLOSED.
    Closed { info: u8, message: Option<String> },
    /// A protocol or IO fault aborted the connection outright.
    Aborted { message: String },
}

/// Per-connection listener capability set. All methods have a no-op
/// default so implementors only override what they need.
pub trait ConnectionListener: Send + Sync {
    fn on_event(&self, _event: &Event) {}
}

/// Transaction-correlated report from a server broadcast helper
/// (`send_object_to_all` and friends): one per connection the broadcast
/// reached, so callers can tell success from per-peer failure.
#[derive(Debug, Clone)]
pub struct BroadcastOutcome {
    pub transaction: u64,
    pub connection_uuid: uuid::Uuid,
    pub result: Result<u64, String>,
}

/// Server-level listener, notified of connection lifecycle and
/// broadcast outcomes.
pub trait ServerListener: Send + Sync {
    fn connection_available(&self, _connection_uuid: uuid::Uuid) {}
    fn connection_closed(&self, _connection_uuid: uuid::Uuid) {}
    fn on_broadcast_outcome(&self, _outcome: &BroadcastOutcome) {}
}
