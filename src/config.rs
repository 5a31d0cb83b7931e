//! # Configuration
//!
//! Per-connection and per-server tunables (design document §6). Modelled
//! on the teacher's `TransportConfig`: a plain struct, one field per
//! knob, a documented `Default`, with builder-style setters for the
//! subset of options that may change after the connection is CONNECTED.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::JennyError;
use crate::serialization::METHOD_COMPACT;

/// How a connection's send-side event delivery is threaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryThreadUsage {
    /// One shared delivery worker pool for all connections.
    Global,
    /// A dedicated delivery task per connection.
    Individual,
}

/// Per-connection configuration. All fields are settable before
/// `connect()`; `parcel_queue_capacity` and `object_queue_capacity`
/// become immutable once the connection reaches CONNECTED (design
/// document §6).
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Maximum payload size of a single outgoing parcel, in bytes.
    pub transmission_parcel_size: u32,
    /// Initial send-side tempo in bytes/second; -1 unlimited, 0 paused.
    pub transmission_speed: i64,
    /// How long the handshake and transfer-confirm handshakes wait
    /// before failing.
    pub confirm_timeout: Duration,
    /// Exchange (bytes) below which the connection is considered idle
    /// over `idle_check_period`.
    pub idle_threshold: u64,
    /// How often idle state is re-evaluated.
    pub idle_check_period: Duration,
    /// If no parcel has been sent in this long, emit an ALIVE signal.
    /// `Duration::ZERO` disables the keepalive.
    pub alive_period: Duration,
    /// Directory under which received files are resolved and renamed.
    pub file_root_dir: Option<PathBuf>,
    /// Directory temp files are staged under while a file transfer is
    /// in progress.
    pub temp_dir: PathBuf,
    /// How send-side event delivery is threaded.
    pub delivery_thread_usage: DeliveryThreadUsage,
    /// Tolerance (queue depth) the delivery worker pool may lag behind
    /// before a warning is logged.
    pub deliver_tolerance: usize,
    /// Maximum accepted total serialisation length for any one object.
    pub max_serialisation_size: u64,
    /// Bounded capacity of the outgoing object queue (design doc's
    /// resolved Open Question: overflow is an explicit error, not a
    /// blocking wait).
    pub object_queue_capacity: usize,
    /// Bounded capacity of the outgoing parcel (priority send) queue.
    pub parcel_queue_capacity: usize,
    /// Default serialisation method id new sends use unless overridden
    /// at the call site.
    pub serialisation_method: u32,
    /// Minimum spacing between two outbound pings (the "guard window").
    pub ping_guard_window: Duration,
    /// How long a graceful close waits for both sides' all-data-sent
    /// acknowledgement before the connection is force-closed.
    pub graceful_close_wait: Duration,
    /// Whether this endpoint ignores peer tempo proposals.
    pub tempo_fixed: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            transmission_parcel_size: 8192,
            transmission_speed: -1,
            confirm_timeout: Duration::from_secs(10),
            idle_threshold: 1,
            idle_check_period: Duration::from_secs(2),
            alive_period: Duration::from_secs(20),
            file_root_dir: None,
            temp_dir: std::env::temp_dir(),
            delivery_thread_usage: DeliveryThreadUsage::Individual,
            deliver_tolerance: 64,
            max_serialisation_size: 100 * 1024 * 1024,
            object_queue_capacity: 512,
            parcel_queue_capacity: 4096,
            serialisation_method: METHOD_COMPACT,
            ping_guard_window: Duration::from_millis(500),
            graceful_close_wait: Duration::from_secs(30),
            tempo_fixed: false,
        }
    }
}

impl ConnectionConfig {
    /// Configuration fields that may legally change after CONNECTED.
    /// Called by `Connection::set_*` setters before mutating; the
    /// queue-capacity fields are excluded on purpose.
    pub fn assert_mutable_post_connect(field: &str) -> Result<(), JennyError> {
        match field {
            "object_queue_capacity" | "parcel_queue_capacity" => Err(JennyError::IllegalArgument(
                format!("{} cannot change after the connection is CONNECTED", field),
            )),
            _ => Ok(()),
        }
    }
}

/// Per-server configuration: the accept-side knobs layered on top of a
/// template `ConnectionConfig` applied to every accepted connection.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the listening socket to.
    pub bind_addr: std::net::SocketAddr,
    /// Capacity of the bounded accept queue (ACCEPT signal method only).
    pub accept_queue_capacity: usize,
    /// Template applied to every freshly accepted connection.
    pub connection_defaults: ConnectionConfig,
}

impl ServerConfig {
    pub fn new(bind_addr: std::net::SocketAddr) -> Self {
        ServerConfig {
            bind_addr,
            accept_queue_capacity: 64,
            connection_defaults: ConnectionConfig::default(),
        }
    }
}
