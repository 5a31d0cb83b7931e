//! # JennyNet
//!
//! An application-level multiplexed messaging layer over a reliable
//! stream transport (design document §1/§2). A [`connection::Connection`]
//! exchanges user objects, raw byte blocks, and files with a peer over
//! one TCP socket, each transfer prioritised and interleaved on a single
//! wire according to a priority/object-id/sequence ordering; a
//! [`server::Server`] accepts many such connections behind one listening
//! socket.
//!
//! Non-goals carried over unchanged from the design document: this crate
//! does not parse configuration, does not choose an application wire
//! codec beyond the pluggable serialisation-method abstraction, and does
//! not ship a reflect server or test harness — `src/bin/jennynet-demo.rs`
//! is a minimal accept-loop demo, not either of those.

pub mod assembler;
pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod io_manager;
pub mod logging;
pub mod metrics;
pub mod objects;
pub mod queue;
pub mod serialization;
pub mod server;
pub mod signal;
pub mod transfer;
pub mod utils;
pub mod wire;

pub use config::{ConnectionConfig, ServerConfig};
pub use connection::{ConnState, Connection, Initiator, PeerParams};
pub use error::{InfoCode, JennyError};
pub use events::{
    BroadcastOutcome, ConnectionListener, Direction, Event, ServerListener, TransmissionEventKind,
};
pub use metrics::{Category, Monitor, MonitorSnapshot};
pub use objects::UserObject;
pub use server::{PendingConnection, Server, SignalMethod};
pub use wire::Priority;

/// The current version of the jennynet library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Close every given connection and server in parallel and wait for each
/// to reach CLOSED, up to `timeout_ms` (design document §9
/// `shutdown_and_wait`). This crate keeps no implicit process-wide
/// connection/server registry — each `Server` and each directly-created
/// `Connection` is owned by the application that created it — so callers
/// pass their own handles rather than relying on a hidden global set.
pub async fn shutdown_and_wait(
    connections: &[std::sync::Arc<Connection>],
    servers: &[server::Server],
    timeout_ms: u64,
) {
    let timeout = std::time::Duration::from_millis(timeout_ms);
    let mut joins = Vec::new();
    for conn in connections {
        let conn = conn.clone();
        joins.push(tokio::spawn(async move {
            conn.close(None).await;
            conn.wait_for_closed(timeout).await;
        }));
    }
    for srv in servers {
        let srv = srv.clone();
        joins.push(tokio::spawn(async move {
            srv.close_all_connections(None).await;
        }));
    }
    for handle in joins {
        let _ = handle.await;
    }
}
