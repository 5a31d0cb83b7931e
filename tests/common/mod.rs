//! Shared helpers for the loopback integration tests, in the style of
//! the teacher's own `tests/integration_tcp_round_trip.rs` smoke tests:
//! real sockets, real handshakes, no mocked transport.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use jennynet::events::{BroadcastOutcome, ConnectionListener, Event, ServerListener};

/// Reserve a free loopback port by binding a throwaway std listener and
/// dropping it before the caller binds `Server` to the same address.
pub fn free_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local_addr")
}

/// A [`ConnectionListener`] that records every event it sees, for tests
/// that need to assert on what a connection observed.
pub struct CollectingListener {
    events: Mutex<Vec<Event>>,
}

impl CollectingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(CollectingListener {
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn snapshot(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

impl ConnectionListener for CollectingListener {
    fn on_event(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}

/// A [`ServerListener`] that records connection availability/closure and
/// broadcast outcomes, for server-level assertions.
pub struct CollectingServerListener {
    available: Mutex<Vec<uuid::Uuid>>,
    closed: Mutex<Vec<uuid::Uuid>>,
    outcomes: Mutex<Vec<BroadcastOutcome>>,
}

impl CollectingServerListener {
    pub fn new() -> Arc<Self> {
        Arc::new(CollectingServerListener {
            available: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
            outcomes: Mutex::new(Vec::new()),
        })
    }

    pub fn outcomes(&self) -> Vec<BroadcastOutcome> {
        self.outcomes.lock().clone()
    }
}

impl ServerListener for CollectingServerListener {
    fn connection_available(&self, connection_uuid: uuid::Uuid) {
        self.available.lock().push(connection_uuid);
    }

    fn connection_closed(&self, connection_uuid: uuid::Uuid) {
        self.closed.lock().push(connection_uuid);
    }

    fn on_broadcast_outcome(&self, outcome: &BroadcastOutcome) {
        self.outcomes.lock().push(outcome.clone());
    }
}

/// Poll `pred` against the listener's current events until it returns
/// true or `timeout` elapses. Returns whether it found a match.
pub async fn wait_until<F>(listener: &CollectingListener, timeout: Duration, mut pred: F) -> bool
where
    F: FnMut(&[Event]) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        let events = listener.snapshot();
        if pred(&events) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
