//! Loopback coverage for PING/ECHO round trips and tempo arbitration.

mod common;

use std::sync::Arc;
use std::time::Duration;

use jennynet::events::Event;
use jennynet::{Connection, ConnectionConfig, Server};

use common::{free_addr, wait_until, CollectingListener};

async fn connect_pair() -> (Arc<Connection>, Arc<Connection>, Server) {
    let addr = free_addr();
    let server = Server::bind(addr).await.expect("bind");
    server.start().await;

    let client_fut = Connection::connect(addr, ConnectionConfig::default());
    let accept_fut = async {
        let pending = server
            .accept(Duration::from_secs(5))
            .await
            .expect("a pending connection arrives");
        pending.start().await.expect("pending connection starts")
    };

    let (client, accepted) = tokio::join!(client_fut, accept_fut);
    (client.expect("client connects"), accepted, server)
}

#[tokio::test]
async fn ping_is_echoed_back_with_a_measured_rtt() {
    let (client, _accepted, server) = connect_pair().await;
    let listener = CollectingListener::new();
    client.add_listener(listener.clone());

    let nonce = client.send_ping().await;
    assert!(nonce >= 0, "first ping should not be suppressed by the guard window");

    let echoed = wait_until(&listener, Duration::from_secs(2), |events| {
        events.iter().any(|e| matches!(e, Event::PingEcho { nonce: n, .. } if *n == nonce))
    })
    .await;
    assert!(echoed, "expected a PingEcho event for our own nonce");

    client.close(None).await;
    server.close().await;
}

#[tokio::test]
async fn a_second_immediate_ping_is_suppressed_by_the_guard_window() {
    let (client, _accepted, server) = connect_pair().await;
    let first = client.send_ping().await;
    assert!(first >= 0);
    let second = client.send_ping().await;
    assert_eq!(second, -1, "guard window should suppress a second immediate ping");

    client.close(None).await;
    server.close().await;
}

#[tokio::test]
async fn local_tempo_proposal_becomes_effective_immediately() {
    let (client, _accepted, server) = connect_pair().await;
    client.set_tempo(32_000).await;
    let snap = client.monitor_snapshot();
    assert_eq!(snap.effective_tempo, 32_000);

    client.close(None).await;
    server.close().await;
}

#[tokio::test]
async fn fixed_tempo_reasserts_against_a_peer_proposal() {
    let (client, accepted, server) = connect_pair().await;
    client.set_tempo_fixed(true);
    client.set_tempo(10_000).await;

    // Let the peer propose a different tempo; the fixed side should
    // reassert its own value rather than adopt the peer's.
    accepted.set_tempo(99_000).await;

    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    loop {
        if client.monitor_snapshot().effective_tempo == 10_000 {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "fixed tempo should remain 10_000");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    client.close(None).await;
    server.close().await;
}
