//! Loopback coverage for connection shutdown and cancellation: graceful
//! close when both sides participate, hard close, and `break_transfer`'s
//! defined behaviour when there is no matching transfer to cancel.

mod common;

use std::sync::Arc;
use std::time::Duration;

use jennynet::error::InfoCode;
use jennynet::events::{Direction, Event, TransmissionEventKind};
use jennynet::{Connection, ConnectionConfig, Priority, Server, ServerConfig};

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
async fn graceful_close_on_both_sides_reaches_closed_quickly() {
    let (client, accepted, server) = connect_pair().await;

    // Both sides initiate a graceful close; each exchanges EnterShutdown
    // and AllDataSent, so neither has to wait out the full
    // `graceful_close_wait` timer to reach CLOSED.
    let (client_closed, accepted_closed) = tokio::join!(
        async {
            client.close(Some("done".to_string())).await;
            client.wait_for_closed(Duration::from_secs(2)).await
        },
        async {
            accepted.close(None).await;
            accepted.wait_for_closed(Duration::from_secs(2)).await
        }
    );

    assert!(client_closed, "client should reach CLOSED without the graceful timeout firing");
    assert!(accepted_closed, "accepting side should reach CLOSED without the graceful timeout firing");

    server.close().await;
}

#[tokio::test]
async fn hard_close_reaches_closed_immediately() {
    let (client, _accepted, server) = connect_pair().await;

    client.close_hard().await;
    let closed = client.wait_for_closed(Duration::from_millis(200)).await;
    assert!(closed, "close_hard should transition to CLOSED without any round trip");

    let snap = client.monitor_snapshot();
    // Monitor state is independent of the close path; just confirm the
    // connection is usable for a final snapshot read post-close.
    let _ = snap.exchanged_volume;

    server.close().await;
}

#[tokio::test]
async fn break_transfer_is_a_no_op_for_an_unknown_object_id() {
    let (client, accepted, server) = connect_pair().await;

    let outgoing_result = client.break_transfer(999_999, Direction::Outgoing, None).await;
    assert!(!outgoing_result, "no outgoing transfer with that id exists");

    let incoming_result = accepted.break_transfer(999_999, Direction::Incoming, None).await;
    assert!(!incoming_result, "no incoming assembler with that id exists");

    client.close(None).await;
    server.close().await;
}

#[tokio::test]
async fn break_transfer_aborts_a_paced_in_flight_file_both_sides() {
    let source_dir = tempfile::tempdir().expect("source tempdir");
    let temp_dir = tempfile::tempdir().expect("receiver temp dir");
    let dest_dir = tempfile::tempdir().expect("dest tempdir");

    let source_path = source_dir.path().join("payload.bin");
    tokio::fs::write(&source_path, vec![7u8; 60_000])
        .await
        .expect("write source file");

    let addr = free_addr();
    let mut server_config = ServerConfig::new(addr);
    server_config.connection_defaults.temp_dir = temp_dir.path().to_path_buf();
    server_config.connection_defaults.file_root_dir = Some(dest_dir.path().to_path_buf());
    let server = Server::bind_with_config(server_config).await.expect("bind");
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
    let client = client.expect("client connects");

    let client_listener = CollectingListener::new();
    client.add_listener(client_listener.clone());
    let accepted_listener = CollectingListener::new();
    accepted.add_listener(accepted_listener.clone());

    // Slow enough that the 60 kB file is still streaming well after we
    // call `break_transfer` below (mirrors the 100 kB/15 kB/s scenario).
    client.set_tempo(10_000).await;

    let object_id = client
        .send_file(source_path, "inbox/payload.bin".to_string(), Priority::Normal)
        .await
        .expect("send_file succeeds");

    tokio::time::sleep(Duration::from_millis(300)).await;

    let broke = client.break_transfer(object_id, Direction::Outgoing, None).await;
    assert!(broke, "a paced transfer should still be tracked 300ms in");

    let client_aborted = wait_until(&client_listener, Duration::from_secs(2), |events| {
        events.iter().any(|e| {
            matches!(
                e,
                Event::Transmission {
                    kind: TransmissionEventKind::FileAborted,
                    info: Some(info),
                    ..
                } if *info == InfoCode::AbortOwnOut as u8
            )
        })
    })
    .await;
    assert!(client_aborted, "sender should observe its own abort as AbortOwnOut (105)");

    let peer_aborted = wait_until(&accepted_listener, Duration::from_secs(2), |events| {
        events.iter().any(|e| {
            matches!(
                e,
                Event::Transmission {
                    kind: TransmissionEventKind::FileAborted,
                    info: Some(info),
                    ..
                } if *info == InfoCode::AbortPeerOut as u8
            )
        })
    })
    .await;
    assert!(peer_aborted, "receiver should observe the peer-initiated abort as AbortPeerOut (106)");

    let no_received = client_listener
        .snapshot()
        .iter()
        .chain(accepted_listener.snapshot().iter())
        .any(|e| matches!(e, Event::Transmission { kind: TransmissionEventKind::FileReceived, .. }));
    assert!(!no_received, "an aborted transfer must never also report as received");

    // Give the receiver's assembler a moment to drop its temp file, then
    // confirm nothing was left behind in its temp directory.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let mut leftovers = tokio::fs::read_dir(temp_dir.path()).await.expect("read temp dir");
    assert!(
        leftovers.next_entry().await.expect("read dir entry").is_none(),
        "receiver must delete the partial temp file on abort"
    );

    client.close(None).await;
    server.close().await;
}

#[tokio::test]
async fn info_codes_used_by_close_paths_are_stable() {
    // `InfoCode` values are part of the wire contract; pin the ones the
    // close/abort paths reference so an accidental renumbering is caught.
    assert_eq!(InfoCode::ClosedHard as u8, 10);
    assert_eq!(InfoCode::ClosedLocalInitiator as u8, 0);
    assert_eq!(InfoCode::ClosedPeerInitiator as u8, 2);
}
