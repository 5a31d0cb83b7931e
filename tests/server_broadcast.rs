//! Loopback coverage for the server's accept core and its broadcast
//! helpers: two clients connect through one listening socket, and a
//! server-wide broadcast reaches both, or all but an excluded one.

mod common;

use std::time::Duration;

use jennynet::events::Event;
use jennynet::{Connection, ConnectionConfig, Priority, Server};

use common::{free_addr, wait_until, CollectingListener, CollectingServerListener};

#[tokio::test]
async fn broadcast_reaches_every_connected_client() {
    let addr = free_addr();
    let server = Server::bind(addr).await.expect("bind");
    let server_listener = CollectingServerListener::new();
    server.add_listener(server_listener.clone());
    server.start().await;

    let client1_fut = Connection::connect(addr, ConnectionConfig::default());
    let client2_fut = Connection::connect(addr, ConnectionConfig::default());
    let accept_both = async {
        let p1 = server.accept(Duration::from_secs(5)).await.expect("first pending");
        let a1 = p1.start().await.expect("first accepted starts");
        let p2 = server.accept(Duration::from_secs(5)).await.expect("second pending");
        let a2 = p2.start().await.expect("second accepted starts");
        (a1, a2)
    };

    let ((client1, client2), (_accepted1, _accepted2)) =
        tokio::join!(async { (client1_fut.await.unwrap(), client2_fut.await.unwrap()) }, accept_both);

    assert_eq!(server.connection_count(), 2);

    let listener1 = CollectingListener::new();
    client1.add_listener(listener1.clone());
    let listener2 = CollectingListener::new();
    client2.add_listener(listener2.clone());

    server.send_data_to_all(b"broadcast payload".to_vec(), Priority::Normal).await;

    for listener in [&listener1, &listener2] {
        let arrived = wait_until(listener, Duration::from_secs(2), |events| {
            events.iter().any(|e| matches!(e, Event::DataReceived { bytes, .. } if bytes.as_slice() == b"broadcast payload"))
        })
        .await;
        assert!(arrived, "every connected client should receive the broadcast");
    }

    client1.close(None).await;
    client2.close(None).await;
    server.close().await;
}

#[tokio::test]
async fn broadcast_except_skips_the_excluded_connection() {
    let addr = free_addr();
    let server = Server::bind(addr).await.expect("bind");
    server.start().await;

    let client1_fut = Connection::connect(addr, ConnectionConfig::default());
    let client2_fut = Connection::connect(addr, ConnectionConfig::default());
    let accept_both = async {
        let p1 = server.accept(Duration::from_secs(5)).await.expect("first pending");
        let a1 = p1.start().await.expect("first accepted starts");
        let p2 = server.accept(Duration::from_secs(5)).await.expect("second pending");
        let a2 = p2.start().await.expect("second accepted starts");
        (a1, a2)
    };

    let ((client1, client2), (accepted1, _accepted2)) =
        tokio::join!(async { (client1_fut.await.unwrap(), client2_fut.await.unwrap()) }, accept_both);

    let listener1 = CollectingListener::new();
    client1.add_listener(listener1.clone());
    let listener2 = CollectingListener::new();
    client2.add_listener(listener2.clone());

    // Exclude one server-side connection; which client that maps to
    // depends on accept ordering, so assert on the pair rather than a
    // specific client: exactly one of the two should receive it.
    server
        .send_data_except(b"only for one client".to_vec(), Priority::Normal, Some(accepted1.uuid))
        .await;

    let either_arrived = wait_until(&listener2, Duration::from_secs(2), |events| {
        events.iter().any(|e| matches!(e, Event::DataReceived { .. }))
    })
    .await
        || wait_until(&listener1, Duration::from_secs(1), |events| {
            events.iter().any(|e| matches!(e, Event::DataReceived { .. }))
        })
        .await;
    assert!(either_arrived, "the non-excluded client should receive the broadcast");

    tokio::time::sleep(Duration::from_millis(200)).await;
    let count_received = [&listener1, &listener2]
        .iter()
        .filter(|l| l.snapshot().iter().any(|e| matches!(e, Event::DataReceived { .. })))
        .count();
    assert_eq!(count_received, 1, "exactly one client is excluded from the broadcast");

    client1.close(None).await;
    client2.close(None).await;
    server.close().await;
}
