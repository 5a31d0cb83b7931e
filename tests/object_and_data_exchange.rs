//! Loopback coverage for the two non-file logical object kinds: a
//! registered user object and a raw byte block, each sent over a freshly
//! handshaken connection pair and observed through a connection
//! listener on the accepting side.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use jennynet::events::Event;
use jennynet::{Connection, ConnectionConfig, Priority, Server, UserObject};

use common::{free_addr, wait_until, CollectingListener};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Greeting {
    text: String,
    count: u32,
}

impl UserObject for Greeting {
    const CLASS_NAME: &'static str = "jennynet.tests.Greeting";
}

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
async fn user_object_round_trips_to_the_accepting_side() {
    let (client, accepted, server) = connect_pair().await;
    let listener = CollectingListener::new();
    accepted.add_listener(listener.clone());

    client
        .send_object(
            &Greeting {
                text: "hello".to_string(),
                count: 3,
            },
            None,
            Priority::Normal,
        )
        .await
        .expect("send_object succeeds");

    let arrived = wait_until(&listener, Duration::from_secs(2), |events| {
        events.iter().any(|e| matches!(e, Event::ObjectReceived { class, .. } if class == Greeting::CLASS_NAME))
    })
    .await;
    assert!(arrived, "accepting side should observe an ObjectReceived event");

    let events = listener.snapshot();
    let Event::ObjectReceived { json_bytes, .. } = events
        .iter()
        .find(|e| matches!(e, Event::ObjectReceived { .. }))
        .unwrap()
    else {
        unreachable!()
    };
    let decoded: Greeting = serde_json::from_slice(json_bytes).expect("decode greeting");
    assert_eq!(decoded, Greeting { text: "hello".to_string(), count: 3 });

    client.close(None).await;
    server.close().await;
}

#[tokio::test]
async fn raw_data_block_round_trips_to_the_accepting_side() {
    let (client, accepted, server) = connect_pair().await;
    let listener = CollectingListener::new();
    accepted.add_listener(listener.clone());

    client
        .send_data(b"raw payload bytes".to_vec(), Priority::High)
        .await
        .expect("send_data succeeds");

    let arrived = wait_until(&listener, Duration::from_secs(2), |events| {
        events.iter().any(|e| matches!(e, Event::DataReceived { .. }))
    })
    .await;
    assert!(arrived, "accepting side should observe a DataReceived event");

    let events = listener.snapshot();
    let Event::DataReceived { bytes, .. } = events
        .iter()
        .find(|e| matches!(e, Event::DataReceived { .. }))
        .unwrap()
    else {
        unreachable!()
    };
    assert_eq!(bytes.as_slice(), b"raw payload bytes");

    client.close(None).await;
    server.close().await;
}

#[tokio::test]
async fn send_data_rejects_an_empty_block() {
    let (client, _accepted, server) = connect_pair().await;
    let err = client.send_data(Vec::new(), Priority::Normal).await.unwrap_err();
    assert!(matches!(err, jennynet::JennyError::NullObject));
    client.close(None).await;
    server.close().await;
}
