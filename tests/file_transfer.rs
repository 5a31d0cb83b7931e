//! Loopback coverage for file transfers: a small file is staged to a
//! temp file on the receiving side, CRC-verified, and renamed into
//! place under the configured file root, with a CONFIRM signal flowing
//! back to the sender.

mod common;

use std::sync::Arc;
use std::time::Duration;

use jennynet::events::{Event, TransmissionEventKind};
use jennynet::{Connection, ConnectionConfig, Priority, Server};

use common::{free_addr, wait_until, CollectingListener};

async fn connect_pair_with_file_root(
    file_root: std::path::PathBuf,
) -> (Arc<Connection>, Arc<Connection>, Server) {
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
    accepted.set_file_root_dir(Some(file_root));
    (client.expect("client connects"), accepted, server)
}

#[tokio::test]
async fn file_transfer_renames_into_place_and_confirms() {
    let source_dir = tempfile::tempdir().expect("source tempdir");
    let dest_dir = tempfile::tempdir().expect("dest tempdir");

    let source_path = source_dir.path().join("report.txt");
    tokio::fs::write(&source_path, b"quarterly figures")
        .await
        .expect("write source file");

    let (client, accepted, server) = connect_pair_with_file_root(dest_dir.path().to_path_buf()).await;

    let client_listener = CollectingListener::new();
    client.add_listener(client_listener.clone());
    let server_listener = CollectingListener::new();
    accepted.add_listener(server_listener.clone());

    client
        .send_file(source_path.clone(), "inbox/report.txt".to_string(), Priority::Normal)
        .await
        .expect("send_file succeeds");

    let received = wait_until(&server_listener, Duration::from_secs(2), |events| {
        events.iter().any(|e| {
            matches!(
                e,
                Event::Transmission { kind: TransmissionEventKind::FileReceived, .. }
            )
        })
    })
    .await;
    assert!(received, "receiving side should observe FileReceived");

    let final_path = dest_dir.path().join("inbox/report.txt");
    let contents = tokio::fs::read(&final_path).await.expect("final file exists");
    assert_eq!(contents, b"quarterly figures");

    let confirmed = wait_until(&client_listener, Duration::from_secs(2), |events| {
        events.iter().any(|e| matches!(e, Event::Transmission { kind: TransmissionEventKind::FileConfirmed, .. }))
    })
    .await;
    assert!(confirmed, "sending side should observe FileConfirmed once the peer acks");

    client.close(None).await;
    server.close().await;
}

#[tokio::test]
async fn send_file_fails_fast_for_a_missing_source() {
    let addr = free_addr();
    let server = Server::bind(addr).await.expect("bind");
    server.start().await;
    let client = Connection::connect(addr, ConnectionConfig::default())
        .await
        .expect("client connects");

    let err = client
        .send_file(
            std::path::PathBuf::from("/no/such/file/anywhere"),
            "dest.bin".to_string(),
            Priority::Normal,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, jennynet::JennyError::FileNotFound(_)));

    client.close(None).await;
    server.close().await;
}
