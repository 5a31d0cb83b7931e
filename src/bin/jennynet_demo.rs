//! Thin accept-loop demo binary for `jennynet` (design document §1's "a
//! thin server accept loop is covered only to the extent it produces
//! fresh connection engines"). Not a test harness or reflect server.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use jennynet::events::{ConnectionListener, Event};
use jennynet::{
    cli::{Args, Mode},
    serialization::METHOD_PORTABLE,
    wire::Priority,
    Connection, ConnectionConfig, Server, ServerConfig, UserObject,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct DemoMessage {
    text: String,
}

impl UserObject for DemoMessage {
    const CLASS_NAME: &'static str = "jennynet.demo.DemoMessage";
}

struct PrintingListener;

impl ConnectionListener for PrintingListener {
    fn on_event(&self, event: &Event) {
        match event {
            Event::Connected => println!("connected"),
            Event::ObjectReceived { class, json_bytes, .. } if class == DemoMessage::CLASS_NAME => {
                if let Ok(msg) = serde_json::from_slice::<DemoMessage>(json_bytes) {
                    println!("received: {}", msg.text);
                }
            }
            Event::ObjectReceived { class, .. } => println!("received object of class {}", class),
            Event::DataReceived { bytes, .. } => println!("received {} raw bytes", bytes.len()),
            Event::Closed { info, message } => {
                println!("closed (info={}, message={:?})", info, message)
            }
            Event::Aborted { message } => println!("aborted: {}", message),
            _ => {}
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    jennynet::logging::init_demo_logging();
    let args = Args::parse();

    match args.mode {
        Mode::Serve { addr } => {
            let server = Server::bind_with_config(ServerConfig::new(addr)).await?;
            server.add_listener(Arc::new(DemoServerListener));
            server.start().await;
            println!("listening on {}", addr);

            loop {
                if let Some(pending) = server.accept(Duration::from_secs(3600)).await {
                    let peer = pending.peer_uuid();
                    match pending.start().await {
                        Ok(conn) => {
                            conn.add_listener(Arc::new(PrintingListener));
                            println!("accepted connection from peer {}", peer);
                        }
                        Err(e) => println!("failed to start connection: {}", e),
                    }
                }
            }
        }
        Mode::Send { addr, message } => {
            let mut config = ConnectionConfig::default();
            config.serialisation_method = METHOD_PORTABLE;
            let conn = Connection::connect(addr, config).await?;
            conn.add_listener(Arc::new(PrintingListener));
            conn.send_object(&DemoMessage { text: message }, None, Priority::Normal)
                .await?;
            conn.close(Some("demo client done".to_string())).await;
            conn.wait_for_closed(Duration::from_secs(5)).await;
            Ok(())
        }
    }
}

struct DemoServerListener;

impl jennynet::events::ServerListener for DemoServerListener {
    fn connection_available(&self, connection_uuid: uuid::Uuid) {
        println!("connection available: {}", connection_uuid);
    }

    fn connection_closed(&self, connection_uuid: uuid::Uuid) {
        println!("connection closed: {}", connection_uuid);
    }
}
