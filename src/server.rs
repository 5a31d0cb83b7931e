//! # Server accept core
//!
//! [`Server`] owns a listening socket, a set of live connections, a
//! server-listener set, and either a bounded accept queue or an inline
//! accept policy (design document §4.5). Modelled on the teacher's
//! multi-client `TcpSocketTransport`: a `connections` map keyed by
//! connection id behind a lock, a background accept loop spawned once at
//! `start()`, and per-connection handlers spawned off that loop — here
//! generalised from raw `TcpStream`s to full [`Connection`] engines.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use uuid::Uuid;

use crate::config::{ConnectionConfig, ServerConfig};
use crate::connection::{handshake, Connection, PeerParams};
use crate::error::JennyError;
use crate::events::{BroadcastOutcome, ServerListener};
use crate::metrics::Category;
use crate::objects::UserObject;
use crate::wire::Priority;

/// How freshly accepted sockets are surfaced to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalMethod {
    /// The server decides accept/reject itself via the installed accept
    /// policy, in the accept loop, and only notifies listeners once the
    /// connection is CONNECTED.
    Listener,
    /// Each accepted socket is queued and handed to the next caller of
    /// [`Server::accept`], who decides by calling `start()`/`reject()` on
    /// the returned [`PendingConnection`].
    Accept,
}

type AcceptPolicy = dyn Fn(&PeerParams) -> bool + Send + Sync;

/// A freshly accepted socket that has completed the parameter exchange
/// but not yet received its ACK/REJECT verdict — the connection exists
/// conceptually in HANDSHAKING (design document §4.5).
pub struct PendingConnection {
    stream: TcpStream,
    uuid: Uuid,
    peer: PeerParams,
    config: ConnectionConfig,
    inner: Arc<Inner>,
}

impl PendingConnection {
    pub fn peer_uuid(&self) -> Uuid {
        self.peer.uuid
    }

    pub fn peer_params(&self) -> PeerParams {
        self.peer
    }

    /// Send ACK, spawn the connection's tasks, and register it in the
    /// server's connection set.
    pub async fn start(mut self) -> Result<Arc<Connection>, JennyError> {
        handshake::server_finish(&mut self.stream, true).await?;
        let conn = Connection::start(self.stream, self.uuid, self.peer, self.config, Category::Server);
        self.inner.connections.lock().insert(conn.uuid, conn.clone());
        self.inner.notify_available(conn.uuid);
        Ok(conn)
    }

    /// Send REJECT and drop the socket before it ever reaches CONNECTED.
    pub async fn reject(mut self) {
        let _ = handshake::server_finish(&mut self.stream, false).await;
    }
}

struct Inner {
    config: ServerConfig,
    connections: SyncMutex<HashMap<Uuid, Arc<Connection>>>,
    listeners: SyncMutex<Vec<Arc<dyn ServerListener>>>,
    signal_method: SyncMutex<SignalMethod>,
    accept_policy: SyncMutex<Arc<AcceptPolicy>>,
    next_transaction: AtomicU64,
    terminate: std::sync::atomic::AtomicBool,
}

impl Inner {
    fn notify_available(&self, connection_uuid: Uuid) {
        for listener in self.listeners.lock().iter() {
            listener.connection_available(connection_uuid);
        }
    }

    fn notify_closed(&self, connection_uuid: Uuid) {
        for listener in self.listeners.lock().iter() {
            listener.connection_closed(connection_uuid);
        }
    }

    fn notify_broadcast(&self, outcome: BroadcastOutcome) {
        for listener in self.listeners.lock().iter() {
            listener.on_broadcast_outcome(&outcome);
        }
    }
}

/// Listening socket plus the live connection set it has produced.
/// Cheap to clone — every handle shares the same accept loop and
/// connection set.
#[derive(Clone)]
pub struct Server {
    inner: Arc<Inner>,
    accept_tx: mpsc::Sender<PendingConnection>,
    accept_rx: Arc<AsyncMutex<mpsc::Receiver<PendingConnection>>>,
    listener: Arc<AsyncMutex<Option<TcpListener>>>,
}

impl Server {
    /// Bind the listening socket. Does not accept connections until
    /// [`Server::start`] is called.
    pub async fn bind(address: SocketAddr) -> Result<Self, JennyError> {
        Self::bind_with_config(ServerConfig::new(address)).await
    }

    pub async fn bind_with_config(config: ServerConfig) -> Result<Self, JennyError> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let (accept_tx, accept_rx) = mpsc::channel(config.accept_queue_capacity.max(1));
        Ok(Server {
            inner: Arc::new(Inner {
                config,
                connections: SyncMutex::new(HashMap::new()),
                listeners: SyncMutex::new(Vec::new()),
                signal_method: SyncMutex::new(SignalMethod::Accept),
                accept_policy: SyncMutex::new(Arc::new(|_: &PeerParams| true)),
                next_transaction: AtomicU64::new(0),
                terminate: std::sync::atomic::AtomicBool::new(false),
            }),
            accept_tx,
            accept_rx: Arc::new(AsyncMutex::new(accept_rx)),
            listener: Arc::new(AsyncMutex::new(Some(listener))),
        })
    }

    /// Spawn the accept loop. Each accepted socket runs the server side
    /// of the handshake's parameter exchange, then is routed according
    /// to the current signal method. A no-op if already started.
    pub async fn start(&self) {
        let listener = self.listener.lock().await.take();
        let Some(listener) = listener else { return };
        let inner = self.inner.clone();
        let accept_tx = self.accept_tx.clone();
        tokio::spawn(async move {
            loop {
                if inner.terminate.load(Ordering::SeqCst) {
                    break;
                }
                let (stream, peer_addr) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "server accept loop ended");
                        break;
                    }
                };
                tracing::debug!(%peer_addr, "accepted connection");
                let inner = inner.clone();
                let accept_tx = accept_tx.clone();
                tokio::spawn(handle_accepted(inner, accept_tx, stream));
            }
        });
    }

    pub fn set_signal_method(&self, method: SignalMethod) {
        *self.inner.signal_method.lock() = method;
    }

    /// Install the predicate consulted in `SignalMethod::Listener` mode
    /// to decide ACK vs REJECT. Ignored in `SignalMethod::Accept` mode,
    /// where the caller of `accept()` decides instead.
    pub fn set_accept_policy(&self, policy: impl Fn(&PeerParams) -> bool + Send + Sync + 'static) {
        *self.inner.accept_policy.lock() = Arc::new(policy);
    }

    pub fn add_listener(&self, listener: Arc<dyn ServerListener>) {
        self.inner.listeners.lock().push(listener);
    }

    /// Pop one pending connection off the accept queue (`SignalMethod::Accept`
    /// mode only), or time out.
    pub async fn accept(&self, timeout: Duration) -> Option<PendingConnection> {
        let mut rx = self.accept_rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.lock().len()
    }

    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.inner.connections.lock().values().cloned().collect()
    }

    /// Close a single connection by its (local-side) uuid, gracefully.
    pub async fn close_connection(&self, uuid: Uuid, reason: Option<String>) {
        let conn = self.inner.connections.lock().get(&uuid).cloned();
        if let Some(conn) = conn {
            conn.close(reason).await;
        }
    }

    /// Close the listening socket and every live connection. Each
    /// connection's closed event carries `info=1` (server-broadcast,
    /// local side) / `info=3` (server-broadcast, peer side) per the
    /// state table.
    pub async fn close_all_connections(&self, reason: Option<String>) {
        self.inner.terminate.store(true, Ordering::SeqCst);
        let conns: Vec<Arc<Connection>> = self.inner.connections.lock().values().cloned().collect();
        for conn in conns {
            conn.close(reason.clone()).await;
        }
    }

    pub async fn close(&self) {
        self.close_all_connections(None).await;
    }

    fn next_transaction(&self) -> u64 {
        self.inner.next_transaction.fetch_add(1, Ordering::SeqCst)
    }

    fn live_connections(&self, except: Option<Uuid>) -> Vec<Arc<Connection>> {
        self.inner
            .connections
            .lock()
            .values()
            .filter(|c| Some(c.uuid) != except)
            .cloned()
            .collect()
    }

    /// Broadcast a user object to every live connection, reporting
    /// per-connection failures to server listeners under one shared
    /// transaction number (design document §4.5).
    pub async fn send_object_to_all<T: UserObject>(&self, value: &T, priority: Priority) -> u64 {
        self.send_object_except(value, priority, None).await
    }

    pub async fn send_object_except<T: UserObject>(
        &self,
        value: &T,
        priority: Priority,
        except: Option<Uuid>,
    ) -> u64 {
        let transaction = self.next_transaction();
        for conn in self.live_connections(except) {
            let result = conn.send_object(value, None, priority).await;
            self.inner.notify_broadcast(BroadcastOutcome {
                transaction,
                connection_uuid: conn.uuid,
                result: result.map_err(|e| e.to_string()),
            });
        }
        transaction
    }

    pub async fn send_data_to_all(&self, bytes: Vec<u8>, priority: Priority) -> u64 {
        self.send_data_except(bytes, priority, None).await
    }

    pub async fn send_data_except(&self, bytes: Vec<u8>, priority: Priority, except: Option<Uuid>) -> u64 {
        let transaction = self.next_transaction();
        for conn in self.live_connections(except) {
            let result = conn.send_data(bytes.clone(), priority).await;
            self.inner.notify_broadcast(BroadcastOutcome {
                transaction,
                connection_uuid: conn.uuid,
                result: result.map_err(|e| e.to_string()),
            });
        }
        transaction
    }

    pub async fn send_file_to_all(&self, source: std::path::PathBuf, remote_path: String, priority: Priority) -> u64 {
        self.send_file_except(source, remote_path, priority, None).await
    }

    pub async fn send_file_except(
        &self,
        source: std::path::PathBuf,
        remote_path: String,
        priority: Priority,
        except: Option<Uuid>,
    ) -> u64 {
        let transaction = self.next_transaction();
        for conn in self.live_connections(except) {
            let result = conn.send_file(source.clone(), remote_path.clone(), priority).await;
            self.inner.notify_broadcast(BroadcastOutcome {
                transaction,
                connection_uuid: conn.uuid,
                result: result.map_err(|e| e.to_string()),
            });
        }
        transaction
    }

    pub async fn send_ping_to_all(&self) -> u64 {
        self.send_ping_except(None).await
    }

    pub async fn send_ping_except(&self, except: Option<Uuid>) -> u64 {
        let transaction = self.next_transaction();
        for conn in self.live_connections(except) {
            let nonce = conn.send_ping().await;
            self.inner.notify_broadcast(BroadcastOutcome {
                transaction,
                connection_uuid: conn.uuid,
                result: Ok(nonce as u64),
            });
        }
        transaction
    }

    pub async fn send_tempo_to_all(&self, bytes_per_second: i64) -> u64 {
        self.send_tempo_except(bytes_per_second, None).await
    }

    pub async fn send_tempo_except(&self, bytes_per_second: i64, except: Option<Uuid>) -> u64 {
        let transaction = self.next_transaction();
        for conn in self.live_connections(except) {
            conn.set_tempo(bytes_per_second).await;
            self.inner.notify_broadcast(BroadcastOutcome {
                transaction,
                connection_uuid: conn.uuid,
                result: Ok(0),
            });
        }
        transaction
    }
}

async fn handle_accepted(inner: Arc<Inner>, accept_tx: mpsc::Sender<PendingConnection>, mut stream: TcpStream) {
    let uuid = Uuid::new_v4();
    let config = inner.config.connection_defaults.clone();
    if let Err(e) = crate::connection::tune_socket(&mut stream, config.transmission_parcel_size) {
        tracing::debug!(error = %e, "failed to tune accepted socket, continuing with defaults");
    }
    let peer = match handshake::server_negotiate(&mut stream, uuid, &config).await {
        Ok(peer) => peer,
        Err(e) => {
            tracing::debug!(error = %e, "handshake negotiation failed for accepted socket");
            return;
        }
    };

    let pending = PendingConnection {
        stream,
        uuid,
        peer,
        config,
        inner: inner.clone(),
    };

    match *inner.signal_method.lock() {
        SignalMethod::Listener => {
            let accept = (inner.accept_policy.lock().clone())(&pending.peer);
            if accept {
                if let Err(e) = pending.start().await {
                    tracing::debug!(error = %e, "pending connection failed to start");
                }
            } else {
                pending.reject().await;
            }
        }
        SignalMethod::Accept => {
            if accept_tx.send(pending).await.is_err() {
                tracing::warn!("accept queue closed, dropping pending connection");
            }
        }
    }
}

/// Forgets a connection once it has reached CLOSED, so the server's
/// broadcast helpers stop addressing it. Connections report their own
/// closure; the server only needs to drop its reference (design
/// document §4.4 ownership note: "each connection can outlive its entry
/// in the server's collection").
pub async fn reap_closed(server: &Server, uuid: Uuid, timeout: Duration) {
    let conn = server.inner.connections.lock().get(&uuid).cloned();
    if let Some(conn) = conn {
        conn.wait_for_closed(timeout).await;
        server.inner.connections.lock().remove(&uuid);
        server.inner.notify_closed(uuid);
    }
}
