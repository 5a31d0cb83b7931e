//! # Connection Engine
//!
//! A [`Connection`] owns one half of an established wire session: the
//! split socket (held only by its tasks, never by the shared struct —
//! see design notes §9's "arena-style ownership... workers hold weak
//! handles" guidance, realised here as "tasks own the halves outright"
//! rather than via weak references, since Tokio's split halves are
//! already exclusively owned), the serialisation registry copies, the
//! priority send queue, the assembler table, the listener set, the
//! monitor, and the state machine (design document §3/§4.4).
//!
//! Four tasks run per connection: the serialisation stage, the transmit
//! stage, the receive stage, and the idle/keepalive task. They
//! communicate only through the bounded object queue, the priority send
//! queue, and a handful of small locked fields — never by holding a lock
//! across a socket operation (design document §5).

pub(crate) mod handshake;
mod idle;
mod receive;
mod send;
mod signal_handler;
mod state;
mod tempo;

pub use handshake::PeerParams;
pub use send::SendOrder;
pub use state::{ConnState, Initiator};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex as SyncMutex;
use tokio::net::TcpStream;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use uuid::Uuid;

use crate::assembler::IncomingAssembler;
use crate::config::ConnectionConfig;
use crate::error::{InfoCode, JennyError};
use crate::events::{ConnectionListener, Direction as EventDirection, Event};
use crate::metrics::{Category, Monitor, MonitorSnapshot};
use crate::objects::{encode_user_object, OutgoingPayload, UserObject};
use crate::queue::PriorityQueue;
use crate::serialization::{self, Serializer};
use crate::signal::Signal;
use crate::transfer::OutgoingTransfer;
use crate::wire::Priority;

use self::tempo::TempoState;

fn derive_short_id(uuid: &Uuid) -> [u8; 4] {
    let bytes = uuid.as_bytes();
    [bytes[0], bytes[1], bytes[2], bytes[3]]
}

/// Disable Nagle's algorithm and size the kernel send/receive buffers
/// to roughly one parcel, the way the teacher's `ipc/tcp_socket.rs`
/// tunes freshly connected/accepted sockets "for low latency" before
/// handing them to the transport. Tokio's `TcpStream` exposes
/// `set_nodelay` directly but not buffer sizing, hence the detour
/// through `socket2` on the std-socket representation.
pub(crate) fn tune_socket(stream: &mut TcpStream, parcel_size: u32) -> std::io::Result<()> {
    stream.set_nodelay(true)?;
    let buffer_size = (parcel_size.max(1) as usize).saturating_mul(4);
    let fd_socket = socket2::SockRef::from(stream);
    fd_socket.set_recv_buffer_size(buffer_size)?;
    fd_socket.set_send_buffer_size(buffer_size)?;
    Ok(())
}

/// The live engine behind one established session. Cheap to share —
/// callers always hold an `Arc<Connection>`.
pub struct Connection {
    pub uuid: Uuid,
    pub short_id: [u8; 4],
    peer_uuid: AsyncMutex<Option<Uuid>>,
    category: Category,
    config: SyncMutex<ConnectionConfig>,
    state: AsyncMutex<ConnState>,
    pub(crate) monitor: Monitor,
    listeners: SyncMutex<Vec<Arc<dyn ConnectionListener>>>,
    properties: SyncMutex<HashMap<String, String>>,
    pub(crate) send_serializer: AsyncMutex<Box<dyn Serializer>>,
    pub(crate) recv_serializer: AsyncMutex<Box<dyn Serializer>>,
    next_outgoing_object_id: AtomicU64,
    pub(crate) finished_incoming_ids: SyncMutex<HashSet<u64>>,
    pub(crate) outgoing_transfers: AsyncMutex<HashMap<u64, OutgoingTransfer>>,
    pub(crate) incoming_assemblers: AsyncMutex<HashMap<u64, IncomingAssembler>>,
    pub(crate) priority_queue: Arc<PriorityQueue>,
    object_tx: AsyncMutex<Option<send::ObjectSender>>,
    pub(crate) terminate: Arc<AtomicBool>,
    pub(crate) tempo: SyncMutex<TempoState>,
    ping_outstanding: SyncMutex<Option<(i64, Instant)>>,
    last_ping_sent_at: SyncMutex<Option<Instant>>,
    closed_notify: Notify,
    name: SyncMutex<Option<String>>,
}

impl Connection {
    fn new(uuid: Uuid, category: Category, config: ConnectionConfig) -> Arc<Self> {
        let send_serializer = serialization::method_by_id(config.serialisation_method)
            .unwrap_or_else(|_| Box::new(crate::serialization::CompactSerializer::new()));
        let recv_serializer = serialization::method_by_id(config.serialisation_method)
            .unwrap_or_else(|_| Box::new(crate::serialization::CompactSerializer::new()));
        let tempo_initial = config.transmission_speed;
        let tempo_fixed = config.tempo_fixed;
        let parcel_queue_capacity = config.parcel_queue_capacity;

        Arc::new(Connection {
            uuid,
            short_id: derive_short_id(&uuid),
            peer_uuid: AsyncMutex::new(None),
            category,
            config: SyncMutex::new(config),
            state: AsyncMutex::new(ConnState::Handshaking),
            monitor: Monitor::new(category),
            listeners: SyncMutex::new(Vec::new()),
            properties: SyncMutex::new(HashMap::new()),
            send_serializer: AsyncMutex::new(send_serializer),
            recv_serializer: AsyncMutex::new(recv_serializer),
            next_outgoing_object_id: AtomicU64::new(0),
            finished_incoming_ids: SyncMutex::new(HashSet::new()),
            outgoing_transfers: AsyncMutex::new(HashMap::new()),
            incoming_assemblers: AsyncMutex::new(HashMap::new()),
            priority_queue: PriorityQueue::new(parcel_queue_capacity),
            object_tx: AsyncMutex::new(None),
            terminate: Arc::new(AtomicBool::new(false)),
            tempo: SyncMutex::new(TempoState::new(tempo_initial, tempo_fixed)),
            ping_outstanding: SyncMutex::new(None),
            last_ping_sent_at: SyncMutex::new(None),
            closed_notify: Notify::new(),
            name: SyncMutex::new(None),
        })
    }

    /// Establish an outbound connection, performing the client side of
    /// the handshake, and start the connection's tasks.
    pub async fn connect(addr: std::net::SocketAddr, config: ConnectionConfig) -> Result<Arc<Self>, JennyError> {
        let mut stream = TcpStream::connect(addr).await?;
        tune_socket(&mut stream, config.transmission_parcel_size)?;
        let uuid = Uuid::new_v4();
        let peer = handshake::client_handshake(&mut stream, uuid, &config).await?;
        Ok(Self::start(stream, uuid, peer, config, Category::Client))
    }

    /// Used by [`crate::server::Server`] after accepting a socket and
    /// completing the server side of the handshake.
    pub(crate) fn start(
        stream: TcpStream,
        uuid: Uuid,
        peer: PeerParams,
        config: ConnectionConfig,
        category: Category,
    ) -> Arc<Self> {
        let conn = Self::new(uuid, category, config.clone());
        *conn.peer_uuid.try_lock().expect("fresh connection") = Some(peer.uuid);

        let (object_tx, object_rx) = send::object_channel(config.object_queue_capacity);
        *conn.object_tx.try_lock().expect("fresh connection") = Some(object_tx);

        let (read_half, write_half) = stream.into_split();

        tokio::spawn(send::run_serialisation_stage(conn.clone(), object_rx));
        tokio::spawn(send::run_transmit_stage(conn.clone(), write_half));
        tokio::spawn(receive::run_receive_stage(conn.clone(), read_half));
        tokio::spawn(idle::run_idle_task(conn.clone()));

        {
            let mut state = conn.state.try_lock().expect("fresh connection");
            *state = ConnState::Connected;
        }
        conn.emit(Event::Connected);
        conn
    }

    pub fn config(&self) -> ConnectionConfig {
        self.config.lock().clone()
    }

    pub fn set_file_root_dir(&self, dir: Option<std::path::PathBuf>) {
        self.config.lock().file_root_dir = dir;
    }

    pub fn set_transmission_parcel_size(&self, v: u32) {
        self.config.lock().transmission_parcel_size = v;
    }

    pub fn set_idle_threshold(&self, v: u64) {
        self.config.lock().idle_threshold = v;
    }

    pub fn set_idle_check_period(&self, v: Duration) {
        self.config.lock().idle_check_period = v;
    }

    pub fn set_alive_period(&self, v: Duration) {
        self.config.lock().alive_period = v;
    }

    /// Resize the object or parcel queue. Both are fixed once CONNECTED
    /// (design document §6); any other field goes through its own setter
    /// instead since only these two are restricted.
    pub fn set_queue_capacity(&self, field: &str, _v: usize) -> Result<(), JennyError> {
        ConnectionConfig::assert_mutable_post_connect(field)
    }

    pub fn add_listener(&self, listener: Arc<dyn ConnectionListener>) {
        self.listeners.lock().push(listener);
    }

    pub fn set_property(&self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.lock().insert(key.into(), value.into());
    }

    pub fn get_property(&self, key: &str) -> Option<String> {
        self.properties.lock().get(key).cloned()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.lock() = Some(name.into());
    }

    pub fn monitor_snapshot(&self) -> MonitorSnapshot {
        self.monitor.snapshot()
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub async fn state_label(&self) -> &'static str {
        self.state.lock().await.label()
    }

    pub(crate) fn emit(&self, event: Event) {
        tracing::debug!(connection = %self.uuid, ?event, "connection event");
        for listener in self.listeners.lock().iter() {
            listener.on_event(&event);
        }
    }

    pub(crate) async fn send_signal_unbound(&self, signal: Signal) {
        let parcel = crate::wire::Parcel::signal(Priority::Top, 0, signal.encode());
        self.priority_queue
            .push_with_key(crate::wire::parcel::ScheduleKey::unbound_signal(), parcel, &self.terminate)
            .await;
    }

    async fn next_object_id(&self) -> u64 {
        self.next_outgoing_object_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn assert_can_send(&self) -> Result<(), JennyError> {
        match &*self.state.lock().await {
            ConnState::Connected => Ok(()),
            ConnState::Closed { .. } => Err(JennyError::ClosedConnection),
            _ => Err(JennyError::Unconnected),
        }
    }

    async fn enqueue(&self, object_id: u64, priority: Priority, method_id: u32, payload: OutgoingPayload) -> Result<u64, JennyError> {
        let order = SendOrder {
            object_id,
            priority,
            method_id,
            payload,
            cancel: Arc::new(AtomicBool::new(false)),
        };
        let sender = self.object_tx.lock().await;
        let sender = sender.as_ref().ok_or(JennyError::Unconnected)?;
        sender
            .try_send(order)
            .map_err(|_| JennyError::ListOverflow)?;
        Ok(object_id)
    }

    /// Send a registered user object (design document §4.4 `send_object`).
    pub async fn send_object<T: UserObject>(&self, value: &T, method_id: Option<u32>, priority: Priority) -> Result<u64, JennyError> {
        self.assert_can_send().await?;
        let method_id = method_id.unwrap_or_else(|| self.config().serialisation_method);
        let payload = encode_user_object(value)?;
        {
            let mut serializer = self.send_serializer.lock().await;
            if serializer.method_id() != method_id {
                *serializer = serialization::method_by_id(method_id)?;
            }
            serializer.register_class(T::CLASS_NAME)?;
        }
        let object_id = self.next_object_id().await;
        self.enqueue(object_id, priority, method_id, payload).await
    }

    /// Send a raw byte block, bypassing class registration.
    pub async fn send_data(&self, bytes: Vec<u8>, priority: Priority) -> Result<u64, JennyError> {
        self.assert_can_send().await?;
        if bytes.is_empty() {
            return Err(JennyError::NullObject);
        }
        let method_id = self.config().serialisation_method;
        let object_id = self.next_object_id().await;
        self.enqueue(object_id, priority, method_id, OutgoingPayload::Data(bytes)).await
    }

    /// Send a file. Fails fast (before enqueueing) if the source does not
    /// exist or `remote_path` is missing, matching the synchronous-use-error
    /// contract in design document §4.4.
    pub async fn send_file(&self, source: std::path::PathBuf, remote_path: String, priority: Priority) -> Result<u64, JennyError> {
        self.assert_can_send().await?;
        if remote_path.is_empty() {
            return Err(JennyError::EmptyRemotePath);
        }
        if !tokio::fs::metadata(&source).await.is_ok() {
            return Err(JennyError::FileNotFound(source.display().to_string()));
        }
        let method_id = self.config().serialisation_method;
        let object_id = self.next_object_id().await;
        self.enqueue(object_id, priority, method_id, OutgoingPayload::File { source, remote_path }).await
    }

    /// Send a PING, returning its nonce, or -1 if one is already
    /// outstanding or the guard window has not elapsed.
    pub async fn send_ping(&self) -> i64 {
        let guard = self.config().ping_guard_window;
        let now = Instant::now();
        {
            let mut last = self.last_ping_sent_at.lock();
            if self.ping_outstanding.lock().is_some() {
                return -1;
            }
            if let Some(t) = *last {
                if now.duration_since(t) < guard {
                    return -1;
                }
            }
            *last = Some(now);
        }
        let nonce = crate::utils::fresh_nonce();
        *self.ping_outstanding.lock() = Some((nonce, now));
        self.send_signal_unbound(Signal::Ping { nonce }).await;
        nonce
    }

    pub(crate) async fn on_echo(&self, nonce: i64) {
        let outstanding = self.ping_outstanding.lock().take();
        if let Some((expected, sent_at)) = outstanding {
            if expected == nonce {
                let rtt_ms = sent_at.elapsed().as_millis() as u64;
                self.monitor.set_last_ping_ms(rtt_ms);
                self.emit(Event::PingEcho { nonce, rtt_ms });
            } else {
                *self.ping_outstanding.lock() = Some((expected, sent_at));
            }
        }
    }

    /// Propose a new send tempo, propagated to the peer via a TEMPO signal.
    pub async fn set_tempo(&self, bytes_per_second: i64) {
        let effective = self.tempo.lock().propose_local(bytes_per_second);
        self.monitor.set_effective_tempo(effective);
        self.send_signal_unbound(Signal::Tempo(bytes_per_second as i32)).await;
    }

    pub fn set_tempo_fixed(&self, fixed: bool) {
        self.tempo.lock().set_fixed(fixed);
    }

    /// Cancel an in-flight transfer (design document §4.4 "Cancellation").
    pub async fn break_transfer(&self, object_id: u64, direction: EventDirection, reason: Option<String>) -> bool {
        let reason = reason.unwrap_or_else(|| "cancelled by local application".to_string());
        match direction {
            EventDirection::Outgoing => {
                let transfer = self.outgoing_transfers.lock().await.remove(&object_id);
                let Some(transfer) = transfer else { return false };
                transfer.cancel();
                self.priority_queue.drop_object(object_id).await;
                self.monitor.file_finished(true, false);
                self.emit(Event::Transmission {
                    kind: crate::events::TransmissionEventKind::FileAborted,
                    object_id,
                    direction: EventDirection::Outgoing,
                    path: None,
                    info: Some(InfoCode::AbortOwnOut as u8),
                    message: Some(reason.clone()),
                });
                self.send_signal_unbound(Signal::Break {
                    object_id,
                    direction: EventDirection::Outgoing,
                    info: InfoCode::AbortPeerOut as u8,
                    reason,
                })
                .await;
                true
            }
            EventDirection::Incoming => {
                let assembler = self.incoming_assemblers.lock().await.remove(&object_id);
                let Some(assembler) = assembler else { return false };
                if let IncomingAssembler::File(f) = assembler {
                    f.abort().await;
                }
                self.monitor.file_finished(false, false);
                self.emit(Event::Transmission {
                    kind: crate::events::TransmissionEventKind::FileAborted,
                    object_id,
                    direction: EventDirection::Incoming,
                    path: None,
                    info: Some(InfoCode::AbortOwnIn as u8),
                    message: Some(reason.clone()),
                });
                self.send_signal_unbound(Signal::Break {
                    object_id,
                    direction: EventDirection::Incoming,
                    info: InfoCode::AbortPeerIn as u8,
                    reason,
                })
                .await;
                true
            }
        }
    }

    /// Graceful close: enters SHUTDOWN, sends ENTER_SHUTDOWN, and waits
    /// for both sides' all-data-sent acknowledgement up to
    /// `graceful_close_wait` before forcing CLOSED.
    pub async fn close(self: &Arc<Self>, reason: Option<String>) {
        {
            let mut state = self.state.lock().await;
            if !matches!(*state, ConnState::Connected) {
                return;
            }
            *state = ConnState::Shutdown {
                initiator: Initiator::Local,
                local_all_sent: false,
                peer_all_sent: false,
                entered_at: Instant::now(),
                message: reason.clone(),
            };
        }
        self.emit(Event::Shutdown { message: reason });
        self.send_signal_unbound(Signal::EnterShutdown).await;

        let wait = self.config().graceful_close_wait;
        let conn = self.clone();
        tokio::spawn(async move {
            conn.send_signal_unbound(Signal::AllDataSent).await;
            conn.on_local_all_data_sent().await;
            tokio::time::sleep(wait).await;
            if conn.force_closed_if_pending(InfoCode::ClosedHard as u8).await {
                conn.abort_pending_graceful().await;
            }
        });
    }

    /// Hard close: drops queues, closes the socket, emits closed(info=10)
    /// immediately (design document §4.4 state table).
    pub async fn close_hard(&self) {
        self.abort_pending_hard().await;
        self.terminate.store(true, Ordering::SeqCst);
        self.priority_queue.wake_all();
        self.transition_closed(InfoCode::ClosedHard as u8, None).await;
    }

    /// Abort any transfers still in flight when a graceful close's wait
    /// timed out (design document §4.4 "close-initiated aborts", codes
    /// 113-116): own side gets the own-* code locally, the peer gets a
    /// BREAK carrying the peer-* code.
    async fn abort_pending_graceful(&self) {
        let outgoing: Vec<u64> = self.outgoing_transfers.lock().await.keys().copied().collect();
        for object_id in outgoing {
            if self.outgoing_transfers.lock().await.remove(&object_id).is_some() {
                self.priority_queue.drop_object(object_id).await;
                self.monitor.file_finished(true, false);
                self.emit(Event::Transmission {
                    kind: crate::events::TransmissionEventKind::FileAborted,
                    object_id,
                    direction: EventDirection::Outgoing,
                    path: None,
                    info: Some(InfoCode::CloseAbortOwnOut as u8),
                    message: Some("connection closed while transfer was in progress".to_string()),
                });
                self.send_signal_unbound(Signal::Break {
                    object_id,
                    direction: EventDirection::Outgoing,
                    info: InfoCode::CloseAbortPeerOut as u8,
                    reason: "connection closed while transfer was in progress".to_string(),
                })
                .await;
            }
        }
        let incoming: Vec<u64> = self.incoming_assemblers.lock().await.keys().copied().collect();
        for object_id in incoming {
            if let Some(assembler) = self.incoming_assemblers.lock().await.remove(&object_id) {
                if let IncomingAssembler::File(f) = assembler {
                    f.abort().await;
                }
                self.monitor.file_finished(false, false);
                self.emit(Event::Transmission {
                    kind: crate::events::TransmissionEventKind::FileAborted,
                    object_id,
                    direction: EventDirection::Incoming,
                    path: None,
                    info: Some(InfoCode::CloseAbortOwnIn as u8),
                    message: Some("connection closed while transfer was in progress".to_string()),
                });
                self.send_signal_unbound(Signal::Break {
                    object_id,
                    direction: EventDirection::Incoming,
                    info: InfoCode::CloseAbortPeerIn as u8,
                    reason: "connection closed while transfer was in progress".to_string(),
                })
                .await;
            }
        }
    }

    /// Abort any transfers still in flight when `close_hard()` tears the
    /// socket down outright. No BREAK can reach the peer (the socket is
    /// going away with it), so both directions are reported locally under
    /// the own-in code with the hard-close exception message.
    async fn abort_pending_hard(&self) {
        let outgoing: Vec<u64> = self.outgoing_transfers.lock().await.keys().copied().collect();
        for object_id in outgoing {
            if self.outgoing_transfers.lock().await.remove(&object_id).is_some() {
                self.priority_queue.drop_object(object_id).await;
                self.monitor.file_finished(true, false);
                self.emit(Event::Transmission {
                    kind: crate::events::TransmissionEventKind::FileAborted,
                    object_id,
                    direction: EventDirection::Outgoing,
                    path: None,
                    info: Some(InfoCode::CloseAbortOwnIn as u8),
                    message: Some("connection-closed-hardly".to_string()),
                });
            }
        }
        let incoming: Vec<u64> = self.incoming_assemblers.lock().await.keys().copied().collect();
        for object_id in incoming {
            if let Some(assembler) = self.incoming_assemblers.lock().await.remove(&object_id) {
                if let IncomingAssembler::File(f) = assembler {
                    f.abort().await;
                }
                self.monitor.file_finished(false, false);
                self.emit(Event::Transmission {
                    kind: crate::events::TransmissionEventKind::FileAborted,
                    object_id,
                    direction: EventDirection::Incoming,
                    path: None,
                    info: Some(InfoCode::CloseAbortOwnIn as u8),
                    message: Some("connection-closed-hardly".to_string()),
                });
            }
        }
    }

    pub(crate) async fn on_socket_fault(&self) {
        self.terminate.store(true, Ordering::SeqCst);
        self.priority_queue.wake_all();
        self.transition_closed(InfoCode::ClosedSocketFault as u8, None).await;
    }

    pub(crate) async fn on_protocol_error(&self, error: JennyError) {
        self.terminate.store(true, Ordering::SeqCst);
        self.priority_queue.wake_all();
        self.transition_closed(InfoCode::ClosedHard as u8, Some(error.to_string())).await;
    }

    pub(crate) async fn on_peer_enter_shutdown(&self) {
        let mut state = self.state.lock().await;
        if matches!(*state, ConnState::Connected) {
            *state = ConnState::Shutdown {
                initiator: Initiator::Peer,
                local_all_sent: false,
                peer_all_sent: false,
                entered_at: Instant::now(),
                message: None,
            };
            drop(state);
            self.emit(Event::Shutdown { message: None });
        }
    }

    pub(crate) async fn on_peer_all_data_sent(&self) {
        let mut state = self.state.lock().await;
        if let ConnState::Shutdown {
            initiator,
            local_all_sent,
            peer_all_sent,
            ..
        } = &mut *state
        {
            *peer_all_sent = true;
            if *local_all_sent {
                let info = match initiator {
                    Initiator::Local => InfoCode::ClosedLocalInitiator as u8,
                    Initiator::Peer => InfoCode::ClosedPeerInitiator as u8,
                    Initiator::ServerBroadcast => InfoCode::ClosedServerBroadcastLocal as u8,
                };
                drop(state);
                self.transition_closed(info, None).await;
            }
        }
    }

    pub(crate) async fn on_local_all_data_sent(&self) {
        let mut state = self.state.lock().await;
        if let ConnState::Shutdown {
            initiator,
            local_all_sent,
            peer_all_sent,
            ..
        } = &mut *state
        {
            *local_all_sent = true;
            if *peer_all_sent {
                let info = match initiator {
                    Initiator::Local => InfoCode::ClosedLocalInitiator as u8,
                    Initiator::Peer => InfoCode::ClosedPeerInitiator as u8,
                    Initiator::ServerBroadcast => InfoCode::ClosedServerBroadcastLocal as u8,
                };
                drop(state);
                self.transition_closed(info, None).await;
            }
        }
    }

    /// If still SHUTDOWN (the peer never finished draining), force CLOSED.
    /// Returns whether it actually forced the transition, so the caller
    /// knows whether to also abort leftover transfers.
    async fn force_closed_if_pending(&self, info: u8) -> bool {
        let mut state = self.state.lock().await;
        if matches!(*state, ConnState::Shutdown { .. }) {
            *state = ConnState::Closed { info, message: Some("graceful close timed out".to_string()) };
            drop(state);
            self.terminate.store(true, Ordering::SeqCst);
            self.priority_queue.wake_all();
            self.emit(Event::Closed { info, message: Some("graceful close timed out".to_string()) });
            self.closed_notify.notify_waiters();
            true
        } else {
            false
        }
    }

    async fn transition_closed(&self, info: u8, message: Option<String>) {
        let mut state = self.state.lock().await;
        if matches!(*state, ConnState::Closed { .. }) {
            return;
        }
        *state = ConnState::Closed { info, message: message.clone() };
        drop(state);
        self.emit(Event::Closed { info, message });
        self.closed_notify.notify_waiters();
    }

    /// Block until the connection reaches CLOSED or `timeout` elapses.
    /// Returns whether it closed within the window.
    pub async fn wait_for_closed(&self, timeout: Duration) -> bool {
        if self.state.lock().await.is_closed() {
            return true;
        }
        tokio::time::timeout(timeout, self.closed_notify.notified())
            .await
            .is_ok()
    }
}
