//! Send pipeline: serialisation stage and transmit stage (design
//! document §4.4 "Send pipeline"). Two independently schedulable Tokio
//! tasks cooperating through the bounded object queue and the
//! [`crate::queue::PriorityQueue`], matching the "workers cooperate only
//! via bounded queues" discipline of design document §5.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;

use crate::connection::Connection;
use crate::error::JennyError;
use crate::events::{Direction, Event, TransmissionEventKind};
use crate::io_manager;
use crate::objects::OutgoingPayload;
use crate::serialization::BYTE_BLOCK_CLASS;
use crate::transfer::{OutgoingTransfer, TransferKind};
use crate::wire::{Channel, ObjectHeader, Parcel, Priority};

/// A queued request to send one logical object, produced by the public
/// `send_*` API and consumed by the serialisation stage.
pub struct SendOrder {
    pub object_id: u64,
    pub priority: Priority,
    pub method_id: u32,
    pub payload: OutgoingPayload,
    pub cancel: Arc<AtomicBool>,
}

pub type ObjectSender = mpsc::Sender<SendOrder>;
pub type ObjectReceiver = mpsc::Receiver<SendOrder>;

pub fn object_channel(capacity: usize) -> (ObjectSender, ObjectReceiver) {
    mpsc::channel(capacity.max(1))
}

/// Serialisation stage: picks send-orders off the object queue in FIFO
/// order and turns each into one or more parcels on the priority send
/// queue.
pub async fn run_serialisation_stage(conn: Arc<Connection>, mut orders: ObjectReceiver) {
    while let Some(order) = orders.recv().await {
        if let Err(e) = process_order(&conn, order).await {
            tracing::warn!(connection = %conn.uuid, error = %e, "send order failed");
        }
    }
}

async fn process_order(conn: &Connection, order: SendOrder) -> Result<(), JennyError> {
    if order.cancel.load(Ordering::SeqCst) {
        conn.emit(Event::Transmission {
            kind: TransmissionEventKind::FileAborted,
            object_id: order.object_id,
            direction: Direction::Outgoing,
            path: None,
            info: Some(crate::error::InfoCode::AbortOwnOut as u8),
            message: Some("cancelled before transmission began".to_string()),
        });
        return Ok(());
    }

    match order.payload {
        OutgoingPayload::User { class, json_bytes } => {
            let wire_bytes = {
                let serializer = conn.send_serializer.lock().await;
                serializer.serialise(&class, &json_bytes)?
            };
            stream_data_object(conn, order.object_id, order.priority, order.method_id, wire_bytes, order.cancel)
                .await
        }
        OutgoingPayload::Data(raw) => {
            let json_bytes = serde_json::to_vec(&raw)
                .map_err(|e| JennyError::SerialisationError(e.to_string()))?;
            let wire_bytes = {
                let serializer = conn.send_serializer.lock().await;
                serializer.serialise(BYTE_BLOCK_CLASS, &json_bytes)?
            };
            stream_data_object(conn, order.object_id, order.priority, order.method_id, wire_bytes, order.cancel)
                .await
        }
        OutgoingPayload::File { source, remote_path } => {
            stream_file(conn, order.object_id, order.priority, source, remote_path, order.cancel).await
        }
    }
}

async fn stream_data_object(
    conn: &Connection,
    object_id: u64,
    priority: Priority,
    method_id: u32,
    bytes: Vec<u8>,
    cancel: Arc<AtomicBool>,
) -> Result<(), JennyError> {
    let parcel_size = conn.config().transmission_parcel_size.max(1) as usize;
    let total_length = bytes.len() as u64;
    let crc = crc32fast::hash(&bytes);
    let parcel_count = ((bytes.len() + parcel_size - 1) / parcel_size).max(1) as u32;

    conn.outgoing_transfers.lock().await.insert(
        object_id,
        OutgoingTransfer::new(object_id, priority, TransferKind::Data, total_length, parcel_count, cancel.clone()),
    );

    for (seq, chunk) in bytes.chunks(parcel_size.max(1)).enumerate() {
        if cancel.load(Ordering::SeqCst) {
            // Whoever set this flag (`break_transfer` or an incoming
            // BREAK/FAIL signal) already removed the transfer record,
            // dropped its queued parcels, and emitted the terminal
            // event under the right info code — stop producing parcels
            // without repeating any of that.
            return Ok(());
        }
        let header = if seq == 0 {
            Some(ObjectHeader {
                total_length,
                parcel_count,
                method_id,
                crc32: crc,
                remote_path: None,
            })
        } else {
            None
        };
        let parcel = Parcel::data(Channel::Object, priority, object_id, seq as u32, header, chunk.to_vec());
        if !conn.priority_queue.push(parcel, &conn.terminate).await {
            // Connection is tearing down; the close path owns cleanup
            // of whatever is left in `outgoing_transfers`.
            return Ok(());
        }
    }
    // The record stays in `outgoing_transfers` until the transmit stage
    // has actually written its last parcel to the wire (see
    // `run_transmit_stage`), not merely enqueued here.
    Ok(())
}

async fn stream_file(
    conn: &Connection,
    object_id: u64,
    priority: Priority,
    source: PathBuf,
    remote_path: String,
    cancel: Arc<AtomicBool>,
) -> Result<(), JennyError> {
    if !io_manager::acquire(&source, io_manager::Direction::Outgoing) {
        return Err(JennyError::FileInTransmission(source.display().to_string()));
    }

    let result = stream_file_inner(conn, object_id, priority, &source, &remote_path, cancel).await;
    io_manager::release(&source, io_manager::Direction::Outgoing);
    result
}

async fn stream_file_inner(
    conn: &Connection,
    object_id: u64,
    priority: Priority,
    source: &std::path::Path,
    remote_path: &str,
    cancel: Arc<AtomicBool>,
) -> Result<(), JennyError> {
    let metadata = tokio::fs::metadata(source)
        .await
        .map_err(|_| JennyError::FileNotFound(source.display().to_string()))?;
    let total_length = metadata.len();

    let mut prepass = tokio::fs::File::open(source).await?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = vec![0u8; 65536];
    loop {
        let n = prepass.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let crc = hasher.finalize();

    let parcel_size = conn.config().transmission_parcel_size.max(1) as usize;
    let parcel_count = ((total_length as usize + parcel_size - 1) / parcel_size.max(1)).max(1) as u32;

    conn.outgoing_transfers.lock().await.insert(
        object_id,
        OutgoingTransfer::new(object_id, priority, TransferKind::File, total_length, parcel_count, cancel.clone()),
    );
    conn.monitor.file_started(true);

    let mut file = tokio::fs::File::open(source).await?;
    file.seek(std::io::SeekFrom::Start(0)).await?;

    let mut seq = 0u32;
    loop {
        if cancel.load(Ordering::SeqCst) {
            // As above: the canceller already finalised bookkeeping,
            // queue state and the event; just stop reading/pushing.
            return Ok(());
        }
        let mut chunk = vec![0u8; parcel_size];
        let n = file.read(&mut chunk).await?;
        if n == 0 && seq > 0 {
            break;
        }
        chunk.truncate(n);
        let header = if seq == 0 {
            Some(ObjectHeader {
                total_length,
                parcel_count,
                method_id: u32::MAX,
                crc32: crc,
                remote_path: Some(remote_path.to_string()),
            })
        } else {
            None
        };
        let parcel = Parcel::data(Channel::File, priority, object_id, seq, header, chunk);
        if !conn.priority_queue.push(parcel, &conn.terminate).await {
            // Connection is tearing down; the close path owns cleanup
            // of whatever is left in `outgoing_transfers`.
            return Ok(());
        }
        seq += 1;
        if seq >= parcel_count {
            break;
        }
    }
    // Unlike the data-object case, this record is not removed here: a
    // file transfer retires on the receiver's CONFIRM signal
    // (`signal_handler::handle_signal`'s `Signal::Confirm` arm), not
    // merely once its parcels have been handed to the priority queue.
    conn.emit(Event::Transmission {
        kind: TransmissionEventKind::FileSending,
        object_id,
        direction: Direction::Outgoing,
        path: Some(source.to_path_buf()),
        info: None,
        message: None,
    });
    Ok(())
}

/// Transmit stage: pops the head of the priority queue, applies tempo
/// pacing, and writes one parcel to the wire.
pub async fn run_transmit_stage(conn: Arc<Connection>, mut sink: OwnedWriteHalf) {
    loop {
        let parcel = match conn.priority_queue.pop_cancellable(&conn.terminate).await {
            Some(p) => p,
            None => break,
        };
        wait_for_tempo_budget(&conn, parcel.payload.len() as u32).await;
        let encoded = crate::wire::encode_parcel(&parcel);
        if let Err(e) = crate::wire::codec::write_parcel(&mut sink, &parcel).await {
            tracing::warn!(connection = %conn.uuid, error = %e, "transmit stage write failed");
            conn.on_socket_fault().await;
            break;
        }
        conn.monitor.record_sent(encoded.len() as u64);
        conn.monitor.set_transmitting(true);

        if parcel.channel != Channel::Signal {
            retire_if_fully_sent(&conn, parcel.object_id).await;
        }
    }
    conn.monitor.set_transmitting(false);
}

/// Once an object's last parcel has actually left the wire, retire its
/// `outgoing_transfers` record — for `Data`/user-object transfers, which
/// have no confirm handshake. `File` transfers keep their record until
/// the receiver's CONFIRM signal arrives (see `signal_handler.rs`), so
/// `break_transfer`/the close paths can still find and report on a file
/// still awaiting confirmation.
async fn retire_if_fully_sent(conn: &Connection, object_id: u64) {
    let mut transfers = conn.outgoing_transfers.lock().await;
    let Some(transfer) = transfers.get(&object_id) else {
        return;
    };
    if transfer.mark_parcel_sent() && transfer.kind == TransferKind::Data {
        transfers.remove(&object_id);
    }
}

async fn wait_for_tempo_budget(conn: &Connection, n: u32) {
    loop {
        let effective = conn.tempo.lock().effective();
        conn.monitor.set_effective_tempo(effective);
        if effective == -1 {
            return;
        }
        if effective == 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            continue;
        }
        let (bytes, window) = conn.monitor.bytes_sent_in_window();
        let elapsed = window.as_secs_f64().max(0.05);
        let rate = bytes as f64 / elapsed;
        if rate + n as f64 <= effective as f64 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
