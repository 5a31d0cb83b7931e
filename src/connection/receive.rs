//! Receive pipeline: a single loop per connection reading one parcel at
//! a time, routing data/file parcels to per-object assemblers and
//! control parcels to the signal handler (design document §4.4 "Receive
//! pipeline").

use std::sync::Arc;

use tokio::net::tcp::OwnedReadHalf;

use crate::assembler::{DataAssembler, FileAssembler, IncomingAssembler};
use crate::connection::signal_handler::handle_signal;
use crate::connection::Connection;
use crate::error::JennyError;
use crate::events::{Direction, Event, TransmissionEventKind};
use crate::serialization::BYTE_BLOCK_CLASS;
use crate::signal::Signal;
use crate::wire::{decode_parcel, Channel, Parcel};

pub async fn run_receive_stage(conn: Arc<Connection>, mut source: OwnedReadHalf) {
    let max_payload = conn.config().max_serialisation_size.min(u32::MAX as u64) as u32;
    loop {
        match decode_parcel(&mut source, max_payload).await {
            Ok(parcel) => {
                conn.monitor
                    .record_received(crate::wire::encode_parcel(&parcel).len() as u64);
                if let Err(e) = dispatch(&conn, parcel).await {
                    tracing::warn!(connection = %conn.uuid, error = %e, "protocol error, hard-closing");
                    conn.on_protocol_error(e).await;
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(connection = %conn.uuid, error = %e, "receive stage ended");
                conn.on_socket_fault().await;
                break;
            }
        }
    }
}

async fn dispatch(conn: &Connection, parcel: Parcel) -> Result<(), JennyError> {
    match parcel.channel {
        Channel::Signal => {
            let signal = Signal::decode(&parcel.payload)?;
            handle_signal(conn, signal).await
        }
        Channel::Object | Channel::File => route_to_assembler(conn, parcel).await,
    }
}

async fn route_to_assembler(conn: &Connection, parcel: Parcel) -> Result<(), JennyError> {
    let object_id = parcel.object_id;

    if parcel.sequence == 0 {
        let already_live = conn.incoming_assemblers.lock().await.contains_key(&object_id);
        let already_finished = conn.finished_incoming_ids.lock().contains(&object_id);
        if already_live || already_finished {
            return Err(JennyError::DuplicateObjectId(object_id));
        }
        let header = parcel
            .header
            .ok_or_else(|| JennyError::FramingError("missing object header at sequence 0".to_string()))?;

        let assembler = if parcel.channel == Channel::File {
            let remote_path = header
                .remote_path
                .clone()
                .ok_or_else(|| JennyError::FramingError("file header missing remote path".to_string()))?;
            let temp_dir = conn.config().temp_dir.clone();
            let mut file_assembler = FileAssembler::create(
                object_id,
                header.total_length,
                header.parcel_count,
                header.crc32,
                remote_path,
                &temp_dir,
            )
            .await?;
            conn.monitor.file_started(false);
            let complete = file_assembler.push(0, &parcel.payload).await?;
            if complete {
                finish_file(conn, object_id, file_assembler).await?;
                conn.finished_incoming_ids.lock().insert(object_id);
                return Ok(());
            }
            IncomingAssembler::File(file_assembler)
        } else {
            let mut data_assembler = DataAssembler::new(
                object_id,
                header.method_id,
                header.total_length,
                header.parcel_count,
                header.crc32,
            );
            let complete = data_assembler.push(0, &parcel.payload)?;
            if complete {
                finish_data(conn, object_id, data_assembler).await?;
                conn.finished_incoming_ids.lock().insert(object_id);
                return Ok(());
            }
            IncomingAssembler::Data(data_assembler)
        };
        conn.incoming_assemblers.lock().await.insert(object_id, assembler);
        return Ok(());
    }

    let mut assemblers = conn.incoming_assemblers.lock().await;
    let assembler = assemblers
        .get_mut(&object_id)
        .ok_or(JennyError::UnknownObjectId(object_id))?;
    let complete = match assembler {
        IncomingAssembler::Data(a) => a.push(parcel.sequence, &parcel.payload)?,
        IncomingAssembler::File(a) => a.push(parcel.sequence, &parcel.payload).await?,
    };
    if complete {
        let assembler = assemblers.remove(&object_id).unwrap();
        drop(assemblers);
        match assembler {
            IncomingAssembler::Data(a) => finish_data(conn, object_id, a).await?,
            IncomingAssembler::File(a) => finish_file(conn, object_id, a).await?,
        }
        conn.finished_incoming_ids.lock().insert(object_id);
    }
    Ok(())
}

async fn finish_data(conn: &Connection, object_id: u64, assembler: DataAssembler) -> Result<(), JennyError> {
    let bytes = match assembler.finish() {
        Ok(b) => b,
        Err(e) => {
            conn.emit(Event::Aborted {
                message: format!("object {} failed CRC check: {}", object_id, e),
            });
            return Ok(());
        }
    };
    let (class, json_bytes) = {
        let serializer = conn.recv_serializer.lock().await;
        serializer.deserialise(&bytes)?
    };
    if class == BYTE_BLOCK_CLASS {
        let raw: Vec<u8> =
            serde_json::from_slice(&json_bytes).map_err(|e| JennyError::SerialisationError(e.to_string()))?;
        conn.emit(Event::DataReceived {
            object_id,
            bytes: Arc::new(raw),
        });
    } else {
        conn.emit(Event::ObjectReceived {
            object_id,
            class,
            json_bytes: Arc::new(json_bytes),
        });
    }
    Ok(())
}

async fn finish_file(conn: &Connection, object_id: u64, assembler: FileAssembler) -> Result<(), JennyError> {
    let file_root = conn.config().file_root_dir.clone();
    let (temp_path, final_path) = match assembler.finish(file_root.as_deref()).await {
        Ok(pair) => pair,
        Err(JennyError::DestinationRealisationError) => {
            conn.monitor.file_finished(false, false);
            conn.emit(Event::Transmission {
                kind: TransmissionEventKind::FileAborted,
                object_id,
                direction: Direction::Incoming,
                path: None,
                info: Some(crate::error::InfoCode::DestinationRealisationError as u8),
                message: Some("destination path could not be resolved".to_string()),
            });
            return Ok(());
        }
        Err(JennyError::StorageCrcError) => {
            conn.monitor.file_finished(false, false);
            conn.emit(Event::Transmission {
                kind: TransmissionEventKind::FileAborted,
                object_id,
                direction: Direction::Incoming,
                path: None,
                info: None,
                message: Some("storage CRC mismatch".to_string()),
            });
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    if let Some(parent) = final_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::rename(&temp_path, &final_path).await?;
    conn.monitor.file_finished(false, true);
    conn.emit(Event::Transmission {
        kind: TransmissionEventKind::FileReceived,
        object_id,
        direction: Direction::Incoming,
        path: Some(final_path),
        info: None,
        message: None,
    });
    conn.send_signal_unbound(Signal::Confirm { object_id }).await;
    Ok(())
}
