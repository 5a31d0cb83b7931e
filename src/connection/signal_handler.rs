//! Handling of control signals arriving on the receive pipeline (design
//! document §4.4 "Cancellation", "Idle, keepalive, ping", "tempo
//! arbitration").

use crate::connection::Connection;
use crate::error::JennyError;
use crate::events::{Direction, Event, TransmissionEventKind};
use crate::signal::Signal;

pub async fn handle_signal(conn: &Connection, signal: Signal) -> Result<(), JennyError> {
    match signal {
        Signal::Alive => Ok(()),

        Signal::Tempo(v) => {
            let reassert = conn.tempo.lock().receive_remote(v as i64);
            conn.monitor.set_effective_tempo(conn.tempo.lock().effective());
            if let Some(fixed_value) = reassert {
                conn.send_signal_unbound(Signal::Tempo(fixed_value as i32)).await;
            }
            Ok(())
        }

        Signal::Ping { nonce } => {
            conn.send_signal_unbound(Signal::Echo { nonce, measured_ms: 0 }).await;
            Ok(())
        }

        Signal::Echo { nonce, .. } => {
            conn.on_echo(nonce).await;
            Ok(())
        }

        Signal::Break {
            object_id,
            direction,
            info,
            reason,
        } => {
            match direction {
                Direction::Outgoing => {
                    // Peer broke their own outgoing transfer; we are
                    // receiving it, so drop our assembler.
                    if let Some(assembler) = conn.incoming_assemblers.lock().await.remove(&object_id) {
                        if let crate::assembler::IncomingAssembler::File(f) = assembler {
                            f.abort().await;
                        }
                        conn.monitor.file_finished(false, false);
                        conn.emit(Event::Transmission {
                            kind: TransmissionEventKind::FileAborted,
                            object_id,
                            direction: Direction::Incoming,
                            path: None,
                            info: Some(info),
                            message: Some(reason),
                        });
                    }
                }
                Direction::Incoming => {
                    // Peer broke their own incoming transfer; we are
                    // sending it, so stop producing parcels for it.
                    let transfer = conn.outgoing_transfers.lock().await.remove(&object_id);
                    if let Some(t) = transfer {
                        t.cancel();
                    }
                    conn.priority_queue.drop_object(object_id).await;
                    conn.monitor.file_finished(true, false);
                    conn.emit(Event::Transmission {
                        kind: TransmissionEventKind::FileAborted,
                        object_id,
                        direction: Direction::Outgoing,
                        path: None,
                        info: Some(info),
                        message: Some(reason),
                    });
                }
            }
            Ok(())
        }

        Signal::Fail { object_id, info, reason } => {
            if let Some(t) = conn.outgoing_transfers.lock().await.remove(&object_id) {
                t.cancel();
                conn.priority_queue.drop_object(object_id).await;
                conn.monitor.file_finished(true, false);
                conn.emit(Event::Transmission {
                    kind: TransmissionEventKind::FileAborted,
                    object_id,
                    direction: Direction::Outgoing,
                    path: None,
                    info: Some(info),
                    message: Some(reason.clone()),
                });
            }
            if let Some(assembler) = conn.incoming_assemblers.lock().await.remove(&object_id) {
                if let crate::assembler::IncomingAssembler::File(f) = assembler {
                    f.abort().await;
                }
                conn.monitor.file_finished(false, false);
                conn.emit(Event::Transmission {
                    kind: TransmissionEventKind::FileAborted,
                    object_id,
                    direction: Direction::Incoming,
                    path: None,
                    info: Some(info),
                    message: Some(reason),
                });
            }
            Ok(())
        }

        Signal::EnterShutdown => {
            conn.on_peer_enter_shutdown().await;
            Ok(())
        }

        Signal::AllDataSent => {
            conn.on_peer_all_data_sent().await;
            Ok(())
        }

        Signal::Confirm { object_id } => {
            conn.outgoing_transfers.lock().await.remove(&object_id);
            conn.monitor.file_finished(true, true);
            conn.emit(Event::Transmission {
                kind: TransmissionEventKind::FileConfirmed,
                object_id,
                direction: Direction::Outgoing,
                path: None,
                info: None,
                message: None,
            });
            Ok(())
        }

        Signal::Reject { code, reason } => {
            tracing::warn!(connection = %conn.uuid, code, reason, "unexpected REJECT after handshake");
            Ok(())
        }
    }
}
