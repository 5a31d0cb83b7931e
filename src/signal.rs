//! # Control Signals
//!
//! Signals are control parcels carried on the SIGNAL channel with no
//! user payload beyond their own small fixed/length-prefixed fields
//! (design document §6). This module defines [`Signal`] and its wire
//! encode/decode, used by the connection's signal handler
//! (`crate::connection::signal_handler`).

use crate::error::JennyError;
use crate::events::Direction;

/// One of the control signals exchanged on the SIGNAL channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Alive,
    Tempo(i32),
    Ping { nonce: i64 },
    Echo { nonce: i64, measured_ms: u32 },
    Break { object_id: u64, direction: Direction, info: u8, reason: String },
    Fail { object_id: u64, info: u8, reason: String },
    EnterShutdown,
    AllDataSent,
    Confirm { object_id: u64 },
    Reject { code: u16, reason: String },
}

const TAG_ALIVE: u8 = 0;
const TAG_TEMPO: u8 = 1;
const TAG_PING: u8 = 2;
const TAG_ECHO: u8 = 3;
const TAG_BREAK: u8 = 4;
const TAG_FAIL: u8 = 5;
const TAG_ENTER_SHUTDOWN: u8 = 6;
const TAG_ALL_DATA_SENT: u8 = 7;
const TAG_CONFIRM: u8 = 8;
const TAG_REJECT: u8 = 9;

impl Signal {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Signal::Alive => out.push(TAG_ALIVE),
            Signal::Tempo(v) => {
                out.push(TAG_TEMPO);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Signal::Ping { nonce } => {
                out.push(TAG_PING);
                out.extend_from_slice(&nonce.to_be_bytes());
            }
            Signal::Echo { nonce, measured_ms } => {
                out.push(TAG_ECHO);
                out.extend_from_slice(&nonce.to_be_bytes());
                out.extend_from_slice(&measured_ms.to_be_bytes());
            }
            Signal::Break {
                object_id,
                direction,
                info,
                reason,
            } => {
                out.push(TAG_BREAK);
                out.extend_from_slice(&object_id.to_be_bytes());
                out.push(match direction {
                    Direction::Outgoing => 0,
                    Direction::Incoming => 1,
                });
                out.push(*info);
                let reason_bytes = reason.as_bytes();
                out.extend_from_slice(&(reason_bytes.len() as u16).to_be_bytes());
                out.extend_from_slice(reason_bytes);
            }
            Signal::Fail {
                object_id,
                info,
                reason,
            } => {
                out.push(TAG_FAIL);
                out.extend_from_slice(&object_id.to_be_bytes());
                out.push(*info);
                let reason_bytes = reason.as_bytes();
                out.extend_from_slice(&(reason_bytes.len() as u16).to_be_bytes());
                out.extend_from_slice(reason_bytes);
            }
            Signal::EnterShutdown => out.push(TAG_ENTER_SHUTDOWN),
            Signal::AllDataSent => out.push(TAG_ALL_DATA_SENT),
            Signal::Confirm { object_id } => {
                out.push(TAG_CONFIRM);
                out.extend_from_slice(&object_id.to_be_bytes());
            }
            Signal::Reject { code, reason } => {
                out.push(TAG_REJECT);
                out.extend_from_slice(&code.to_be_bytes());
                let reason_bytes = reason.as_bytes();
                out.extend_from_slice(&(reason_bytes.len() as u16).to_be_bytes());
                out.extend_from_slice(reason_bytes);
            }
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, JennyError> {
        let bad = || JennyError::FramingError("truncated signal payload".to_string());
        let tag = *bytes.first().ok_or_else(bad)?;
        let rest = &bytes[1..];
        Ok(match tag {
            TAG_ALIVE => Signal::Alive,
            TAG_TEMPO => {
                if rest.len() < 4 {
                    return Err(bad());
                }
                Signal::Tempo(i32::from_be_bytes(rest[0..4].try_into().unwrap()))
            }
            TAG_PING => {
                if rest.len() < 8 {
                    return Err(bad());
                }
                Signal::Ping {
                    nonce: i64::from_be_bytes(rest[0..8].try_into().unwrap()),
                }
            }
            TAG_ECHO => {
                if rest.len() < 12 {
                    return Err(bad());
                }
                Signal::Echo {
                    nonce: i64::from_be_bytes(rest[0..8].try_into().unwrap()),
                    measured_ms: u32::from_be_bytes(rest[8..12].try_into().unwrap()),
                }
            }
            TAG_BREAK => {
                if rest.len() < 8 + 1 + 1 + 2 {
                    return Err(bad());
                }
                let object_id = u64::from_be_bytes(rest[0..8].try_into().unwrap());
                let direction = match rest[8] {
                    0 => Direction::Outgoing,
                    1 => Direction::Incoming,
                    _ => return Err(bad()),
                };
                let info = rest[9];
                let reason_len = u16::from_be_bytes(rest[10..12].try_into().unwrap()) as usize;
                let reason_bytes = rest.get(12..12 + reason_len).ok_or_else(bad)?;
                let reason = String::from_utf8(reason_bytes.to_vec())
                    .map_err(|_| JennyError::FramingError("non-UTF8 BREAK reason".to_string()))?;
                Signal::Break {
                    object_id,
                    direction,
                    info,
                    reason,
                }
            }
            TAG_FAIL => {
                if rest.len() < 8 + 1 + 2 {
                    return Err(bad());
                }
                let object_id = u64::from_be_bytes(rest[0..8].try_into().unwrap());
                let info = rest[8];
                let reason_len = u16::from_be_bytes(rest[9..11].try_into().unwrap()) as usize;
                let reason_bytes = rest.get(11..11 + reason_len).ok_or_else(bad)?;
                let reason = String::from_utf8(reason_bytes.to_vec())
                    .map_err(|_| JennyError::FramingError("non-UTF8 FAIL reason".to_string()))?;
                Signal::Fail {
                    object_id,
                    info,
                    reason,
                }
            }
            TAG_ENTER_SHUTDOWN => Signal::EnterShutdown,
            TAG_ALL_DATA_SENT => Signal::AllDataSent,
            TAG_CONFIRM => {
                if rest.len() < 8 {
                    return Err(bad());
                }
                Signal::Confirm {
                    object_id: u64::from_be_bytes(rest[0..8].try_into().unwrap()),
                }
            }
            TAG_REJECT => {
                if rest.len() < 2 {
                    return Err(bad());
                }
                let code = u16::from_be_bytes(rest[0..2].try_into().unwrap());
                let reason_len_start = 2;
                let reason = String::from_utf8(rest[reason_len_start..].to_vec())
                    .map_err(|_| JennyError::FramingError("non-UTF8 REJECT reason".to_string()))?;
                Signal::Reject { code, reason }
            }
            other => {
                return Err(JennyError::FramingError(format!(
                    "unknown signal tag {}",
                    other
                )))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(signal: Signal) {
        let bytes = signal.encode();
        let decoded = Signal::decode(&bytes).unwrap();
        assert_eq!(decoded, signal);
    }

    #[test]
    fn all_signal_kinds_roundtrip() {
        roundtrip(Signal::Alive);
        roundtrip(Signal::Tempo(-1));
        roundtrip(Signal::Tempo(5000));
        roundtrip(Signal::Ping { nonce: 42 });
        roundtrip(Signal::Echo {
            nonce: 42,
            measured_ms: 17,
        });
        roundtrip(Signal::Break {
            object_id: 7,
            direction: Direction::Outgoing,
            info: 105,
            reason: "cancelled by user".to_string(),
        });
        roundtrip(Signal::Fail {
            object_id: 9,
            info: 100,
            reason: "boom".to_string(),
        });
        roundtrip(Signal::EnterShutdown);
        roundtrip(Signal::AllDataSent);
        roundtrip(Signal::Confirm { object_id: 3 });
        roundtrip(Signal::Reject {
            code: 1,
            reason: "busy".to_string(),
        });
    }
}
