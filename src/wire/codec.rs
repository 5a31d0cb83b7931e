//! Encode/decode parcels to and from a byte stream.
//!
//! Mirrors the teacher's `TcpSocketTransport::read_message`/
//! `write_message` pair (length-prefixed framing over `AsyncRead`/
//! `AsyncWrite`), generalised to the full parcel header this protocol
//! defines instead of a bare 4-byte length prefix.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::JennyError;
use crate::wire::parcel::{Channel, ObjectHeader, Parcel, Priority, MAGIC};

/// Encode a parcel into its full wire representation.
pub fn encode_parcel(parcel: &Parcel) -> Vec<u8> {
    let mut payload = Vec::new();
    if parcel.sequence == 0 && parcel.channel != Channel::Signal {
        if let Some(header) = &parcel.header {
            payload.extend_from_slice(&header.total_length.to_be_bytes());
            payload.extend_from_slice(&header.parcel_count.to_be_bytes());
            payload.extend_from_slice(&header.method_id.to_be_bytes());
            payload.extend_from_slice(&header.crc32.to_be_bytes());
            let path_bytes = header
                .remote_path
                .as_deref()
                .map(str::as_bytes)
                .unwrap_or(&[]);
            payload.extend_from_slice(&(path_bytes.len() as u16).to_be_bytes());
            payload.extend_from_slice(path_bytes);
        }
    }
    payload.extend_from_slice(&parcel.payload);

    let mut out = Vec::with_capacity(8 + 1 + 1 + 8 + 4 + 4 + payload.len());
    out.extend_from_slice(&MAGIC);
    out.push(parcel.channel as u8);
    out.push(parcel.priority as u8);
    out.extend_from_slice(&parcel.object_id.to_be_bytes());
    out.extend_from_slice(&parcel.sequence.to_be_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&payload);
    out
}

/// Write an already-encoded parcel to an async sink.
pub async fn write_parcel<W: AsyncWrite + Unpin>(
    sink: &mut W,
    parcel: &Parcel,
) -> Result<(), JennyError> {
    let bytes = encode_parcel(parcel);
    sink.write_all(&bytes).await?;
    sink.flush().await?;
    Ok(())
}

/// Decode the next parcel from an async source. Blocks (awaits) until a
/// full frame is available. `max_payload` enforces the configured
/// maximum serialisation size.
pub async fn decode_parcel<R: AsyncRead + Unpin>(
    source: &mut R,
    max_payload: u32,
) -> Result<Parcel, JennyError> {
    let mut magic = [0u8; 8];
    source
        .read_exact(&mut magic)
        .await
        .map_err(|e| map_eof(e, "reading magic marker"))?;
    if magic != MAGIC {
        return Err(JennyError::FramingError(
            "magic marker mismatch".to_string(),
        ));
    }

    let mut head = [0u8; 1 + 1 + 8 + 4 + 4];
    source
        .read_exact(&mut head)
        .await
        .map_err(|e| map_eof(e, "reading parcel head"))?;

    let channel = Channel::from_u8(head[0])
        .ok_or_else(|| JennyError::FramingError(format!("unknown channel tag {}", head[0])))?;
    let priority = Priority::from_u8(head[1])
        .ok_or_else(|| JennyError::FramingError(format!("unknown priority ordinal {}", head[1])))?;
    let object_id = u64::from_be_bytes(head[2..10].try_into().unwrap());
    let sequence = u32::from_be_bytes(head[10..14].try_into().unwrap());
    let length = u32::from_be_bytes(head[14..18].try_into().unwrap());

    if length > max_payload {
        return Err(JennyError::FramingError(format!(
            "payload length {} exceeds configured maximum {}",
            length, max_payload
        )));
    }

    let mut payload = vec![0u8; length as usize];
    source
        .read_exact(&mut payload)
        .await
        .map_err(|e| map_eof(e, "reading parcel payload"))?;

    let mut header = None;
    let mut body_start = 0usize;
    if sequence == 0 && channel != Channel::Signal {
        if payload.len() < 8 + 4 + 4 + 4 + 2 {
            return Err(JennyError::FramingError(
                "object header truncated".to_string(),
            ));
        }
        let total_length = u64::from_be_bytes(payload[0..8].try_into().unwrap());
        let parcel_count = u32::from_be_bytes(payload[8..12].try_into().unwrap());
        let method_id = u32::from_be_bytes(payload[12..16].try_into().unwrap());
        let crc32 = u32::from_be_bytes(payload[16..20].try_into().unwrap());
        let path_len = u16::from_be_bytes(payload[20..22].try_into().unwrap()) as usize;
        let path_start = 22;
        let path_end = path_start + path_len;
        if payload.len() < path_end {
            return Err(JennyError::FramingError(
                "object header path truncated".to_string(),
            ));
        }
        let remote_path = if path_len > 0 {
            Some(
                String::from_utf8(payload[path_start..path_end].to_vec())
                    .map_err(|_| JennyError::FramingError("non-UTF8 remote path".to_string()))?,
            )
        } else {
            None
        };
        header = Some(ObjectHeader {
            total_length,
            parcel_count,
            method_id,
            crc32,
            remote_path,
        });
        body_start = path_end;
    }

    Ok(Parcel {
        channel,
        priority,
        object_id,
        sequence,
        header,
        payload: payload[body_start..].to_vec(),
    })
}

fn map_eof(e: std::io::Error, context: &str) -> JennyError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        JennyError::FramingError(format!("EOF mid-frame while {}", context))
    } else {
        JennyError::Io(e)
    }
}
