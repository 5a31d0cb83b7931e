//! Connection handshake (design document §4.4 "Handshake", wire layout
//! in §6): 8-byte magic, 16-byte UUID, 4-byte method id, 16-byte
//! parameter block (parcel size, max serialisation size, initial tempo,
//! alive period ms, each 4 bytes), 1-byte ACK/REJECT.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use uuid::Uuid;

use crate::config::ConnectionConfig;
use crate::error::JennyError;
use crate::wire::MAGIC;

const ACK: u8 = 0;
const REJECT: u8 = 1;

/// Parameters exchanged during the handshake, from the peer's side.
#[derive(Debug, Clone, Copy)]
pub struct PeerParams {
    pub uuid: Uuid,
    pub method_id: u32,
    pub parcel_size: u32,
    pub max_serialisation_size: u32,
    pub initial_tempo: i32,
    pub alive_period_ms: u32,
}

async fn write_block(
    stream: &mut TcpStream,
    local_uuid: Uuid,
    config: &ConnectionConfig,
) -> Result<(), JennyError> {
    let mut out = Vec::with_capacity(8 + 16 + 4 + 16);
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(local_uuid.as_bytes());
    out.extend_from_slice(&config.serialisation_method.to_be_bytes());
    out.extend_from_slice(&config.transmission_parcel_size.to_be_bytes());
    out.extend_from_slice(&(config.max_serialisation_size.min(u32::MAX as u64) as u32).to_be_bytes());
    out.extend_from_slice(&(config.transmission_speed as i32).to_be_bytes());
    out.extend_from_slice(&(config.alive_period.as_millis() as u32).to_be_bytes());
    stream.write_all(&out).await?;
    stream.flush().await?;
    Ok(())
}

async fn read_block(stream: &mut TcpStream) -> Result<PeerParams, JennyError> {
    let mut magic = [0u8; 8];
    stream.read_exact(&mut magic).await?;
    if magic != MAGIC {
        return Err(JennyError::HandshakeError(
            "magic marker mismatch".to_string(),
        ));
    }
    let mut uuid_bytes = [0u8; 16];
    stream.read_exact(&mut uuid_bytes).await?;
    let mut rest = [0u8; 4 + 16];
    stream.read_exact(&mut rest).await?;
    Ok(PeerParams {
        uuid: Uuid::from_bytes(uuid_bytes),
        method_id: u32::from_be_bytes(rest[0..4].try_into().unwrap()),
        parcel_size: u32::from_be_bytes(rest[4..8].try_into().unwrap()),
        max_serialisation_size: u32::from_be_bytes(rest[8..12].try_into().unwrap()),
        initial_tempo: i32::from_be_bytes(rest[12..16].try_into().unwrap()),
        alive_period_ms: u32::from_be_bytes(rest[16..20].try_into().unwrap()),
    })
}

/// Client side: write our block, read the peer's, send ACK, wait for the
/// peer's ACK/REJECT.
pub async fn client_handshake(
    stream: &mut TcpStream,
    local_uuid: Uuid,
    config: &ConnectionConfig,
) -> Result<PeerParams, JennyError> {
    timeout(config.confirm_timeout, async {
        write_block(stream, local_uuid, config).await?;
        let peer = read_block(stream).await?;
        stream.write_u8(ACK).await?;
        stream.flush().await?;
        let verdict = stream.read_u8().await?;
        if verdict == REJECT {
            return Err(JennyError::ConnectionRejected);
        }
        Ok(peer)
    })
    .await
    .map_err(|_| JennyError::ConfirmTimeout)?
}

/// Server side, first phase: read the peer's block, write ours, read the
/// peer's ACK. The connection engine exists in HANDSHAKING from this point;
/// the server's accept policy (listener callback or `accept(timeout)`
/// caller) decides ACK or REJECT afterwards via [`server_finish`], so the
/// two phases share one `confirm_timeout` budget tracked by the caller.
pub async fn server_negotiate(
    stream: &mut TcpStream,
    local_uuid: Uuid,
    config: &ConnectionConfig,
) -> Result<PeerParams, JennyError> {
    timeout(config.confirm_timeout, async {
        let peer = read_block(stream).await?;
        write_block(stream, local_uuid, config).await?;
        let peer_verdict = stream.read_u8().await?;
        if peer_verdict == REJECT {
            return Err(JennyError::ConnectionRejected);
        }
        Ok(peer)
    })
    .await
    .map_err(|_| JennyError::ConfirmTimeout)?
}

/// Server side, second phase: send our verdict once the application has
/// decided to `start()` or `reject()` the pending connection.
pub async fn server_finish(stream: &mut TcpStream, accept: bool) -> Result<(), JennyError> {
    stream.write_u8(if accept { ACK } else { REJECT }).await?;
    stream.flush().await?;
    if !accept {
        return Err(JennyError::ConnectionRejected);
    }
    Ok(())
}
