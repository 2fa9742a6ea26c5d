//! A single drone session: handshake, inbound dispatch, and cleanup.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rescue_shared::codec::{encode_message, MessageDecoder, ProtocolError};
use rescue_shared::config::{HEARTBEAT_INTERVAL_SECS, READ_TIMEOUT_SECS, STATUS_UPDATE_INTERVAL_SECS};
use rescue_shared::message::{Message, SessionConfig, WireDroneStatus};
use rescue_shared::model::DroneStatus;
use rescue_shared::now_secs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::world::{SessionHandle, World};

/// Drive one accepted TCP connection end-to-end. Returns when the
/// connection closes, the process is shutting down, or a fatal framing
/// error occurs. `_permit` holds the admission-cap slot for the lifetime
/// of the session.
pub async fn run_session(
    stream: TcpStream,
    addr: SocketAddr,
    world: Arc<World>,
    shutdown: CancellationToken,
    _permit: OwnedSemaphorePermit,
) {
    let (mut reader, mut writer) = tokio::io::split(stream);
    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();

    let writer_addr = addr;
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = writer.write_all(&frame).await {
                warn!(%writer_addr, error = %e, "session write failed");
                break;
            }
        }
    });

    let session_end = CancellationToken::new();
    let mut drone_id: Option<u32> = None;
    let mut registered = false;
    let mut decoder = MessageDecoder::new();
    let mut buf = [0u8; 4096];

    'session: loop {
        tokio::select! {
            _ = shutdown.cancelled() => break 'session,
            _ = session_end.cancelled() => break 'session,
            read_result = tokio::time::timeout(Duration::from_secs(READ_TIMEOUT_SECS), reader.read(&mut buf)) => {
                match read_result {
                    Err(_) => continue 'session, // read timed out; loop back to recheck cancellation
                    Ok(Ok(0)) => break 'session, // EOF
                    Ok(Ok(n)) => decoder.extend(&buf[..n]),
                    Ok(Err(e)) => {
                        warn!(%addr, error = %e, "session read error");
                        break 'session;
                    }
                }
            }
        }

        loop {
            match decoder.decode_next() {
                Err(framing_err) => {
                    warn!(%addr, error = %framing_err, "fatal framing error, closing session");
                    break 'session;
                }
                Ok(None) => break,
                Ok(Some(parsed)) => {
                    let close = handle_frame(
                        parsed,
                        &world,
                        &tx,
                        addr,
                        &mut drone_id,
                        &mut registered,
                        &shutdown,
                        &session_end,
                    );
                    if close {
                        break 'session;
                    }
                }
            }
        }
    }

    session_end.cancel();
    if let Some(id) = drone_id {
        world.mark_disconnected(id);
        debug!(drone_id = id, %addr, "session closed");
    } else {
        debug!(%addr, "session closed before handshake");
    }
    drop(tx);
    let _ = writer_task.await;
}

/// Handle one fully-decoded frame (or a non-fatal protocol error already
/// extracted from one). Returns `true` if the session must close.
#[allow(clippy::too_many_arguments)]
fn handle_frame(
    parsed: Result<Message, ProtocolError>,
    world: &Arc<World>,
    tx: &UnboundedSender<Bytes>,
    addr: SocketAddr,
    drone_id: &mut Option<u32>,
    registered: &mut bool,
    shutdown: &CancellationToken,
    session_end: &CancellationToken,
) -> bool {
    let message = match parsed {
        Ok(m) => m,
        Err(e) => {
            debug!(%addr, error = %e, "protocol error");
            send_message(tx, &Message::error(e.code(), e.to_string()));
            return false;
        }
    };

    if !*registered {
        return handle_handshake(message, world, tx, addr, drone_id, registered, shutdown, session_end);
    }

    let Some(id) = *drone_id else {
        // Unreachable in practice: registered implies drone_id is set.
        return false;
    };

    match message {
        Message::StatusUpdate {
            location,
            status,
            timestamp,
            ..
        } => {
            let _ = timestamp; // wire timestamp is informational; server stamps its own clock
            let domain_status = match status {
                WireDroneStatus::Idle => DroneStatus::Idle,
                WireDroneStatus::Busy => DroneStatus::OnMission,
                WireDroneStatus::Charging => DroneStatus::Charging,
            };
            let now = now_secs();
            if let Some(mission_id) = world.apply_status_update(id, location, domain_status, now) {
                send_message(
                    tx,
                    &Message::MissionComplete {
                        drone_id: format!("D{id}"),
                        mission_id,
                        timestamp: now,
                        success: true,
                        details: "cell arrival".into(),
                    },
                );
            }
            false
        }

        Message::MissionComplete {
            mission_id,
            success,
            ..
        } => {
            let now = now_secs();
            world.apply_mission_complete(id, &mission_id, success, now);
            false
        }

        Message::HeartbeatResponse { .. } => {
            world.apply_heartbeat_response(id, now_secs());
            false
        }

        other => {
            debug!(%addr, drone_id = id, kind = other.type_name(), "unexpected message type");
            send_message(tx, &Message::error(400, "unexpected message type"));
            false
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_handshake(
    message: Message,
    world: &Arc<World>,
    tx: &UnboundedSender<Bytes>,
    addr: SocketAddr,
    drone_id: &mut Option<u32>,
    registered: &mut bool,
    shutdown: &CancellationToken,
    session_end: &CancellationToken,
) -> bool {
    let Message::Handshake { drone_id: raw_id, .. } = message else {
        // Any non-HANDSHAKE type before registration: protocol error, session stays open.
        send_message(tx, &Message::error(400, "expected HANDSHAKE"));
        return false;
    };

    let Some(id) = parse_drone_id(&raw_id) else {
        send_message(tx, &Message::error(400, "malformed drone_id"));
        return true; // invalid handshake is fatal
    };

    let now = now_secs();
    let handle = SessionHandle::new(tx.clone(), addr);
    world.register_or_rebind_drone(id, handle, now);

    *drone_id = Some(id);
    *registered = true;

    send_message(
        tx,
        &Message::HandshakeAck {
            session_id: Uuid::new_v4().to_string(),
            config: SessionConfig {
                status_update_interval: STATUS_UPDATE_INTERVAL_SECS,
                heartbeat_interval: HEARTBEAT_INTERVAL_SECS,
            },
        },
    );

    spawn_heartbeat_ticker(tx.clone(), shutdown.clone(), session_end.clone());
    debug!(drone_id = id, %addr, "handshake complete");
    false
}

/// Independent per-session ticker that pushes `HEARTBEAT` to the drone on
/// a fixed cadence, regardless of inbound traffic.
fn spawn_heartbeat_ticker(tx: UnboundedSender<Bytes>, shutdown: CancellationToken, session_end: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
        ticker.tick().await; // first tick fires immediately; discard it
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = session_end.cancelled() => break,
                _ = ticker.tick() => {
                    if let Ok(bytes) = encode_message(&Message::Heartbeat { timestamp: now_secs() }) {
                        if tx.send(bytes).is_err() {
                            break;
                        }
                    }
                }
            }
        }
    });
}

fn send_message(tx: &UnboundedSender<Bytes>, message: &Message) {
    match encode_message(message) {
        Ok(bytes) => {
            let _ = tx.send(bytes);
        }
        Err(e) => warn!(error = %e, "failed to encode outgoing message"),
    }
}

fn parse_drone_id(raw: &str) -> Option<u32> {
    raw.strip_prefix('D')?.parse::<u32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_drone_id() {
        assert_eq!(parse_drone_id("D42"), Some(42));
    }

    #[test]
    fn rejects_malformed_drone_id() {
        assert_eq!(parse_drone_id("drone-1"), None);
        assert_eq!(parse_drone_id("D"), None);
        assert_eq!(parse_drone_id(""), None);
    }
}
