//! One connection's worth of simulated drone behavior: handshake, a
//! periodic status-update loop, and simple step-toward-target movement
//! when a mission is assigned.

use std::time::Duration;

use rand::Rng;
use rescue_shared::codec::{encode_message, MessageDecoder};
use rescue_shared::message::{Message, WireDroneStatus};
use rescue_shared::model::Coord;
use rescue_shared::now_secs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

pub struct ClientConfig {
    pub server_addr: String,
    pub drone_id: u32,
    pub width: i32,
    pub height: i32,
}

/// Run one connection attempt to completion (until disconnect). The
/// caller is responsible for reconnect/backoff between calls.
pub async fn run_once(config: &ClientConfig) -> anyhow::Result<()> {
    let mut stream = TcpStream::connect(&config.server_addr).await?;
    info!(addr = %config.server_addr, drone_id = config.drone_id, "connected");

    send(
        &mut stream,
        &Message::Handshake {
            drone_id: format!("D{}", config.drone_id),
            capabilities: serde_json::json!({ "camera": true, "payload_kg": 5 }),
        },
    )
    .await?;

    let mut decoder = MessageDecoder::new();
    let mut buf = [0u8; 4096];
    let mut status_interval = tokio::time::interval(Duration::from_secs(5));

    let mut coord = random_coord(config.width, config.height);
    let mut target: Option<Coord> = None;

    loop {
        tokio::select! {
            read_result = stream.read(&mut buf) => {
                let n = read_result?;
                if n == 0 {
                    info!(drone_id = config.drone_id, "server closed connection");
                    return Ok(());
                }
                decoder.extend(&buf[..n]);
                while let Some(parsed) = decoder.decode_next()? {
                    match parsed {
                        Ok(message) => handle_inbound(&mut stream, config, message, &mut target, &mut status_interval).await?,
                        Err(e) => warn!(drone_id = config.drone_id, error = %e, "server sent malformed frame"),
                    }
                }
            }
            _ = status_interval.tick() => {
                step_toward_target(&mut coord, &mut target);
                let status = if target.is_some() { WireDroneStatus::Busy } else { WireDroneStatus::Idle };
                send(&mut stream, &Message::StatusUpdate {
                    drone_id: format!("D{}", config.drone_id),
                    timestamp: now_secs(),
                    location: coord,
                    status,
                    battery: 100.0,
                    speed: 1.0,
                }).await?;
            }
        }
    }
}

async fn handle_inbound(
    stream: &mut TcpStream,
    config: &ClientConfig,
    message: Message,
    target: &mut Option<Coord>,
    status_interval: &mut tokio::time::Interval,
) -> anyhow::Result<()> {
    match message {
        Message::HandshakeAck { session_id, config: session_config } => {
            info!(drone_id = config.drone_id, session_id, "handshake acknowledged");
            *status_interval = tokio::time::interval(Duration::from_secs(session_config.status_update_interval));
        }
        Message::AssignMission { mission_id, target: new_target, .. } => {
            info!(drone_id = config.drone_id, mission_id, ?new_target, "mission assigned");
            *target = Some(new_target);
        }
        Message::MissionComplete { mission_id, success, .. } => {
            debug!(drone_id = config.drone_id, mission_id, success, "mission complete acknowledged by server");
        }
        Message::Heartbeat { timestamp } => {
            send(stream, &Message::HeartbeatResponse {
                drone_id: format!("D{}", config.drone_id),
                timestamp,
            }).await?;
        }
        Message::Error { code, message } => {
            warn!(drone_id = config.drone_id, code, message, "server reported protocol error");
        }
        other => {
            debug!(drone_id = config.drone_id, kind = other.type_name(), "ignoring unexpected message");
        }
    }
    Ok(())
}

/// Move one cell closer to `target` along each axis; clears `target` once
/// reached.
fn step_toward_target(coord: &mut Coord, target: &mut Option<Coord>) {
    let Some(t) = *target else { return };
    coord.x += (t.x - coord.x).signum();
    coord.y += (t.y - coord.y).signum();
    if *coord == t {
        *target = None;
    }
}

fn random_coord(width: i32, height: i32) -> Coord {
    let mut rng = rand::thread_rng();
    Coord::new(rng.gen_range(0..width), rng.gen_range(0..height))
}

async fn send(stream: &mut TcpStream, message: &Message) -> anyhow::Result<()> {
    let bytes = encode_message(message)?;
    stream.write_all(&bytes).await?;
    Ok(())
}
