//! End-to-end scenarios driven over real loopback TCP sockets: a running
//! acceptor + dispatcher + world, with plain `TcpStream`s standing in for
//! drones.

use std::sync::Arc;
use std::time::Duration;

use rescue_server::acceptor;
use rescue_server::dispatcher::run_dispatcher;
use rescue_server::world::World;
use rescue_shared::codec::MessageDecoder;
use rescue_shared::message::{Message, WireDroneStatus};
use rescue_shared::model::Coord;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

/// Spin up a full server (acceptor + dispatcher, no spawner — tests control
/// survivor creation directly) on an ephemeral port.
async fn start_server(width: i32, height: i32, admission_cap: usize) -> (Arc<World>, String, CancellationToken) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let world = Arc::new(World::new(width, height));
    let shutdown = CancellationToken::new();

    tokio::spawn(acceptor::run_acceptor(listener, world.clone(), admission_cap, shutdown.clone()));
    tokio::spawn(run_dispatcher(world.clone(), shutdown.clone()));

    (world, addr.to_string(), shutdown)
}

async fn handshake(stream: &mut TcpStream, drone_id: &str) {
    let msg = Message::Handshake {
        drone_id: drone_id.to_string(),
        capabilities: serde_json::json!({}),
    };
    write_message(stream, &msg).await;
    // drain the HANDSHAKE_ACK
    let _ = read_message(stream).await;
}

async fn write_message(stream: &mut TcpStream, msg: &Message) {
    let bytes = rescue_shared::codec::encode_message(msg).unwrap();
    stream.write_all(&bytes).await.unwrap();
}

/// Read exactly one complete message, retrying partial reads.
async fn read_message(stream: &mut TcpStream) -> Message {
    let mut decoder = MessageDecoder::new();
    let mut buf = [0u8; 4096];
    loop {
        if let Some(result) = decoder.decode_next().unwrap() {
            return result.unwrap();
        }
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0, "connection closed before a full message arrived");
        decoder.extend(&buf[..n]);
    }
}

async fn read_message_timeout(stream: &mut TcpStream, timeout: Duration) -> Option<Message> {
    tokio::time::timeout(timeout, read_message(stream)).await.ok()
}

#[tokio::test]
async fn scenario_1_assigns_closest_of_three_survivors() {
    let (world, addr, _shutdown) = start_server(40, 30, 10).await;
    world.spawn_survivor("SURV-0001".into(), Coord::new(5, 5), 0);
    world.spawn_survivor("SURV-0002".into(), Coord::new(10, 10), 0);
    world.spawn_survivor("SURV-0003".into(), Coord::new(20, 20), 0);

    let mut stream = TcpStream::connect(&addr).await.unwrap();
    handshake(&mut stream, "D1").await;
    // Pin the drone's coordinate near (5,5) so the closest survivor is unambiguous.
    write_message(
        &mut stream,
        &Message::StatusUpdate {
            drone_id: "D1".into(),
            timestamp: 0,
            location: Coord::new(4, 4),
            status: WireDroneStatus::Idle,
            battery: 100.0,
            speed: 0.0,
        },
    )
    .await;

    let assign = read_message_timeout(&mut stream, Duration::from_secs(3))
        .await
        .expect("expected an ASSIGN_MISSION within the dispatch window");
    match assign {
        Message::AssignMission { mission_id, .. } => assert_eq!(mission_id, "SURV-0001"),
        other => panic!("expected ASSIGN_MISSION, got {other:?}"),
    }
}

#[tokio::test]
async fn scenario_2_only_the_closer_drone_is_assigned() {
    let (world, addr, _shutdown) = start_server(40, 30, 10).await;
    world.spawn_survivor("SURV-0001".into(), Coord::new(1, 1), 0);

    let mut d1 = TcpStream::connect(&addr).await.unwrap();
    handshake(&mut d1, "D1").await;
    write_message(
        &mut d1,
        &Message::StatusUpdate {
            drone_id: "D1".into(),
            timestamp: 0,
            location: Coord::new(0, 0),
            status: WireDroneStatus::Idle,
            battery: 100.0,
            speed: 0.0,
        },
    )
    .await;

    let mut d2 = TcpStream::connect(&addr).await.unwrap();
    handshake(&mut d2, "D2").await;
    write_message(
        &mut d2,
        &Message::StatusUpdate {
            drone_id: "D2".into(),
            timestamp: 0,
            location: Coord::new(30, 20),
            status: WireDroneStatus::Idle,
            battery: 100.0,
            speed: 0.0,
        },
    )
    .await;

    let assign = read_message_timeout(&mut d1, Duration::from_secs(3))
        .await
        .expect("D1 should receive the assignment");
    assert!(matches!(assign, Message::AssignMission { .. }));

    let nothing = read_message_timeout(&mut d2, Duration::from_millis(1500)).await;
    assert!(
        !matches!(nothing, Some(Message::AssignMission { .. })),
        "D2 must not be assigned; it is farther away"
    );

    let drone2 = world.get_drone(2).unwrap();
    assert!(drone2.status().is_idle());
}

#[tokio::test]
async fn scenario_3_cell_arrival_archives_survivor_and_completes_mission() {
    let (world, addr, _shutdown) = start_server(40, 30, 10).await;
    world.spawn_survivor("SURV-0001".into(), Coord::new(7, 7), 0);

    let mut stream = TcpStream::connect(&addr).await.unwrap();
    handshake(&mut stream, "D1").await;

    let assign = read_message_timeout(&mut stream, Duration::from_secs(3))
        .await
        .expect("expected assignment");
    let Message::AssignMission { mission_id, target, .. } = assign else {
        panic!("expected ASSIGN_MISSION");
    };
    assert_eq!(target, Coord::new(7, 7));

    write_message(
        &mut stream,
        &Message::StatusUpdate {
            drone_id: "D1".into(),
            timestamp: 1,
            location: target,
            status: WireDroneStatus::Busy,
            battery: 90.0,
            speed: 0.0,
        },
    )
    .await;

    let completion = read_message_timeout(&mut stream, Duration::from_secs(3))
        .await
        .expect("expected MISSION_COMPLETE");
    match completion {
        Message::MissionComplete {
            mission_id: completed_id,
            success,
            ..
        } => {
            assert_eq!(completed_id, mission_id);
            assert!(success);
        }
        other => panic!("expected MISSION_COMPLETE, got {other:?}"),
    }

    let (active, helped) = world.survivor_count();
    assert_eq!(active, 0);
    assert_eq!(helped, 1);
    assert!(world.get_drone(1).unwrap().status().is_idle());
}

#[tokio::test]
async fn scenario_4_status_update_before_handshake_gets_error_400_and_stays_open() {
    let (_world, addr, _shutdown) = start_server(40, 30, 10).await;
    let mut stream = TcpStream::connect(&addr).await.unwrap();

    write_message(
        &mut stream,
        &Message::StatusUpdate {
            drone_id: "D1".into(),
            timestamp: 0,
            location: Coord::new(0, 0),
            status: WireDroneStatus::Idle,
            battery: 100.0,
            speed: 0.0,
        },
    )
    .await;

    let response = read_message_timeout(&mut stream, Duration::from_secs(2))
        .await
        .expect("expected an ERROR response");
    match response {
        Message::Error { code, .. } => assert_eq!(code, 400),
        other => panic!("expected ERROR, got {other:?}"),
    }

    // Session must still be open: a real HANDSHAKE now succeeds.
    handshake(&mut stream, "D1").await;
    assert!(_world.get_drone(1).is_some());
}

#[tokio::test]
async fn scenario_5_equidistant_drones_break_tie_by_lower_id() {
    let (world, addr, _shutdown) = start_server(40, 30, 10).await;
    world.spawn_survivor("SURV-0001".into(), Coord::new(10, 10), 0);

    let mut d1 = TcpStream::connect(&addr).await.unwrap();
    handshake(&mut d1, "D1").await;
    write_message(
        &mut d1,
        &Message::StatusUpdate {
            drone_id: "D1".into(),
            timestamp: 0,
            location: Coord::new(0, 10),
            status: WireDroneStatus::Idle,
            battery: 100.0,
            speed: 0.0,
        },
    )
    .await;

    let mut d2 = TcpStream::connect(&addr).await.unwrap();
    handshake(&mut d2, "D2").await;
    write_message(
        &mut d2,
        &Message::StatusUpdate {
            drone_id: "D2".into(),
            timestamp: 0,
            location: Coord::new(20, 10),
            status: WireDroneStatus::Idle,
            battery: 100.0,
            speed: 0.0,
        },
    )
    .await;

    let assign = read_message_timeout(&mut d1, Duration::from_secs(3))
        .await
        .expect("D1 (lower id) should win the tie");
    assert!(matches!(assign, Message::AssignMission { .. }));
    assert!(world.get_drone(2).unwrap().status().is_idle());
}

#[tokio::test]
async fn scenario_6_three_concatenated_messages_in_one_write_process_in_order() {
    let (world, addr, _shutdown) = start_server(40, 30, 10).await;
    let mut stream = TcpStream::connect(&addr).await.unwrap();
    handshake(&mut stream, "D1").await;

    let mut payload = Vec::new();
    for ts in [10u64, 11, 12] {
        payload.extend_from_slice(&rescue_shared::codec::encode_message(&Message::HeartbeatResponse {
            drone_id: "D1".into(),
            timestamp: ts,
        }).unwrap());
    }
    stream.write_all(&payload).await.unwrap();

    // Give the session loop a moment to drain all three heartbeat responses.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let drone = world.get_drone(1).unwrap();
    assert!(drone.status().is_idle());
    let _ = drone; // last_update is asserted indirectly: no panic/disconnect means all three parsed.
}
