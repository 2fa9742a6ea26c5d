//! Periodic matching of idle drones to unassigned survivors.

use std::sync::Arc;
use std::time::Duration;

use rescue_shared::config::{DISPATCH_TICK_SECS, MISSION_CHECKSUM_PLACEHOLDER, MISSION_EXPIRY_SECS};
use rescue_shared::message::Message;
use rescue_shared::model::Coord;
use rescue_shared::now_secs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::world::World;

/// Run the dispatcher loop until `shutdown` is cancelled. Each tick scans
/// unassigned survivors in insertion order and pairs each with the
/// closest idle drone, breaking ties by lowest drone id.
pub async fn run_dispatcher(world: Arc<World>, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(Duration::from_secs(DISPATCH_TICK_SECS));
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => tick(&world),
        }
    }
    debug!("dispatcher stopped");
}

fn tick(world: &Arc<World>) {
    let survivors = world.unassigned_survivors();
    if survivors.is_empty() {
        return;
    }

    // Idle drones are re-snapshotted per survivor: an assignment earlier in
    // this tick removes that drone from subsequent candidacy.
    for (survivor_id, survivor_coord) in survivors {
        let Some((drone_id, _)) = closest_idle_drone(world, survivor_coord) else {
            continue; // no idle drone this tick; retried next tick, no queue
        };

        let now = now_secs();
        if !world.try_assign(drone_id, &survivor_id, survivor_coord, now) {
            // Drone was claimed by a concurrent path between snapshot and commit.
            continue;
        }

        let message = Message::AssignMission {
            mission_id: survivor_id.clone(),
            priority: "high".into(),
            target: survivor_coord,
            expiry: now + MISSION_EXPIRY_SECS,
            checksum: MISSION_CHECKSUM_PLACEHOLDER.to_string(),
        };

        match world.session_handle(drone_id) {
            Some(handle) => match rescue_shared::codec::encode_message(&message) {
                Ok(bytes) => {
                    if handle.send(bytes).is_err() {
                        warn!(drone_id, survivor_id, "assign send failed, reverting to idle");
                        world.revert_assignment(drone_id, &survivor_id);
                    }
                }
                Err(e) => {
                    warn!(drone_id, error = %e, "failed to encode ASSIGN_MISSION");
                    world.revert_assignment(drone_id, &survivor_id);
                }
            },
            None => {
                warn!(drone_id, survivor_id, "no session for drone, reverting to idle");
                world.revert_assignment(drone_id, &survivor_id);
            }
        }
    }
}

/// Closest idle drone to `target` by Manhattan distance, ties broken by
/// lowest drone id.
fn closest_idle_drone(world: &Arc<World>, target: Coord) -> Option<(u32, Coord)> {
    world
        .idle_drones()
        .into_iter()
        .min_by_key(|(id, coord)| (coord.manhattan(target), *id))
}
