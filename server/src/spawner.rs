//! Periodic survivor generation.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use rescue_shared::config::{SPAWN_MAX_SECS, SPAWN_MIN_SECS};
use rescue_shared::now_secs;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::world::World;

/// Run the survivor spawner until `shutdown` is cancelled: every
/// `uniform(SPAWN_MIN_SECS, SPAWN_MAX_SECS)` seconds, spawn one survivor
/// at a uniformly random in-bounds coordinate.
pub async fn run_spawner(world: Arc<World>, shutdown: CancellationToken) {
    let counter = AtomicU32::new(0);
    loop {
        let delay = next_delay();
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {
                spawn_one(&world, &counter);
            }
        }
    }
    debug!("spawner stopped");
}

fn next_delay() -> Duration {
    let secs = rand::thread_rng().gen_range(SPAWN_MIN_SECS..=SPAWN_MAX_SECS);
    Duration::from_secs_f64(secs)
}

fn spawn_one(world: &Arc<World>, counter: &AtomicU32) {
    let coord = world.random_coord();
    let suffix = counter.fetch_add(1, Ordering::Relaxed) % 10_000;
    let id = format!("SURV-{suffix:04}");
    world.spawn_survivor(id.clone(), coord, now_secs());
    debug!(survivor_id = %id, ?coord, "survivor spawned");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_one_adds_exactly_one_active_survivor() {
        let world = Arc::new(World::new(40, 30));
        let counter = AtomicU32::new(0);
        spawn_one(&world, &counter);
        let (active, helped) = world.survivor_count();
        assert_eq!(active, 1);
        assert_eq!(helped, 0);
    }

    #[test]
    fn delay_is_within_configured_bounds() {
        for _ in 0..50 {
            let d = next_delay();
            assert!(d.as_secs_f64() >= SPAWN_MIN_SECS);
            assert!(d.as_secs_f64() <= SPAWN_MAX_SECS);
        }
    }
}
