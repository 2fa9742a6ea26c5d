//! Read-only point-in-time views of the world, for consumers that must
//! never hold a world lock (a renderer, a status endpoint, tests).

use rescue_shared::model::{Coord, DroneStatus, SurvivorStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct DroneSnapshot {
    pub id: u32,
    pub coord: Coord,
    pub target: Coord,
    pub status: DroneStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurvivorSnapshot {
    pub id: String,
    pub coord: Coord,
    pub status: SurvivorStatus,
}

/// A consistent copy of drone and survivor state, independent of any
/// further world mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub drones: Vec<DroneSnapshot>,
    pub survivors: Vec<SurvivorSnapshot>,
}
