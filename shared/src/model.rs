//! Domain value types shared by the server and the reference client.
//!
//! These carry no behavior beyond small invariant-preserving helpers; the
//! stateful, lock-protected aggregate (`World`) lives in `rescue-server`
//! because it needs a session handle type that only makes sense with an
//! async runtime underneath it.

use serde::{Deserialize, Serialize};

/// An integer grid coordinate. `0 <= x < W`, `0 <= y < H` for whatever
/// bounds the world was constructed with; this type itself does not know
/// the bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

impl Coord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance between two coordinates.
    pub fn manhattan(self, other: Coord) -> i64 {
        (self.x as i64 - other.x as i64).abs() + (self.y as i64 - other.y as i64).abs()
    }

    pub fn in_bounds(self, width: i32, height: i32) -> bool {
        self.x >= 0 && self.x < width && self.y >= 0 && self.y < height
    }

    /// Clamp a coordinate into `[0, width) x [0, height)`. Mirrors the
    /// original source's fallback when a freshly-rolled spawn coordinate
    /// fell outside the map; reused here for incoming `STATUS_UPDATE`
    /// locations so invariant 5 (coords always in bounds) holds without
    /// rejecting the message. See SPEC_FULL.md §4.2.
    pub fn clamp(self, width: i32, height: i32) -> Coord {
        let clamp_axis = |v: i32, bound: i32| -> i32 {
            if bound <= 0 {
                return 0;
            }
            let m = v % bound;
            if m < 0 {
                m + bound
            } else {
                m
            }
        };
        Coord {
            x: clamp_axis(self.x, width),
            y: clamp_axis(self.y, height),
        }
    }
}

/// A survivor's lifecycle state. Immutable except for the one-way
/// `Waiting -> Helped` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SurvivorStatus {
    Waiting,
    Helped,
}

/// A survivor awaiting or having received rescue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Survivor {
    pub id: String,
    pub coord: Coord,
    pub discovery_time: u64,
    pub status: SurvivorStatus,
    pub helped_time: Option<u64>,
}

impl Survivor {
    pub fn new_waiting(id: impl Into<String>, coord: Coord, discovery_time: u64) -> Self {
        Self {
            id: id.into(),
            coord,
            discovery_time,
            status: SurvivorStatus::Waiting,
            helped_time: None,
        }
    }

    /// Produce the archived copy of this survivor as of `helped_time`.
    /// Does not mutate `self`; the caller is responsible for moving the
    /// record between the active and helped collections.
    pub fn into_helped(mut self, helped_time: u64) -> Self {
        self.status = SurvivorStatus::Helped;
        self.helped_time = Some(helped_time);
        self
    }
}

/// A drone's operating state as tracked by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DroneStatus {
    Idle,
    OnMission,
    /// Reported by the drone itself via `STATUS_UPDATE.status == "charging"`.
    /// Excluded from dispatch like `OnMission`, but distinct from it: no
    /// energy/battery model exists to back further semantics (Non-goal).
    Charging,
    Disconnected,
}

impl DroneStatus {
    pub fn is_idle(self) -> bool {
        matches!(self, DroneStatus::Idle)
    }
}

/// A drone record as it exists inside the world model. This is the
/// plain-data projection; `rescue-server::world::DroneRecord` wraps it with
/// locking and a session handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drone {
    pub id: u32,
    pub coord: Coord,
    pub target: Coord,
    pub status: DroneStatus,
    pub mission_id: Option<String>,
    pub last_update: u64,
}

impl Drone {
    pub fn new_idle(id: u32, coord: Coord, now: u64) -> Self {
        Self {
            id,
            coord,
            target: Coord::new(0, 0),
            status: DroneStatus::Idle,
            mission_id: None,
            last_update: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manhattan_distance() {
        assert_eq!(Coord::new(0, 0).manhattan(Coord::new(3, 4)), 7);
        assert_eq!(Coord::new(5, 5).manhattan(Coord::new(5, 5)), 0);
    }

    #[test]
    fn clamp_wraps_negative_and_overflow() {
        assert_eq!(Coord::new(-1, 0).clamp(40, 30), Coord::new(39, 0));
        assert_eq!(Coord::new(40, 30).clamp(40, 30), Coord::new(0, 0));
        assert_eq!(Coord::new(5, 5).clamp(40, 30), Coord::new(5, 5));
    }

    #[test]
    fn survivor_transition_sets_helped_time() {
        let s = Survivor::new_waiting("SURV-0001", Coord::new(1, 1), 100);
        let helped = s.into_helped(200);
        assert_eq!(helped.status, SurvivorStatus::Helped);
        assert_eq!(helped.helped_time, Some(200));
    }
}
