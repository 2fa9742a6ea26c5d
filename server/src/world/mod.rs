//! The concurrent world model: survivors, drones, and per-cell occupancy.
//!
//! All mutation goes through methods on [`World`] so the canonical lock
//! order (`cells -> active_survivors -> helped_survivors -> drones ->
//! per-drone`) is enforced in one place rather than at every call site.

mod record;
mod snapshot;

pub use record::{DroneRecord, SessionHandle};
pub use snapshot::{DroneSnapshot, Snapshot, SurvivorSnapshot};

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use rescue_shared::model::{Coord, DroneStatus, Survivor};
use tracing::{debug, warn};

/// A single grid cell's survivor occupancy list, independently locked so
/// that touching one cell never blocks on another.
struct Cell {
    occupants: Mutex<Vec<String>>,
}

impl Cell {
    fn new() -> Self {
        Self {
            occupants: Mutex::new(Vec::new()),
        }
    }
}

/// The shared aggregate. Cheap to clone behind an `Arc`; every task in the
/// process holds one.
pub struct World {
    width: i32,
    height: i32,
    cells: Vec<Cell>,
    active_survivors: RwLock<IndexMap<String, Survivor>>,
    helped_survivors: RwLock<HashMap<String, Survivor>>,
    drones: RwLock<HashMap<u32, Arc<DroneRecord>>>,
}

impl World {
    pub fn new(width: i32, height: i32) -> Self {
        let cell_count = (width as usize) * (height as usize);
        let mut cells = Vec::with_capacity(cell_count);
        cells.resize_with(cell_count, Cell::new);

        Self {
            width,
            height,
            cells,
            active_survivors: RwLock::new(IndexMap::new()),
            helped_survivors: RwLock::new(HashMap::new()),
            drones: RwLock::new(HashMap::new()),
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    fn cell_index(&self, coord: Coord) -> usize {
        (coord.y as usize) * (self.width as usize) + (coord.x as usize)
    }

    // ---- survivor spawning ------------------------------------------------

    /// Insert a freshly-spawned survivor at `coord`, updating the active
    /// set and the cell index together. Lock order: `cells` then
    /// `active_survivors`.
    pub fn spawn_survivor(&self, id: String, coord: Coord, now: u64) {
        let idx = self.cell_index(coord);
        self.cells[idx].occupants.lock().push(id.clone());
        let survivor = Survivor::new_waiting(id.clone(), coord, now);
        self.active_survivors.write().insert(id, survivor);
    }

    /// Choose a uniformly random in-bounds coordinate.
    pub fn random_coord(&self) -> Coord {
        let mut rng = rand::thread_rng();
        Coord::new(rng.gen_range(0..self.width), rng.gen_range(0..self.height))
    }

    // ---- drone lifecycle --------------------------------------------------

    /// Handle a `HANDSHAKE`: create the drone record on first contact, or
    /// rebind its session on reconnect. Returns the (possibly new) record.
    pub fn register_or_rebind_drone(
        &self,
        drone_id: u32,
        session: SessionHandle,
        now: u64,
    ) -> Arc<DroneRecord> {
        let mut drones = self.drones.write();
        if let Some(existing) = drones.get(&drone_id) {
            existing.rebind_session(session, now);
            debug!(drone_id, "drone reconnected, rebound session");
            return existing.clone();
        }

        let coord = self.random_coord();
        let record = Arc::new(DroneRecord::new(drone_id, coord, session, now));
        drones.insert(drone_id, record.clone());
        debug!(drone_id, ?coord, "drone registered");
        record
    }

    pub fn get_drone(&self, drone_id: u32) -> Option<Arc<DroneRecord>> {
        self.drones.read().get(&drone_id).cloned()
    }

    /// Mark a drone disconnected, preserving its coordinate and id. Leaves
    /// the record in the registry so a reconnect can rebind it.
    pub fn mark_disconnected(&self, drone_id: u32) {
        if let Some(record) = self.get_drone(drone_id) {
            record.mark_disconnected();
        }
    }

    // ---- status update / mission completion --------------------------------

    /// Apply a `STATUS_UPDATE`: update coord/status/last_update, then check
    /// the cell-arrival shortcut. Returns the id of a survivor archived as
    /// a side effect, if any (the caller sends `MISSION_COMPLETE` for it).
    pub fn apply_status_update(
        &self,
        drone_id: u32,
        location: Coord,
        status: DroneStatus,
        now: u64,
    ) -> Option<String> {
        let clamped = location.clamp(self.width, self.height);
        let record = self.get_drone(drone_id)?;
        record.update_from_status(clamped, status, now);

        self.try_arrival_rescue(clamped, drone_id, now)
    }

    /// Check whether `coord` currently holds a waiting survivor and, if so,
    /// archive the lowest-id one and free the drone. Shared by the
    /// cell-arrival shortcut and (defensively) by explicit completion.
    fn try_arrival_rescue(&self, coord: Coord, drone_id: u32, now: u64) -> Option<String> {
        let idx = self.cell_index(coord);

        // Lock order: cells -> active_survivors -> helped_survivors -> drones/per-drone.
        let candidate_id = {
            let occupants = self.cells[idx].occupants.lock();
            occupants.iter().min().cloned()
        }?;

        let archived = self.archive_survivor(&candidate_id, now);
        if archived {
            if let Some(record) = self.get_drone(drone_id) {
                record.complete_mission();
            }
            Some(candidate_id)
        } else {
            None
        }
    }

    /// Move a survivor from active to helped by id, removing it from its
    /// cell list. Idempotent: returns `false` if the survivor was already
    /// archived (or never existed), which callers treat as success, not an
    /// error.
    ///
    /// A survivor's coord never changes after creation, so peeking it
    /// under a short-lived read lock before taking the cell lock does not
    /// risk acting on stale data; it only lets us respect the canonical
    /// `cells -> active_survivors` acquisition order without already
    /// knowing the coordinate up front.
    fn archive_survivor(&self, survivor_id: &str, now: u64) -> bool {
        let coord = match self.active_survivors.read().get(survivor_id) {
            Some(s) => s.coord,
            None => return false,
        };

        let idx = self.cell_index(coord);
        let mut occupants = self.cells[idx].occupants.lock();

        let removed = {
            let mut active = self.active_survivors.write();
            active.shift_remove(survivor_id)
        };

        let Some(survivor) = removed else {
            return false;
        };

        occupants.retain(|id| id != survivor_id);
        drop(occupants);

        let helped = survivor.into_helped(now);
        self.helped_survivors
            .write()
            .insert(survivor_id.to_string(), helped);
        true
    }

    /// Apply an explicit `MISSION_COMPLETE`. Returns `true` if this call
    /// archived the survivor (i.e. the cell-arrival shortcut had not
    /// already done so).
    pub fn apply_mission_complete(
        &self,
        drone_id: u32,
        mission_id: &str,
        success: bool,
        now: u64,
    ) -> bool {
        let Some(record) = self.get_drone(drone_id) else {
            warn!(drone_id, "MISSION_COMPLETE from unknown drone");
            return false;
        };

        if !success {
            record.fail_mission();
            return false;
        }

        let expected_coord = self.active_survivors.read().get(mission_id).map(|s| s.coord);
        if let Some(expected_coord) = expected_coord {
            if expected_coord != record.coord() {
                warn!(
                    drone_id,
                    mission_id, "MISSION_COMPLETE coord does not match survivor coord"
                );
            }
        }

        let archived = self.archive_survivor(mission_id, now);
        record.complete_mission();
        archived
    }

    pub fn apply_heartbeat_response(&self, drone_id: u32, now: u64) {
        if let Some(record) = self.get_drone(drone_id) {
            record.touch(now);
        }
    }

    // ---- dispatcher support -------------------------------------------------

    /// Survivors with no drone currently assigned to them, in insertion
    /// order, each paired with its coordinate.
    pub fn unassigned_survivors(&self) -> Vec<(String, Coord)> {
        let assigned: std::collections::HashSet<String> = self
            .drones
            .read()
            .values()
            .filter_map(|d| d.mission_id())
            .collect();

        self.active_survivors
            .read()
            .iter()
            .filter(|entry| !assigned.contains(entry.0))
            .map(|(id, s)| (id.clone(), s.coord))
            .collect()
    }

    /// All currently-idle drones, as `(id, coord)` pairs.
    pub fn idle_drones(&self) -> Vec<(u32, Coord)> {
        self.drones
            .read()
            .values()
            .filter(|d| d.status().is_idle())
            .map(|d| (d.id, d.coord()))
            .collect()
    }

    /// Atomically verify a drone is still idle and, if so, commit it to a
    /// mission. Returns `false` (no-op) if the drone changed state between
    /// the dispatcher's snapshot and this call.
    pub fn try_assign(&self, drone_id: u32, survivor_id: &str, target: Coord, now: u64) -> bool {
        match self.get_drone(drone_id) {
            Some(record) => record.try_assign(survivor_id, target, now),
            None => false,
        }
    }

    /// Revert a drone to idle after a failed `ASSIGN_MISSION` send, but
    /// only if it still holds the mission we just failed to announce.
    pub fn revert_assignment(&self, drone_id: u32, mission_id: &str) {
        if let Some(record) = self.get_drone(drone_id) {
            record.revert_if_mission(mission_id);
        }
    }

    pub fn session_handle(&self, drone_id: u32) -> Option<SessionHandle> {
        self.get_drone(drone_id).and_then(|d| d.session_handle())
    }

    // ---- snapshot ------------------------------------------------------------

    pub fn snapshot(&self) -> Snapshot {
        let drones: Vec<DroneSnapshot> = self
            .drones
            .read()
            .values()
            .map(|d| d.to_snapshot())
            .collect();

        let survivors: Vec<SurvivorSnapshot> = self
            .active_survivors
            .read()
            .values()
            .map(|s| SurvivorSnapshot {
                id: s.id.clone(),
                coord: s.coord,
                status: s.status,
            })
            .chain(self.helped_survivors.read().values().map(|s| SurvivorSnapshot {
                id: s.id.clone(),
                coord: s.coord,
                status: s.status,
            }))
            .collect();

        Snapshot { drones, survivors }
    }

    /// Total count of active + helped survivors, mainly for tests and logs.
    pub fn survivor_count(&self) -> (usize, usize) {
        (
            self.active_survivors.read().len(),
            self.helped_survivors.read().len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rescue_shared::model::DroneStatus;

    fn world() -> World {
        World::new(40, 30)
    }

    fn noop_session() -> SessionHandle {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        SessionHandle::new(tx, "127.0.0.1:1".parse().unwrap())
    }

    #[test]
    fn spawn_registers_in_active_and_cell_index() {
        let w = world();
        w.spawn_survivor("SURV-0001".into(), Coord::new(5, 5), 100);
        let (active, helped) = w.survivor_count();
        assert_eq!(active, 1);
        assert_eq!(helped, 0);
    }

    #[test]
    fn cell_arrival_archives_survivor_and_frees_drone() {
        let w = world();
        w.spawn_survivor("SURV-0001".into(), Coord::new(5, 5), 100);
        w.register_or_rebind_drone(1, noop_session(), 100);
        w.try_assign(1, "SURV-0001", Coord::new(5, 5), 100);

        let archived = w.apply_status_update(1, Coord::new(5, 5), DroneStatus::Idle, 200);
        assert_eq!(archived, Some("SURV-0001".to_string()));

        let (active, helped) = w.survivor_count();
        assert_eq!(active, 0);
        assert_eq!(helped, 1);

        let drone = w.get_drone(1).unwrap();
        assert!(drone.status().is_idle());
        assert_eq!(drone.mission_id(), None);
    }

    #[test]
    fn mission_complete_is_idempotent_after_cell_arrival() {
        let w = world();
        w.spawn_survivor("SURV-0001".into(), Coord::new(2, 2), 0);
        w.register_or_rebind_drone(7, noop_session(), 0);
        w.try_assign(7, "SURV-0001", Coord::new(2, 2), 0);

        let first = w.apply_status_update(7, Coord::new(2, 2), DroneStatus::Idle, 10);
        assert!(first.is_some());

        // Drone's explicit completion arrives after the shortcut already fired.
        let archived_again = w.apply_mission_complete(7, "SURV-0001", true, 11);
        assert!(!archived_again, "second completion path must be a no-op");

        let (active, helped) = w.survivor_count();
        assert_eq!(active, 0);
        assert_eq!(helped, 1);
    }

    #[test]
    fn out_of_bounds_status_update_is_clamped_into_bounds() {
        let w = world();
        w.register_or_rebind_drone(1, noop_session(), 0);
        w.apply_status_update(1, Coord::new(-5, 1000), DroneStatus::Idle, 0);
        let drone = w.get_drone(1).unwrap();
        assert!(drone.coord().in_bounds(w.width(), w.height()));
    }

    #[test]
    fn unassigned_survivors_exclude_those_already_on_mission() {
        let w = world();
        w.spawn_survivor("SURV-0001".into(), Coord::new(1, 1), 0);
        w.spawn_survivor("SURV-0002".into(), Coord::new(2, 2), 0);
        w.register_or_rebind_drone(1, noop_session(), 0);
        w.try_assign(1, "SURV-0001", Coord::new(1, 1), 0);

        let unassigned = w.unassigned_survivors();
        assert_eq!(unassigned.len(), 1);
        assert_eq!(unassigned[0].0, "SURV-0002");
    }

    #[test]
    fn try_assign_fails_if_drone_not_idle() {
        let w = world();
        w.register_or_rebind_drone(1, noop_session(), 0);
        assert!(w.try_assign(1, "SURV-0001", Coord::new(1, 1), 0));
        // Already on mission now; a second attempt must not clobber it.
        assert!(!w.try_assign(1, "SURV-0002", Coord::new(2, 2), 0));
    }

    #[test]
    fn disconnect_preserves_coord_and_id() {
        let w = world();
        w.register_or_rebind_drone(1, noop_session(), 0);
        let before = w.get_drone(1).unwrap().coord();
        w.mark_disconnected(1);
        let drone = w.get_drone(1).unwrap();
        assert_eq!(drone.coord(), before);
        assert_eq!(drone.status(), DroneStatus::Disconnected);
    }

    #[test]
    fn reconnect_rebinds_without_creating_a_new_record() {
        let w = world();
        w.register_or_rebind_drone(1, noop_session(), 0);
        w.mark_disconnected(1);
        let record = w.register_or_rebind_drone(1, noop_session(), 10);
        assert_eq!(record.id, 1);
        assert_eq!(w.drones.read().len(), 1);
        assert_ne!(record.status(), DroneStatus::Disconnected);
    }
}
