//! Per-drone record and its session handle.
//!
//! The world owns the record; a session holds only the drone id, looking
//! the record up through the world on each message. Reconnects rebind the
//! session field without touching the rest of the record.

use std::net::SocketAddr;

use bytes::Bytes;
use parking_lot::Mutex;
use rescue_shared::model::{Coord, DroneStatus};
use tokio::sync::mpsc::UnboundedSender;

use super::snapshot::DroneSnapshot;

/// A lightweight, cloneable handle for sending pre-encoded frames to a
/// drone's writer task. Never touches the socket directly and never
/// blocks: the channel is unbounded, so a send under the per-drone lock
/// can never stall on I/O.
#[derive(Clone)]
pub struct SessionHandle {
    tx: UnboundedSender<Bytes>,
    pub addr: SocketAddr,
}

impl SessionHandle {
    pub fn new(tx: UnboundedSender<Bytes>, addr: SocketAddr) -> Self {
        Self { tx, addr }
    }

    /// Hand a pre-encoded frame to the writer task. Fails only if the
    /// session's writer task (and therefore the socket) has already gone
    /// away.
    pub fn send(&self, frame: Bytes) -> Result<(), SendFailed> {
        self.tx.send(frame).map_err(|_| SendFailed)
    }
}

#[derive(Debug)]
pub struct SendFailed;

struct Inner {
    coord: Coord,
    target: Coord,
    status: DroneStatus,
    mission_id: Option<String>,
    last_update: u64,
    session: Option<SessionHandle>,
}

/// A drone's persistent record. Created on first handshake, never deleted;
/// disconnects flip `status` to `Disconnected` and clear the session.
pub struct DroneRecord {
    pub id: u32,
    inner: Mutex<Inner>,
}

impl DroneRecord {
    pub fn new(id: u32, coord: Coord, session: SessionHandle, now: u64) -> Self {
        Self {
            id,
            inner: Mutex::new(Inner {
                coord,
                target: Coord::new(0, 0),
                status: DroneStatus::Idle,
                mission_id: None,
                last_update: now,
                session: Some(session),
            }),
        }
    }

    pub fn rebind_session(&self, session: SessionHandle, now: u64) {
        let mut inner = self.inner.lock();
        inner.session = Some(session);
        inner.last_update = now;
        if inner.status == DroneStatus::Disconnected {
            inner.status = DroneStatus::Idle;
        }
    }

    pub fn mark_disconnected(&self) {
        let mut inner = self.inner.lock();
        inner.status = DroneStatus::Disconnected;
        inner.session = None;
    }

    pub fn coord(&self) -> Coord {
        self.inner.lock().coord
    }

    pub fn status(&self) -> DroneStatus {
        self.inner.lock().status
    }

    pub fn mission_id(&self) -> Option<String> {
        self.inner.lock().mission_id.clone()
    }

    pub fn session_handle(&self) -> Option<SessionHandle> {
        self.inner.lock().session.clone()
    }

    /// Apply a `STATUS_UPDATE`'s coord/status/last_update. The caller is
    /// expected to have already clamped `coord` into bounds.
    ///
    /// A drone reporting anything other than `OnMission` is, by
    /// definition, not flying a mission from the server's point of view,
    /// so `mission_id` is cleared alongside the status to keep the two
    /// fields consistent even if the drone itself misreports.
    pub fn update_from_status(&self, coord: Coord, status: DroneStatus, now: u64) {
        let mut inner = self.inner.lock();
        inner.coord = coord;
        inner.status = status;
        if status != DroneStatus::OnMission {
            inner.mission_id = None;
        }
        inner.last_update = now;
    }

    pub fn touch(&self, now: u64) {
        self.inner.lock().last_update = now;
    }

    /// Verify-and-set: only commits if the drone is currently idle.
    pub fn try_assign(&self, survivor_id: &str, target: Coord, now: u64) -> bool {
        let mut inner = self.inner.lock();
        if !inner.status.is_idle() {
            return false;
        }
        inner.status = DroneStatus::OnMission;
        inner.target = target;
        inner.mission_id = Some(survivor_id.to_string());
        inner.last_update = now;
        true
    }

    /// Revert to idle only if the drone still holds `mission_id` — guards
    /// against clobbering a second, independently-successful assignment.
    pub fn revert_if_mission(&self, mission_id: &str) {
        let mut inner = self.inner.lock();
        if inner.mission_id.as_deref() == Some(mission_id) {
            inner.status = DroneStatus::Idle;
            inner.mission_id = None;
        }
    }

    /// Free the drone after a successful rescue.
    pub fn complete_mission(&self) {
        let mut inner = self.inner.lock();
        inner.status = DroneStatus::Idle;
        inner.mission_id = None;
    }

    /// Free the drone after a failed mission (`MISSION_COMPLETE{success:false}`).
    pub fn fail_mission(&self) {
        self.complete_mission();
    }

    pub fn to_snapshot(&self) -> DroneSnapshot {
        let inner = self.inner.lock();
        DroneSnapshot {
            id: self.id,
            coord: inner.coord,
            target: inner.target,
            status: inner.status,
        }
    }
}
