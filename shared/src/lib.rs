//! Rescue Coordination Shared Protocol
//!
//! Shared wire protocol types and line-delimited JSON codec for
//! communication between drone agents and the coordination server. No
//! dependency on any async runtime: pure data plus (de)serialization, so
//! the server, the reference drone client, and tests all use it unmodified.

pub mod codec;
pub mod message;
pub mod model;

pub use message::Message;
pub use model::{Coord, Drone, DroneStatus, Survivor, SurvivorStatus};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix time in whole seconds. Wire timestamps are seconds, not
/// milliseconds.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Tunable parameters shared by the server and reference client.
pub mod config {
    /// Default grid width in cells.
    pub const DEFAULT_WIDTH: i32 = 40;
    /// Default grid height in cells.
    pub const DEFAULT_HEIGHT: i32 = 30;
    /// Default TCP listen port.
    pub const DEFAULT_PORT: u16 = 8080;
    /// Default simultaneous-drone admission cap.
    pub const DEFAULT_ADMISSION_CAP: usize = 10;
    /// Maximum bytes a single line may grow to before framing fails.
    pub const MAX_FRAME_BYTES: usize = 8 * 1024;
    /// Interval at which the server expects `STATUS_UPDATE`s, echoed to
    /// the drone in `HANDSHAKE_ACK.config`.
    pub const STATUS_UPDATE_INTERVAL_SECS: u64 = 5;
    /// Interval at which the server sends `HEARTBEAT`, echoed in
    /// `HANDSHAKE_ACK.config`.
    pub const HEARTBEAT_INTERVAL_SECS: u64 = 10;
    /// Dispatcher tick cadence.
    pub const DISPATCH_TICK_SECS: u64 = 1;
    /// Survivor spawner period lower bound (inclusive), seconds.
    pub const SPAWN_MIN_SECS: f64 = 2.0;
    /// Survivor spawner period upper bound (inclusive), seconds.
    pub const SPAWN_MAX_SECS: f64 = 4.0;
    /// How far in the future an `ASSIGN_MISSION.expiry` is set.
    pub const MISSION_EXPIRY_SECS: u64 = 3600;
    /// Socket read timeout; bounds how promptly a session observes shutdown.
    pub const READ_TIMEOUT_SECS: u64 = 5;
    /// Opaque checksum placeholder for `ASSIGN_MISSION` frames. Never
    /// interpreted, only echoed — see DESIGN.md.
    pub const MISSION_CHECKSUM_PLACEHOLDER: &str = "a1b2c3";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_secs_is_plausible() {
        let t = now_secs();
        assert!(t > 1_700_000_000);
    }
}
