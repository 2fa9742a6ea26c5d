//! Wire message types for the rescue coordination protocol.
//!
//! Every frame is a UTF-8 JSON object carrying a `type` discriminator; see
//! SPEC_FULL.md §4.1 for the required-field table this enum mirrors
//! exactly. The enum is internally tagged on `type` so that decoding an
//! unknown `type` value fails before any field is even looked at.

use serde::{Deserialize, Serialize};

use crate::model::Coord;

/// The `status` field reported in `STATUS_UPDATE`. Distinct from
/// `model::DroneStatus`: this is the wire vocabulary (`"idle"`/`"busy"`/
/// `"charging"`), mapped to the domain enum by the connection handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireDroneStatus {
    Idle,
    Busy,
    Charging,
}

/// The negotiated session configuration sent in `HANDSHAKE_ACK`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub status_update_interval: u64,
    pub heartbeat_interval: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "HANDSHAKE")]
    Handshake {
        drone_id: String,
        capabilities: serde_json::Value,
    },

    #[serde(rename = "HANDSHAKE_ACK")]
    HandshakeAck {
        session_id: String,
        config: SessionConfig,
    },

    #[serde(rename = "STATUS_UPDATE")]
    StatusUpdate {
        drone_id: String,
        timestamp: u64,
        location: Coord,
        status: WireDroneStatus,
        battery: f64,
        speed: f64,
    },

    #[serde(rename = "ASSIGN_MISSION")]
    AssignMission {
        mission_id: String,
        priority: String,
        target: Coord,
        expiry: u64,
        checksum: String,
    },

    #[serde(rename = "MISSION_COMPLETE")]
    MissionComplete {
        drone_id: String,
        mission_id: String,
        timestamp: u64,
        success: bool,
        details: String,
    },

    #[serde(rename = "HEARTBEAT")]
    Heartbeat { timestamp: u64 },

    #[serde(rename = "HEARTBEAT_RESPONSE")]
    HeartbeatResponse { drone_id: String, timestamp: u64 },

    #[serde(rename = "ERROR")]
    Error { code: i32, message: String },
}

impl Message {
    /// The wire `type` string for this message, useful for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::Handshake { .. } => "HANDSHAKE",
            Message::HandshakeAck { .. } => "HANDSHAKE_ACK",
            Message::StatusUpdate { .. } => "STATUS_UPDATE",
            Message::AssignMission { .. } => "ASSIGN_MISSION",
            Message::MissionComplete { .. } => "MISSION_COMPLETE",
            Message::Heartbeat { .. } => "HEARTBEAT",
            Message::HeartbeatResponse { .. } => "HEARTBEAT_RESPONSE",
            Message::Error { .. } => "ERROR",
        }
    }

    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Message::Error {
            code,
            message: message.into(),
        }
    }
}
