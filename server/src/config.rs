//! Minimal startup configuration.
//!
//! Full CLI/config-file loading is a separate product; this is the small
//! surface needed to start the process with spec-matching defaults.

use clap::Parser;
use rescue_shared::config::{DEFAULT_ADMISSION_CAP, DEFAULT_HEIGHT, DEFAULT_PORT, DEFAULT_WIDTH};

#[derive(Debug, Clone, Parser)]
#[command(name = "rescue-server", about = "Coordination server for the rescue drone fleet")]
pub struct ServerConfig {
    /// Grid width in cells.
    #[arg(long, env = "RESCUE_WIDTH", default_value_t = DEFAULT_WIDTH)]
    pub width: i32,

    /// Grid height in cells.
    #[arg(long, env = "RESCUE_HEIGHT", default_value_t = DEFAULT_HEIGHT)]
    pub height: i32,

    /// TCP port to listen on.
    #[arg(long, env = "RESCUE_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Maximum number of simultaneously connected drones.
    #[arg(long, env = "RESCUE_ADMISSION_CAP", default_value_t = DEFAULT_ADMISSION_CAP)]
    pub admission_cap: usize,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}
