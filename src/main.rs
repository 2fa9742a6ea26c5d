mod client;

use std::time::Duration;

use clap::Parser;
use client::ClientConfig;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Reference drone client: connects to a rescue coordination server,
/// performs the handshake, and simulates basic status reporting and
/// mission movement. Intended for manual smoke-testing the wire protocol,
/// not as a production agent.
#[derive(Debug, Clone, Parser)]
#[command(name = "drone-client")]
struct Args {
    /// Server address to connect to.
    #[arg(long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Numeric drone id (sent on the wire as "D<id>").
    #[arg(long, default_value_t = 1)]
    drone_id: u32,

    /// Grid width, used only to pick a plausible starting coordinate.
    #[arg(long, default_value_t = 40)]
    width: i32,

    /// Grid height, used only to pick a plausible starting coordinate.
    #[arg(long, default_value_t = 30)]
    height: i32,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = ClientConfig {
        server_addr: args.server,
        drone_id: args.drone_id,
        width: args.width,
        height: args.height,
    };

    let mut backoff = Duration::from_secs(1);
    loop {
        match client::run_once(&config).await {
            Ok(()) => {
                info!(drone_id = config.drone_id, "disconnected, reconnecting");
                backoff = Duration::from_secs(1);
            }
            Err(e) => {
                warn!(drone_id = config.drone_id, error = %e, ?backoff, "connection attempt failed");
            }
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(Duration::from_secs(30));
    }
}
