//! Per-drone session handling.
//!
//! A session is the lifetime of one TCP connection: handshake, inbound
//! message dispatch into the world model, a dedicated writer task, and
//! disconnect cleanup. The session holds no state of its own beyond the
//! drone id once known; the record it mutates lives in [`crate::world`].

mod connection;

pub use connection::run_session;
