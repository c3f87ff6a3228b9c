//! IPC module for daemon-client communication
//!
//! Unix socket IPC between the CLI and the daemon that owns the engine.

mod client;
mod protocol;
mod server;

pub use client::{is_daemon_running, DaemonClient};
pub use protocol::*;
pub use server::DaemonServer;
