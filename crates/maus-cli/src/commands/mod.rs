pub mod config;
pub mod daemon;
pub mod engine;
pub mod permission;

use anyhow::Result;

use maus_core::{AppConfig, DaemonClient, Error};

fn client(config: &AppConfig) -> DaemonClient {
    DaemonClient::new(config.socket_path())
}

/// Turn the errors a user can act on into instructions
fn explain(error: Error) -> anyhow::Error {
    match error {
        Error::DaemonNotRunning => {
            anyhow::anyhow!("Daemon is not running. Start it with `maus daemon start`.")
        }
        Error::PermissionDenied => anyhow::anyhow!(
            "Accessibility permission not granted. Run `maus permission request`, \
             allow the daemon in System Settings, then try again."
        ),
        other => other.into(),
    }
}

fn require<T>(result: maus_core::Result<T>) -> Result<T> {
    result.map_err(explain)
}
