use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};

use crate::{Error, Result};

/// One unit of work for the engine service
#[derive(Debug)]
pub enum EngineCommand {
    /// Accepted wheel delta, stamped when the OS delivered it
    Scroll { delta: f64, at: Instant },
    /// Frame clock fired
    Tick { at: Instant },
    SetEnabled {
        enabled: bool,
        reply: oneshot::Sender<Result<EngineStatus>>,
    },
    /// Ask the OS to prompt for Accessibility trust
    RequestPermission { reply: oneshot::Sender<EngineStatus> },
    /// Re-query the capability after a prompt
    RecheckCapability,
    Status { reply: oneshot::Sender<EngineStatus> },
    Shutdown,
}

/// Snapshot of the engine published after every state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub enabled: bool,
    pub hook_installed: bool,
    pub clock_running: bool,
    pub display_synced: bool,
    pub capability_granted: bool,
    /// Permission was revoked while smoothing was on
    pub permission_alert: bool,
    pub conflict_detected: bool,
    pub last_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub events_intercepted: u64,
    pub events_passed: u64,
    pub frames_advanced: u64,
    pub pixels_emitted: u64,
    pub emit_failures: u64,
}

impl Default for EngineStatus {
    fn default() -> Self {
        Self {
            enabled: false,
            hook_installed: false,
            clock_running: false,
            display_synced: false,
            capability_granted: false,
            permission_alert: false,
            conflict_detected: false,
            last_error: None,
            started_at: Utc::now(),
            events_intercepted: 0,
            events_passed: 0,
            frames_advanced: 0,
            pixels_emitted: 0,
            emit_failures: 0,
        }
    }
}

/// Cloneable front door to a running [`EngineService`](super::EngineService)
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<EngineCommand>,
    status: watch::Receiver<EngineStatus>,
}

impl EngineHandle {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<EngineCommand>,
        status: watch::Receiver<EngineStatus>,
    ) -> Self {
        Self { commands, status }
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<EngineStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::SetEnabled { enabled, reply })?;
        rx.await.map_err(|_| engine_stopped())?
    }

    /// Prompt for Accessibility trust in this process
    pub async fn request_permission(&self) -> Result<EngineStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::RequestPermission { reply })?;
        rx.await.map_err(|_| engine_stopped())
    }

    /// Fresh snapshot, after re-querying the capability
    pub async fn refresh_status(&self) -> Result<EngineStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Status { reply })?;
        rx.await.map_err(|_| engine_stopped())
    }

    /// Last published snapshot
    pub fn status(&self) -> EngineStatus {
        self.status.borrow().clone()
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(EngineCommand::Shutdown);
    }

    fn send(&self, command: EngineCommand) -> Result<()> {
        self.commands.send(command).map_err(|_| engine_stopped())
    }
}

fn engine_stopped() -> Error {
    Error::Other("Engine service has stopped".to_string())
}
