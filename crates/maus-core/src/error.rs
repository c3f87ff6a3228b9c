use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Accessibility permission not granted")]
    PermissionDenied,

    #[error("Failed to install scroll event tap: {0}")]
    HookInstallFailed(String),

    #[error("Conflicting scroll utility is running")]
    ConflictDetected,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Daemon is not running")]
    DaemonNotRunning,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
