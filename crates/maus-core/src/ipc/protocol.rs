//! IPC Protocol definitions for daemon-client communication
//!
//! Uses JSON-RPC style request/response format over Unix socket.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::EngineStatus;
use crate::Error;

/// JSON-RPC style request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl Request {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method: method.into(),
            params: serde_json::Value::Null,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}

/// JSON-RPC style response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn success(id: Uuid, result: serde_json::Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Uuid, code: i32, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    /// Error response carrying the code for a library error
    pub fn from_error(id: Uuid, error: &Error) -> Self {
        let message = match error {
            Error::HookInstallFailed(reason) => reason.clone(),
            other => other.to_string(),
        };
        Self::error(id, error_code(error), message)
    }

    pub fn ok(id: Uuid) -> Self {
        Self::success(id, serde_json::json!({"ok": true}))
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// RPC error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcError {
    /// Turn a remote error back into the library error it came from
    pub fn into_error(self) -> Error {
        match self.code {
            ERR_PERMISSION_DENIED => Error::PermissionDenied,
            ERR_HOOK_INSTALL_FAILED => Error::HookInstallFailed(self.message),
            _ => Error::Other(format!("RPC error {}: {}", self.code, self.message)),
        }
    }
}

// Error codes
pub const ERR_PARSE: i32 = -32700;
pub const ERR_METHOD_NOT_FOUND: i32 = -32601;
pub const ERR_INTERNAL: i32 = -32603;
pub const ERR_PERMISSION_DENIED: i32 = -32001;
pub const ERR_HOOK_INSTALL_FAILED: i32 = -32002;

pub fn error_code(error: &Error) -> i32 {
    match error {
        Error::PermissionDenied => ERR_PERMISSION_DENIED,
        Error::HookInstallFailed(_) => ERR_HOOK_INSTALL_FAILED,
        _ => ERR_INTERNAL,
    }
}

// Method names
pub mod methods {
    pub const PING: &str = "ping";
    pub const STATUS: &str = "status";

    // Engine methods
    pub const ENGINE_ENABLE: &str = "engine.enable";
    pub const ENGINE_DISABLE: &str = "engine.disable";

    // Capability methods
    pub const CAPABILITY_REQUEST: &str = "capability.request";
}

// Response structures

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub running: bool,
    pub pid: u32,
    pub uptime_secs: u64,
    pub engine: EngineStatus,
}
