//! IPC Client for connecting to daemon
//!
//! Provides a type-safe interface for communicating with the daemon.

use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

use super::protocol::*;
use crate::engine::EngineStatus;
use crate::{Error, Result};

/// Client for communicating with the daemon
#[derive(Clone)]
pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    /// Create a new daemon client
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    /// Check if daemon is running by sending a ping
    pub async fn ping(&self) -> Result<bool> {
        match self.call(methods::PING, serde_json::Value::Null).await {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    /// Get daemon and engine status
    pub async fn status(&self) -> Result<StatusResponse> {
        let result = self.call(methods::STATUS, serde_json::Value::Null).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Turn smoothing on
    pub async fn enable(&self) -> Result<EngineStatus> {
        let result = self.call(methods::ENGINE_ENABLE, serde_json::Value::Null).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Turn smoothing off
    pub async fn disable(&self) -> Result<EngineStatus> {
        let result = self.call(methods::ENGINE_DISABLE, serde_json::Value::Null).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Have the daemon ask the OS to prompt for Accessibility trust
    pub async fn request_permission(&self) -> Result<EngineStatus> {
        let result = self
            .call(methods::CAPABILITY_REQUEST, serde_json::Value::Null)
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Send a request and receive a response
    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            debug!(
                "Failed to connect to daemon at {}: {}",
                self.socket_path.display(),
                e
            );
            Error::DaemonNotRunning
        })?;

        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        // Build request
        let request = Request::new(method).with_params(params);
        let request_json = serde_json::to_string(&request)?;

        // Send request
        writer.write_all(request_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        // Read response
        let mut response_line = String::new();
        reader.read_line(&mut response_line).await?;

        let response: Response = serde_json::from_str(&response_line)?;

        if let Some(error) = response.error {
            return Err(error.into_error());
        }

        response.result.ok_or_else(|| Error::Other("Empty response".to_string()))
    }
}

/// Check if daemon is reachable
pub async fn is_daemon_running(socket_path: &std::path::Path) -> bool {
    let client = DaemonClient::new(socket_path.to_path_buf());
    client.ping().await.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::watch;

    use crate::config::AppConfig;
    use crate::engine::EngineService;
    use crate::ipc::DaemonServer;
    use crate::platform::mock::MockPlatform;

    struct Daemon {
        client: DaemonClient,
        shutdown: watch::Sender<bool>,
        _dir: tempfile::TempDir,
    }

    async fn start_daemon(platform: &MockPlatform) -> Daemon {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.general.data_dir = dir.path().to_path_buf();
        let config = Arc::new(config);

        let (shutdown, shutdown_rx) = watch::channel(false);
        let (service, handle) = EngineService::new(config.clone(), Arc::new(platform.clone()));
        tokio::spawn(service.run(shutdown_rx.clone()));

        let server = DaemonServer::new(handle, &config);
        tokio::spawn(async move { server.run(shutdown_rx).await });

        let client = DaemonClient::new(config.socket_path());
        for _ in 0..200 {
            if client.ping().await.unwrap_or(false) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        Daemon {
            client,
            shutdown,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_no_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let client = DaemonClient::new(dir.path().join("maus.sock"));
        assert!(!client.ping().await.unwrap());
        assert!(matches!(client.status().await, Err(Error::DaemonNotRunning)));
        assert!(!is_daemon_running(&dir.path().join("maus.sock")).await);
    }

    #[tokio::test]
    async fn test_enable_disable_round_trip() {
        let platform = MockPlatform::trusted();
        let daemon = start_daemon(&platform).await;
        let client = &daemon.client;

        let status = client.status().await.unwrap();
        assert!(status.running);
        assert!(!status.engine.enabled);
        assert!(status.engine.capability_granted);

        let status = client.enable().await.unwrap();
        assert!(status.enabled);
        assert!(status.hook_installed);
        assert_eq!(platform.installs(), 1);

        let status = client.disable().await.unwrap();
        assert!(!status.enabled);
        assert_eq!(platform.uninstalls(), 1);

        daemon.shutdown.send(true).unwrap();
    }

    #[tokio::test]
    async fn test_enable_without_permission_is_typed() {
        let platform = MockPlatform::new();
        let daemon = start_daemon(&platform).await;

        let result = daemon.client.enable().await;
        assert!(matches!(result, Err(Error::PermissionDenied)));

        let status = daemon.client.request_permission().await.unwrap();
        assert!(!status.capability_granted);
        assert_eq!(platform.prompts(), 1);

        daemon.shutdown.send(true).unwrap();
    }

    #[tokio::test]
    async fn test_hook_failure_is_typed() {
        let platform = MockPlatform::trusted();
        platform.set_fail_install(true);
        let daemon = start_daemon(&platform).await;

        let result = daemon.client.enable().await;
        assert!(matches!(result, Err(Error::HookInstallFailed(_))));

        daemon.shutdown.send(true).unwrap();
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let platform = MockPlatform::trusted();
        let daemon = start_daemon(&platform).await;

        let result = daemon
            .client
            .call("engine.explode", serde_json::Value::Null)
            .await;
        match result {
            Err(Error::Other(message)) => assert!(message.contains("-32601")),
            other => panic!("unexpected result: {:?}", other),
        }

        daemon.shutdown.send(true).unwrap();
    }
}
