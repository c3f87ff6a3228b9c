//! IPC Server for daemon
//!
//! Listens on Unix socket and forwards client requests to the engine.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::protocol::*;
use crate::config::AppConfig;
use crate::engine::{EngineHandle, EngineStatus};
use crate::Result;

/// IPC Server that handles client connections
pub struct DaemonServer {
    engine: EngineHandle,
    socket_path: PathBuf,
    start_time: Instant,
}

impl DaemonServer {
    pub fn new(engine: EngineHandle, config: &AppConfig) -> Self {
        Self {
            engine,
            socket_path: config.socket_path(),
            start_time: Instant::now(),
        }
    }

    /// Run the IPC server
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        // Remove old socket file if exists
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        // Ensure parent directory exists
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("IPC server listening on: {}", self.socket_path.display());

        let context = Arc::new(Context {
            engine: self.engine.clone(),
            start_time: self.start_time,
        });

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _)) => {
                            let context = context.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, context).await {
                                    warn!("Error handling connection: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        info!("IPC server shutting down");
                        break;
                    }
                }
            }
        }

        // Cleanup socket file
        let _ = std::fs::remove_file(&self.socket_path);
        Ok(())
    }
}

struct Context {
    engine: EngineHandle,
    start_time: Instant,
}

async fn handle_connection(stream: UnixStream, context: Arc<Context>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break; // Connection closed
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                debug!("Received request: {} (id: {})", request.method, request.id);
                handle_request(request, &context).await
            }
            Err(e) => {
                warn!("Failed to parse request: {}", e);
                Response::error(Uuid::nil(), ERR_PARSE, format!("Parse error: {}", e))
            }
        };

        let response_json = serde_json::to_string(&response)?;
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(())
}

async fn handle_request(request: Request, context: &Context) -> Response {
    let id = request.id;
    let engine = &context.engine;

    match request.method.as_str() {
        methods::PING => Response::success(id, serde_json::json!({"ok": true})),

        methods::STATUS => match engine.refresh_status().await {
            Ok(status) => {
                let response = StatusResponse {
                    running: true,
                    pid: std::process::id(),
                    uptime_secs: context.start_time.elapsed().as_secs(),
                    engine: status,
                };
                to_response(id, &response)
            }
            Err(e) => Response::from_error(id, &e),
        },

        methods::ENGINE_ENABLE => status_response(id, engine.set_enabled(true).await),

        methods::ENGINE_DISABLE => status_response(id, engine.set_enabled(false).await),

        methods::CAPABILITY_REQUEST => status_response(id, engine.request_permission().await),

        _ => Response::error(id, ERR_METHOD_NOT_FOUND, "Method not found"),
    }
}

fn status_response(id: Uuid, result: Result<EngineStatus>) -> Response {
    match result {
        Ok(status) => to_response(id, &status),
        Err(e) => Response::from_error(id, &e),
    }
}

fn to_response<T: serde::Serialize>(id: Uuid, value: &T) -> Response {
    match serde_json::to_value(value) {
        Ok(result) => Response::success(id, result),
        Err(e) => Response::error(id, ERR_INTERNAL, e.to_string()),
    }
}
