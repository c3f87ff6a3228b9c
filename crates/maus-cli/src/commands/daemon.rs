use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{error, info};

use maus_core::ipc::is_daemon_running as is_socket_live;
use maus_core::{platform, AppConfig, DaemonServer, EngineService};

/// Check if daemon is running
fn is_daemon_running(pid_path: &Path) -> Option<u32> {
    if !pid_path.exists() {
        return None;
    }

    let mut file = fs::File::open(pid_path).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    let pid: u32 = contents.trim().parse().ok()?;

    // Check if process is still running
    let output = std::process::Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .output()
        .ok()?;
    if output.status.success() {
        return Some(pid);
    }

    // Process not running, clean up stale PID file
    let _ = fs::remove_file(pid_path);
    None
}

/// Write PID file
fn write_pid_file(pid_path: &Path) -> Result<()> {
    if let Some(parent) = pid_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(pid_path)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(())
}

/// Remove PID file
fn remove_pid_file(pid_path: &Path) {
    let _ = fs::remove_file(pid_path);
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Start the daemon
pub async fn start(config: Arc<AppConfig>) -> Result<()> {
    let pid_path = config.pid_path();

    // Check if already running
    if let Some(pid) = is_daemon_running(&pid_path) {
        println!("Daemon is already running (PID: {})", pid);
        return Ok(());
    }

    println!("Starting maus daemon...");

    // Write PID file
    write_pid_file(&pid_path)?;

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Setup signal handlers for graceful shutdown
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal");
        let _ = shutdown_tx_clone.send(true);
    });

    let (engine, handle) = EngineService::new(config.clone(), platform::native());
    let engine_task = tokio::spawn(engine.run(shutdown_rx.clone()));

    println!(
        "Daemon started (PID: {}). Press Ctrl+C or run 'maus daemon stop' to stop.",
        std::process::id()
    );
    println!("  Socket: {}", config.socket_path().display());
    println!(
        "  Smoothing on start: {}",
        if config.general.enable_on_start { "yes" } else { "no" }
    );

    // Serve clients (blocks until shutdown)
    let server = DaemonServer::new(handle, &config);
    let served = server.run(shutdown_rx).await;

    // The engine must uninstall its tap before the process exits
    let _ = shutdown_tx.send(true);
    if let Err(e) = engine_task.await {
        error!("Engine task failed: {}", e);
    }

    // Cleanup
    remove_pid_file(&pid_path);
    println!("Daemon stopped.");

    served?;
    Ok(())
}

/// Stop the daemon
pub async fn stop(config: &AppConfig) -> Result<()> {
    let pid_path = config.pid_path();
    match is_daemon_running(&pid_path) {
        Some(pid) => {
            println!("Stopping daemon (PID: {})...", pid);

            let output = std::process::Command::new("kill")
                .arg("-TERM")
                .arg(pid.to_string())
                .output()?;

            if output.status.success() {
                // Wait a moment for graceful shutdown
                tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;

                // Check if still running
                if is_daemon_running(&pid_path).is_none() {
                    println!("Daemon stopped successfully.");
                } else {
                    // Force kill
                    let _ = std::process::Command::new("kill")
                        .arg("-9")
                        .arg(pid.to_string())
                        .output();
                    remove_pid_file(&pid_path);
                    let _ = fs::remove_file(config.socket_path());
                    println!("Daemon forcefully terminated.");
                }
            } else {
                println!(
                    "Failed to stop daemon. You may need to kill it manually: kill {}",
                    pid
                );
            }
        }
        None => {
            println!("Daemon is not running.");
        }
    }

    Ok(())
}

/// Show daemon status
pub async fn status(config: &AppConfig) -> Result<()> {
    match is_daemon_running(&config.pid_path()) {
        Some(pid) => {
            println!("Daemon is running (PID: {})", pid);
            println!("PID file: {}", config.pid_path().display());
            if !is_socket_live(&config.socket_path()).await {
                println!("Warning: daemon is not answering on {}", config.socket_path().display());
            }
        }
        None => {
            println!("Daemon is not running.");
        }
    }

    Ok(())
}
