use anyhow::Result;

use maus_core::{AppConfig, EngineStatus};

use super::{client, require};

pub async fn enable(config: &AppConfig) -> Result<()> {
    let status = require(client(config).enable().await)?;
    println!("Smooth scrolling enabled.");
    if status.conflict_detected {
        println!("Note: another scroll utility is running and may interfere.");
    }
    Ok(())
}

pub async fn disable(config: &AppConfig) -> Result<()> {
    require(client(config).disable().await)?;
    println!("Smooth scrolling disabled.");
    Ok(())
}

pub async fn status(config: &AppConfig, json: bool) -> Result<()> {
    let response = require(client(config).status().await)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!(
        "Daemon: running (PID: {}, up {}s)",
        response.pid, response.uptime_secs
    );
    print_engine(&response.engine);
    Ok(())
}

fn print_engine(status: &EngineStatus) {
    let state = if status.enabled { "enabled" } else { "disabled" };
    println!("Smooth scrolling: {}", state);

    if status.capability_granted {
        println!("Accessibility: granted");
    } else {
        println!("Accessibility: NOT GRANTED (run `maus permission request`)");
    }
    if status.permission_alert {
        println!("  Permission was revoked while smoothing was on; it has been turned off.");
    }
    if status.conflict_detected {
        println!("Conflict: another scroll utility was running at start-up");
    }
    if let Some(ref error) = status.last_error {
        println!("Last error: {}", error);
    }

    let clock = if status.display_synced {
        "display link"
    } else {
        "timer"
    };
    println!(
        "Motion: {} ({})",
        if status.clock_running { "in flight" } else { "idle" },
        clock
    );
    println!(
        "Events: {} smoothed, {} passed through",
        status.events_intercepted, status.events_passed
    );
    println!(
        "Output: {} frames, {} px",
        status.frames_advanced, status.pixels_emitted
    );
    if status.emit_failures > 0 {
        println!("  {} synthetic events failed to post", status.emit_failures);
    }
    println!(
        "Started: {}",
        status.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
}
