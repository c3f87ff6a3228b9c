use anyhow::{Context, Result};

use maus_core::AppConfig;

use super::{client, require};

const ACCESSIBILITY_PANE: &str =
    "x-apple.systempreferences:com.apple.preference.security?Privacy_Accessibility";

/// The prompt must come from the daemon, since that is the process the
/// event tap runs in and the one macOS grants access to
pub async fn request(config: &AppConfig) -> Result<()> {
    let status = require(client(config).request_permission().await)?;

    if status.capability_granted {
        println!("Accessibility permission is granted.");
    } else {
        println!("macOS should now show an Accessibility prompt for the daemon.");
        println!("After allowing it, run `maus enable`.");
        println!("To grant it manually: maus permission open-settings");
    }
    Ok(())
}

pub fn open_settings() -> Result<()> {
    open::that(ACCESSIBILITY_PANE).context("Failed to open System Settings")?;
    println!("Opened Privacy & Security > Accessibility.");
    Ok(())
}
