//! OS boundary
//!
//! Everything the engine needs from the operating system goes through
//! [`Platform`]: the accessibility trust query, the scroll event tap,
//! synthetic event posting, the display-synchronized frame source and
//! process enumeration.

use std::sync::Arc;

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System, UpdateKind};

use crate::frame_clock::FrameSource;
use crate::interceptor::{ScrollFilter, TapGuard};
use crate::Result;

#[cfg(target_os = "macos")]
mod macos;
mod unsupported;

#[cfg(test)]
pub(crate) mod mock;

#[cfg(target_os = "macos")]
pub use macos::MacPlatform;
pub use unsupported::UnsupportedPlatform;

/// Invoked from the frame source's own thread once per display refresh
pub type FrameCallback = Arc<dyn Fn() + Send + Sync>;

pub trait Platform: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Query input-monitoring trust without prompting
    fn is_trusted(&self) -> bool;

    /// Query trust and let the OS prompt the user if needed
    fn request_trust(&self) -> bool;

    /// Install a systemwide tap for discrete scroll-wheel events
    fn install_scroll_tap(&self, filter: Arc<ScrollFilter>) -> Result<Box<dyn TapGuard>>;

    /// Post one pixel-unit scroll event on the primary axis
    fn post_scroll(&self, pixels: i32) -> Result<()>;

    /// Display-synchronized frame source, `None` if unavailable
    fn display_link(&self, on_frame: FrameCallback) -> Option<Box<dyn FrameSource>>;

    /// Identifiers (executable paths) of running processes
    fn running_processes(&self) -> Result<Vec<String>> {
        list_processes()
    }
}

/// The platform this binary was built for
pub fn native() -> Arc<dyn Platform> {
    #[cfg(target_os = "macos")]
    {
        Arc::new(MacPlatform::new())
    }

    #[cfg(not(target_os = "macos"))]
    {
        Arc::new(UnsupportedPlatform)
    }
}

/// Enumerate processes, preferring the executable path over the short name
fn list_processes() -> Result<Vec<String>> {
    if !sysinfo::IS_SUPPORTED_SYSTEM {
        return Err(crate::Error::Other(
            "process enumeration is not supported on this system".to_string(),
        ));
    }

    let mut system = System::new_with_specifics(RefreshKind::nothing());
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing().with_exe(UpdateKind::OnlyIfNotSet),
    );

    Ok(system
        .processes()
        .values()
        .map(|process| match process.exe() {
            Some(exe) => exe.to_string_lossy().into_owned(),
            None => process.name().to_string_lossy().into_owned(),
        })
        .filter(|identifier| !identifier.is_empty())
        .collect())
}
