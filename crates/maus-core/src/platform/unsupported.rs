use std::sync::Arc;

use super::{FrameCallback, Platform};
use crate::frame_clock::FrameSource;
use crate::interceptor::{ScrollFilter, TapGuard};
use crate::{Error, Result};

/// Platforms without a scroll event tap
///
/// Capability is never granted, so the engine stays disabled; the rest of
/// the daemon (IPC, status, config) works normally.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedPlatform;

impl Platform for UnsupportedPlatform {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn is_trusted(&self) -> bool {
        false
    }

    fn request_trust(&self) -> bool {
        false
    }

    fn install_scroll_tap(&self, _filter: Arc<ScrollFilter>) -> Result<Box<dyn TapGuard>> {
        Err(Error::HookInstallFailed(
            "scroll interception is only available on macOS".to_string(),
        ))
    }

    fn post_scroll(&self, _pixels: i32) -> Result<()> {
        Err(Error::Other(
            "synthetic scroll events are only available on macOS".to_string(),
        ))
    }

    fn display_link(&self, _on_frame: FrameCallback) -> Option<Box<dyn FrameSource>> {
        None
    }
}
