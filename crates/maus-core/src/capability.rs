//! Accessibility permission tracking

use std::sync::Arc;

use tracing::{info, warn};

use crate::platform::Platform;

/// What a refresh observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityChange {
    Unchanged,
    Granted,
    Revoked,
}

/// Mirrors the OS trust state for the engine
pub struct CapabilityGate {
    platform: Arc<dyn Platform>,
    granted: bool,
}

impl CapabilityGate {
    /// Queries the OS once, without prompting
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        let granted = platform.is_trusted();
        if !granted {
            info!("Accessibility permission not granted yet");
        }
        Self { platform, granted }
    }

    #[inline]
    pub fn is_granted(&self) -> bool {
        self.granted
    }

    /// Re-query the OS without prompting
    pub fn refresh(&mut self) -> CapabilityChange {
        self.apply(self.platform.is_trusted())
    }

    /// Query the OS and let it prompt the user
    pub fn request(&mut self) -> CapabilityChange {
        self.apply(self.platform.request_trust())
    }

    fn apply(&mut self, granted: bool) -> CapabilityChange {
        if granted == self.granted {
            return CapabilityChange::Unchanged;
        }
        self.granted = granted;

        if granted {
            info!("Accessibility permission granted");
            CapabilityChange::Granted
        } else {
            warn!("Accessibility permission revoked");
            CapabilityChange::Revoked
        }
    }
}
