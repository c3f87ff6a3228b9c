//! Synthetic scroll event posting

use std::sync::Arc;

use tracing::{trace, warn};

use crate::platform::Platform;

/// Posts whole-pixel scroll events through the platform
pub struct EventEmitter {
    platform: Arc<dyn Platform>,
    direction: i64,
    pixels_emitted: u64,
    failures: u64,
}

impl EventEmitter {
    pub fn new(platform: Arc<dyn Platform>, direction: i64) -> Self {
        Self {
            platform,
            direction,
            pixels_emitted: 0,
            failures: 0,
        }
    }

    /// Post one event carrying `pixels * direction`
    ///
    /// Zero is never posted. Returns whether an event went out.
    pub fn emit(&mut self, pixels: i64) -> bool {
        if pixels == 0 {
            return false;
        }

        let value = pixels
            .saturating_mul(self.direction)
            .clamp(i32::MIN as i64, i32::MAX as i64) as i32;

        match self.platform.post_scroll(value) {
            Ok(()) => {
                trace!(pixels = value, "posted scroll event");
                self.pixels_emitted += value.unsigned_abs() as u64;
                true
            }
            Err(e) => {
                self.failures += 1;
                if self.failures == 1 || self.failures % 100 == 0 {
                    warn!("Failed to post scroll event ({} so far): {}", self.failures, e);
                }
                false
            }
        }
    }

    /// Total absolute pixels posted
    pub fn pixels_emitted(&self) -> u64 {
        self.pixels_emitted
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockPlatform;
    use crate::platform::UnsupportedPlatform;

    #[test]
    fn test_zero_is_never_posted() {
        let platform = MockPlatform::new();
        let mut emitter = EventEmitter::new(Arc::new(platform.clone()), 1);
        assert!(!emitter.emit(0));
        assert!(platform.posted().is_empty());
    }

    #[test]
    fn test_direction_applied() {
        let platform = MockPlatform::new();
        let mut natural = EventEmitter::new(Arc::new(platform.clone()), 1);
        let mut reversed = EventEmitter::new(Arc::new(platform.clone()), -1);

        assert!(natural.emit(3));
        assert!(reversed.emit(3));
        assert!(reversed.emit(-2));
        assert_eq!(platform.posted(), vec![3, -3, 2]);
        assert_eq!(reversed.pixels_emitted(), 5);
    }

    #[test]
    fn test_saturates_to_i32() {
        let platform = MockPlatform::new();
        let mut emitter = EventEmitter::new(Arc::new(platform.clone()), -1);
        emitter.emit(i64::MIN);
        emitter.emit(1 << 40);
        assert_eq!(platform.posted(), vec![i32::MAX, i32::MIN]);
    }

    #[test]
    fn test_post_failure_counted() {
        let mut emitter = EventEmitter::new(Arc::new(UnsupportedPlatform), 1);
        assert!(!emitter.emit(4));
        assert_eq!(emitter.failures(), 1);
        assert_eq!(emitter.pixels_emitted(), 0);
    }
}
