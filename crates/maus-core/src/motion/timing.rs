//! L4 Atomic Layer: Frame timing utilities
//!
//! Real elapsed time between frames is noisy: the display link can stall,
//! the machine can sleep, a debugger can pause the process. The integrator
//! only ever sees a delta inside `[0, IDEAL_FRAME_SECS]`.

use std::time::Instant;

/// One frame at 60 Hz, the largest step the integrator will take
pub const IDEAL_FRAME_SECS: f64 = 1.0 / 60.0;

/// Clamp a frame delta into `[0, IDEAL_FRAME_SECS]`
///
/// Negative, NaN and infinite inputs become zero.
#[inline]
pub fn clamp_dt(dt: f64) -> f64 {
    if !dt.is_finite() || dt <= 0.0 {
        0.0
    } else {
        dt.min(IDEAL_FRAME_SECS)
    }
}

/// Seconds from `from` to `to`, zero when `to` is earlier
#[inline]
pub fn elapsed_secs(from: Instant, to: Instant) -> f64 {
    to.checked_duration_since(from)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
