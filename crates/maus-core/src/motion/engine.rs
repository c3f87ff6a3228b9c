//! L3 Molecular Layer: Motion state owner
//!
//! Combines the spring step, frame timing and quantization. Exactly one
//! caller owns a `MotionEngine`; it is not synchronized internally.

use std::time::Instant;

use tracing::trace;

use super::quantize;
use super::spring::SpringParams;
use super::timing::{clamp_dt, elapsed_secs};
use crate::config::EngineConfig;

/// Below this, both velocity and displacement count as rest
pub const SETTLE_THRESHOLD: f64 = 0.1;

/// Mutable simulation state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotionState {
    /// Displacement integrated but not yet emitted
    pub position: f64,
    /// Displacement requested by wheel input but not yet emitted
    pub target: f64,
    pub velocity: f64,
    /// Timestamp of the previous frame (or of the clock start)
    pub last_tick: Option<Instant>,
}

impl MotionState {
    /// All motion quantities are exactly zero
    pub fn is_rest(&self) -> bool {
        self.position == 0.0 && self.target == 0.0 && self.velocity == 0.0
    }
}

/// Result of one frame advance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOutcome {
    /// Whole pixels to post this frame (before the direction multiplier)
    pub pixels: i64,
    /// Motion came to rest and the state was snapped to zero
    pub settled: bool,
}

#[derive(Debug, Clone)]
pub struct MotionEngine {
    params: SpringParams,
    impulse_scale: f64,
    state: MotionState,
}

impl MotionEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            params: SpringParams::from(config),
            impulse_scale: config.impulse_scale(),
            state: MotionState::default(),
        }
    }

    pub fn state(&self) -> &MotionState {
        &self.state
    }

    pub fn params(&self) -> &SpringParams {
        &self.params
    }

    /// Motion is still in flight and frames are needed
    #[inline]
    pub fn is_pending(&self) -> bool {
        (self.state.target - self.state.position).abs() >= SETTLE_THRESHOLD
            || self.state.velocity.abs() >= SETTLE_THRESHOLD
    }

    /// Feed one raw wheel delta into the target
    ///
    /// Returns false when the scaled delta would make the target non-finite;
    /// the impulse is dropped in that case.
    pub fn add_impulse(&mut self, raw_delta: f64) -> bool {
        let target = self.state.target + raw_delta * self.impulse_scale;
        if !target.is_finite() {
            return false;
        }
        self.state.target = target;
        true
    }

    /// Reset the frame timer, called when the frame clock starts
    pub fn mark_started(&mut self, now: Instant) {
        self.state.last_tick = Some(now);
    }

    /// Advance by the real time elapsed since the previous frame
    pub fn advance_to(&mut self, now: Instant) -> FrameOutcome {
        let dt = self
            .state
            .last_tick
            .map(|last| elapsed_secs(last, now))
            .unwrap_or(0.0);
        self.state.last_tick = Some(now);
        self.advance(dt)
    }

    /// Advance the simulation by `dt` seconds (clamped) and quantize
    pub fn advance(&mut self, dt: f64) -> FrameOutcome {
        let dt = clamp_dt(dt);
        let state = &mut self.state;

        let displacement =
            self.params
                .step(&mut state.position, &mut state.velocity, state.target, dt);

        let (pixels, remainder) = quantize::split(state.position);
        if pixels != 0 {
            state.position = remainder;
            state.target -= pixels as f64;
        }

        let settled =
            state.velocity.abs() < SETTLE_THRESHOLD && displacement.abs() < SETTLE_THRESHOLD;
        if settled {
            self.reset();
        }

        trace!(dt, pixels, settled, "motion frame");
        FrameOutcome { pixels, settled }
    }

    /// Snap everything to zero
    pub fn reset(&mut self) {
        self.state = MotionState::default();
    }
}
