//! Spring-damper motion engine
//!
//! Turns accumulated wheel impulses into a continuous, inertial scroll
//! displacement that is sampled once per display frame.
//!
//! ## L4 Atomic Layer
//! - `timing` - Frame delta computation and clamping
//! - `spring` - Damped harmonic oscillator integration step
//! - `quantize` - Truncation of fractional displacement into whole pixels
//!
//! ## L3 Molecular Layer
//! - `engine` - Motion state owner combining the atoms
//!
//! # Usage
//!
//! ```ignore
//! use maus_core::motion::MotionEngine;
//!
//! let mut engine = MotionEngine::new(&config.engine);
//! engine.add_impulse(10.0);
//!
//! // once per frame
//! let outcome = engine.advance(1.0 / 60.0);
//! if outcome.pixels != 0 {
//!     emitter.emit(outcome.pixels);
//! }
//! ```

// L4 Atomic Layer
pub mod quantize;
pub mod spring;
pub mod timing;

// L3 Molecular Layer
pub mod engine;

pub use engine::{FrameOutcome, MotionEngine, MotionState};
pub use spring::SpringParams;
pub use timing::{clamp_dt, elapsed_secs, IDEAL_FRAME_SECS};
