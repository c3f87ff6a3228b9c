//! Engine service: the single serial context that owns all motion state
//!
//! Scroll events from the OS tap, frame ticks from the frame clock and
//! control requests from the daemon all arrive as [`EngineCommand`]s on one
//! channel and are handled one at a time.

mod command;
mod service;

pub use command::{EngineCommand, EngineHandle, EngineStatus};
pub use service::EngineService;
