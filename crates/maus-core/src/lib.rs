pub mod capability;
pub mod config;
pub mod conflict;
pub mod emitter;
pub mod engine;
pub mod error;
pub mod frame_clock;
pub mod interceptor;
pub mod ipc;
pub mod motion;
pub mod platform;

pub use config::{AppConfig, EngineConfig, Modifier, ScrollDirection};
pub use engine::{EngineHandle, EngineService, EngineStatus};
pub use error::{Error, Result};
pub use ipc::{DaemonClient, DaemonServer};
