//! faceverify-app — configuration and the capture/verification engine shared
//! by the desktop UI and the CLI.

pub mod config;
pub mod engine;

pub use config::{Config, ConfigError};
pub use engine::{spawn_engine, spawn_with, EngineError, EngineHandle, FrameSource, Pending, VerifySettings};
