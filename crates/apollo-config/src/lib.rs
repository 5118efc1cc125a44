//! Configuration system for Apollo.
//!
//! Provides runtime-configurable settings that persist to disk as RON files.
//! Supports CLI overrides via clap, validation of the mesh and buffering
//! parameters, and forward/backward compatible serialization.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    CONFIG_FILE_NAME, CameraConfig, Config, CullingConfig, DebugConfig, FrameConfig,
    MAX_FRAMES_IN_FLIGHT, MAX_SUBDIVISION_DEPTH, SphereConfig, WindowConfig,
};
pub use error::ConfigError;
