//! Demo binary that orbits a camera around the quad sphere and streams the
//! visible indices of every face each frame.
//!
//! Configuration is loaded from `apollo.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p apollo-demo` for the headless recorder.
//! Run with `cargo run -p apollo-demo -- --gpu --frames 300` to drive a wgpu device.

mod camera;
mod gpu;
mod headless;
mod report;

use std::error::Error;

use apollo_config::{CliArgs, Config};
use clap::Parser;

/// Simulated time step between frames, in seconds.
pub const FRAME_TIME: f32 = 1.0 / 60.0;

fn main() -> Result<(), Box<dyn Error>> {
    let args = CliArgs::parse();

    // Resolve config directory
    let config_dir = match args.config.clone() {
        Some(dir) => dir,
        None => Config::default_dir()?,
    };

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);
    config.validate()?;

    let log_dir = config_dir.join("logs");
    if let Err(e) = apollo_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config))
    {
        eprintln!("Failed to initialize logging: {e}");
    }

    tracing::info!(
        radius = config.sphere.radius(),
        depth = config.sphere.max_subdivision_depth,
        frames_in_flight = config.frames.frames_in_flight,
        culling = config.culling.enabled,
        gpu = args.gpu,
        "starting apollo demo"
    );

    if args.gpu {
        gpu::run(&config, args.frames)
    } else {
        headless::run(&config, args.frames)
    }
}
