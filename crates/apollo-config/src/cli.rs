//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Apollo command-line arguments.
///
/// CLI values override settings loaded from `apollo.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "apollo", about = "Quad-sphere visibility streaming demo")]
pub struct CliArgs {
    /// Window width.
    #[arg(long)]
    pub width: Option<u32>,

    /// Window height.
    #[arg(long)]
    pub height: Option<u32>,

    /// Start in fullscreen.
    #[arg(long)]
    pub fullscreen: Option<bool>,

    /// Number of quad subdivision rounds.
    #[arg(long)]
    pub subdivisions: Option<u32>,

    /// Number of frames the CPU may run ahead of the GPU.
    #[arg(long)]
    pub frames_in_flight: Option<u32>,

    /// Draw every face at full resolution.
    #[arg(long)]
    pub no_culling: bool,

    /// Number of frames to run before exiting.
    #[arg(long, default_value_t = 600)]
    pub frames: u32,

    /// Render through a wgpu device instead of the headless recorder.
    #[arg(long)]
    pub gpu: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(w) = args.width {
            self.window.width = w;
        }
        if let Some(h) = args.height {
            self.window.height = h;
        }
        if let Some(fs) = args.fullscreen {
            self.window.fullscreen = fs;
        }
        if let Some(depth) = args.subdivisions {
            self.sphere.max_subdivision_depth = depth;
            self.sphere.attribute_level = self.sphere.attribute_level.min(depth);
        }
        if let Some(n) = args.frames_in_flight {
            self.frames.frames_in_flight = n;
        }
        if args.no_culling {
            self.culling.enabled = false;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
