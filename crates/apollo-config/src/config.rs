//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name of the persisted configuration inside the config directory.
pub const CONFIG_FILE_NAME: &str = "apollo.ron";

/// Deepest subdivision the `u32` index type can address (`6 * 4^(d+1)` must fit).
pub const MAX_SUBDIVISION_DEPTH: u32 = 13;

/// Upper bound on buffered frames; more than this only adds latency.
pub const MAX_FRAMES_IN_FLIGHT: u32 = 8;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Window settings, consumed by the windowing layer only.
    pub window: WindowConfig,
    /// Quad-sphere mesh and hierarchy settings.
    pub sphere: SphereConfig,
    /// Visibility query settings.
    pub culling: CullingConfig,
    /// Frame pacing and buffering.
    pub frames: FrameConfig,
    /// Demo camera settings.
    pub camera: CameraConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Window configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    /// Window width in logical pixels.
    pub width: u32,
    /// Window height in logical pixels.
    pub height: u32,
    /// Start in fullscreen mode.
    pub fullscreen: bool,
    /// Window title.
    pub title: String,
}

/// Quad-sphere mesh configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SphereConfig {
    /// Edge length of the base cube. The sphere radius is half of this.
    pub edge_length: f32,
    /// Number of quad subdivision rounds applied to the base cube.
    pub max_subdivision_depth: u32,
    /// Deepest quadtree level. Clamped to `max_subdivision_depth`.
    pub max_node_level: u32,
    /// Level at which patch centers are baked into the vertex data.
    ///
    /// Fixed by the amplification shader's contract.
    pub attribute_level: u32,
}

/// Visibility query configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CullingConfig {
    /// Disable to draw every face at full resolution.
    pub enabled: bool,
    /// Nodes shallower than this level are never culled.
    pub never_cull_below_level: u32,
}

/// Frame buffering configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FrameConfig {
    /// Number of frames the CPU may record ahead of the GPU.
    pub frames_in_flight: u32,
}

/// Demo camera configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    /// Starting distance from the sphere center.
    pub start_distance: f32,
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    /// Near clip distance.
    pub near: f32,
    /// Upper bound on the far clip distance. The demo camera places the
    /// far plane at the sphere center, never beyond this.
    pub far: f32,
    /// Orbit speed in radians per second.
    pub orbit_speed: f32,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Log frame statistics every N frames (0 = never).
    pub stats_interval_frames: u32,
}

// --- Default implementations ---

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fullscreen: false,
            title: "Apollo".to_string(),
        }
    }
}

impl Default for SphereConfig {
    fn default() -> Self {
        Self {
            edge_length: 300.0,
            max_subdivision_depth: 5,
            max_node_level: 4,
            attribute_level: 5,
        }
    }
}

impl SphereConfig {
    /// Radius of the sphere the culling geometry is projected onto.
    pub fn radius(&self) -> f32 {
        self.edge_length * 0.5
    }

    /// Quadtree depth actually built: never deeper than the mesh.
    pub fn node_level_limit(&self) -> u32 {
        self.max_node_level.min(self.max_subdivision_depth)
    }
}

impl Default for CullingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            never_cull_below_level: 1,
        }
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            start_distance: 500.0,
            fov_degrees: 45.0,
            near: 0.01,
            far: 1000.0,
            orbit_speed: 0.25,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            stats_interval_frames: 120,
        }
    }
}

// --- Validation ---

impl Config {
    /// Check every value the mesh builder and stream setup depend on.
    ///
    /// Called before any GPU resource is created.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sphere = &self.sphere;
        if !sphere.edge_length.is_finite() || sphere.edge_length <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "sphere.edge_length",
                reason: format!("must be a positive finite number, got {}", sphere.edge_length),
            });
        }
        if sphere.max_subdivision_depth > MAX_SUBDIVISION_DEPTH {
            return Err(ConfigError::Invalid {
                field: "sphere.max_subdivision_depth",
                reason: format!(
                    "{} overflows the 32-bit index type (max {MAX_SUBDIVISION_DEPTH})",
                    sphere.max_subdivision_depth
                ),
            });
        }
        if sphere.attribute_level > sphere.max_subdivision_depth {
            return Err(ConfigError::Invalid {
                field: "sphere.attribute_level",
                reason: format!(
                    "{} is deeper than the mesh ({})",
                    sphere.attribute_level, sphere.max_subdivision_depth
                ),
            });
        }
        if self.frames.frames_in_flight == 0 || self.frames.frames_in_flight > MAX_FRAMES_IN_FLIGHT
        {
            return Err(ConfigError::Invalid {
                field: "frames.frames_in_flight",
                reason: format!(
                    "must be in 1..={MAX_FRAMES_IN_FLIGHT}, got {}",
                    self.frames.frames_in_flight
                ),
            });
        }
        if !self.camera.near.is_finite() || self.camera.near <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "camera.near",
                reason: format!("must be positive, got {}", self.camera.near),
            });
        }
        if !self.camera.far.is_finite() || self.camera.far <= self.camera.near {
            return Err(ConfigError::Invalid {
                field: "camera.far",
                reason: format!(
                    "must be finite and beyond camera.near ({}), got {}",
                    self.camera.near, self.camera.far
                ),
            });
        }
        Ok(())
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Platform default config directory (`<config_dir>/apollo`).
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("apollo"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `apollo.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("edge_length: 300.0"));
        assert!(ron_str.contains("frames_in_flight: 3"));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_section_uses_default() {
        let ron_str = "(window: (), sphere: (max_subdivision_depth: 6))";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.culling, CullingConfig::default());
        assert_eq!(config.sphere.max_subdivision_depth, 6);
        assert_eq!(config.sphere.edge_length, 300.0);
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(shadow_map_size: 2048)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_negative_depth_rejected_by_parser() {
        let result: Result<Config, _> = ron::from_str("(sphere: (max_subdivision_depth: -1))");
        assert!(result.is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_overflowing_depth_is_invalid() {
        let mut config = Config::default();
        config.sphere.max_subdivision_depth = MAX_SUBDIVISION_DEPTH + 1;
        config.sphere.attribute_level = 0;
        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => {
                assert_eq!(field, "sphere.max_subdivision_depth")
            }
            other => panic!("expected depth error, got {other:?}"),
        }
    }

    #[test]
    fn test_attribute_level_deeper_than_mesh_is_invalid() {
        let mut config = Config::default();
        config.sphere.max_subdivision_depth = 3;
        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "sphere.attribute_level"),
            other => panic!("expected attribute level error, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_frames_in_flight_is_invalid() {
        let mut config = Config::default();
        config.frames.frames_in_flight = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_positive_edge_length_is_invalid() {
        let mut config = Config::default();
        config.sphere.edge_length = 0.0;
        assert!(config.validate().is_err());
        config.sphere.edge_length = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_far_plane_must_exceed_near_plane() {
        let mut config = Config::default();
        config.camera.far = config.camera.near;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "camera.far", .. }));
    }

    #[test]
    fn test_node_level_clamped_to_mesh_depth() {
        let sphere = SphereConfig {
            max_subdivision_depth: 2,
            max_node_level: 4,
            ..SphereConfig::default()
        };
        assert_eq!(sphere.node_level_limit(), 2);
        assert_eq!(SphereConfig::default().node_level_limit(), 4);
        assert_eq!(SphereConfig::default().radius(), 150.0);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.sphere.max_subdivision_depth = 7;
        config.frames.frames_in_flight = 2;

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join(CONFIG_FILE_NAME).exists());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let result: Result<Config, _> = ron::from_str("{{not valid}}");
        assert!(result.is_err());
    }
}
