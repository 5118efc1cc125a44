//! Errors raised while allocating or rebuilding the index streams.

use apollo_config::ConfigError;
use apollo_quadsphere::MeshError;

/// Failure to build the streams or allocate their GPU buffers.
///
/// Nothing here is retried: mesh and configuration errors are fatal at
/// startup, and a lost device is answered by rebuilding the streams.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build the quad-sphere: {0}")]
    Mesh(#[from] MeshError),

    /// A single index buffer would exceed the device's buffer size limit.
    #[error("index buffer '{label}' needs {size} bytes, device limit is {limit}")]
    BufferTooLarge {
        label: String,
        size: u64,
        limit: u64,
    },

    #[error("graphics device lost")]
    DeviceLost,
}
