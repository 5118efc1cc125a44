//! Mesh and hierarchy construction errors.

/// Invalid parameters detected while building the quad-sphere.
///
/// All of these are configuration errors: they are reported before any
/// GPU resource is created and are never retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MeshError {
    /// The cube edge length is zero, negative, or not finite.
    #[error("edge length must be positive and finite, got {0}")]
    InvalidEdgeLength(f32),

    /// The subdivision depth produces more indices or vertices than `u32` can address.
    #[error("subdivision depth {depth} overflows the 32-bit index type")]
    IndexOverflow {
        /// The requested subdivision depth.
        depth: u32,
    },

    /// The quadtree would be deeper than the mesh it partitions.
    #[error("node level {level} exceeds subdivision depth {depth}")]
    NodeLevelTooDeep {
        /// The requested node level limit.
        level: u32,
        /// The mesh subdivision depth.
        depth: u32,
    },

    /// Patch centers were requested below the finest quad level.
    #[error("attribute level {level} exceeds subdivision depth {depth}")]
    AttributeLevelTooDeep {
        /// The requested attribute level.
        level: u32,
        /// The mesh subdivision depth.
        depth: u32,
    },
}
