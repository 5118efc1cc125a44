//! The six faces of the base cube and their corner topology.

use glam::Vec3;

/// Indices of the four corners of each face in the 8-vertex base cube,
/// in canonical face order. `[a, b, c, d]` with `a`/`d` diagonal.
const BASE_CORNERS: [[u32; 4]; 6] = [
    [0, 1, 3, 2], // front
    [6, 7, 5, 4], // back
    [1, 6, 2, 5], // top
    [7, 0, 4, 3], // bottom
    [7, 6, 0, 1], // left
    [3, 2, 4, 5], // right
];

/// The six faces of the cube that is projected onto the sphere.
///
/// The discriminant is the face's position in the mesh: face `f` owns the
/// `f`-th sixth of the index array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum CubeFace {
    /// −Z face
    Front = 0,
    /// +Z face
    Back = 1,
    /// +Y face
    Top = 2,
    /// −Y face
    Bottom = 3,
    /// −X face
    Left = 4,
    /// +X face
    Right = 5,
}

impl CubeFace {
    /// All six faces in mesh order.
    pub const ALL: [CubeFace; 6] = [
        CubeFace::Front,
        CubeFace::Back,
        CubeFace::Top,
        CubeFace::Bottom,
        CubeFace::Left,
        CubeFace::Right,
    ];

    /// Position of this face in the mesh.
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Outward-pointing unit normal for this face.
    #[must_use]
    pub fn normal(self) -> Vec3 {
        match self {
            CubeFace::Front => Vec3::NEG_Z,
            CubeFace::Back => Vec3::Z,
            CubeFace::Top => Vec3::Y,
            CubeFace::Bottom => Vec3::NEG_Y,
            CubeFace::Left => Vec3::NEG_X,
            CubeFace::Right => Vec3::X,
        }
    }

    /// Corner vertex indices of this face in the unsubdivided cube.
    #[must_use]
    pub fn base_corners(self) -> [u32; 4] {
        BASE_CORNERS[self.index()]
    }

    /// Short lowercase name used for buffer labels and log fields.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            CubeFace::Front => "front",
            CubeFace::Back => "back",
            CubeFace::Top => "top",
            CubeFace::Bottom => "bottom",
            CubeFace::Left => "left",
            CubeFace::Right => "right",
        }
    }
}
