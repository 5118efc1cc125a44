//! Quad-sphere geometry and per-face visibility hierarchy.
//!
//! [`MeshBuilder`] produces one immutable vertex/index pair for a subdivided
//! cube. A [`FaceTree`] per [`CubeFace`] partitions that face's contiguous
//! index range into nested patches with oriented bounding boxes, and answers
//! frustum queries with a list of disjoint index ranges to draw.

mod bounds;
mod cube_face;
mod error;
mod frustum;
mod mesh;
mod quadtree;

pub use bounds::{
    FOOTPRINT_SCALE, OrientedBox, SHELL_HALF_THICKNESS, TangentFrame, project_to_sphere,
};
pub use cube_face::CubeFace;
pub use error::MeshError;
pub use frustum::{Containment, Frustum};
pub use mesh::{
    INDICES_PER_QUAD, MeshBuilder, QuadSphereMesh, Vertex, base_cube_positions,
    index_count_for_depth, vertex_count_for_depth,
};
pub use quadtree::{
    CullPolicy, FaceTree, NodeId, QueryCounts, QueryResult, SpatialNode, TreeParams,
};
