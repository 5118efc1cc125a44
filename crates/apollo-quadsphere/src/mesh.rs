//! Base cube construction and recursive quad subdivision.
//!
//! The mesh is a flat list of quads, four indices each. Every subdivision
//! round replaces each quad by four children laid out consecutively, so a
//! quad's descendants always occupy one contiguous run of the index array
//! and the first index of each quarter of that run is one of its corners.
//! The quadtree relies on that layout to address nodes by range alone.

use std::ops::Range;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::{CubeFace, MeshError};

/// Indices per quad patch.
pub const INDICES_PER_QUAD: u32 = 4;

/// A quad-sphere vertex.
///
/// `position` lies on the subdivided cube; the amplification stage projects
/// it onto the sphere. `patch_center` is baked once per patch at the
/// attribute level and shared by every index of that patch.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub patch_center: [f32; 3],
}

impl Vertex {
    /// A vertex at `position` with no patch center yet.
    pub fn at(position: Vec3) -> Self {
        Self {
            position: position.to_array(),
            patch_center: [0.0; 3],
        }
    }

    /// Position as a glam vector.
    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }
}

/// Total index count for a mesh subdivided `depth` times, if it fits in `u32`.
pub fn index_count_for_depth(depth: u32) -> Option<u32> {
    let exponent = depth.checked_add(1)?;
    4u32.checked_pow(exponent)?.checked_mul(6)
}

/// Total vertex count for a mesh subdivided `depth` times, if it fits in `u32`.
///
/// Each round adds five vertices per existing quad: `8 + 10 * (4^depth - 1)`.
pub fn vertex_count_for_depth(depth: u32) -> Option<u32> {
    let added = 4u32.checked_pow(depth)?.checked_sub(1)?.checked_mul(10)?;
    added.checked_add(8)
}

/// The eight corners of an axis-aligned cube centered at the origin.
///
/// Order matches the corner indices returned by [`CubeFace::base_corners`].
pub fn base_cube_positions(edge_length: f32) -> [Vec3; 8] {
    let h = 0.5 * edge_length;
    [
        // front (−Z)
        Vec3::new(-h, -h, -h),
        Vec3::new(-h, h, -h),
        Vec3::new(h, h, -h),
        Vec3::new(h, -h, -h),
        // back (+Z)
        Vec3::new(h, -h, h),
        Vec3::new(h, h, h),
        Vec3::new(-h, h, h),
        Vec3::new(-h, -h, h),
    ]
}

/// The immutable vertex and index arrays of a subdivided cube.
#[derive(Clone, Debug)]
pub struct QuadSphereMesh {
    /// Vertex data. Only `patch_center` is written after construction,
    /// once, while the face trees are built.
    pub vertices: Vec<Vertex>,
    /// Quad index list, four indices per quad, faces in [`CubeFace::ALL`] order.
    pub indices: Vec<u32>,
    edge_length: f32,
    subdivision_depth: u32,
}

impl QuadSphereMesh {
    /// Edge length of the base cube.
    pub fn edge_length(&self) -> f32 {
        self.edge_length
    }

    /// Radius of the sphere the culling geometry is projected onto.
    pub fn radius(&self) -> f32 {
        0.5 * self.edge_length
    }

    /// Number of subdivision rounds applied.
    pub fn subdivision_depth(&self) -> u32 {
        self.subdivision_depth
    }

    /// Number of indices owned by each face.
    pub fn face_index_count(&self) -> u32 {
        (self.indices.len() / CubeFace::ALL.len()) as u32
    }

    /// The index-array range owned by `face`.
    pub fn face_index_range(&self, face: CubeFace) -> Range<u32> {
        let count = self.face_index_count();
        let start = face.index() as u32 * count;
        start..start + count
    }

    /// The indices owned by `face`.
    pub fn face_indices(&self, face: CubeFace) -> &[u32] {
        let range = self.face_index_range(face);
        &self.indices[range.start as usize..range.end as usize]
    }

    /// Number of quads across all six faces.
    pub fn total_quad_count(&self) -> u32 {
        self.indices.len() as u32 / INDICES_PER_QUAD
    }

    /// Raw vertex bytes for GPU upload.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Raw index bytes for GPU upload.
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

/// Builds the base cube and subdivides it to a fixed depth.
#[derive(Clone, Copy, Debug)]
pub struct MeshBuilder {
    edge_length: f32,
    max_subdivision_depth: u32,
}

impl MeshBuilder {
    pub fn new(edge_length: f32, max_subdivision_depth: u32) -> Self {
        Self {
            edge_length,
            max_subdivision_depth,
        }
    }

    /// Build the mesh.
    ///
    /// Fails before allocating anything if the parameters cannot produce a
    /// valid `u32`-indexed mesh.
    pub fn build(&self) -> Result<QuadSphereMesh, MeshError> {
        if !self.edge_length.is_finite() || self.edge_length <= 0.0 {
            return Err(MeshError::InvalidEdgeLength(self.edge_length));
        }
        let depth = self.max_subdivision_depth;
        let overflow = MeshError::IndexOverflow { depth };
        let index_count = index_count_for_depth(depth).ok_or(overflow.clone())?;
        let vertex_count = vertex_count_for_depth(depth).ok_or(overflow)?;

        let mut vertices = Vec::with_capacity(vertex_count as usize);
        vertices.extend(base_cube_positions(self.edge_length).map(Vertex::at));

        let mut indices: Vec<u32> = CubeFace::ALL
            .iter()
            .flat_map(|face| face.base_corners())
            .collect();

        for _ in 0..depth {
            indices = subdivide(&mut vertices, &indices);
        }

        debug_assert_eq!(indices.len(), index_count as usize);
        debug_assert_eq!(vertices.len(), vertex_count as usize);

        tracing::info!(
            edge_length = self.edge_length,
            depth,
            vertices = vertices.len(),
            indices = indices.len(),
            "built quad-sphere mesh"
        );

        Ok(QuadSphereMesh {
            vertices,
            indices,
            edge_length: self.edge_length,
            subdivision_depth: depth,
        })
    }
}

/// One subdivision round: every quad becomes four, in place of the parent.
///
/// For a quad `[i0, i1, i2, i3]` (`i0`/`i3` diagonal) the loop around the
/// quad is `v0 = i0, v1 = i1, v2 = i3, v3 = i2`. Each child starts with one
/// original corner, followed by its two adjacent edge midpoints and the
/// face midpoint.
fn subdivide(vertices: &mut Vec<Vertex>, indices: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(indices.len() * 4);

    for quad in indices.chunks_exact(INDICES_PER_QUAD as usize) {
        let (v0, v1, v2, v3) = (quad[0], quad[1], quad[3], quad[2]);
        let p = |i: u32| vertices[i as usize].position();

        let m0 = midpoint(p(v0), p(v1));
        let m1 = midpoint(p(v1), p(v2));
        let m2 = midpoint(p(v2), p(v3));
        let m3 = midpoint(p(v3), p(v0));
        let m4 = midpoint(m0, m2);

        let m0i = vertices.len() as u32;
        let (m1i, m2i, m3i, m4i) = (m0i + 1, m0i + 2, m0i + 3, m0i + 4);
        vertices.extend([m0, m1, m2, m3, m4].map(Vertex::at));

        out.extend_from_slice(&[v0, m0i, m3i, m4i]);
        out.extend_from_slice(&[v1, m1i, m0i, m4i]);
        out.extend_from_slice(&[v3, m3i, m2i, m4i]);
        out.extend_from_slice(&[v2, m2i, m1i, m4i]);
    }

    out
}

fn midpoint(a: Vec3, b: Vec3) -> Vec3 {
    0.5 * (a + b)
}
