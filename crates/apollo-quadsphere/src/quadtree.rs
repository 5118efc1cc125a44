//! Per-face quadtree over the immutable index array, and the visibility query.
//!
//! Each node covers one contiguous run of the face's indices. The run of a
//! node is exactly the concatenation of its four children's runs, so a
//! query can describe any visible subset as a list of disjoint ranges
//! without touching the index data itself.
//!
//! Nodes live in one arena per face and refer to their children by
//! [`NodeId`]. A built tree is never mutated, so trees of different faces
//! can be queried from different threads.

use std::ops::Range;

use glam::Vec3;

use crate::bounds::{OrientedBox, TangentFrame, project_to_sphere};
use crate::mesh::{INDICES_PER_QUAD, QuadSphereMesh, Vertex};
use crate::{Containment, CubeFace, Frustum, MeshError};

/// Handle of a node inside its face's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// The face root.
    pub const ROOT: NodeId = NodeId(0);

    /// Position of the node in [`FaceTree::nodes`].
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Parameters for building the face trees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TreeParams {
    /// Sphere radius the node centers are projected onto.
    pub radius: f32,
    /// Deepest node level; nodes at this level are leaves.
    pub max_node_level: u32,
    /// Level whose patch centers are baked into the vertices.
    pub attribute_level: u32,
}

/// Culling policy applied by [`FaceTree::query`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CullPolicy {
    /// Nodes shallower than this level are never culled, only recursed into.
    pub never_cull_below_level: u32,
}

impl Default for CullPolicy {
    fn default() -> Self {
        Self {
            never_cull_below_level: 1,
        }
    }
}

/// Counters reported by one query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueryCounts {
    /// Quads inside subtrees rejected by the frustum test.
    pub culled_quads: u32,
    /// Nodes whose bounding volume was tested.
    pub visited_nodes: u32,
}

/// Ranges collected by [`FaceTree::query_ranges`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryResult {
    /// Disjoint index-array ranges to draw, in traversal order.
    pub ranges: Vec<Range<u32>>,
    pub counts: QueryCounts,
}

impl QueryResult {
    /// Total number of indices covered by `ranges`.
    pub fn index_count(&self) -> u32 {
        self.ranges.iter().map(|r| r.end - r.start).sum()
    }
}

/// One quad patch of a face.
#[derive(Clone, Debug)]
pub struct SpatialNode {
    level: u32,
    index_count: u32,
    corner_indices: [u32; 4],
    base_address: u32,
    width: f32,
    center: Vec3,
    bounds: OrientedBox,
    children: Option<[NodeId; 4]>,
}

impl SpatialNode {
    /// Depth below the face root.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Indices spanned by this node's subtree.
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Quads spanned by this node's subtree.
    pub fn quad_count(&self) -> u32 {
        self.index_count / INDICES_PER_QUAD
    }

    /// Vertex indices of the patch corners (`[0]`/`[3]` diagonal).
    pub fn corner_indices(&self) -> [u32; 4] {
        self.corner_indices
    }

    /// First index-array position covered by this node.
    pub fn base_address(&self) -> u32 {
        self.base_address
    }

    /// The index-array range covered by this node.
    pub fn index_range(&self) -> Range<u32> {
        self.base_address..self.base_address + self.index_count
    }

    /// Patch edge length.
    pub fn width(&self) -> f32 {
        self.width
    }

    /// Patch center projected onto the sphere.
    pub fn center(&self) -> Vec3 {
        self.center
    }

    pub fn bounds(&self) -> &OrientedBox {
        &self.bounds
    }

    pub fn children(&self) -> Option<[NodeId; 4]> {
        self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }
}

/// The quadtree of one cube face.
#[derive(Clone, Debug)]
pub struct FaceTree {
    face: CubeFace,
    nodes: Vec<SpatialNode>,
    max_node_level: u32,
}

impl FaceTree {
    /// Build the tree for `face` and bake the face's patch centers into `mesh`.
    pub fn build(
        face: CubeFace,
        mesh: &mut QuadSphereMesh,
        params: &TreeParams,
    ) -> Result<Self, MeshError> {
        let depth = mesh.subdivision_depth();
        if params.max_node_level > depth {
            return Err(MeshError::NodeLevelTooDeep {
                level: params.max_node_level,
                depth,
            });
        }
        if params.attribute_level > depth {
            return Err(MeshError::AttributeLevelTooDeep {
                level: params.attribute_level,
                depth,
            });
        }

        let range = mesh.face_index_range(face);
        let width = mesh.edge_length();

        let node_count = (4usize.pow(params.max_node_level + 1) - 1) / 3;
        let mut builder = TreeBuilder {
            nodes: Vec::with_capacity(node_count),
            vertices: mesh.vertices.as_mut_slice(),
            indices: mesh.indices.as_slice(),
            params,
        };
        builder.push_node(0, range.end - range.start, range.start, face.base_corners(), width);

        tracing::debug!(
            face = face.name(),
            nodes = builder.nodes.len(),
            levels = params.max_node_level + 1,
            "built face tree"
        );

        Ok(Self {
            face,
            nodes: builder.nodes,
            max_node_level: params.max_node_level,
        })
    }

    pub fn face(&self) -> CubeFace {
        self.face
    }

    pub fn root(&self) -> &SpatialNode {
        &self.nodes[NodeId::ROOT.index()]
    }

    pub fn node(&self, id: NodeId) -> &SpatialNode {
        &self.nodes[id.index()]
    }

    /// All nodes in depth-first pre-order; the root is first.
    pub fn nodes(&self) -> &[SpatialNode] {
        &self.nodes
    }

    /// Level of the leaves.
    pub fn max_node_level(&self) -> u32 {
        self.max_node_level
    }

    /// The face's full index range.
    pub fn index_range(&self) -> Range<u32> {
        self.root().index_range()
    }

    /// Visibility query.
    ///
    /// Calls `visit` once per index range to draw. The ranges are pairwise
    /// disjoint and lie inside [`FaceTree::index_range`]. A node draws its own
    /// range only when it is a leaf or when none of its descendants drew
    /// anything.
    pub fn query<F>(&self, frustum: &Frustum, policy: CullPolicy, mut visit: F) -> QueryCounts
    where
        F: FnMut(Range<u32>),
    {
        let mut counts = QueryCounts::default();
        self.query_node(NodeId::ROOT, frustum, policy, &mut visit, &mut counts);
        counts
    }

    /// [`FaceTree::query`] collecting the ranges into a vector.
    pub fn query_ranges(&self, frustum: &Frustum, policy: CullPolicy) -> QueryResult {
        let mut ranges = Vec::new();
        let counts = self.query(frustum, policy, |range| ranges.push(range));
        QueryResult { ranges, counts }
    }

    /// Returns whether anything in the subtree was emitted.
    fn query_node<F>(
        &self,
        id: NodeId,
        frustum: &Frustum,
        policy: CullPolicy,
        visit: &mut F,
        counts: &mut QueryCounts,
    ) -> bool
    where
        F: FnMut(Range<u32>),
    {
        let node = self.node(id);
        counts.visited_nodes += 1;

        let outside = frustum.contains_obb(&node.bounds) == Containment::Outside;
        let protected = node.level < policy.never_cull_below_level;
        if outside && !protected {
            counts.culled_quads += node.quad_count();
            return false;
        }

        let mut emitted = false;
        if let Some(children) = node.children {
            for child in children {
                emitted |= self.query_node(child, frustum, policy, visit, counts);
            }
            // A protected node that is itself outside is only a pass-through:
            // its culled children already account for all of its quads.
            if outside {
                return emitted;
            }
        }

        if !emitted {
            visit(node.index_range());
        }
        true
    }
}

struct TreeBuilder<'a> {
    nodes: Vec<SpatialNode>,
    vertices: &'a mut [Vertex],
    indices: &'a [u32],
    params: &'a TreeParams,
}

impl TreeBuilder<'_> {
    fn push_node(
        &mut self,
        level: u32,
        index_count: u32,
        base_address: u32,
        corner_indices: [u32; 4],
        width: f32,
    ) -> NodeId {
        let raw_center = self.raw_center(corner_indices);
        let center = project_to_sphere(raw_center, width, self.params.radius);
        let frame = TangentFrame::from_direction(raw_center);
        let bounds = OrientedBox::for_patch(center, &frame, width);

        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(SpatialNode {
            level,
            index_count,
            corner_indices,
            base_address,
            width,
            center,
            bounds,
            children: None,
        });

        self.bake_patch_centers(level, index_count, base_address, center, width);

        if level < self.params.max_node_level {
            let quarter = index_count / 4;
            let children = [0, 1, 2, 3].map(|c| {
                let child_base = base_address + c * quarter;
                let corners = self.range_corners(child_base, quarter);
                self.push_node(level + 1, quarter, child_base, corners, width * 0.5)
            });
            self.nodes[id.index()].children = Some(children);
        }

        id
    }

    /// Corners of the patch covering `count` indices from `base`: the first
    /// index of each quarter.
    fn range_corners(&self, base: u32, count: u32) -> [u32; 4] {
        let step = count / 4;
        [0, 1, 2, 3].map(|k| self.indices[(base + k * step) as usize])
    }

    fn raw_center(&self, corners: [u32; 4]) -> Vec3 {
        corners
            .iter()
            .map(|&i| self.vertices[i as usize].position())
            .sum::<Vec3>()
            / 4.0
    }

    /// Write patch centers at the attribute level.
    ///
    /// A node at the attribute level bakes its own center. Leaves above the
    /// attribute level split their range into the sub-patches of that level
    /// and bake each sub-patch's center.
    fn bake_patch_centers(
        &mut self,
        level: u32,
        index_count: u32,
        base_address: u32,
        center: Vec3,
        width: f32,
    ) {
        let attribute_level = self.params.attribute_level;
        if level == attribute_level {
            self.write_patch_center(base_address, index_count, center);
            return;
        }
        let is_leaf = level == self.params.max_node_level;
        if !is_leaf || attribute_level < level {
            return;
        }

        let split = 4u32.pow(attribute_level - level);
        let sub_count = index_count / split;
        let sub_width = width / (1u32 << (attribute_level - level)) as f32;
        for s in 0..split {
            let sub_base = base_address + s * sub_count;
            let raw = self.raw_center(self.range_corners(sub_base, sub_count));
            let sub_center = project_to_sphere(raw, sub_width, self.params.radius);
            self.write_patch_center(sub_base, sub_count, sub_center);
        }
    }

    fn write_patch_center(&mut self, base: u32, count: u32, center: Vec3) {
        let indices = &self.indices[base as usize..(base + count) as usize];
        for &i in indices {
            self.vertices[i as usize].patch_center = center.to_array();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MeshBuilder;
    use glam::Vec4;

    fn params(depth: u32) -> TreeParams {
        TreeParams {
            radius: 150.0,
            max_node_level: depth.min(4),
            attribute_level: depth,
        }
    }

    fn build(depth: u32, face: CubeFace) -> (QuadSphereMesh, FaceTree) {
        let mut mesh = MeshBuilder::new(300.0, depth).build().unwrap();
        let tree = FaceTree::build(face, &mut mesh, &params(depth)).unwrap();
        (mesh, tree)
    }

    /// Axis-aligned box `[-e, e]^3` as a frustum.
    fn box_frustum(e: f32) -> Frustum {
        Frustum::from_planes([
            Vec4::new(1.0, 0.0, 0.0, e),
            Vec4::new(-1.0, 0.0, 0.0, e),
            Vec4::new(0.0, 1.0, 0.0, e),
            Vec4::new(0.0, -1.0, 0.0, e),
            Vec4::new(0.0, 0.0, 1.0, e),
            Vec4::new(0.0, 0.0, -1.0, e),
        ])
    }

    /// Everything with `z <= -cut` inside a huge box.
    fn half_space_frustum(cut: f32) -> Frustum {
        Frustum::from_planes([
            Vec4::new(1.0, 0.0, 0.0, 1000.0),
            Vec4::new(-1.0, 0.0, 0.0, 1000.0),
            Vec4::new(0.0, 1.0, 0.0, 1000.0),
            Vec4::new(0.0, -1.0, 0.0, 1000.0),
            Vec4::new(0.0, 0.0, -1.0, -cut),
            Vec4::new(0.0, 0.0, 1.0, 1000.0),
        ])
    }

    fn assert_disjoint_within(ranges: &[Range<u32>], face: &Range<u32>) {
        let mut sorted = ranges.to_vec();
        sorted.sort_by_key(|r| r.start);
        for r in &sorted {
            assert!(r.start >= face.start && r.end <= face.end, "{r:?} outside {face:?}");
            assert!(r.start < r.end);
        }
        for pair in sorted.windows(2) {
            assert!(pair[0].end <= pair[1].start, "{:?} overlaps {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_node_count_and_levels() {
        let (_, tree) = build(5, CubeFace::Front);
        assert_eq!(tree.nodes().len(), 1 + 4 + 16 + 64 + 256);
        assert_eq!(tree.max_node_level(), 4);
        for node in tree.nodes() {
            assert_eq!(node.index_count(), 4u32.pow(6 - node.level()));
            assert_eq!(node.is_leaf(), node.level() == 4);
            assert!((node.width() - 300.0 / 2f32.powi(node.level() as i32)).abs() < 1e-4);
        }
    }

    #[test]
    fn test_children_concatenate_to_parent_range() {
        let (_, tree) = build(4, CubeFace::Left);
        for node in tree.nodes() {
            let Some(children) = node.children() else {
                continue;
            };
            let mut next = node.base_address();
            for id in children {
                let child = tree.node(id);
                assert_eq!(child.base_address(), next);
                assert_eq!(child.level(), node.level() + 1);
                next = child.index_range().end;
            }
            assert_eq!(next, node.index_range().end);
        }
    }

    #[test]
    fn test_root_covers_face_range_with_base_corners() {
        let (mesh, tree) = build(3, CubeFace::Bottom);
        assert_eq!(tree.index_range(), mesh.face_index_range(CubeFace::Bottom));
        assert_eq!(tree.root().corner_indices(), CubeFace::Bottom.base_corners());
        // The base corners are also the quarter heads of the subdivided range.
        let r = tree.index_range();
        let q = (r.end - r.start) / 4;
        let heads = [0, 1, 2, 3].map(|k| mesh.indices[(r.start + k * q) as usize]);
        assert_eq!(heads, tree.root().corner_indices());
    }

    #[test]
    fn test_node_centers_lie_over_their_face() {
        let (_, tree) = build(4, CubeFace::Top);
        for node in tree.nodes().iter().skip(1) {
            assert!(node.center().y > 0.0, "{:?}", node.center());
            assert!(node.center().length() <= 150.0 + 1e-3);
        }
    }

    #[test]
    fn test_full_visibility_covers_face_exactly() {
        let (_, tree) = build(5, CubeFace::Front);
        let result = tree.query_ranges(&box_frustum(1000.0), CullPolicy::default());
        assert_eq!(result.counts.culled_quads, 0);
        assert_disjoint_within(&result.ranges, &tree.index_range());
        assert_eq!(result.index_count(), tree.root().index_count());
        // Every leaf draws itself.
        assert_eq!(result.ranges.len(), 256);
    }

    #[test]
    fn test_partition_invariant_for_partial_view() {
        let (_, tree) = build(5, CubeFace::Right);
        let frustum = Frustum::look_at(
            Vec3::new(400.0, 60.0, 30.0),
            Vec3::new(150.0, 40.0, 0.0),
            Vec3::Y,
            0.3,
            1.5,
            0.01,
            450.0,
        );
        let result = tree.query_ranges(&frustum, CullPolicy::default());
        assert!(!result.ranges.is_empty());
        assert!(result.counts.culled_quads > 0);
        assert_disjoint_within(&result.ranges, &tree.index_range());
    }

    #[test]
    fn test_invisible_face_draws_nothing() {
        // Looking at the front face from outside; the back face is beyond the far plane.
        let (_, tree) = build(5, CubeFace::Back);
        let frustum = Frustum::look_at(
            Vec3::new(0.0, 0.0, -500.0),
            Vec3::ZERO,
            Vec3::Y,
            std::f32::consts::FRAC_PI_4,
            16.0 / 9.0,
            0.01,
            400.0,
        );
        let result = tree.query_ranges(&frustum, CullPolicy::default());
        assert!(result.ranges.is_empty());
        assert_eq!(result.counts.culled_quads, tree.root().quad_count());
    }

    #[test]
    fn test_level_zero_is_recursed_even_when_outside() {
        let (_, tree) = build(4, CubeFace::Front);
        // The front root box is a flat shell through the origin; the cut at
        // z <= -10 excludes it but keeps the projected level-1 patches.
        let frustum = half_space_frustum(10.0);
        assert_eq!(
            frustum.contains_obb(tree.root().bounds()),
            Containment::Outside
        );

        let protected = tree.query_ranges(&frustum, CullPolicy::default());
        assert!(protected.counts.visited_nodes > 1);
        assert!(!protected.ranges.is_empty());
        assert!(!protected.ranges.contains(&tree.index_range()));

        let unprotected = tree.query_ranges(
            &frustum,
            CullPolicy {
                never_cull_below_level: 0,
            },
        );
        assert_eq!(unprotected.counts.visited_nodes, 1);
        assert!(unprotected.ranges.is_empty());
        assert_eq!(unprotected.counts.culled_quads, tree.root().quad_count());
    }

    #[test]
    fn test_inner_node_draws_only_when_all_children_are_culled() {
        let (_, tree) = build(4, CubeFace::Front);
        let frustum = half_space_frustum(140.0);
        let policy = CullPolicy::default();
        let result = tree.query_ranges(&frustum, policy);
        assert_disjoint_within(&result.ranges, &tree.index_range());
        for range in &result.ranges {
            let node = tree
                .nodes()
                .iter()
                .find(|n| n.index_range() == *range)
                .expect("every range is a node range");
            let Some(children) = node.children() else {
                continue;
            };
            for id in children {
                assert_eq!(
                    frustum.contains_obb(tree.node(id).bounds()),
                    Containment::Outside
                );
            }
        }
    }

    #[test]
    fn test_culling_is_monotone_for_shrinking_frustum() {
        let (_, tree) = build(5, CubeFace::Front);
        let mut previous = 0;
        for cut in [0.0, 60.0, 100.0, 130.0, 145.0, 149.0, 200.0] {
            let counts = tree.query(&half_space_frustum(cut), CullPolicy::default(), |_| {});
            assert!(
                counts.culled_quads >= previous,
                "cut {cut}: {} < {previous}",
                counts.culled_quads
            );
            previous = counts.culled_quads;
        }
        assert_eq!(previous, tree.root().quad_count());
    }

    #[test]
    fn test_visits_are_bounded_by_output() {
        let (_, tree) = build(5, CubeFace::Front);
        let frustum = half_space_frustum(148.0);
        let mut emitted = 0;
        let counts = tree.query(&frustum, CullPolicy::default(), |_| emitted += 1);
        assert!(counts.culled_quads > 0);
        assert!(counts.visited_nodes < tree.nodes().len() as u32);
        assert!(emitted <= counts.visited_nodes);
    }

    #[test]
    fn test_patch_centers_baked_below_leaf_level() {
        // Leaves at level 4, attribute level 5: each finest quad is its own patch.
        let (mesh, _) = build(5, CubeFace::Top);
        let expected_height = project_to_sphere(Vec3::Y, 300.0 / 32.0, 150.0).length();
        for &i in mesh.face_indices(CubeFace::Top) {
            let vertex = mesh.vertices[i as usize];
            let center = Vec3::from_array(vertex.patch_center);
            assert!((center.length() - expected_height).abs() < 1e-2, "{center:?}");
            assert!(center.normalize().dot(vertex.position().normalize()) > 0.995);
        }
        // Other faces are untouched until their trees are built.
        assert!(
            mesh.face_indices(CubeFace::Bottom)
                .iter()
                .all(|&i| mesh.vertices[i as usize].patch_center == [0.0; 3])
        );
    }

    #[test]
    fn test_patch_centers_baked_at_node_level() {
        let mut mesh = MeshBuilder::new(300.0, 4).build().unwrap();
        let params = TreeParams {
            radius: 150.0,
            max_node_level: 3,
            attribute_level: 2,
        };
        let tree = FaceTree::build(CubeFace::Front, &mut mesh, &params).unwrap();
        for node in tree.nodes().iter().filter(|n| n.level() == 2) {
            let r = node.index_range();
            let face_mid = mesh.indices[(r.start + 3) as usize];
            // Interior face midpoints belong to exactly one level-2 patch.
            assert_eq!(
                mesh.vertices[face_mid as usize].patch_center,
                node.center().to_array()
            );
        }
    }

    #[test]
    fn test_too_deep_levels_rejected() {
        let mut mesh = MeshBuilder::new(300.0, 2).build().unwrap();
        let bad_nodes = TreeParams {
            radius: 150.0,
            max_node_level: 3,
            attribute_level: 2,
        };
        assert_eq!(
            FaceTree::build(CubeFace::Front, &mut mesh, &bad_nodes).unwrap_err(),
            MeshError::NodeLevelTooDeep { level: 3, depth: 2 }
        );
        let bad_attr = TreeParams {
            radius: 150.0,
            max_node_level: 2,
            attribute_level: 3,
        };
        assert_eq!(
            FaceTree::build(CubeFace::Front, &mut mesh, &bad_attr).unwrap_err(),
            MeshError::AttributeLevelTooDeep { level: 3, depth: 2 }
        );
    }

    #[test]
    fn test_single_level_tree_is_a_leaf() {
        let mut mesh = MeshBuilder::new(300.0, 2).build().unwrap();
        let params = TreeParams {
            radius: 150.0,
            max_node_level: 0,
            attribute_level: 0,
        };
        let tree = FaceTree::build(CubeFace::Back, &mut mesh, &params).unwrap();
        assert_eq!(tree.nodes().len(), 1);
        let result = tree.query_ranges(&box_frustum(1000.0), CullPolicy::default());
        assert_eq!(result.ranges, vec![tree.index_range()]);
    }
}
