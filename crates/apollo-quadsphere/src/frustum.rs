//! View frustum with three-way containment tests against patch bounding volumes.

use glam::{Mat4, Vec3, Vec4};

use crate::OrientedBox;

/// Plane indices into the frustum planes array.
const LEFT: usize = 0;
const RIGHT: usize = 1;
const BOTTOM: usize = 2;
const TOP: usize = 3;
const NEAR: usize = 4;
const FAR: usize = 5;

/// Result of testing a bounding volume against a frustum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    /// Entirely outside at least one plane.
    Outside,
    /// Straddles one or more planes.
    Intersecting,
    /// Entirely inside every plane.
    Inside,
}

/// A view frustum defined by six inward-pointing planes.
///
/// Each plane is `Vec4(a, b, c, d)` with `(a, b, c)` the unit inward normal;
/// a point `p` is inside when `dot(n, p) + d >= 0`.
#[derive(Clone, Debug, PartialEq)]
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Frustum {
    /// Extract frustum planes from a combined view-projection matrix
    /// using the Gribb/Hartmann method, for a `[0, 1]` depth range.
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let rows = [vp.row(0), vp.row(1), vp.row(2), vp.row(3)];

        let mut planes = [Vec4::ZERO; 6];
        planes[LEFT] = rows[3] + rows[0];
        planes[RIGHT] = rows[3] - rows[0];
        planes[BOTTOM] = rows[3] + rows[1];
        planes[TOP] = rows[3] - rows[1];
        planes[NEAR] = rows[2];
        planes[FAR] = rows[3] - rows[2];

        Self::from_planes(planes)
    }

    /// Build a frustum from six arbitrary inward planes. Planes are normalized.
    pub fn from_planes(mut planes: [Vec4; 6]) -> Self {
        for plane in &mut planes {
            let len = plane.truncate().length();
            if len > 1e-8 {
                *plane /= len;
            }
        }
        Self { planes }
    }

    /// Right-handed perspective frustum looking from `eye` toward `target`.
    pub fn look_at(
        eye: Vec3,
        target: Vec3,
        up: Vec3,
        fov_y_radians: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        let view = Mat4::look_at_rh(eye, target, up);
        let proj = Mat4::perspective_rh(fov_y_radians, aspect, near, far);
        Self::from_view_projection(&(proj * view))
    }

    /// The six normalized planes: left, right, bottom, top, near, far.
    pub fn planes(&self) -> &[Vec4; 6] {
        &self.planes
    }

    /// Whether `point` is inside or on every plane.
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(point) + plane.w >= 0.0)
    }

    /// Classify a sphere.
    pub fn contains_sphere(&self, center: Vec3, radius: f32) -> Containment {
        self.classify(center, |_| radius)
    }

    /// Classify an oriented box.
    ///
    /// Per plane, the box's projected radius onto the plane normal is compared
    /// with the signed distance of its center. The test is conservative: boxes
    /// near frustum edges may report `Intersecting` while being outside, but a
    /// box that touches the frustum is never reported `Outside`.
    pub fn contains_obb(&self, obb: &OrientedBox) -> Containment {
        self.classify(obb.center, |normal| obb.extent_along(normal))
    }

    fn classify(&self, center: Vec3, radius_along: impl Fn(Vec3) -> f32) -> Containment {
        let mut all_inside = true;

        for plane in &self.planes {
            let normal = plane.truncate();
            let effective_radius = radius_along(normal);
            let signed_dist = normal.dot(center) + plane.w;

            if signed_dist < -effective_radius {
                return Containment::Outside;
            }
            if signed_dist < effective_radius {
                all_inside = false;
            }
        }

        if all_inside {
            Containment::Inside
        } else {
            Containment::Intersecting
        }
    }
}
