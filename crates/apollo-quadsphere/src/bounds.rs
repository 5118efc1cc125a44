//! Patch bounding volumes: sphere projection, tangent frames, and oriented boxes.

use glam::{Mat3, Quat, Vec3};

/// Half-extent of a patch box along the tangent and bitangent, as a fraction
/// of the patch width. Over-covers the flat footprint to absorb curvature and
/// displacement error.
pub const FOOTPRINT_SCALE: f32 = 0.6;

/// Half-extent of a patch box along the surface normal.
pub const SHELL_HALF_THICKNESS: f32 = 0.1;

/// Project a patch's raw (chord) center onto the sphere.
///
/// The distance from the origin is `radius * sin(acos(0.5 * width / radius))`,
/// which pulls coarse patches, whose width is large relative to the radius,
/// toward the chord they span.
pub fn project_to_sphere(raw_center: Vec3, width: f32, radius: f32) -> Vec3 {
    let cos_angle = (0.5 * width / radius).clamp(-1.0, 1.0);
    let height = radius * cos_angle.acos().sin();
    raw_center.normalize_or_zero() * height
}

/// An orthonormal frame tangent to the sphere at a point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TangentFrame {
    pub tangent: Vec3,
    pub bitangent: Vec3,
    pub normal: Vec3,
}

impl TangentFrame {
    /// Frame at the surface point along `direction`.
    ///
    /// The tangent follows the azimuth `atan2(n.z, n.x)` rotated by 90° in
    /// the XZ plane, so it is defined at the poles as well.
    pub fn from_direction(direction: Vec3) -> Self {
        let normal = direction.normalize_or(Vec3::Y);
        let theta = normal.z.atan2(normal.x);
        let tangent = Vec3::new(-theta.sin(), 0.0, theta.cos()).normalize();
        let bitangent = normal.cross(tangent).normalize();
        Self {
            tangent,
            bitangent,
            normal,
        }
    }

    /// Rotation taking local X/Y/Z onto tangent/bitangent/normal.
    pub fn rotation(&self) -> Quat {
        Quat::from_mat3(&Mat3::from_cols(self.tangent, self.bitangent, self.normal)).normalize()
    }
}

/// An oriented bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrientedBox {
    /// Box center.
    pub center: Vec3,
    /// Half-size along each local axis.
    pub half_extents: Vec3,
    /// Rotation from local axes to world axes.
    pub orientation: Quat,
}

impl OrientedBox {
    pub fn new(center: Vec3, half_extents: Vec3, orientation: Quat) -> Self {
        Self {
            center,
            half_extents,
            orientation,
        }
    }

    /// Thin shell box for a patch of the given width centered at `center`.
    pub fn for_patch(center: Vec3, frame: &TangentFrame, width: f32) -> Self {
        Self::new(
            center,
            Vec3::new(
                width * FOOTPRINT_SCALE,
                width * FOOTPRINT_SCALE,
                SHELL_HALF_THICKNESS,
            ),
            frame.rotation(),
        )
    }

    /// World-space directions of the local X, Y and Z axes.
    pub fn axes(&self) -> [Vec3; 3] {
        [
            self.orientation * Vec3::X,
            self.orientation * Vec3::Y,
            self.orientation * Vec3::Z,
        ]
    }

    /// The eight corners of the box.
    pub fn corners(&self) -> [Vec3; 8] {
        let [x, y, z] = self.axes();
        let (hx, hy, hz) = (
            x * self.half_extents.x,
            y * self.half_extents.y,
            z * self.half_extents.z,
        );
        let mut corners = [Vec3::ZERO; 8];
        for (i, corner) in corners.iter_mut().enumerate() {
            let sx = if i & 1 == 0 { -1.0 } else { 1.0 };
            let sy = if i & 2 == 0 { -1.0 } else { 1.0 };
            let sz = if i & 4 == 0 { -1.0 } else { 1.0 };
            *corner = self.center + hx * sx + hy * sy + hz * sz;
        }
        corners
    }

    /// Projected radius of the box onto a unit direction.
    pub fn extent_along(&self, direction: Vec3) -> f32 {
        let [x, y, z] = self.axes();
        self.half_extents.x * direction.dot(x).abs()
            + self.half_extents.y * direction.dot(y).abs()
            + self.half_extents.z * direction.dot(z).abs()
    }

    /// Whether `point` lies inside the box (inclusive).
    pub fn contains_point(&self, point: Vec3) -> bool {
        let local = self.orientation.inverse() * (point - self.center);
        local.abs().cmple(self.half_extents + Vec3::splat(1e-4)).all()
    }
}
