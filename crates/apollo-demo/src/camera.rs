//! Scripted orbit camera for the frame loop.

use apollo_config::Config;
use apollo_quadsphere::Frustum;
use glam::{Mat4, Vec3};

/// Closest approach as a multiple of the sphere radius.
const CLOSEST_APPROACH: f32 = 1.15;

/// Orbits the sphere center while slowly zooming in toward the surface and
/// back out, so every frame sees a different mix of visible faces.
#[derive(Clone, Debug)]
pub struct OrbitCamera {
    far_distance: f32,
    near_distance: f32,
    fov_y: f32,
    aspect: f32,
    near: f32,
    far: f32,
    orbit_speed: f32,
}

impl OrbitCamera {
    pub fn from_config(config: &Config) -> Self {
        let camera = &config.camera;
        let window = &config.window;
        Self {
            far_distance: camera.start_distance,
            near_distance: (config.sphere.radius() * CLOSEST_APPROACH).min(camera.start_distance),
            fov_y: camera.fov_degrees.to_radians(),
            aspect: window.width.max(1) as f32 / window.height.max(1) as f32,
            near: camera.near,
            far: camera.far,
            orbit_speed: camera.orbit_speed,
        }
    }

    /// Eye position at `time` seconds.
    pub fn eye(&self, time: f32) -> Vec3 {
        let yaw = time * self.orbit_speed;
        let pitch = 0.37 * (time * self.orbit_speed * 0.5).sin();
        let zoom = 0.5 + 0.5 * (time * self.orbit_speed * 0.3).cos();
        let distance = self.near_distance + (self.far_distance - self.near_distance) * zoom;
        Vec3::new(
            distance * pitch.cos() * yaw.sin(),
            distance * pitch.sin(),
            -distance * pitch.cos() * yaw.cos(),
        )
    }

    /// The far plane passes through the sphere center, so the hemisphere
    /// facing away from the camera is clipped. `camera.far` caps it.
    pub fn far_plane(&self, eye: Vec3) -> f32 {
        eye.length().min(self.far).max(self.near * 2.0)
    }

    pub fn view_proj(&self, time: f32) -> Mat4 {
        let eye = self.eye(time);
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far_plane(eye));
        proj * view
    }

    pub fn frustum(&self, time: f32) -> Frustum {
        Frustum::from_view_projection(&self.view_proj(time))
    }
}
