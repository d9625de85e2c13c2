use glam::{Mat4, Vec3};

/// A perspective camera for viewing particle sets.
///
/// Provides position, orientation, field of view and clip planes. The particle
/// depth, thickness and composite programs all read its view and projection
/// matrices; see [`SurfaceReconstruction::set_camera`](crate::SurfaceReconstruction::set_camera).
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    pub fov: f32, // radians, vertical
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
            fov: std::f32::consts::FRAC_PI_2, // 90 degrees
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(mut self, x: f32, y: f32, z: f32) -> Self {
        self.position = Vec3::new(x, y, z);
        self
    }

    pub fn looking_at(mut self, target_x: f32, target_y: f32, target_z: f32) -> Self {
        let target = Vec3::new(target_x, target_y, target_z);
        self.forward = (target - self.position).normalize_or_zero();
        self
    }

    pub fn with_fov(mut self, fov_degrees: f32) -> Self {
        self.fov = fov_degrees.to_radians();
        self
    }

    pub fn with_clip(mut self, near: f32, far: f32) -> Self {
        self.near = near;
        self.far = far;
        self
    }

    /// Place the camera on a sphere around `target`, looking at it.
    ///
    /// `yaw` rotates around the world Y axis, `pitch` tilts above the horizon.
    /// Both are in radians.
    pub fn orbiting(mut self, target: Vec3, distance: f32, yaw: f32, pitch: f32) -> Self {
        let offset = Vec3::new(
            distance * pitch.cos() * yaw.sin(),
            distance * pitch.sin(),
            distance * pitch.cos() * yaw.cos(),
        );
        self.position = target + offset;
        self.forward = (-offset).normalize_or_zero();
        self
    }

    /// Compute the right vector from forward and up.
    pub fn right(&self) -> Vec3 {
        self.forward.cross(self.up).normalize_or_zero()
    }

    /// Recompute up to be orthogonal to forward and right.
    pub fn orthogonal_up(&self) -> Vec3 {
        self.right().cross(self.forward).normalize_or_zero()
    }

    /// World to camera space. The camera looks down its local -Z axis.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward, self.orthogonal_up())
    }

    /// Camera to clip space with a 0..1 depth range.
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov, aspect, self.near, self.far)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_camera_sees_origin_in_front() {
        let camera = Camera::default();
        let view_pos = camera.view_matrix().transform_point3(Vec3::ZERO);

        // Five units in front means view-space z of -5.
        assert!((view_pos.z + 5.0).abs() < 1e-5);
        assert!(view_pos.x.abs() < 1e-5);
        assert!(view_pos.y.abs() < 1e-5);
    }

    #[test]
    fn orbiting_faces_target() {
        let target = Vec3::new(1.0, 0.5, -2.0);
        let camera = Camera::new().orbiting(target, 4.0, 0.7, 0.3);

        assert!((camera.position.distance(target) - 4.0).abs() < 1e-4);
        let to_target = (target - camera.position).normalize();
        assert!(camera.forward.dot(to_target) > 0.9999);
    }

    #[test]
    fn projection_maps_near_and_far_to_unit_range() {
        let camera = Camera::new().with_clip(0.5, 50.0);
        let proj = camera.projection_matrix(1.0);

        let near = proj.project_point3(Vec3::new(0.0, 0.0, -0.5));
        let far = proj.project_point3(Vec3::new(0.0, 0.0, -50.0));
        assert!(near.z.abs() < 1e-5);
        assert!((far.z - 1.0).abs() < 1e-4);
    }
}
