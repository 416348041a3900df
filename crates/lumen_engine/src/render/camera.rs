//! 3D perspective camera
//!
//! Position/target/up camera producing the view and projection matrices the
//! matrix pipeline consumes. Matrices are computed on demand; the pipeline's
//! dirty tracking is the caching layer, not the camera.

use crate::foundation::math::{Mat4, Mat4Ext, Vec3};

/// 3D camera for perspective projection
///
/// Uses a right-handed Y-up coordinate system: X+ right, Y+ up, looking down
/// -Z in view space.
#[derive(Debug, Clone)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,

    /// Point the camera is looking at in world space
    pub target: Vec3,

    /// Up vector for camera orientation (typically [0, 1, 0])
    pub up: Vec3,

    /// Field of view angle in radians
    pub fov: f32,

    /// Aspect ratio (width / height)
    pub aspect: f32,

    /// Distance to near clipping plane
    pub near: f32,

    /// Distance to far clipping plane
    pub far: f32,
}

impl Camera {
    /// Create a perspective camera looking at the origin
    pub fn perspective(position: Vec3, fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position,
            target: Vec3::zeros(),
            up: Vec3::y(),
            fov: fov_degrees.to_radians(),
            aspect,
            near,
            far,
        }
    }

    /// Point the camera at a target
    pub fn look_at(&mut self, target: Vec3) {
        self.target = target;
    }

    /// Update the aspect ratio after a viewport resize
    pub fn set_aspect(&mut self, width: u32, height: u32) {
        if height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    /// World-to-camera view matrix
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at(self.position, self.target, self.up)
    }

    /// Camera-to-clip projection matrix
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective(self.fov, self.aspect, self.near, self.far)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::perspective(Vec3::new(0.0, 0.0, 5.0), 60.0, 4.0 / 3.0, 0.1, 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn set_aspect_tracks_viewport() {
        let mut camera = Camera::default();
        camera.set_aspect(1920, 1080);
        assert_relative_eq!(camera.aspect, 1920.0 / 1080.0);
        // Degenerate height leaves the aspect untouched
        camera.set_aspect(100, 0);
        assert_relative_eq!(camera.aspect, 1920.0 / 1080.0);
    }

    #[test]
    fn view_matrix_centers_the_target() {
        let camera = Camera::perspective(Vec3::new(0.0, 0.0, 10.0), 60.0, 1.0, 0.1, 100.0);
        let viewed = camera
            .view_matrix()
            .transform_point(&nalgebra::Point3::origin());
        assert_relative_eq!(viewed.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(viewed.y, 0.0, epsilon = 1e-6);
        assert!(viewed.z < 0.0);
    }
}
