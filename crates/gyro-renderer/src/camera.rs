use glam::{Mat4, Vec3};

/// Fixed camera looking at the origin, where the cube sits.
pub struct Camera {
    pub position: Vec3,
    /// Vertical field of view in degrees.
    pub fov_y_degrees: f32,
    /// Aspect ratio (width / height), kept in sync with the window.
    pub aspect_ratio: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn new(fov_y_degrees: f32) -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            fov_y_degrees,
            aspect_ratio: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }

    /// Update the aspect ratio from a surface size; zero sizes are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect_ratio = width as f32 / height as f32;
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, Vec3::ZERO, Vec3::Y)
    }

    /// Perspective projection matrix.
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.fov_y_degrees.to_radians(),
            self.aspect_ratio,
            self.near,
            self.far,
        )
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_projects_to_screen_centre() {
        let camera = Camera::new(75.0);
        let clip = camera.view_projection() * glam::Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-6);
        assert!(ndc.y.abs() < 1e-6);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn resize_ignores_zero_sizes() {
        let mut camera = Camera::new(75.0);
        camera.resize(800, 400);
        assert_eq!(camera.aspect_ratio, 2.0);
        camera.resize(0, 400);
        assert_eq!(camera.aspect_ratio, 2.0);
    }
}
