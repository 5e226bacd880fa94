use crate::orientation::OrientationState;
use crate::wireframe::{self, WireMesh};
use glam::{EulerRot, Mat4, Quat};
use std::f64::consts::TAU;

/// The single wireframe solid and its current rotation.
pub struct SceneSolid {
    pub mesh: WireMesh,
    pub rotation: Quat,
    /// Line colour, linear RGBA.
    pub color: [f32; 4],
}

impl SceneSolid {
    pub fn cube(half_extent: f32, color: [f32; 4]) -> Self {
        Self {
            mesh: wireframe::cube(half_extent),
            rotation: Quat::IDENTITY,
            color,
        }
    }

    /// Point the solid at `orientation` (intrinsic X, then Y, then Z).
    pub fn set_orientation(&mut self, orientation: OrientationState) {
        self.rotation = rotation_from(orientation);
    }

    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_quat(self.rotation)
    }
}

/// Rotation for a set of accumulated angles.
///
/// Angles are reduced modulo 2π in f64 before the f32 cast so long sessions
/// keep full precision. The accumulated state itself is not touched.
pub fn rotation_from(orientation: OrientationState) -> Quat {
    let wrap = |angle: f64| angle.rem_euclid(TAU) as f32;
    Quat::from_euler(
        EulerRot::XYZ,
        wrap(orientation.x),
        wrap(orientation.y),
        wrap(orientation.z),
    )
}
