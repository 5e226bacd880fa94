//! Orientation cube rendering: the per-frame integration step, the
//! wireframe geometry and the wgpu pipeline that draws it.

pub mod camera;
pub mod orientation;
pub mod pipeline;
pub mod scene;
pub mod wireframe;
