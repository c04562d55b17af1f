//! Scripted camera flight: a descending spiral that ends inside the scene.

use std::f32::consts::TAU;

use glam::Vec3;
use tessera_lod::CameraState;

const FOV_Y: f32 = 60.0 * std::f32::consts::PI / 180.0;

/// Spiral around `center` from `4 * radius` out down to `0.25 * radius`,
/// making two turns over `frames` frames.
pub struct Flight {
    pub center: Vec3,
    pub radius: f32,
    pub frames: u32,
}

impl Flight {
    pub fn camera_at(&self, frame: u32) -> CameraState {
        let t = if self.frames <= 1 {
            0.0
        } else {
            frame.min(self.frames - 1) as f32 / (self.frames - 1) as f32
        };
        let distance = self.radius * (4.0 - 3.75 * t);
        let angle = t * 2.0 * TAU;
        let eye = self.center
            + Vec3::new(angle.cos() * distance, distance * 0.4, angle.sin() * distance);
        CameraState::look_at(
            eye,
            self.center,
            Vec3::Y,
            FOV_Y,
            16.0 / 9.0,
            0.1,
            self.radius * 20.0,
        )
    }
}
