use glam::{Mat4, Vec3};
use tessera_math::{matrices_equal, try_inverse};

use crate::CullError;

/// Perspective camera as seen by the culler.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraState {
    /// Camera-to-world transform.
    pub world: Mat4,
    pub projection: Mat4,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl CameraState {
    pub fn perspective(world: Mat4, fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            world,
            projection: Mat4::perspective_rh(fov_y, aspect, near, far),
            fov_y,
            aspect,
            near,
            far,
        }
    }

    /// Camera at `eye` looking at `target`.
    pub fn look_at(
        eye: Vec3,
        target: Vec3,
        up: Vec3,
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        let view = Mat4::look_at_rh(eye, target, up);
        Self::perspective(view.inverse(), fov_y, aspect, near, far)
    }

    pub fn position(&self) -> Vec3 {
        self.world.w_axis.truncate()
    }

    /// World-to-camera transform.
    pub fn view_matrix(&self) -> Result<Mat4, CullError> {
        try_inverse(&self.world).ok_or(CullError::NonInvertibleTransform { model: None })
    }

    /// Projection of the same camera cut off at `range`, or `None` when the
    /// range ends before the near plane.
    pub fn short_range_projection(&self, range: f32) -> Option<Mat4> {
        (range > self.near).then(|| Mat4::perspective_rh(self.fov_y, self.aspect, self.near, range))
    }

    /// True when both matrices are bit-identical to `other`'s.
    pub fn same_view(&self, other: &CameraState) -> bool {
        matrices_equal(&self.world, &other.world)
            && matrices_equal(&self.projection, &other.projection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> CameraState {
        CameraState::look_at(
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::ZERO,
            Vec3::Y,
            60f32.to_radians(),
            1.5,
            0.1,
            1000.0,
        )
    }

    /// The camera sits at the eye position.
    #[test]
    fn test_position_from_world_matrix() {
        assert!((camera().position() - Vec3::new(0.0, 0.0, 5.0)).length() < 1e-5);
    }

    /// The view matrix maps the eye to the origin.
    #[test]
    fn test_view_matrix_inverts_world() {
        let view = camera().view_matrix().unwrap();
        assert!(view.transform_point3(Vec3::new(0.0, 0.0, 5.0)).length() < 1e-5);
    }

    /// A zero world matrix cannot be inverted.
    #[test]
    fn test_degenerate_world_matrix() {
        let mut cam = camera();
        cam.world = Mat4::ZERO;
        assert_eq!(
            cam.view_matrix(),
            Err(CullError::NonInvertibleTransform { model: None })
        );
    }

    /// Moving the camera is detected; an identical copy is not.
    #[test]
    fn test_same_view() {
        let a = camera();
        let mut b = a;
        assert!(a.same_view(&b));
        b.world = Mat4::from_translation(Vec3::X) * b.world;
        assert!(!a.same_view(&b));
    }

    /// No near-field projection when the range is inside the near plane.
    #[test]
    fn test_short_range_projection() {
        let cam = camera();
        assert!(cam.short_range_projection(10.0).is_some());
        assert!(cam.short_range_projection(0.05).is_none());
    }
}
