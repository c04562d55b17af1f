//! View frustum extracted from a projection * view matrix, with conservative AABB tests.
//!
//! Clip space follows glam's `perspective_rh` convention: depth in `[0, 1]`,
//! near plane at z = 0.

use glam::{Mat4, Vec3, Vec4};

use crate::Aabb;

/// Plane indices into the frustum planes array.
const LEFT: usize = 0;
const RIGHT: usize = 1;
const BOTTOM: usize = 2;
const TOP: usize = 3;
const NEAR: usize = 4;
const FAR: usize = 5;

/// An oriented plane `normal.dot(p) + d = 0`. Points with a positive signed
/// distance are on the accepted side.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

impl Plane {
    /// Create a plane from a normal and the signed distance term. The normal is normalized.
    pub fn new(normal: Vec3, d: f32) -> Self {
        let len = normal.length();
        if len > 0.0 {
            Self {
                normal: normal / len,
                d: d / len,
            }
        } else {
            Self { normal, d }
        }
    }

    /// Plane through `point` facing along `normal`.
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let n = normal.normalize_or_zero();
        Self {
            normal: n,
            d: -n.dot(point),
        }
    }

    fn from_vec4(v: Vec4) -> Self {
        Self::new(v.truncate(), v.w)
    }

    /// Signed distance from the plane to `p`.
    pub fn distance_to_point(&self, p: Vec3) -> f32 {
        self.normal.dot(p) + self.d
    }

    /// The plane expressed in a model's local space, where `model_matrix` maps
    /// local points into this plane's space.
    pub fn to_local_space(&self, model_matrix: &Mat4) -> Plane {
        // (n, d) · (M p) = (Mᵀ (n, d)) · p
        let v = model_matrix.transpose() * self.normal.extend(self.d);
        Plane::from_vec4(v)
    }
}

/// A view frustum defined by six inward-pointing planes.
#[derive(Clone, Debug)]
pub struct Frustum {
    /// Six planes: left, right, bottom, top, near, far.
    planes: [Plane; 6],
}

impl Frustum {
    /// Extract frustum planes from a combined projection * view matrix
    /// using the Gribb-Hartmann method.
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let rows = [vp.row(0), vp.row(1), vp.row(2), vp.row(3)];

        let mut planes = [Plane::new(Vec3::ZERO, 0.0); 6];
        planes[LEFT] = Plane::from_vec4(rows[3] + rows[0]);
        planes[RIGHT] = Plane::from_vec4(rows[3] - rows[0]);
        planes[BOTTOM] = Plane::from_vec4(rows[3] + rows[1]);
        planes[TOP] = Plane::from_vec4(rows[3] - rows[1]);
        planes[NEAR] = Plane::from_vec4(rows[2]);
        planes[FAR] = Plane::from_vec4(rows[3] - rows[2]);

        Self { planes }
    }

    /// Frustum for a projection matrix and a view (world-to-camera) matrix.
    pub fn from_projection_view(projection: &Mat4, view: &Mat4) -> Self {
        Self::from_view_projection(&(*projection * *view))
    }

    pub fn planes(&self) -> &[Plane; 6] {
        &self.planes
    }

    /// Test whether an AABB is at least partially inside the frustum.
    ///
    /// Uses the p-vertex method: for each plane, find the corner of the AABB
    /// furthest along the plane normal. If that corner is behind the plane,
    /// the entire AABB is outside.
    ///
    /// Conservative: may return `true` for boxes fully outside near frustum
    /// corners, never `false` for a visible box.
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        for plane in &self.planes {
            let n = plane.normal;
            let p = Vec3::new(
                if n.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if n.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if n.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );
            if plane.distance_to_point(p) < 0.0 {
                return false;
            }
        }
        true
    }

    /// Returns `true` if the point lies inside all six planes.
    pub fn contains_point(&self, p: Vec3) -> bool {
        self.planes.iter().all(|plane| plane.distance_to_point(p) >= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_camera_vp(far: f32) -> Mat4 {
        let view = Mat4::look_to_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 16.0 / 9.0, 0.1, far);
        proj * view
    }

    #[test]
    fn test_object_in_front_visible() {
        let frustum = Frustum::from_view_projection(&default_camera_vp(1000.0));
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, -5.0), Vec3::new(1.0, 1.0, -3.0));
        assert!(frustum.intersects_aabb(&aabb));
    }

    #[test]
    fn test_object_behind_camera_not_visible() {
        let frustum = Frustum::from_view_projection(&default_camera_vp(1000.0));
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, 5.0), Vec3::new(1.0, 1.0, 10.0));
        assert!(!frustum.intersects_aabb(&aabb));
    }

    #[test]
    fn test_object_beyond_far_plane_not_visible() {
        let frustum = Frustum::from_view_projection(&default_camera_vp(10.0));
        let near = Aabb::new(Vec3::new(-1.0, -1.0, -9.0), Vec3::new(1.0, 1.0, -8.0));
        let far = Aabb::new(Vec3::new(-1.0, -1.0, -30.0), Vec3::new(1.0, 1.0, -20.0));
        assert!(frustum.intersects_aabb(&near));
        assert!(!frustum.intersects_aabb(&far));
    }

    #[test]
    fn test_object_far_to_the_side_not_visible() {
        let frustum = Frustum::from_view_projection(&default_camera_vp(1000.0));
        let aabb = Aabb::new(Vec3::new(1000.0, -1.0, -6.0), Vec3::new(1002.0, 1.0, -4.0));
        assert!(!frustum.intersects_aabb(&aabb));
    }

    #[test]
    fn test_camera_inside_box_is_visible() {
        let frustum = Frustum::from_view_projection(&default_camera_vp(1000.0));
        let aabb = Aabb::new(Vec3::splat(-50.0), Vec3::splat(50.0));
        assert!(frustum.intersects_aabb(&aabb));
    }

    #[test]
    fn test_contains_point() {
        let frustum = Frustum::from_view_projection(&default_camera_vp(100.0));
        assert!(frustum.contains_point(Vec3::new(0.0, 0.0, -10.0)));
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, 10.0)));
    }

    #[test]
    fn test_plane_signed_distance() {
        let plane = Plane::from_point_normal(Vec3::new(0.0, 2.0, 0.0), Vec3::Y);
        assert!((plane.distance_to_point(Vec3::new(5.0, 3.0, 1.0)) - 1.0).abs() < 1e-6);
        assert!(plane.distance_to_point(Vec3::ZERO) < 0.0);
    }

    #[test]
    fn test_plane_into_model_space() {
        // World plane y = 2 facing up; model translated by +1 in y.
        let plane = Plane::from_point_normal(Vec3::new(0.0, 2.0, 0.0), Vec3::Y);
        let model = Mat4::from_translation(Vec3::Y);
        let local = plane.to_local_space(&model);
        // Model-space point y = 1 maps to world y = 2 (on the plane).
        assert!(local.distance_to_point(Vec3::new(0.0, 1.0, 0.0)).abs() < 1e-6);
    }
}
