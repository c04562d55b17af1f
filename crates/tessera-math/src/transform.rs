use glam::Mat4;

/// Invert `m`, returning `None` when it is singular or contains non-finite values.
pub fn try_inverse(m: &Mat4) -> Option<Mat4> {
    let det = m.determinant();
    if !det.is_finite() || det.abs() <= f32::MIN_POSITIVE {
        return None;
    }
    let inv = m.inverse();
    inv.is_finite().then_some(inv)
}

/// Exact element-wise comparison. Camera change detection compares the
/// matrices a caller hands in each frame, so any bit change counts.
pub fn matrices_equal(a: &Mat4, b: &Mat4) -> bool {
    a.to_cols_array() == b.to_cols_array()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_inverse_of_translation() {
        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let inv = try_inverse(&m).unwrap();
        assert_eq!(inv.transform_point3(Vec3::new(1.0, 2.0, 3.0)), Vec3::ZERO);
    }

    #[test]
    fn test_singular_matrix_has_no_inverse() {
        let m = Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0));
        assert!(try_inverse(&m).is_none());
        assert!(try_inverse(&Mat4::NAN).is_none());
    }

    #[test]
    fn test_matrices_equal() {
        let a = Mat4::from_translation(Vec3::X);
        assert!(matrices_equal(&a, &a.clone()));
        assert!(!matrices_equal(&a, &Mat4::IDENTITY));
    }
}
