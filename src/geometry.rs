//! Small SE(3)/SO(3) helpers shared by the aligner, delta selector and metrics.

use crate::types::{Mat3, Rot3, Se3, Vec3, SO3_TOLERANCE};

/// Geodesic angle of a rotation in `[0, π]` radians.
///
/// Uses `2·atan2(|v|, |w|)` instead of `acos((tr R - 1) / 2)`, which loses
/// precision for small angles.
pub fn rotation_angle(q: &Rot3) -> f64 {
    2.0 * q.imag().norm().atan2(q.scalar().abs())
}

/// `a⁻¹ · b`
pub fn relative_se3(a: &Se3, b: &Se3) -> Se3 {
    a.inverse() * b
}

/// Check determinant and orthonormality of a 3x3 matrix.
pub fn is_so3(m: &Mat3) -> bool {
    if m.iter().any(|v| !v.is_finite()) {
        return false;
    }
    let det_valid = (m.determinant() - 1.0).abs() <= SO3_TOLERANCE;
    let ortho = m.transpose() * m - Mat3::identity();
    let inv_valid = ortho.iter().all(|v| v.abs() <= SO3_TOLERANCE);
    det_valid && inv_valid
}

pub fn centroid(points: &[Vec3]) -> Vec3 {
    if points.is_empty() {
        return Vec3::zeros();
    }
    let sum = points.iter().fold(Vec3::zeros(), |acc, p| acc + p);
    sum / points.len() as f64
}

/// Discrete arc length of a point sequence.
pub fn arc_length(points: &[Vec3]) -> f64 {
    points.windows(2).map(|w| (w[1] - w[0]).norm()).sum()
}

/// Travelled distance from the first point, one entry per point.
pub fn accumulated_distances(points: &[Vec3]) -> Vec<f64> {
    let mut out = Vec::with_capacity(points.len());
    let mut total = 0.0;
    for (k, p) in points.iter().enumerate() {
        if k > 0 {
            total += (p - points[k - 1]).norm();
        }
        out.push(total);
    }
    out
}

/// Accumulated magnitude of the per-step relative rotation, one entry per
/// rotation, in radians.
pub fn accumulated_angles(rotations: &[Rot3]) -> Vec<f64> {
    let mut out = Vec::with_capacity(rotations.len());
    let mut total = 0.0;
    for (k, q) in rotations.iter().enumerate() {
        if k > 0 {
            total += rotation_angle(&(rotations[k - 1].inverse() * q));
        }
        out.push(total);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use std::f64::consts::PI;

    #[test]
    fn test_rotation_angle_small_and_large() {
        let small = Rot3::from_axis_angle(&Vector3::x_axis(), 1e-9);
        assert_relative_eq!(rotation_angle(&small), 1e-9, max_relative = 1e-6);

        let half_turn = Rot3::from_axis_angle(&Vector3::y_axis(), PI);
        assert_relative_eq!(rotation_angle(&half_turn), PI, epsilon = 1e-12);

        let negative = Rot3::from_axis_angle(&Vector3::z_axis(), -0.5);
        assert_relative_eq!(rotation_angle(&negative), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_is_so3() {
        let r = Rot3::from_euler_angles(0.1, -0.4, 2.0);
        assert!(is_so3(r.to_rotation_matrix().matrix()));

        let mut reflected = *r.to_rotation_matrix().matrix();
        reflected.column_mut(2).neg_mut();
        assert!(!is_so3(&reflected));

        assert!(!is_so3(&(Mat3::identity() * 2.0)));
    }

    #[test]
    fn test_arc_length_and_accumulated_distances() {
        let points = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(3.0, 4.0, 0.0),
            Vec3::new(3.0, 4.0, 2.0),
        ];
        assert_relative_eq!(arc_length(&points), 7.0);
        assert_eq!(accumulated_distances(&points), vec![0.0, 5.0, 7.0]);
        assert_eq!(arc_length(&[]), 0.0);
    }

    #[test]
    fn test_accumulated_angles_ignore_direction() {
        let z = Vector3::z_axis();
        let rotations = vec![
            Rot3::identity(),
            Rot3::from_axis_angle(&z, 0.3),
            Rot3::from_axis_angle(&z, 0.1),
        ];
        let acc = accumulated_angles(&rotations);
        assert_relative_eq!(acc[1], 0.3, epsilon = 1e-12);
        assert_relative_eq!(acc[2], 0.5, epsilon = 1e-12);
    }
}
