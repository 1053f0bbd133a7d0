//! Closed-form point set registration (Umeyama).
//!
//! Finds `s, R, t` minimizing `Σ |q_i - (s·R·p_i + t)|²` over paired
//! positions, with an optional restriction of `R` to a yaw about +z.

use nalgebra::{Rotation3, Vector3};

use crate::config::{AlignmentConfig, RotationConstraint};
use crate::error::{EvalError, EvalResult};
use crate::geometry::centroid;
use crate::types::{Mat3, Mat4, Pose, PoseSequence, Rot3, Vec3};

/// Minimum number of correspondences for a well posed problem
pub const MIN_POINTS: usize = 3;

/// Relative singular value threshold below which a direction is ignored
const RANK_TOLERANCE: f64 = 1e-10;

/// Similarity transform `p ↦ s·R·p + t`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlignmentTransform {
    pub rotation: Rot3,
    pub translation: Vec3,
    pub scale: f64,
}

impl AlignmentTransform {
    pub fn identity() -> Self {
        AlignmentTransform {
            rotation: Rot3::identity(),
            translation: Vec3::zeros(),
            scale: 1.0,
        }
    }

    pub fn from_scale(scale: f64) -> Self {
        AlignmentTransform {
            scale,
            ..Self::identity()
        }
    }

    pub fn transform_point(&self, p: &Vec3) -> Vec3 {
        self.rotation * p * self.scale + self.translation
    }

    pub fn transform_pose(&self, pose: &Pose) -> Pose {
        Pose::new(
            pose.timestamp,
            self.transform_point(&pose.translation),
            self.rotation * pose.rotation,
        )
    }

    /// Rigid transform taking `from` onto `to`
    pub fn between(from: &Pose, to: &Pose) -> Self {
        let tf = to.isometry() * from.isometry().inverse();
        AlignmentTransform {
            rotation: tf.rotation,
            translation: tf.translation.vector,
            scale: 1.0,
        }
    }

    /// `self` first, then `after`
    pub fn followed_by(&self, after: &AlignmentTransform) -> Self {
        AlignmentTransform {
            rotation: after.rotation * self.rotation,
            translation: after.transform_point(&self.translation),
            scale: after.scale * self.scale,
        }
    }

    /// Transform every pose of a sequence
    pub fn apply(&self, sequence: &PoseSequence) -> PoseSequence {
        sequence.map_poses(|p| self.transform_pose(p))
    }

    /// Homogeneous Sim(3) matrix
    pub fn to_homogeneous(&self) -> Mat4 {
        let mut m = Mat4::identity();
        let sr = self.rotation.to_rotation_matrix().into_inner() * self.scale;
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&sr);
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }
}

/// Umeyama alignment of `source` (estimate) onto `target` (reference).
pub fn umeyama(
    source: &[Vec3],
    target: &[Vec3],
    with_scale: bool,
    constraint: RotationConstraint,
) -> EvalResult<AlignmentTransform> {
    if source.len() != target.len() {
        return Err(EvalError::InvalidConfiguration(format!(
            "point sets differ in size ({} vs {})",
            source.len(),
            target.len()
        )));
    }
    let n = source.len();
    if n < MIN_POINTS {
        return Err(EvalError::InsufficientPoints {
            points: n,
            required: MIN_POINTS,
        });
    }

    let mu_p = centroid(source);
    let mu_q = centroid(target);
    let centered: Vec<(Vec3, Vec3)> = source
        .iter()
        .zip(target)
        .map(|(p, q)| (p - mu_p, q - mu_q))
        .collect();
    let var_p = centered.iter().map(|(p, _)| p.norm_squared()).sum::<f64>() / n as f64;

    let (rotation, scale) = match constraint {
        RotationConstraint::None => rotation_3d(&centered, var_p, with_scale)?,
        RotationConstraint::YawOnly => rotation_yaw(&centered, with_scale)?,
    };

    Ok(AlignmentTransform {
        rotation,
        translation: mu_q - rotation * mu_p * scale,
        scale,
    })
}

fn rotation_3d(
    centered: &[(Vec3, Vec3)],
    var_p: f64,
    with_scale: bool,
) -> EvalResult<(Rot3, f64)> {
    let n = centered.len();
    let sigma = centered
        .iter()
        .fold(Mat3::zeros(), |acc, (p, q)| acc + p * q.transpose())
        / n as f64;

    let svd = sigma.svd(true, true);
    let d = svd.singular_values;
    let degenerate = || EvalError::AlignmentDegenerate {
        points: n,
        singular_values: [d[0], d[1], d[2]],
    };

    let d_max = d.max();
    let threshold = f64::EPSILON.max(d_max * RANK_TOLERANCE);
    if d.iter().filter(|&&v| v > threshold).count() < 2 || var_p <= 0.0 {
        return Err(degenerate());
    }
    let u = svd.u.ok_or_else(degenerate)?;
    let v = svd.v_t.ok_or_else(degenerate)?.transpose();

    // Reflection fix on the weakest direction
    let mut s = Vector3::new(1.0, 1.0, 1.0);
    if u.determinant() * v.determinant() < 0.0 {
        s[d.imin()] = -1.0;
    }

    let r = v * Mat3::from_diagonal(&s) * u.transpose();
    let rotation = Rot3::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r));
    let scale = if with_scale { d.dot(&s) / var_p } else { 1.0 };
    Ok((rotation, scale))
}

/// Planar variant: rotation about +z from the horizontal correlation.
fn rotation_yaw(centered: &[(Vec3, Vec3)], with_scale: bool) -> EvalResult<(Rot3, f64)> {
    let (mut a, mut b) = (0.0, 0.0);
    let (mut norm_p, mut norm_q) = (0.0, 0.0);
    for (p, q) in centered {
        a += p.x * q.x + p.y * q.y;
        b += p.x * q.y - p.y * q.x;
        norm_p += p.x * p.x + p.y * p.y;
        norm_q += q.x * q.x + q.y * q.y;
    }

    // Cauchy-Schwarz bound of the correlation magnitude
    let bound = (norm_p * norm_q).sqrt();
    let magnitude = a.hypot(b);
    if bound <= 0.0 || magnitude <= bound * RANK_TOLERANCE {
        return Err(EvalError::AlignmentDegenerate {
            points: centered.len(),
            singular_values: [magnitude, 0.0, 0.0],
        });
    }

    let rotation = Rot3::from_axis_angle(&Vector3::z_axis(), b.atan2(a));
    let scale = if with_scale {
        let (num, den) = centered.iter().fold((0.0, 0.0), |(num, den), (p, q)| {
            (num + q.dot(&(rotation * p)), den + p.norm_squared())
        });
        num / den
    } else {
        1.0
    };
    Ok((rotation, scale))
}

/// Solve the alignment the configuration asks for on paired sequences.
///
/// Returns `None` when alignment is disabled. In scale-only mode the full
/// Sim(3) problem is solved and only its scale is kept. Origin alignment is
/// composed after the Umeyama transform, so the first aligned estimate pose
/// coincides with the first reference pose.
pub fn align_sequences(
    estimate: &PoseSequence,
    reference: &PoseSequence,
    config: &AlignmentConfig,
) -> EvalResult<Option<AlignmentTransform>> {
    if !config.is_enabled() {
        return Ok(None);
    }
    let transform = if config.umeyama_enabled() {
        solve_umeyama(estimate, reference, config)?
    } else {
        AlignmentTransform::identity()
    };
    if !config.align_origin {
        return Ok(Some(transform));
    }

    let (first_est, first_ref) = match (estimate.poses().first(), reference.poses().first()) {
        (Some(e), Some(r)) => (e, r),
        _ => {
            return Err(EvalError::InsufficientPoints {
                points: 0,
                required: 1,
            })
        }
    };
    let origin = AlignmentTransform::between(&transform.transform_pose(first_est), first_ref);
    log::debug!(
        "Aligned origin of '{}' to '{}': translation {:?}",
        estimate.name(),
        reference.name(),
        origin.translation.as_slice()
    );
    Ok(Some(transform.followed_by(&origin)))
}

fn solve_umeyama(
    estimate: &PoseSequence,
    reference: &PoseSequence,
    config: &AlignmentConfig,
) -> EvalResult<AlignmentTransform> {
    let mut source = estimate.positions();
    let mut target = reference.positions();
    if let Some(n) = config.n_to_align {
        source.truncate(n);
        target.truncate(n);
        log::debug!("Using the first {} of {} poses for alignment", source.len(), estimate.len());
    }
    let transform = umeyama(
        &source,
        &target,
        config.correct_scale,
        config.rotation_constraint,
    )?;

    if config.scale_only() {
        log::debug!("Correcting scale of '{}' by {:.6}", estimate.name(), transform.scale);
        return Ok(AlignmentTransform::from_scale(transform.scale));
    }

    log::debug!(
        "Aligned '{}' to '{}' {}: rotation angle {:.6} rad, translation {:?}, scale {:.6}",
        estimate.name(),
        reference.name(),
        config.describe(),
        transform.rotation.angle(),
        transform.translation.as_slice(),
        transform.scale
    );
    Ok(transform)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Deterministic, well spread point cloud
    fn cloud(n: usize) -> Vec<Vec3> {
        (0..n)
            .map(|k| {
                let t = k as f64;
                Vec3::new((0.7 * t).sin() * 3.0 + t * 0.1, (1.3 * t).cos() * 2.0, (0.4 * t).sin())
            })
            .collect()
    }

    fn transformed(points: &[Vec3], tf: &AlignmentTransform) -> Vec<Vec3> {
        points.iter().map(|p| tf.transform_point(p)).collect()
    }

    fn residual_sse(source: &[Vec3], target: &[Vec3], tf: &AlignmentTransform) -> f64 {
        source
            .iter()
            .zip(target)
            .map(|(p, q)| (q - tf.transform_point(p)).norm_squared())
            .sum()
    }

    #[test]
    fn test_self_alignment_is_identity() {
        let p = cloud(40);
        let tf = umeyama(&p, &p, true, RotationConstraint::None).unwrap();
        assert_relative_eq!(tf.rotation.angle(), 0.0, epsilon = 1e-9);
        assert_relative_eq!(tf.translation, Vec3::zeros(), epsilon = 1e-9);
        assert_relative_eq!(tf.scale, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_recovers_similarity_transform() {
        let truth = AlignmentTransform {
            rotation: Rot3::from_euler_angles(0.3, -0.2, 1.1),
            translation: Vec3::new(1.0, -2.0, 3.0),
            scale: 2.5,
        };
        let p = cloud(50);
        let q = transformed(&p, &truth);

        let tf = umeyama(&p, &q, true, RotationConstraint::None).unwrap();
        assert_relative_eq!(tf.scale, 2.5, epsilon = 1e-6);
        assert_relative_eq!(tf.rotation.angle_to(&truth.rotation), 0.0, epsilon = 1e-9);
        assert_relative_eq!(tf.translation, truth.translation, epsilon = 1e-6);

        let rigid = umeyama(&p, &q, false, RotationConstraint::None).unwrap();
        assert_eq!(rigid.scale, 1.0);
        assert_relative_eq!(rigid.rotation.angle_to(&truth.rotation), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_alignment_reduces_residual() {
        let truth = AlignmentTransform {
            rotation: Rot3::from_euler_angles(0.0, 0.1, -0.6),
            translation: Vec3::new(0.5, 0.5, 0.0),
            scale: 1.0,
        };
        let p = cloud(30);
        let q: Vec<Vec3> = transformed(&p, &truth)
            .iter()
            .enumerate()
            .map(|(k, q)| q + Vec3::new(0.01 * (k as f64).sin(), 0.0, -0.01 * (k as f64).cos()))
            .collect();

        let tf = umeyama(&p, &q, false, RotationConstraint::None).unwrap();
        let before = residual_sse(&p, &q, &AlignmentTransform::identity());
        let after = residual_sse(&p, &q, &tf);
        assert!(after <= before);
        assert!(after < 0.01);
    }

    #[test]
    fn test_planar_points_are_not_degenerate() {
        let p: Vec<Vec3> = cloud(20).iter().map(|v| Vec3::new(v.x, v.y, 0.0)).collect();
        let truth = AlignmentTransform {
            rotation: Rot3::from_axis_angle(&Vector3::z_axis(), 0.8),
            ..AlignmentTransform::identity()
        };
        let tf = umeyama(&p, &transformed(&p, &truth), false, RotationConstraint::None).unwrap();
        assert_relative_eq!(tf.rotation.angle_to(&truth.rotation), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_mirrored_points_still_give_a_rotation() {
        let p = cloud(25);
        let q: Vec<Vec3> = p.iter().map(|v| Vec3::new(v.x, v.y, -v.z)).collect();
        let tf = umeyama(&p, &q, false, RotationConstraint::None).unwrap();
        let r = tf.rotation.to_rotation_matrix().into_inner();
        assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_collinear_points_are_degenerate() {
        let p: Vec<Vec3> = (0..10).map(|k| Vec3::new(k as f64, 2.0 * k as f64, 0.0)).collect();
        let err = umeyama(&p, &p, false, RotationConstraint::None).unwrap_err();
        assert!(matches!(err, EvalError::AlignmentDegenerate { points: 10, .. }));

        let same = vec![Vec3::new(1.0, 1.0, 1.0); 5];
        assert!(umeyama(&same, &same, true, RotationConstraint::YawOnly).is_err());
    }

    #[test]
    fn test_too_few_points() {
        let p = cloud(2);
        let err = umeyama(&p, &p, false, RotationConstraint::None).unwrap_err();
        assert_eq!(
            err,
            EvalError::InsufficientPoints {
                points: 2,
                required: 3
            }
        );
    }

    #[test]
    fn test_yaw_only_recovers_pure_yaw() {
        let truth = AlignmentTransform {
            rotation: Rot3::from_axis_angle(&Vector3::z_axis(), -2.4),
            translation: Vec3::new(4.0, 1.0, -0.5),
            scale: 0.8,
        };
        let p = cloud(30);
        let q = transformed(&p, &truth);

        let tf = umeyama(&p, &q, true, RotationConstraint::YawOnly).unwrap();
        assert_relative_eq!(tf.rotation.angle_to(&truth.rotation), 0.0, epsilon = 1e-9);
        assert_relative_eq!(tf.scale, 0.8, epsilon = 1e-6);
        assert_relative_eq!(tf.translation, truth.translation, epsilon = 1e-6);
    }

    #[test]
    fn test_yaw_only_ignores_tilt() {
        let tilt = Rot3::from_euler_angles(0.2, 0.0, 0.5);
        let p = cloud(30);
        let q: Vec<Vec3> = p.iter().map(|v| tilt * v).collect();
        let tf = umeyama(&p, &q, false, RotationConstraint::YawOnly).unwrap();
        let axis = tf.rotation.axis().map(|a| a.into_inner()).unwrap_or_else(Vec3::z);
        assert_relative_eq!(axis.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(axis.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_apply_composes_rotation() {
        let tf = AlignmentTransform {
            rotation: Rot3::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_2),
            translation: Vec3::new(1.0, 0.0, 0.0),
            scale: 2.0,
        };
        let pose = Pose::new(3.0, Vec3::new(1.0, 0.0, 0.0), Rot3::identity());
        let moved = tf.transform_pose(&pose);
        assert_eq!(moved.timestamp, 3.0);
        assert_relative_eq!(moved.translation, Vec3::new(1.0, 2.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(moved.rotation.angle(), std::f64::consts::FRAC_PI_2, epsilon = 1e-12);

        let m = tf.to_homogeneous();
        assert_relative_eq!(m[(1, 0)], 2.0, epsilon = 1e-12);
        assert_relative_eq!(m[(0, 3)], 1.0);
    }

    #[test]
    fn test_disabled_and_scale_only_modes() {
        let poses: Vec<Pose> = cloud(10)
            .into_iter()
            .enumerate()
            .map(|(k, p)| Pose::new(k as f64, p, Rot3::identity()))
            .collect();
        let gt = PoseSequence::new("gt", poses).unwrap();
        let est = AlignmentTransform {
            rotation: Rot3::from_euler_angles(0.0, 0.0, 0.3),
            translation: Vec3::new(1.0, 1.0, 1.0),
            scale: 0.5,
        }
        .apply(&gt);

        assert!(align_sequences(&est, &gt, &AlignmentConfig::default())
            .unwrap()
            .is_none());

        let only_scale = AlignmentConfig {
            correct_scale: true,
            ..AlignmentConfig::default()
        };
        let tf = align_sequences(&est, &gt, &only_scale).unwrap().unwrap();
        assert_relative_eq!(tf.scale, 2.0, epsilon = 1e-6);
        assert_eq!(tf.rotation, Rot3::identity());
        assert_eq!(tf.translation, Vec3::zeros());
    }

    fn cloud_sequence(name: &str, n: usize) -> PoseSequence {
        let poses = cloud(n)
            .into_iter()
            .enumerate()
            .map(|(k, p)| Pose::new(k as f64, p, Rot3::from_euler_angles(0.0, 0.1 * k as f64, 0.0)))
            .collect();
        PoseSequence::new(name, poses).unwrap()
    }

    #[test]
    fn test_n_to_align_uses_leading_poses_only() {
        let gt = cloud_sequence("gt", 30);
        let truth = AlignmentTransform {
            rotation: Rot3::from_euler_angles(0.1, 0.0, 0.7),
            translation: Vec3::new(-1.0, 2.0, 0.0),
            scale: 1.0,
        };
        // Only the first 10 poses follow the rigid transform, the tail drifts
        let est = truth.apply(&gt).map_poses(|p| {
            let drift = (p.timestamp - 9.0).max(0.0);
            Pose::new(p.timestamp, p.translation + Vec3::new(drift, drift, 0.0), p.rotation)
        });
        let inverse = AlignmentTransform {
            rotation: truth.rotation.inverse(),
            translation: -(truth.rotation.inverse() * truth.translation),
            scale: 1.0,
        };

        let head = AlignmentConfig {
            align: true,
            n_to_align: Some(10),
            ..AlignmentConfig::default()
        };
        let tf = align_sequences(&est, &gt, &head).unwrap().unwrap();
        assert_relative_eq!(tf.rotation.angle_to(&inverse.rotation), 0.0, epsilon = 1e-9);
        assert_relative_eq!(tf.translation, inverse.translation, epsilon = 1e-9);

        let all = AlignmentConfig {
            n_to_align: None,
            ..head
        };
        let tf_all = align_sequences(&est, &gt, &all).unwrap().unwrap();
        assert!(tf_all.translation.metric_distance(&inverse.translation) > 1e-3);

        let too_few = AlignmentConfig {
            n_to_align: Some(2),
            ..head
        };
        assert!(matches!(
            align_sequences(&est, &gt, &too_few),
            Err(EvalError::InsufficientPoints { points: 2, .. })
        ));
    }

    #[test]
    fn test_align_origin_maps_first_pose() {
        let gt = cloud_sequence("gt", 12);
        let est = AlignmentTransform {
            rotation: Rot3::from_euler_angles(0.3, -0.1, 1.2),
            translation: Vec3::new(5.0, -3.0, 1.0),
            scale: 1.0,
        }
        .apply(&gt)
        .map_poses(|p| Pose::new(p.timestamp, p.translation * 1.1, p.rotation));

        let origin_only = AlignmentConfig {
            align_origin: true,
            ..AlignmentConfig::default()
        };
        let tf = align_sequences(&est, &gt, &origin_only).unwrap().unwrap();
        assert_eq!(tf.scale, 1.0);
        let first = tf.transform_pose(&est.poses()[0]);
        assert_relative_eq!(first.translation, gt.poses()[0].translation, epsilon = 1e-9);
        assert_relative_eq!(first.rotation.angle_to(&gt.poses()[0].rotation), 0.0, epsilon = 1e-9);

        let sim3_then_origin = AlignmentConfig {
            align: true,
            correct_scale: true,
            align_origin: true,
            ..AlignmentConfig::default()
        };
        let tf = align_sequences(&est, &gt, &sim3_then_origin).unwrap().unwrap();
        let first = tf.transform_pose(&est.poses()[0]);
        assert_relative_eq!(first.translation, gt.poses()[0].translation, epsilon = 1e-9);
    }

    #[test]
    fn test_followed_by_matches_sequential_application() {
        let a = AlignmentTransform {
            rotation: Rot3::from_euler_angles(0.2, 0.0, 0.4),
            translation: Vec3::new(1.0, 0.0, -1.0),
            scale: 2.0,
        };
        let b = AlignmentTransform {
            rotation: Rot3::from_euler_angles(0.0, 0.5, 0.0),
            translation: Vec3::new(0.0, 3.0, 0.0),
            scale: 0.5,
        };
        let pose = Pose::new(0.0, Vec3::new(0.3, -0.7, 2.0), Rot3::from_euler_angles(0.1, 0.2, 0.3));
        let sequential = b.transform_pose(&a.transform_pose(&pose));
        let composed = a.followed_by(&b).transform_pose(&pose);
        assert_relative_eq!(sequential.translation, composed.translation, epsilon = 1e-12);
        assert_relative_eq!(sequential.rotation.angle_to(&composed.rotation), 0.0, epsilon = 1e-12);
    }
}
