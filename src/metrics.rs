//! Absolute and relative pose error metrics.
//!
//! A pose relation decides how an SE(3) residual is reduced to one scalar.
//! The per-element kernel is picked once per evaluation from a fixed table,
//! the loops themselves are plain linear scans.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use ndarray::Array1;

use crate::config::DeltaUnit;
use crate::error::{EvalError, EvalResult};
use crate::geometry::{relative_se3, rotation_angle};
use crate::stats::ErrorArray;
use crate::types::{IndexPair, Mat3, Mat4, PoseSequence, Se3};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Absolute pose error
    Ape,
    /// Relative pose error
    Rpe,
}

impl MetricKind {
    pub fn label(self) -> &'static str {
        match self {
            MetricKind::Ape => "APE",
            MetricKind::Rpe => "RPE",
        }
    }
}

impl Display for MetricKind {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngleUnit {
    Radians,
    Degrees,
}

/// Unit of an error array
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Meters,
    Radians,
    Degrees,
    Unitless,
    Percent,
}

impl Unit {
    pub fn symbol(self) -> &'static str {
        match self {
            Unit::Meters => "m",
            Unit::Radians => "rad",
            Unit::Degrees => "deg",
            Unit::Unitless => "unit-less",
            Unit::Percent => "%",
        }
    }
}

impl Display for Unit {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// How a residual pose is reduced to a scalar error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseRelation {
    /// Norm of the residual translation
    TranslationPart,
    /// Geodesic angle of the residual rotation
    RotationPart(AngleUnit),
    /// `‖R - I₃‖_F` of the residual rotation
    RotationChordal,
    /// `‖E - I₄‖_F` of the full residual
    FullTransformation,
    /// Difference of positions (APE) or of travelled distances (RPE)
    PointDistance,
    /// RPE only: travelled distance error relative to the reference distance
    PointDistanceErrorRatio,
}

impl PoseRelation {
    pub fn unit(self) -> Unit {
        match self {
            PoseRelation::TranslationPart | PoseRelation::PointDistance => Unit::Meters,
            PoseRelation::RotationPart(AngleUnit::Radians) => Unit::Radians,
            PoseRelation::RotationPart(AngleUnit::Degrees) => Unit::Degrees,
            PoseRelation::RotationChordal | PoseRelation::FullTransformation => Unit::Unitless,
            PoseRelation::PointDistanceErrorRatio => Unit::Percent,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PoseRelation::TranslationPart => "translation part",
            PoseRelation::RotationPart(AngleUnit::Radians) => "rotation angle in radians",
            PoseRelation::RotationPart(AngleUnit::Degrees) => "rotation angle in degrees",
            PoseRelation::RotationChordal => "rotation part",
            PoseRelation::FullTransformation => "full transformation",
            PoseRelation::PointDistance => "point distance",
            PoseRelation::PointDistanceErrorRatio => "point distance error ratio",
        }
    }
}

impl Display for PoseRelation {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Per-element error kernel.
///
/// Receives the estimate and reference transform of one element: absolute
/// poses for APE, relative motions `T_i⁻¹·T_j` for RPE.
type Kernel = fn(&Se3, &Se3) -> f64;

fn residual(estimate: &Se3, reference: &Se3) -> Se3 {
    relative_se3(estimate, reference)
}

fn translation_error(estimate: &Se3, reference: &Se3) -> f64 {
    residual(estimate, reference).translation.vector.norm()
}

fn angle_rad_error(estimate: &Se3, reference: &Se3) -> f64 {
    rotation_angle(&residual(estimate, reference).rotation)
}

fn angle_deg_error(estimate: &Se3, reference: &Se3) -> f64 {
    angle_rad_error(estimate, reference).to_degrees()
}

fn chordal_error(estimate: &Se3, reference: &Se3) -> f64 {
    let r = residual(estimate, reference).rotation.to_rotation_matrix();
    (r.matrix() - Mat3::identity()).norm()
}

fn full_error(estimate: &Se3, reference: &Se3) -> f64 {
    (residual(estimate, reference).to_homogeneous() - Mat4::identity()).norm()
}

fn position_error(estimate: &Se3, reference: &Se3) -> f64 {
    (reference.translation.vector - estimate.translation.vector).norm()
}

fn distance_error(estimate: &Se3, reference: &Se3) -> f64 {
    (reference.translation.vector.norm() - estimate.translation.vector.norm()).abs()
}

fn distance_ratio_error(estimate: &Se3, reference: &Se3) -> f64 {
    100.0 * distance_error(estimate, reference) / reference.translation.vector.norm()
}

fn kernel(relation: PoseRelation, metric: MetricKind) -> Kernel {
    match (relation, metric) {
        (PoseRelation::TranslationPart, _) => translation_error,
        (PoseRelation::RotationPart(AngleUnit::Radians), _) => angle_rad_error,
        (PoseRelation::RotationPart(AngleUnit::Degrees), _) => angle_deg_error,
        (PoseRelation::RotationChordal, _) => chordal_error,
        (PoseRelation::FullTransformation, _) => full_error,
        (PoseRelation::PointDistance, MetricKind::Ape) => position_error,
        (PoseRelation::PointDistance, MetricKind::Rpe) => distance_error,
        (PoseRelation::PointDistanceErrorRatio, _) => distance_ratio_error,
    }
}

/// Reject relation / delta unit combinations without a meaning.
///
/// `delta_unit` is `None` for absolute errors.
pub fn check_relation(relation: PoseRelation, delta_unit: Option<DeltaUnit>) -> EvalResult<()> {
    let distance_based = matches!(
        relation,
        PoseRelation::PointDistance | PoseRelation::PointDistanceErrorRatio
    );
    if relation == PoseRelation::PointDistanceErrorRatio && delta_unit.is_none() {
        return Err(EvalError::InvalidPoseRelation {
            relation: relation.to_string(),
            reason: "only defined for relative pose errors".to_string(),
        });
    }
    if let (true, Some(unit)) = (distance_based, delta_unit) {
        if unit.is_angular() {
            return Err(EvalError::InvalidPoseRelation {
                relation: relation.to_string(),
                reason: format!(
                    "travelled distance is not defined over a delta measured in {}",
                    unit
                ),
            });
        }
    }
    Ok(())
}

fn check_lengths(reference: &PoseSequence, estimate: &PoseSequence) -> EvalResult<()> {
    if reference.len() != estimate.len() {
        return Err(EvalError::InvalidConfiguration(format!(
            "paired sequences differ in length: '{}' has {} poses, '{}' has {}",
            reference.name(),
            reference.len(),
            estimate.name(),
            estimate.len()
        )));
    }
    Ok(())
}

/// Absolute pose error of two paired sequences.
pub fn ape(
    reference: &PoseSequence,
    estimate: &PoseSequence,
    relation: PoseRelation,
) -> EvalResult<ErrorArray> {
    check_lengths(reference, estimate)?;
    check_relation(relation, None)?;
    let f = kernel(relation, MetricKind::Ape);
    let values: Array1<f64> = reference
        .poses()
        .iter()
        .zip(estimate.poses())
        .map(|(r, e)| f(&e.isometry(), &r.isometry()))
        .collect();
    Ok(ErrorArray::new(values, relation))
}

/// Relative pose error of two paired sequences over the given index pairs.
pub fn rpe(
    reference: &PoseSequence,
    estimate: &PoseSequence,
    pairs: &[IndexPair],
    relation: PoseRelation,
    delta_unit: DeltaUnit,
) -> EvalResult<ErrorArray> {
    check_lengths(reference, estimate)?;
    check_relation(relation, Some(delta_unit))?;
    if let Some(&(i, j)) = pairs.iter().find(|(i, j)| i >= j || *j >= reference.len()) {
        return Err(EvalError::InvalidConfiguration(format!(
            "index pair ({}, {}) is not ordered within {} poses",
            i,
            j,
            reference.len()
        )));
    }

    let f = kernel(relation, MetricKind::Rpe);
    let ref_poses = reference.isometries();
    let est_poses = estimate.isometries();
    let values = pairs
        .iter()
        .map(|&(i, j)| {
            let ref_motion = relative_se3(&ref_poses[i], &ref_poses[j]);
            let est_motion = relative_se3(&est_poses[i], &est_poses[j]);
            if relation == PoseRelation::PointDistanceErrorRatio
                && ref_motion.translation.vector.norm() <= f64::EPSILON
            {
                return Err(EvalError::InvalidPoseRelation {
                    relation: relation.to_string(),
                    reason: format!("reference does not move between poses {} and {}", i, j),
                });
            }
            Ok(f(&est_motion, &ref_motion))
        })
        .collect::<EvalResult<Vec<f64>>>()?;
    Ok(ErrorArray::new(Array1::from(values), relation))
}
