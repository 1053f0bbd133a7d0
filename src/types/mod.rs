pub mod linalg;

pub use linalg::*;

use std::ops::Range;

use nalgebra::{Quaternion, Rotation3, Translation3};

use crate::error::{EvalError, EvalResult};
use crate::geometry;

/// A timestamped rigid pose.
#[derive(Clone, Debug, PartialEq)]
pub struct Pose {
    /// Seconds
    pub timestamp: f64,
    pub rotation: Rot3,
    pub translation: Vec3,
}

impl Pose {
    pub fn new(timestamp: f64, translation: Vec3, rotation: Rot3) -> Self {
        Pose {
            timestamp,
            rotation,
            translation,
        }
    }

    /// Build from position and a (w, x, y, z) quaternion.
    ///
    /// The quaternion is normalized; callers that need to reject badly
    /// scaled quaternions check the norm first (see [`crate::tum`]).
    pub fn from_xyz_quat_wxyz(timestamp: f64, xyz: [f64; 3], wxyz: [f64; 4]) -> Self {
        let q = Quaternion::new(wxyz[0], wxyz[1], wxyz[2], wxyz[3]);
        Pose {
            timestamp,
            rotation: Rot3::from_quaternion(q),
            translation: Vec3::new(xyz[0], xyz[1], xyz[2]),
        }
    }

    /// Build from a rotation matrix, rejecting anything outside SO(3).
    pub fn from_rotation_matrix(timestamp: f64, translation: Vec3, r: &Mat3) -> EvalResult<Self> {
        if !geometry::is_so3(r) {
            return Err(EvalError::InvalidSequence {
                name: format!("pose at t={}", timestamp),
                reason: "rotation block is not in SO(3)".to_string(),
            });
        }
        let rotation = Rot3::from_rotation_matrix(&Rotation3::from_matrix_unchecked(*r));
        Ok(Pose {
            timestamp,
            rotation,
            translation,
        })
    }

    /// Build from a 4x4 homogeneous matrix, rejecting non-SE(3) input.
    pub fn from_homogeneous(timestamp: f64, m: &Mat4) -> EvalResult<Self> {
        let r: Mat3 = m.fixed_view::<3, 3>(0, 0).into_owned();
        let bottom_ok = m[(3, 0)] == 0.0 && m[(3, 1)] == 0.0 && m[(3, 2)] == 0.0 && m[(3, 3)] == 1.0;
        if !bottom_ok {
            return Err(EvalError::InvalidSequence {
                name: format!("pose at t={}", timestamp),
                reason: "last row must be [0, 0, 0, 1]".to_string(),
            });
        }
        Self::from_rotation_matrix(timestamp, Vec3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)]), &r)
    }

    pub fn from_isometry(timestamp: f64, iso: &Se3) -> Self {
        Pose {
            timestamp,
            rotation: iso.rotation,
            translation: iso.translation.vector,
        }
    }

    pub fn isometry(&self) -> Se3 {
        Se3::from_parts(Translation3::from(self.translation), self.rotation)
    }

    pub fn to_homogeneous(&self) -> Mat4 {
        self.isometry().to_homogeneous()
    }

    fn check(&self) -> Result<(), String> {
        if !self.timestamp.is_finite() {
            return Err(format!("non-finite timestamp {}", self.timestamp));
        }
        if self.translation.iter().any(|v| !v.is_finite()) {
            return Err(format!("non-finite position at t={}", self.timestamp));
        }
        let q = self.rotation.quaternion();
        if q.coords.iter().any(|v| !v.is_finite()) {
            return Err(format!("non-finite rotation at t={}", self.timestamp));
        }
        if (q.norm() - 1.0).abs() > SO3_TOLERANCE {
            return Err(format!(
                "rotation at t={} is not a unit quaternion (norm {})",
                self.timestamp,
                q.norm()
            ));
        }
        Ok(())
    }
}

/// Immutable, time-ordered sequence of poses.
///
/// Timestamps are finite and non-decreasing. Every operation that changes
/// the content returns a new sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct PoseSequence {
    name: String,
    poses: Vec<Pose>,
}

impl PoseSequence {
    /// Validate and wrap a pose list.
    pub fn new(name: impl Into<String>, poses: Vec<Pose>) -> EvalResult<Self> {
        let name = name.into();
        for (k, pose) in poses.iter().enumerate() {
            pose.check().map_err(|reason| EvalError::InvalidSequence {
                name: name.clone(),
                reason: format!("pose {}: {}", k, reason),
            })?;
            if k > 0 && pose.timestamp < poses[k - 1].timestamp {
                return Err(EvalError::InvalidSequence {
                    name,
                    reason: format!(
                        "timestamps decrease at index {} ({} after {})",
                        k,
                        pose.timestamp,
                        poses[k - 1].timestamp
                    ),
                });
            }
        }
        Ok(PoseSequence { name, poses })
    }

    /// Wrap poses derived from an already validated sequence.
    pub(crate) fn from_validated(name: String, poses: Vec<Pose>) -> Self {
        PoseSequence { name, poses }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn renamed(self, name: impl Into<String>) -> Self {
        PoseSequence {
            name: name.into(),
            poses: self.poses,
        }
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn poses(&self) -> &[Pose] {
        &self.poses
    }

    pub fn get(&self, index: usize) -> Option<&Pose> {
        self.poses.get(index)
    }

    pub fn timestamps(&self) -> Vec<f64> {
        self.poses.iter().map(|p| p.timestamp).collect()
    }

    pub fn positions(&self) -> Vec<Vec3> {
        self.poses.iter().map(|p| p.translation).collect()
    }

    pub fn rotations(&self) -> Vec<Rot3> {
        self.poses.iter().map(|p| p.rotation).collect()
    }

    pub fn isometries(&self) -> Vec<Se3> {
        self.poses.iter().map(Pose::isometry).collect()
    }

    /// Seconds between first and last pose (0 for fewer than two poses).
    pub fn duration(&self) -> f64 {
        match (self.poses.first(), self.poses.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0.0,
        }
    }

    /// Path length in meters
    pub fn path_length(&self) -> f64 {
        geometry::arc_length(&self.positions())
    }

    pub fn accumulated_distances(&self) -> Vec<f64> {
        geometry::accumulated_distances(&self.positions())
    }

    pub fn seconds_from_start(&self) -> Vec<f64> {
        let t0 = self.poses.first().map(|p| p.timestamp).unwrap_or(0.0);
        self.poses.iter().map(|p| p.timestamp - t0).collect()
    }

    /// Sub-sequence at the given indices.
    ///
    /// Indices must be strictly increasing and in range.
    pub fn select(&self, indices: &[usize]) -> EvalResult<PoseSequence> {
        let mut poses = Vec::with_capacity(indices.len());
        for (k, &i) in indices.iter().enumerate() {
            let pose = self.poses.get(i).ok_or_else(|| EvalError::InvalidSequence {
                name: self.name.clone(),
                reason: format!("index {} out of range for {} poses", i, self.poses.len()),
            })?;
            if k > 0 && i <= indices[k - 1] {
                return Err(EvalError::InvalidSequence {
                    name: self.name.clone(),
                    reason: format!(
                        "indices not increasing at position {} ({} after {})",
                        k,
                        i,
                        indices[k - 1]
                    ),
                });
            }
            poses.push(pose.clone());
        }
        Ok(PoseSequence::from_validated(self.name.clone(), poses))
    }

    /// At most `max_poses` evenly spaced poses, first and last included.
    pub fn downsample(&self, max_poses: usize) -> PoseSequence {
        let n = self.poses.len();
        if max_poses >= n {
            return self.clone();
        }
        let poses = match max_poses {
            0 => Vec::new(),
            1 => self.poses[..1].to_vec(),
            m => {
                let step = (n - 1) as f64 / (m - 1) as f64;
                (0..m)
                    .map(|k| self.poses[(k as f64 * step).floor() as usize].clone())
                    .collect()
            }
        };
        PoseSequence::from_validated(self.name.clone(), poses)
    }

    /// Keep the first pose, then every pose at which the motion since the
    /// last kept pose exceeds `distance` [m] or `angle_deg` [deg].
    ///
    /// Motion is accumulated over the skipped poses.
    pub fn motion_filter(&self, distance: f64, angle_deg: f64) -> PoseSequence {
        let mut kept = Vec::new();
        let mut travelled = 0.0;
        let mut turned = 0.0;
        for (k, pose) in self.poses.iter().enumerate() {
            if k == 0 {
                kept.push(pose.clone());
                continue;
            }
            let prev = &self.poses[k - 1];
            travelled += (pose.translation - prev.translation).norm();
            turned +=
                geometry::rotation_angle(&(prev.rotation.inverse() * pose.rotation)).to_degrees();
            if travelled > distance || turned > angle_deg {
                kept.push(pose.clone());
                travelled = 0.0;
                turned = 0.0;
            }
        }
        PoseSequence::from_validated(self.name.clone(), kept)
    }

    /// Contiguous sub-sequence, clamped to the sequence bounds.
    pub fn slice(&self, range: Range<usize>) -> PoseSequence {
        let end = range.end.min(self.poses.len());
        let start = range.start.min(end);
        PoseSequence::from_validated(self.name.clone(), self.poses[start..end].to_vec())
    }

    /// Apply a pose-wise map that keeps timestamps untouched.
    pub(crate) fn map_poses<F>(&self, f: F) -> PoseSequence
    where
        F: Fn(&Pose) -> Pose,
    {
        PoseSequence::from_validated(self.name.clone(), self.poses.iter().map(f).collect())
    }
}
