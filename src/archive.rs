//! Versioned result archive, persisted as gzip-compressed JSON.
//!
//! An archive holds everything needed to report or compare a result without
//! recomputation: statistics, raw errors, both trajectories after alignment,
//! the association and alignment parameters and the exact configuration.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use nalgebra::Quaternion;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use crate::align::AlignmentTransform;
use crate::config::{DeltaConfig, EvalConfig};
use crate::error::ArchiveError;
use crate::metrics::{MetricKind, PoseRelation, Unit};
use crate::stats::{Statistics, StatisticsType};
use crate::sync::Association;
use crate::types::{IndexPair, Pose, PoseSequence, Rot3, Vec3, SO3_TOLERANCE};

pub const SCHEMA_VERSION: u32 = 1;

/// Flat pose record (quaternion stored x, y, z, w)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseRecord {
    pub t: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub qx: f64,
    pub qy: f64,
    pub qz: f64,
    pub qw: f64,
}

impl From<&Pose> for PoseRecord {
    fn from(pose: &Pose) -> Self {
        let q = pose.rotation.quaternion();
        PoseRecord {
            t: pose.timestamp,
            x: pose.translation.x,
            y: pose.translation.y,
            z: pose.translation.z,
            qx: q.i,
            qy: q.j,
            qz: q.k,
            qw: q.w,
        }
    }
}

impl PoseRecord {
    /// Rebuild the pose bit for bit; the stored quaternion is not renormalized.
    fn to_pose(&self) -> Result<Pose, String> {
        let values = [self.t, self.x, self.y, self.z, self.qx, self.qy, self.qz, self.qw];
        if values.iter().any(|v| !v.is_finite()) {
            return Err("non-finite value".to_string());
        }
        let q = Quaternion::new(self.qw, self.qx, self.qy, self.qz);
        if (q.norm() - 1.0).abs() > SO3_TOLERANCE {
            return Err(format!("quaternion norm {} is not 1", q.norm()));
        }
        Ok(Pose::new(
            self.t,
            Vec3::new(self.x, self.y, self.z),
            Rot3::new_unchecked(q),
        ))
    }
}

/// Alignment parameters, `None` in the archive when alignment was disabled
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignmentRecord {
    /// (x, y, z, w)
    pub rotation: (f64, f64, f64, f64),
    pub translation: (f64, f64, f64),
    pub scale: f64,
}

impl From<&AlignmentTransform> for AlignmentRecord {
    fn from(tf: &AlignmentTransform) -> Self {
        let q = tf.rotation.quaternion();
        AlignmentRecord {
            rotation: (q.i, q.j, q.k, q.w),
            translation: (tf.translation.x, tf.translation.y, tf.translation.z),
            scale: tf.scale,
        }
    }
}

impl From<&AlignmentRecord> for AlignmentTransform {
    fn from(rec: &AlignmentRecord) -> Self {
        let (x, y, z, w) = rec.rotation;
        AlignmentTransform {
            rotation: Rot3::new_unchecked(Quaternion::new(w, x, y, z)),
            translation: Vec3::new(rec.translation.0, rec.translation.1, rec.translation.2),
            scale: rec.scale,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssociationRecord {
    pub est_indices: Vec<usize>,
    pub ref_indices: Vec<usize>,
    pub max_diff: f64,
    pub offset: f64,
    pub largest_diff: f64,
    pub num_discarded: usize,
}

impl From<&Association> for AssociationRecord {
    fn from(a: &Association) -> Self {
        AssociationRecord {
            est_indices: a.est_indices.clone(),
            ref_indices: a.ref_indices.clone(),
            max_diff: a.max_diff_used,
            offset: a.offset,
            largest_diff: a.largest_diff,
            num_discarded: a.num_discarded,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultArchive {
    pub schema_version: u32,
    /// RFC 3339, UTC
    pub created_at: String,
    pub metric: MetricKind,
    pub title: String,
    pub ref_name: String,
    pub est_name: String,
    pub pose_relation: PoseRelation,
    pub unit: Unit,
    /// RPE only
    pub delta: Option<DeltaConfig>,
    pub statistics: Statistics,
    pub errors: Vec<f64>,
    pub error_timestamps: Vec<f64>,
    pub association: AssociationRecord,
    pub alignment: Option<AlignmentRecord>,
    /// RPE only, indices into the paired sequences
    pub delta_pairs: Option<Vec<IndexPair>>,
    pub reference: Vec<PoseRecord>,
    pub aligned_estimate: Vec<PoseRecord>,
    pub config: EvalConfig,
}

#[derive(Deserialize)]
struct SchemaHeader {
    schema_version: u32,
}

const IN_MEMORY: &str = "<in-memory>";

fn io_error(path: &str, e: std::io::Error) -> ArchiveError {
    ArchiveError::Io {
        path: path.to_string(),
        message: e.to_string(),
    }
}

fn check_records(trajectory: &str, records: &[PoseRecord]) -> Result<Vec<Pose>, ArchiveError> {
    let mut poses: Vec<Pose> = Vec::with_capacity(records.len());
    for (index, rec) in records.iter().enumerate() {
        let pose = rec.to_pose().map_err(|reason| ArchiveError::InvalidPose {
            trajectory: trajectory.to_string(),
            index,
            reason,
        })?;
        if let Some(prev) = poses.last() {
            if pose.timestamp < prev.timestamp {
                return Err(ArchiveError::InvalidPose {
                    trajectory: trajectory.to_string(),
                    index,
                    reason: format!("timestamp {} after {}", pose.timestamp, prev.timestamp),
                });
            }
        }
        poses.push(pose);
    }
    Ok(poses)
}

impl ResultArchive {
    pub fn pose_records(sequence: &PoseSequence) -> Vec<PoseRecord> {
        sequence.poses().iter().map(PoseRecord::from).collect()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ArchiveError> {
        let json = serde_json::to_string(self)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(json.as_bytes())
            .map_err(|e| io_error(IN_MEMORY, e))?;
        encoder.finish().map_err(|e| io_error(IN_MEMORY, e))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArchiveError> {
        Self::decode(bytes, IN_MEMORY)
    }

    fn decode(bytes: &[u8], origin: &str) -> Result<Self, ArchiveError> {
        let mut decoder = GzDecoder::new(bytes);
        let mut json = String::new();
        decoder
            .read_to_string(&mut json)
            .map_err(|e| io_error(origin, e))?;

        let header: SchemaHeader = serde_json::from_str(&json)?;
        if header.schema_version != SCHEMA_VERSION {
            return Err(ArchiveError::UnsupportedVersion {
                found: header.schema_version,
                supported: SCHEMA_VERSION,
            });
        }

        let archive: ResultArchive = serde_json::from_str(&json)?;
        check_records(&archive.ref_name, &archive.reference)?;
        check_records(&archive.est_name, &archive.aligned_estimate)?;
        Ok(archive)
    }

    /// Save as compressed JSON, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), ArchiveError> {
        let shown = path.display().to_string();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| io_error(&shown, e))?;
            }
        }
        let bytes = self.to_bytes()?;
        let mut file = File::create(path).map_err(|e| io_error(&shown, e))?;
        file.write_all(&bytes).map_err(|e| io_error(&shown, e))?;
        log::info!("Saved {} result to {}", self.metric, shown);
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ArchiveError> {
        let shown = path.display().to_string();
        let bytes = fs::read(path).map_err(|e| io_error(&shown, e))?;
        Self::decode(&bytes, &shown)
    }

    pub fn reference_sequence(&self) -> Result<PoseSequence, ArchiveError> {
        let poses = check_records(&self.ref_name, &self.reference)?;
        Ok(PoseSequence::from_validated(self.ref_name.clone(), poses))
    }

    pub fn aligned_estimate_sequence(&self) -> Result<PoseSequence, ArchiveError> {
        let poses = check_records(&self.est_name, &self.aligned_estimate)?;
        Ok(PoseSequence::from_validated(self.est_name.clone(), poses))
    }

    pub fn alignment_transform(&self) -> Option<AlignmentTransform> {
        self.alignment.as_ref().map(AlignmentTransform::from)
    }
}

/// Statistics of several archives side by side.
#[derive(Clone, Debug, PartialEq)]
pub struct ComparisonTable {
    pub rows: Vec<(String, Statistics)>,
    /// Set when every archive has the same metric, pose relation and unit
    pub common: Option<(MetricKind, PoseRelation, Unit)>,
}

impl ComparisonTable {
    pub fn new<'a, I>(archives: I) -> Self
    where
        I: IntoIterator<Item = (String, &'a ResultArchive)>,
    {
        let mut rows = Vec::new();
        let mut kinds = Vec::new();
        for (label, archive) in archives {
            rows.push((label, archive.statistics));
            kinds.push((archive.metric, archive.pose_relation, archive.unit));
        }
        let common = match kinds.first() {
            Some(&first) if kinds.iter().all(|&k| k == first) => Some(first),
            _ => None,
        };
        ComparisonTable { rows, common }
    }

    /// Label of the row with the smallest value of `stat`
    pub fn best(&self, stat: StatisticsType) -> Option<&str> {
        self.rows
            .iter()
            .min_by(|a, b| a.1.get(stat).total_cmp(&b.1.get(stat)))
            .map(|(label, _)| label.as_str())
    }

    pub fn render(&self, stats: &[StatisticsType]) -> String {
        let width = self
            .rows
            .iter()
            .map(|(label, _)| label.len())
            .max()
            .unwrap_or(0)
            .max(5);

        let mut out = String::new();
        if let Some((metric, relation, unit)) = self.common {
            out.push_str(&format!("{} w.r.t. {} ({})\n", metric, relation, unit));
        }
        out.push_str(&format!("{:<width$}", "label", width = width));
        for stat in stats {
            out.push_str(&format!(" {:>12}", stat.name()));
        }
        out.push('\n');
        for (label, s) in &self.rows {
            out.push_str(&format!("{:<width$}", label, width = width));
            for &stat in stats {
                out.push_str(&format!(" {:>12.6}", s.get(stat)));
            }
            out.push('\n');
        }
        out
    }
}
