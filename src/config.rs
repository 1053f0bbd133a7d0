//! Immutable evaluation configuration.
//!
//! One `EvalConfig` value drives association, alignment, delta selection and
//! the metric, so an evaluation is reproducible from its inputs alone. It is
//! stored verbatim in every result archive.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::error::{EvalError, EvalResult};
use crate::metrics::PoseRelation;

/// Timestamp association parameters
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssociationConfig {
    /// Max. allowed absolute time difference [s]
    pub max_diff: f64,
    /// Added to the estimate's timestamps before matching [s]
    pub offset: f64,
}

impl Default for AssociationConfig {
    fn default() -> Self {
        AssociationConfig {
            max_diff: 0.01,
            offset: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationConstraint {
    None,
    /// Rotation about the vertical (+z) axis only
    YawOnly,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignmentConfig {
    /// Solve rotation + translation (Umeyama)
    pub align: bool,
    /// Solve scale too; without `align` only the scale is applied
    pub correct_scale: bool,
    pub rotation_constraint: RotationConstraint,
    /// Solve the Umeyama problem on the first N paired poses only
    #[serde(default)]
    pub n_to_align: Option<usize>,
    /// Map the estimate's first pose onto the reference's first pose,
    /// after any Umeyama alignment
    #[serde(default)]
    pub align_origin: bool,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        AlignmentConfig {
            align: false,
            correct_scale: false,
            rotation_constraint: RotationConstraint::None,
            n_to_align: None,
            align_origin: false,
        }
    }
}

impl AlignmentConfig {
    pub fn is_enabled(&self) -> bool {
        self.umeyama_enabled() || self.align_origin
    }

    /// Whether a Umeyama problem (full or scale-only) is solved
    pub fn umeyama_enabled(&self) -> bool {
        self.align || self.correct_scale
    }

    pub fn scale_only(&self) -> bool {
        self.correct_scale && !self.align
    }

    /// Human readable alignment mode, used in result titles
    pub fn describe(&self) -> &'static str {
        match (self.align, self.correct_scale) {
            (true, false) => "with SE(3) Umeyama alignment",
            (true, true) => "with Sim(3) Umeyama alignment",
            (false, true) => "scale corrected",
            (false, false) if self.align_origin => "with origin alignment",
            (false, false) => "not aligned",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaUnit {
    Frames,
    Seconds,
    Meters,
    Radians,
    Degrees,
}

impl DeltaUnit {
    pub fn is_angular(self) -> bool {
        matches!(self, DeltaUnit::Radians | DeltaUnit::Degrees)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            DeltaUnit::Frames => "frames",
            DeltaUnit::Seconds => "s",
            DeltaUnit::Meters => "m",
            DeltaUnit::Radians => "rad",
            DeltaUnit::Degrees => "deg",
        }
    }
}

impl Display for DeltaUnit {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Relative pose pairing parameters
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeltaConfig {
    pub delta: f64,
    pub unit: DeltaUnit,
    /// Accepted slack relative to `delta` (ignored for frames)
    pub rel_tolerance: f64,
    /// Overlapping pairs from every start index instead of consecutive windows
    pub all_pairs: bool,
    /// Select pairs on the paired reference instead of the aligned estimate
    #[serde(default)]
    pub pairs_from_reference: bool,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        DeltaConfig {
            delta: 1.0,
            unit: DeltaUnit::Frames,
            rel_tolerance: 0.1,
            all_pairs: false,
            pairs_from_reference: false,
        }
    }
}

impl DeltaConfig {
    pub fn validate(&self) -> EvalResult<()> {
        if !self.delta.is_finite() || self.delta <= 0.0 {
            return Err(EvalError::InvalidConfiguration(format!(
                "delta must be a positive number, got {}",
                self.delta
            )));
        }
        if self.unit == DeltaUnit::Frames && self.delta.fract() != 0.0 {
            return Err(EvalError::InvalidConfiguration(format!(
                "delta must be an integer for unit {}, got {}",
                self.unit, self.delta
            )));
        }
        if !self.rel_tolerance.is_finite() || self.rel_tolerance < 0.0 {
            return Err(EvalError::InvalidConfiguration(format!(
                "relative delta tolerance must be non-negative, got {}",
                self.rel_tolerance
            )));
        }
        Ok(())
    }

    /// Absolute slack in the delta unit
    pub fn tolerance(&self) -> f64 {
        match self.unit {
            DeltaUnit::Frames => 0.0,
            _ => self.delta * self.rel_tolerance,
        }
    }
}

/// Motion thresholds for [`crate::types::PoseSequence::motion_filter`]
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MotionFilter {
    /// Travelled distance [m]
    pub distance: f64,
    /// Accumulated rotation angle [deg]
    pub angle_deg: f64,
}

/// Reduction of both input sequences before association
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Keep at most this many evenly spaced poses
    pub downsample: Option<usize>,
    pub motion: Option<MotionFilter>,
}

impl FilterConfig {
    pub fn is_enabled(&self) -> bool {
        self.downsample.is_some() || self.motion.is_some()
    }

    pub fn validate(&self) -> EvalResult<()> {
        if self.downsample == Some(0) {
            return Err(EvalError::InvalidConfiguration(
                "cannot downsample to 0 poses".to_string(),
            ));
        }
        if let Some(m) = &self.motion {
            let ok = |v: f64| v.is_finite() && v >= 0.0;
            if !ok(m.distance) || !ok(m.angle_deg) {
                return Err(EvalError::InvalidConfiguration(format!(
                    "motion filter thresholds must be non-negative, got {} m and {} deg",
                    m.distance, m.angle_deg
                )));
            }
        }
        Ok(())
    }
}

/// Everything a single APE or RPE evaluation depends on
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvalConfig {
    pub pose_relation: PoseRelation,
    pub association: AssociationConfig,
    pub alignment: AlignmentConfig,
    /// Required for RPE, absent for APE
    pub delta: Option<DeltaConfig>,
    #[serde(default)]
    pub filter: FilterConfig,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            pose_relation: PoseRelation::TranslationPart,
            association: AssociationConfig::default(),
            alignment: AlignmentConfig::default(),
            delta: None,
            filter: FilterConfig::default(),
        }
    }
}

impl EvalConfig {
    pub fn with_delta(mut self, delta: DeltaConfig) -> Self {
        self.delta = Some(delta);
        self
    }

    pub fn with_alignment(mut self, alignment: AlignmentConfig) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_association(mut self, association: AssociationConfig) -> Self {
        self.association = association;
        self
    }

    pub fn with_filter(mut self, filter: FilterConfig) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_pose_relation(mut self, pose_relation: PoseRelation) -> Self {
        self.pose_relation = pose_relation;
        self
    }

    pub fn validate(&self) -> EvalResult<()> {
        let a = &self.association;
        if !a.max_diff.is_finite() || a.max_diff < 0.0 {
            return Err(EvalError::InvalidConfiguration(format!(
                "max. time difference must be non-negative, got {}",
                a.max_diff
            )));
        }
        if !a.offset.is_finite() {
            return Err(EvalError::InvalidConfiguration(format!(
                "time offset must be finite, got {}",
                a.offset
            )));
        }
        if let Some(delta) = &self.delta {
            delta.validate()?;
        }
        if self.alignment.n_to_align == Some(0) {
            return Err(EvalError::InvalidConfiguration(
                "cannot align on 0 poses".to_string(),
            ));
        }
        self.filter.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_modes() {
        let se3 = AlignmentConfig {
            align: true,
            ..AlignmentConfig::default()
        };
        assert!(se3.is_enabled());
        assert!(!se3.scale_only());

        let only_scale = AlignmentConfig {
            correct_scale: true,
            ..AlignmentConfig::default()
        };
        assert!(only_scale.scale_only());
        assert_eq!(only_scale.describe(), "scale corrected");
        assert!(!AlignmentConfig::default().is_enabled());

        let origin = AlignmentConfig {
            align_origin: true,
            ..AlignmentConfig::default()
        };
        assert!(origin.is_enabled());
        assert!(!origin.umeyama_enabled());
        assert_eq!(origin.describe(), "with origin alignment");
    }

    #[test]
    fn test_filter_and_n_to_align_validation() {
        let zero_align = EvalConfig::default().with_alignment(AlignmentConfig {
            align: true,
            n_to_align: Some(0),
            ..AlignmentConfig::default()
        });
        assert!(zero_align.validate().is_err());

        let negative_motion = EvalConfig::default().with_filter(FilterConfig {
            downsample: None,
            motion: Some(MotionFilter {
                distance: -1.0,
                angle_deg: 5.0,
            }),
        });
        assert!(negative_motion.validate().is_err());

        let downsample = FilterConfig {
            downsample: Some(0),
            motion: None,
        };
        assert!(downsample.validate().is_err());
        assert!(!FilterConfig::default().is_enabled());
    }

    #[test]
    fn test_config_without_newer_fields_parses() {
        let json = r#"{
            "pose_relation": "translation_part",
            "association": {"max_diff": 0.01, "offset": 0.0},
            "alignment": {"align": true, "correct_scale": false, "rotation_constraint": "none"},
            "delta": {"delta": 1.0, "unit": "frames", "rel_tolerance": 0.1, "all_pairs": false}
        }"#;
        let config: EvalConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.alignment.n_to_align, None);
        assert!(!config.alignment.align_origin);
        assert_eq!(config.delta.map(|d| d.pairs_from_reference), Some(false));
        assert_eq!(config.filter, FilterConfig::default());
    }

    #[test]
    fn test_delta_validation() {
        let fractional_frames = DeltaConfig {
            delta: 1.5,
            ..DeltaConfig::default()
        };
        assert!(matches!(
            fractional_frames.validate(),
            Err(EvalError::InvalidConfiguration(_))
        ));

        let negative = DeltaConfig {
            delta: -1.0,
            unit: DeltaUnit::Meters,
            ..DeltaConfig::default()
        };
        assert!(negative.validate().is_err());

        let meters = DeltaConfig {
            delta: 2.0,
            unit: DeltaUnit::Meters,
            rel_tolerance: 0.1,
            all_pairs: true,
            pairs_from_reference: false,
        };
        assert!(meters.validate().is_ok());
        assert!((meters.tolerance() - 0.2).abs() < 1e-12);
        assert_eq!(DeltaConfig::default().tolerance(), 0.0);
    }

    #[test]
    fn test_negative_max_diff_rejected() {
        let config = EvalConfig::default().with_association(AssociationConfig {
            max_diff: -0.1,
            offset: 0.0,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = EvalConfig::default()
            .with_pose_relation(PoseRelation::FullTransformation)
            .with_delta(DeltaConfig {
                delta: 0.5,
                unit: DeltaUnit::Seconds,
                rel_tolerance: 0.05,
                all_pairs: true,
                pairs_from_reference: true,
            })
            .with_filter(FilterConfig {
                downsample: Some(100),
                motion: Some(MotionFilter {
                    distance: 0.5,
                    angle_deg: 10.0,
                }),
            });
        let json = serde_json::to_string(&config).unwrap();
        let back: EvalConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
