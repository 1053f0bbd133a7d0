//! Trajectory accuracy evaluation: timestamp association, Umeyama alignment,
//! absolute and relative pose errors and their statistics.

pub mod align;
pub mod archive;
pub mod config;
pub mod delta;
pub mod error;
pub mod evaluation;
pub mod geometry;
pub mod metrics;
pub mod stats;
pub mod sync;
pub mod tum;
pub mod types;

pub use align::{align_sequences, umeyama, AlignmentTransform};
pub use archive::{ComparisonTable, ResultArchive};
pub use config::{
    AlignmentConfig, AssociationConfig, DeltaConfig, DeltaUnit, EvalConfig, FilterConfig,
    MotionFilter, RotationConstraint,
};
pub use delta::select_pairs;
pub use error::{ArchiveError, EvalError, EvalResult};
pub use evaluation::{evaluate_ape, evaluate_batch, evaluate_rpe, EvalJob, Evaluation};
pub use metrics::{AngleUnit, MetricKind, PoseRelation, Unit};
pub use stats::{ErrorArray, Statistics, StatisticsType};
pub use sync::{associate, Association};
pub use types::{Pose, PoseSequence};
