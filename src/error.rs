use thiserror::Error;

/// Errors raised by a single evaluation.
///
/// Every variant is terminal for the evaluation that produced it, never for a
/// batch driving many evaluations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error(
        "found only {matches} matching timestamps between '{est_name}' ({est_len} poses) \
         and '{ref_name}' ({ref_len} poses) with max. time diff {max_diff} s \
         and time offset {offset} s (need at least 2)"
    )]
    InsufficientAssociation {
        est_name: String,
        ref_name: String,
        est_len: usize,
        ref_len: usize,
        matches: usize,
        max_diff: f64,
        offset: f64,
    },

    #[error("alignment needs at least {required} point correspondences, got {points}")]
    InsufficientPoints { points: usize, required: usize },

    #[error(
        "degenerate correspondence geometry over {points} points \
         (singular values {singular_values:?}), alignment is not possible"
    )]
    AlignmentDegenerate {
        points: usize,
        singular_values: [f64; 3],
    },

    #[error(
        "delta = {delta} ({unit}) with tolerance {tolerance} produced no index pairs \
         among {poses} poses (total extent {extent} {unit})"
    )]
    NoValidPairs {
        delta: f64,
        unit: String,
        tolerance: f64,
        poses: usize,
        extent: f64,
    },

    #[error("invalid pose relation {relation}: {reason}")]
    InvalidPoseRelation { relation: String, reason: String },

    #[error("cannot compute statistics of an empty error array ({relation})")]
    EmptyErrorArray { relation: String },

    #[error("invalid pose sequence '{name}': {reason}")]
    InvalidSequence { name: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("result archive: {0}")]
    Archive(#[from] ArchiveError),

    #[error("batch worker for job {job} panicked")]
    WorkerPanicked { job: usize },
}

/// Errors of the result archive persistence layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArchiveError {
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    #[error("serialization error: {0}")]
    Json(String),

    #[error("unsupported archive schema version {found} (this build reads {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("archived pose {index} of '{trajectory}' is invalid: {reason}")]
    InvalidPose {
        trajectory: String,
        index: usize,
        reason: String,
    },
}

impl From<serde_json::Error> for ArchiveError {
    fn from(e: serde_json::Error) -> Self {
        ArchiveError::Json(e.to_string())
    }
}

/// Result type for evaluation operations
pub type EvalResult<T> = Result<T, EvalError>;
