//! APE / RPE pipelines: associate, align, select pairs, measure, summarize.
//!
//! Each evaluation is a pure function of its two sequences and one
//! `EvalConfig`. Batches run independent evaluations on scoped threads,
//! at most one per available core at a time.

use crate::align::{align_sequences, AlignmentTransform};
use crate::archive::{AlignmentRecord, AssociationRecord, ResultArchive, SCHEMA_VERSION};
use crate::config::{EvalConfig, FilterConfig, RotationConstraint};
use crate::delta::select_pairs;
use crate::error::{EvalError, EvalResult};
use crate::metrics::{self, check_relation, MetricKind};
use crate::stats::{ErrorArray, Statistics};
use crate::sync::{associate, Association};
use crate::types::{IndexPair, PoseSequence};

/// Outcome of one evaluation
#[derive(Clone, Debug)]
pub struct Evaluation {
    pub metric: MetricKind,
    pub config: EvalConfig,
    pub association: Association,
    pub alignment: Option<AlignmentTransform>,
    /// Full reference, after the configured pre-filters
    pub reference: PoseSequence,
    /// Full (pre-filtered) estimate, alignment applied to every pose
    pub aligned_estimate: PoseSequence,
    pub errors: ErrorArray,
    pub error_timestamps: Vec<f64>,
    /// RPE only, indices into the paired sequences
    pub pairs: Option<Vec<IndexPair>>,
    pub statistics: Statistics,
}

impl Evaluation {
    pub fn title(&self) -> String {
        let relation = self.config.pose_relation;
        let mut title = format!("{} w.r.t. {} ({})", self.metric, relation, relation.unit());
        if let (MetricKind::Rpe, Some(delta)) = (self.metric, self.config.delta) {
            title.push_str(&format!(" for delta = {} ({})", delta.delta, delta.unit));
            if delta.all_pairs {
                title.push_str(" using all pairs");
            }
        }
        title.push_str(&format!(" ({}", self.config.alignment.describe()));
        let alignment = &self.config.alignment;
        if self.alignment.is_some() && alignment.umeyama_enabled() {
            if alignment.rotation_constraint == RotationConstraint::YawOnly {
                title.push_str(", yaw only");
            }
            if alignment.align_origin {
                title.push_str(", origin aligned");
            }
        }
        title.push(')');
        title
    }

    /// Paired reference and aligned estimate
    pub fn paired(&self) -> EvalResult<(PoseSequence, PoseSequence)> {
        let (est, reference) = self.association.apply(&self.aligned_estimate, &self.reference)?;
        Ok((reference, est))
    }

    pub fn to_archive(&self) -> ResultArchive {
        ResultArchive {
            schema_version: SCHEMA_VERSION,
            created_at: chrono::Utc::now().to_rfc3339(),
            metric: self.metric,
            title: self.title(),
            ref_name: self.reference.name().to_string(),
            est_name: self.aligned_estimate.name().to_string(),
            pose_relation: self.errors.relation(),
            unit: self.errors.unit(),
            delta: self.config.delta.filter(|_| self.metric == MetricKind::Rpe),
            statistics: self.statistics,
            errors: self.errors.to_vec(),
            error_timestamps: self.error_timestamps.clone(),
            association: AssociationRecord::from(&self.association),
            alignment: self.alignment.as_ref().map(AlignmentRecord::from),
            delta_pairs: self.pairs.clone(),
            reference: ResultArchive::pose_records(&self.reference),
            aligned_estimate: ResultArchive::pose_records(&self.aligned_estimate),
            config: self.config,
        }
    }
}

/// Association and alignment shared by both metrics
struct Prepared {
    association: Association,
    ref_full: PoseSequence,
    alignment: Option<AlignmentTransform>,
    ref_paired: PoseSequence,
    est_paired: PoseSequence,
    est_full: PoseSequence,
}

fn prepare(
    reference: &PoseSequence,
    estimate: &PoseSequence,
    config: &EvalConfig,
) -> EvalResult<Prepared> {
    config.validate()?;
    let reference = pre_filter(reference, &config.filter);
    let estimate = pre_filter(estimate, &config.filter);
    let association = associate(&estimate, &reference, &config.association)?;
    let (est_paired, ref_paired) = association.apply(&estimate, &reference)?;

    let alignment = align_sequences(&est_paired, &ref_paired, &config.alignment)?;
    let (est_paired, est_full) = match &alignment {
        Some(tf) => (tf.apply(&est_paired), tf.apply(&estimate)),
        None => (est_paired, estimate),
    };

    Ok(Prepared {
        association,
        ref_full: reference,
        alignment,
        ref_paired,
        est_paired,
        est_full,
    })
}

/// Downsampling first, then the motion filter.
fn pre_filter(sequence: &PoseSequence, filter: &FilterConfig) -> PoseSequence {
    if !filter.is_enabled() {
        return sequence.clone();
    }
    let mut filtered = match filter.downsample {
        Some(n) => sequence.downsample(n),
        None => sequence.clone(),
    };
    if let Some(motion) = &filter.motion {
        filtered = filtered.motion_filter(motion.distance, motion.angle_deg);
    }
    log::debug!(
        "Filtered '{}' from {} to {} poses",
        sequence.name(),
        sequence.len(),
        filtered.len()
    );
    filtered
}

fn summarize(evaluation: &Evaluation) {
    log::info!(
        "{} '{}' vs. '{}': rmse {:.6}, mean {:.6}, max {:.6} over {} values",
        evaluation.title(),
        evaluation.aligned_estimate.name(),
        evaluation.reference.name(),
        evaluation.statistics.rmse,
        evaluation.statistics.mean,
        evaluation.statistics.max,
        evaluation.errors.len()
    );
}

/// Absolute pose error of `estimate` against `reference`.
pub fn evaluate_ape(
    reference: &PoseSequence,
    estimate: &PoseSequence,
    config: &EvalConfig,
) -> EvalResult<Evaluation> {
    let relation = config.pose_relation;
    let prepared = prepare(reference, estimate, config)?;

    let errors = metrics::ape(&prepared.ref_paired, &prepared.est_paired, relation)?;
    let statistics = errors.statistics()?;

    let evaluation = Evaluation {
        metric: MetricKind::Ape,
        config: *config,
        association: prepared.association,
        alignment: prepared.alignment,
        reference: prepared.ref_full,
        aligned_estimate: prepared.est_full,
        errors,
        error_timestamps: prepared.est_paired.timestamps(),
        pairs: None,
        statistics,
    };
    summarize(&evaluation);
    Ok(evaluation)
}

/// Relative pose error; needs `config.delta`.
pub fn evaluate_rpe(
    reference: &PoseSequence,
    estimate: &PoseSequence,
    config: &EvalConfig,
) -> EvalResult<Evaluation> {
    let delta = config.delta.ok_or_else(|| {
        EvalError::InvalidConfiguration("relative pose error needs a delta configuration".into())
    })?;
    let relation = config.pose_relation;
    check_relation(relation, Some(delta.unit))?;
    let prepared = prepare(reference, estimate, config)?;

    let pairs = if delta.pairs_from_reference {
        select_pairs(&prepared.ref_paired, &delta)?
    } else {
        select_pairs(&prepared.est_paired, &delta)?
    };
    let errors = metrics::rpe(
        &prepared.ref_paired,
        &prepared.est_paired,
        &pairs,
        relation,
        delta.unit,
    )?;
    let statistics = errors.statistics()?;

    let stamps = prepared.est_paired.timestamps();
    let error_timestamps = pairs.iter().map(|&(_, j)| stamps[j]).collect();

    let evaluation = Evaluation {
        metric: MetricKind::Rpe,
        config: *config,
        association: prepared.association,
        alignment: prepared.alignment,
        reference: prepared.ref_full,
        aligned_estimate: prepared.est_full,
        errors,
        error_timestamps,
        pairs: Some(pairs),
        statistics,
    };
    summarize(&evaluation);
    Ok(evaluation)
}

/// One unit of work for [`evaluate_batch`]
#[derive(Clone, Debug)]
pub struct EvalJob {
    pub metric: MetricKind,
    pub reference: PoseSequence,
    pub estimate: PoseSequence,
    pub config: EvalConfig,
}

impl EvalJob {
    pub fn run(&self) -> EvalResult<Evaluation> {
        match self.metric {
            MetricKind::Ape => evaluate_ape(&self.reference, &self.estimate, &self.config),
            MetricKind::Rpe => evaluate_rpe(&self.reference, &self.estimate, &self.config),
        }
    }
}

/// Run independent jobs in parallel, one result per job in input order.
///
/// Jobs run in chunks of at most one thread per available core. A failing
/// (or panicking) job only affects its own slot.
pub fn evaluate_batch(jobs: &[EvalJob]) -> Vec<EvalResult<Evaluation>> {
    let workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let mut results = Vec::with_capacity(jobs.len());
    for (chunk_index, chunk) in jobs.chunks(workers).enumerate() {
        results.extend(run_chunk(chunk, chunk_index * workers));
    }

    let failed = results.iter().filter(|r| r.is_err()).count();
    if failed > 0 {
        log::warn!("{} of {} batch evaluations failed", failed, jobs.len());
    }
    results
}

/// One scoped thread per job; `first` is the batch index of `chunk[0]`.
fn run_chunk(chunk: &[EvalJob], first: usize) -> Vec<EvalResult<Evaluation>> {
    let outcome = crossbeam::thread::scope(|s| {
        let handles: Vec<_> = chunk.iter().map(|job| s.spawn(move |_| job.run())).collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(k, handle)| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(EvalError::WorkerPanicked { job: first + k }))
            })
            .collect::<Vec<_>>()
    });

    outcome.unwrap_or_else(|_| {
        (first..first + chunk.len())
            .map(|job| Err(EvalError::WorkerPanicked { job }))
            .collect()
    })
}
