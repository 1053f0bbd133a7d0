//! Timestamp association of an estimate with a reference sequence.
//!
//! Matching is greedy, ordered and one-to-one: every estimate stamp (shifted
//! by the configured offset) takes the nearest reference stamp that has not
//! been consumed yet, and is kept only if the difference is within
//! `max_diff`. Both stamp lists are sorted, so a single forward sweep over
//! each list is enough.

use crate::config::AssociationConfig;
use crate::error::{EvalError, EvalResult};
use crate::types::{PoseSequence, TIMESTAMP_EPSILON};

/// Equal-length index lists pairing estimate poses with reference poses.
#[derive(Clone, Debug, PartialEq)]
pub struct Association {
    /// Strictly increasing indices into the estimate
    pub est_indices: Vec<usize>,
    /// Strictly increasing indices into the reference
    pub ref_indices: Vec<usize>,
    /// Threshold the matches were accepted under [s]
    pub max_diff_used: f64,
    pub offset: f64,
    /// Largest |Δt| among accepted matches [s]
    pub largest_diff: f64,
    /// Estimate poses that found no acceptable reference pose
    pub num_discarded: usize,
}

impl Association {
    pub fn len(&self) -> usize {
        self.est_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.est_indices.is_empty()
    }

    /// Reduce both sequences to their matched poses, in matching order.
    pub fn apply(
        &self,
        estimate: &PoseSequence,
        reference: &PoseSequence,
    ) -> EvalResult<(PoseSequence, PoseSequence)> {
        Ok((
            estimate.select(&self.est_indices)?,
            reference.select(&self.ref_indices)?,
        ))
    }
}

/// Raw output of the matching sweep.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchedIndices {
    pub est: Vec<usize>,
    pub reference: Vec<usize>,
    pub largest_diff: f64,
}

impl MatchedIndices {
    fn with_capacity(n: usize) -> Self {
        MatchedIndices {
            est: Vec::with_capacity(n),
            reference: Vec::with_capacity(n),
            largest_diff: 0.0,
        }
    }

    fn push(&mut self, est: usize, reference: usize, diff: f64) {
        self.est.push(est);
        self.reference.push(reference);
        self.largest_diff = self.largest_diff.max(diff);
    }
}

/// Associate two sequences by timestamp.
///
/// Fails with [`EvalError::InsufficientAssociation`] for fewer than two
/// matches.
pub fn associate(
    estimate: &PoseSequence,
    reference: &PoseSequence,
    config: &AssociationConfig,
) -> EvalResult<Association> {
    let stamps_est = estimate.timestamps();
    let stamps_ref = reference.timestamps();

    let matches = match match_by_index(&stamps_est, &stamps_ref, config.max_diff, config.offset) {
        Some(m) => {
            log::debug!("Timestamps agree index-wise, pairing {} poses directly", m.est.len());
            m
        }
        None => matching_time_indices(&stamps_est, &stamps_ref, config.max_diff, config.offset),
    };

    let num_matches = matches.est.len();
    if num_matches < 2 {
        return Err(EvalError::InsufficientAssociation {
            est_name: estimate.name().to_string(),
            ref_name: reference.name().to_string(),
            est_len: estimate.len(),
            ref_len: reference.len(),
            matches: num_matches,
            max_diff: config.max_diff,
            offset: config.offset,
        });
    }

    let num_discarded = estimate.len() - num_matches;
    log::debug!(
        "Found {} of max. {} possible matching timestamps between '{}' and '{}' \
         with max. time diff.: {} (s) and time offset: {} (s)",
        num_matches,
        estimate.len().min(reference.len()),
        estimate.name(),
        reference.name(),
        config.max_diff,
        config.offset
    );
    if num_discarded > 0 {
        log::debug!("{} estimate poses have no reference match", num_discarded);
    }

    Ok(Association {
        est_indices: matches.est,
        ref_indices: matches.reference,
        max_diff_used: config.max_diff,
        offset: config.offset,
        largest_diff: matches.largest_diff,
        num_discarded,
    })
}

/// General greedy sweep, O(|est| + |ref|).
///
/// `next` is the first reference index still available; `cursor` the first
/// available index whose stamp is `>= t`. The only other candidate is the
/// run of equal stamps just below `cursor`, whose start is tracked in
/// `below_start` so that repeated stamps are consumed in order.
pub fn matching_time_indices(
    stamps_est: &[f64],
    stamps_ref: &[f64],
    max_diff: f64,
    offset: f64,
) -> MatchedIndices {
    let n_ref = stamps_ref.len();
    let mut matches = MatchedIndices::with_capacity(stamps_est.len().min(n_ref));
    let mut next = 0usize;
    let mut cursor = 0usize;
    let mut below_start = 0usize;

    for (i_est, &stamp) in stamps_est.iter().enumerate() {
        if next >= n_ref {
            break;
        }
        let t = stamp + offset;
        if cursor < next {
            cursor = next;
        }
        while cursor < n_ref && stamps_ref[cursor] < t {
            if cursor == 0 || stamps_ref[cursor] != stamps_ref[cursor - 1] {
                below_start = cursor;
            }
            cursor += 1;
        }

        let mut best: Option<(usize, f64)> = None;
        if cursor > next {
            let k = below_start.max(next);
            best = Some((k, (t - stamps_ref[k]).abs()));
        }
        if cursor < n_ref {
            let diff = (stamps_ref[cursor] - t).abs();
            if best.map_or(true, |(_, best_diff)| diff < best_diff) {
                best = Some((cursor, diff));
            }
        }

        if let Some((k, diff)) = best {
            if diff <= max_diff {
                matches.push(i_est, k, diff);
                next = k + 1;
            }
        }
    }
    matches
}

/// Index-wise pairing for sequences whose stamps already agree.
///
/// Only taken when each reference stamp is within `min(ε, max_diff)` of its
/// estimate counterpart and reference stamps are more than `2·tol` apart;
/// under those conditions the general sweep picks exactly the same pairs.
pub fn match_by_index(
    stamps_est: &[f64],
    stamps_ref: &[f64],
    max_diff: f64,
    offset: f64,
) -> Option<MatchedIndices> {
    if stamps_est.len() != stamps_ref.len() || stamps_est.is_empty() {
        return None;
    }
    let tol = TIMESTAMP_EPSILON.min(max_diff);
    let mut matches = MatchedIndices::with_capacity(stamps_est.len());
    for (i, (&t_est, &t_ref)) in stamps_est.iter().zip(stamps_ref).enumerate() {
        let diff = (t_ref - (t_est + offset)).abs();
        if diff > tol {
            return None;
        }
        if i > 0 && stamps_ref[i] - stamps_ref[i - 1] <= 2.0 * tol {
            return None;
        }
        matches.push(i, i, diff);
    }
    Some(matches)
}
