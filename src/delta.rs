//! Index pair selection for relative pose errors.
//!
//! Every unit is reduced to a non-decreasing prefix measure `M` over the
//! sequence (frame index, elapsed time, travelled distance, accumulated
//! rotation). The amount between poses `i < j` is then `M[j] - M[i]`, and the
//! search for each start index is a forward-only pointer.

use crate::config::{DeltaConfig, DeltaUnit};
use crate::error::{EvalError, EvalResult};
use crate::geometry::accumulated_angles;
use crate::types::{IndexPair, PoseSequence};

/// Prefix measure of a sequence in the given unit
pub fn prefix_measure(sequence: &PoseSequence, unit: DeltaUnit) -> Vec<f64> {
    match unit {
        DeltaUnit::Frames => (0..sequence.len()).map(|k| k as f64).collect(),
        DeltaUnit::Seconds => sequence.seconds_from_start(),
        DeltaUnit::Meters => sequence.accumulated_distances(),
        DeltaUnit::Radians => accumulated_angles(&sequence.rotations()),
        DeltaUnit::Degrees => accumulated_angles(&sequence.rotations())
            .into_iter()
            .map(f64::to_degrees)
            .collect(),
    }
}

/// Pairs `(i, j)` whose measure difference lies in `[delta - tol, delta + tol]`.
///
/// For each start `i` only the smallest `j > i` reaching `delta - tol` is
/// considered. Without `all_pairs` the next start is the accepted `j`.
pub fn pairs_from_measure(measure: &[f64], delta: f64, tol: f64, all_pairs: bool) -> Vec<IndexPair> {
    let n = measure.len();
    let lower = delta - tol;
    let upper = delta + tol;
    let mut pairs = Vec::new();
    let mut i = 0usize;
    let mut j = 1usize;

    while i + 1 < n {
        if j <= i {
            j = i + 1;
        }
        while j < n && measure[j] - measure[i] < lower {
            j += 1;
        }
        // M is non-decreasing: later starts cannot reach `lower` either
        if j >= n {
            break;
        }
        if measure[j] - measure[i] <= upper {
            pairs.push((i, j));
            if !all_pairs {
                i = j;
                continue;
            }
        }
        i += 1;
    }
    pairs
}

/// Select RPE index pairs on a paired sequence.
pub fn select_pairs(sequence: &PoseSequence, config: &DeltaConfig) -> EvalResult<Vec<IndexPair>> {
    config.validate()?;
    let measure = prefix_measure(sequence, config.unit);
    let tol = config.tolerance();
    let pairs = pairs_from_measure(&measure, config.delta, tol, config.all_pairs);

    if pairs.is_empty() {
        return Err(EvalError::NoValidPairs {
            delta: config.delta,
            unit: config.unit.to_string(),
            tolerance: tol,
            poses: sequence.len(),
            extent: measure.last().copied().unwrap_or(0.0),
        });
    }
    log::debug!(
        "Found {} pairs with delta {} ({}) among {} poses of '{}' (all pairs: {})",
        pairs.len(),
        config.delta,
        config.unit,
        sequence.len(),
        sequence.name(),
        config.all_pairs
    );
    Ok(pairs)
}
