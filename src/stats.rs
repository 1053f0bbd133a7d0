//! Error arrays and their summary statistics.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use ndarray::Array1;

use crate::error::{EvalError, EvalResult};
use crate::metrics::{PoseRelation, Unit};

/// One scalar error per paired pose (APE) or per index pair (RPE).
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorArray {
    values: Array1<f64>,
    relation: PoseRelation,
}

impl ErrorArray {
    pub fn new(values: Array1<f64>, relation: PoseRelation) -> Self {
        ErrorArray { values, relation }
    }

    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    pub fn relation(&self) -> PoseRelation {
        self.relation
    }

    pub fn unit(&self) -> Unit {
        self.relation.unit()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.values.to_vec()
    }

    pub fn statistics(&self) -> EvalResult<Statistics> {
        Statistics::compute(&self.values, self.relation)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticsType {
    Rmse,
    Mean,
    Median,
    Std,
    Min,
    Max,
    Sse,
}

impl StatisticsType {
    pub const ALL: [StatisticsType; 7] = [
        StatisticsType::Rmse,
        StatisticsType::Mean,
        StatisticsType::Median,
        StatisticsType::Std,
        StatisticsType::Min,
        StatisticsType::Max,
        StatisticsType::Sse,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StatisticsType::Rmse => "rmse",
            StatisticsType::Mean => "mean",
            StatisticsType::Median => "median",
            StatisticsType::Std => "std",
            StatisticsType::Min => "min",
            StatisticsType::Max => "max",
            StatisticsType::Sse => "sse",
        }
    }
}

impl Display for StatisticsType {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Summary of an error array. `std` is the population standard deviation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub rmse: f64,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub sse: f64,
}

impl Statistics {
    pub fn compute(values: &Array1<f64>, relation: PoseRelation) -> EvalResult<Self> {
        let n = values.len();
        let mean = values.mean().ok_or_else(|| EvalError::EmptyErrorArray {
            relation: relation.to_string(),
        })?;

        let sse = values.fold(0.0, |acc, e| acc + e * e);
        let min = values.fold(f64::INFINITY, |acc, &e| acc.min(e));
        let max = values.fold(f64::NEG_INFINITY, |acc, &e| acc.max(e));

        Ok(Statistics {
            rmse: (sse / n as f64).sqrt(),
            mean,
            median: median(values),
            std: values.std(0.0),
            min,
            max,
            sse,
        })
    }

    pub fn get(&self, stat: StatisticsType) -> f64 {
        match stat {
            StatisticsType::Rmse => self.rmse,
            StatisticsType::Mean => self.mean,
            StatisticsType::Median => self.median,
            StatisticsType::Std => self.std,
            StatisticsType::Min => self.min,
            StatisticsType::Max => self.max,
            StatisticsType::Sse => self.sse,
        }
    }

    /// Name/value pairs in `StatisticsType::ALL` order
    pub fn to_map(&self) -> Vec<(&'static str, f64)> {
        StatisticsType::ALL
            .iter()
            .map(|&s| (s.name(), self.get(s)))
            .collect()
    }
}

/// Selection-based median; the array is non-empty.
fn median(values: &Array1<f64>) -> f64 {
    let mut v = values.to_vec();
    let n = v.len();
    let mid = n / 2;
    let (lower, upper, _) = v.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    let upper = *upper;
    if n % 2 == 0 {
        let below = lower.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (below + upper) / 2.0
    } else {
        upper
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::AngleUnit;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_statistics_of_one_to_four() {
        let stats = Statistics::compute(&array![1.0, 2.0, 3.0, 4.0], PoseRelation::TranslationPart)
            .unwrap();
        assert_relative_eq!(stats.rmse, 2.7386, epsilon = 1e-4);
        assert_relative_eq!(stats.mean, 2.5);
        assert_relative_eq!(stats.median, 2.5);
        assert_relative_eq!(stats.std, 1.1180, epsilon = 1e-4);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
        assert_relative_eq!(stats.sse, 30.0);
    }

    #[test]
    fn test_median_odd_and_unsorted() {
        assert_eq!(median(&array![5.0, 1.0, 3.0]), 3.0);
        assert_eq!(median(&array![7.0]), 7.0);
        assert_eq!(median(&array![4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn test_empty_array_rejected() {
        let errors = ErrorArray::new(
            Array1::zeros(0),
            PoseRelation::RotationPart(AngleUnit::Degrees),
        );
        let err = errors.statistics().unwrap_err();
        match err {
            EvalError::EmptyErrorArray { relation } => assert!(relation.contains("degrees")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_lookup_and_map_order() {
        let stats = Statistics::compute(&array![2.0, 2.0], PoseRelation::PointDistance).unwrap();
        assert_eq!(stats.get(StatisticsType::Std), 0.0);
        let names: Vec<&str> = stats.to_map().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["rmse", "mean", "median", "std", "min", "max", "sse"]);
    }
}
