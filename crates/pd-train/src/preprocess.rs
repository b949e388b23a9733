//! Feature preprocessing fitted on the training split.

use pd_types::{EvaluationError, TrainerError};
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;

/// Records the feature schema and the per-column fill values used to impute
/// missing cells. Stored next to the model so inference applies the same
/// transformation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    pub feature_names: Vec<String>,
    pub target: String,
    pub dropped: Vec<String>,
    /// Mean of the finite training values per column (0.0 for all-missing columns).
    pub fill_values: Vec<f64>,
}

impl Preprocessor {
    pub fn fit(train: &Dataset, target: &str, dropped: &[String]) -> Self {
        let n = train.n_features();
        let mut sums = vec![0.0; n];
        let mut counts = vec![0usize; n];

        for row in &train.rows {
            for (j, v) in row.iter().enumerate() {
                if v.is_finite() {
                    sums[j] += v;
                    counts[j] += 1;
                }
            }
        }

        let fill_values = sums
            .iter()
            .zip(&counts)
            .map(|(s, &c)| if c == 0 { 0.0 } else { s / c as f64 })
            .collect();

        Self {
            feature_names: train.feature_names.clone(),
            target: target.to_string(),
            dropped: dropped.to_vec(),
            fill_values,
        }
    }

    /// Replace non-finite feature values with the fitted fill values.
    pub fn transform(&self, data: &Dataset) -> Result<Dataset, EvaluationError> {
        if data.feature_names != self.feature_names {
            return Err(TrainerError::FeatureMismatch {
                expected: self.feature_names.len(),
                actual: data.n_features(),
            }
            .into());
        }

        let rows = data
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&self.fill_values)
                    .map(|(&v, &fill)| if v.is_finite() { v } else { fill })
                    .collect()
            })
            .collect();

        Dataset::new(self.feature_names.clone(), rows, data.labels.clone())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}
