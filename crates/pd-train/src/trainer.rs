//! The trainer capability consumed by evaluation and final fitting.

use pd_types::{EvaluationError, Params, TrainerError};
use serde::Serialize;

use crate::dataset::Dataset;

/// Held-out data watched during fitting, with the number of rounds allowed
/// without improvement before training stops.
#[derive(Debug, Clone, Copy)]
pub struct EarlyStopping<'a> {
    pub validation: &'a Dataset,
    pub rounds: usize,
}

/// Fits a model from parameters and a labeled training set.
pub trait Trainer: Send + Sync {
    type Model: Serialize;

    /// Model family recorded on runs.
    fn name(&self) -> &str;

    fn fit(
        &self,
        params: &Params,
        train: &Dataset,
        early_stopping: Option<EarlyStopping<'_>>,
    ) -> Result<Self::Model, TrainerError>;

    fn predict(&self, model: &Self::Model, rows: &[Vec<f64>]) -> Result<Vec<f64>, TrainerError>;
}

/// Root mean squared error.
pub fn rmse(predictions: &[f64], labels: &[f64]) -> Result<f64, EvaluationError> {
    if predictions.len() != labels.len() {
        return Err(EvaluationError::LengthMismatch {
            predictions: predictions.len(),
            labels: labels.len(),
        });
    }
    if labels.is_empty() {
        return Err(EvaluationError::EmptySplit { split: "validation" });
    }

    let mse = predictions
        .iter()
        .zip(labels)
        .map(|(p, y)| (p - y).powi(2))
        .sum::<f64>()
        / labels.len() as f64;
    let value = mse.sqrt();

    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvaluationError::NonFiniteLoss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rmse_known_value() {
        let v = rmse(&[1.0, 2.0, 3.0], &[1.0, 2.0, 5.0]).unwrap();
        assert!((v - (4.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert_eq!(rmse(&[2.0], &[2.0]).unwrap(), 0.0);
    }

    #[test]
    fn rmse_rejects_bad_input() {
        assert!(matches!(
            rmse(&[1.0], &[1.0, 2.0]),
            Err(EvaluationError::LengthMismatch { predictions: 1, labels: 2 })
        ));
        assert!(matches!(rmse(&[], &[]), Err(EvaluationError::EmptySplit { .. })));
        assert!(matches!(rmse(&[f64::INFINITY], &[0.0]), Err(EvaluationError::NonFiniteLoss)));
    }
}
