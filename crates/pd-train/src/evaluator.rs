//! Per-trial fitting and scoring.

use pd_types::{EvaluationError, Params};
use tracing::debug;

use crate::dataset::DataSplit;
use crate::trainer::{rmse, EarlyStopping, Trainer};

/// Fits a candidate on the training split and scores it on the validation
/// split. Used as the search objective, so it must be cheap to call
/// repeatedly: early stopping on the validation RMSE bounds each fit.
#[derive(Debug, Clone)]
pub struct Evaluator<T> {
    trainer: T,
    /// Rounds without validation improvement before a fit stops; 0 disables.
    pub early_stopping_rounds: usize,
}

impl<T: Trainer> Evaluator<T> {
    pub fn new(trainer: T) -> Self {
        Self {
            trainer,
            early_stopping_rounds: 10,
        }
    }

    pub fn with_early_stopping(mut self, rounds: usize) -> Self {
        self.early_stopping_rounds = rounds;
        self
    }

    pub fn trainer(&self) -> &T {
        &self.trainer
    }

    /// Validation RMSE of a model fitted with `params`.
    pub fn evaluate(&self, params: &Params, split: &DataSplit) -> Result<f64, EvaluationError> {
        self.fit_and_score(params, split).map(|(_, loss)| loss)
    }

    /// Fit and score, keeping the model.
    pub fn fit_and_score(
        &self,
        params: &Params,
        split: &DataSplit,
    ) -> Result<(T::Model, f64), EvaluationError> {
        split.validate()?;

        let early_stopping = (self.early_stopping_rounds > 0).then_some(EarlyStopping {
            validation: &split.validation,
            rounds: self.early_stopping_rounds,
        });

        let model = self.trainer.fit(params, &split.train, early_stopping)?;
        let predictions = self.trainer.predict(&model, &split.validation.rows)?;
        let loss = rmse(&predictions, &split.validation.labels)?;

        debug!(loss, "evaluated candidate");
        Ok((model, loss))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boost::{BoostedTreeTrainer, BoostingConfig};
    use crate::dataset::Dataset;
    use pd_types::{ParameterValue, TrainerError};

    fn linear_split() -> DataSplit {
        let rows: Vec<Vec<f64>> = (0..60).map(|i| vec![i as f64]).collect();
        let labels: Vec<f64> = (0..60).map(|i| 2.0 * i as f64 + 1.0).collect();
        Dataset::new(vec!["x".into()], rows, labels).unwrap().split(0.33, 42)
    }

    fn evaluator() -> Evaluator<BoostedTreeTrainer> {
        Evaluator::new(BoostedTreeTrainer::new(BoostingConfig { num_boost_round: 30 }))
    }

    #[test]
    fn returns_finite_validation_loss() {
        let loss = evaluator().evaluate(&Params::new(), &linear_split()).unwrap();
        assert!(loss.is_finite());
        assert!(loss < 20.0, "loss {loss}");
    }

    #[test]
    fn better_parameters_score_lower() {
        let split = linear_split();
        let shallow: Params = [("max_depth".to_string(), ParameterValue::Int(1))].into();
        let deep: Params = [("max_depth".to_string(), ParameterValue::Int(6))].into();
        let e = evaluator();
        assert!(e.evaluate(&deep, &split).unwrap() < e.evaluate(&shallow, &split).unwrap());
    }

    #[test]
    fn empty_validation_split_is_an_evaluation_error() {
        let ds =
            Dataset::new(vec!["x".into()], vec![vec![1.0], vec![2.0]], vec![1.0, 2.0]).unwrap();
        let split = ds.split(0.0, 42);
        assert!(matches!(
            evaluator().evaluate(&Params::new(), &split),
            Err(EvaluationError::EmptySplit { split: "validation" })
        ));
    }

    #[test]
    fn trainer_errors_pass_through() {
        let params: Params =
            [("objective".to_string(), ParameterValue::from("reg:pseudohuber"))].into();
        assert!(matches!(
            evaluator().evaluate(&params, &linear_split()),
            Err(EvaluationError::Trainer(TrainerError::UnsupportedObjective { .. }))
        ));
    }

    #[test]
    fn early_stopping_can_be_disabled() {
        let e = evaluator().with_early_stopping(0);
        let (model, _) = e.fit_and_score(&Params::new(), &linear_split()).unwrap();
        assert_eq!(model.trees.len(), 30);
        assert_eq!(model.best_iteration, None);
    }
}
