//! Final fit with the winning parameters, artifact storage, and run recording.

use pd_registry::{ArtifactRef, NewRun, Registry, RetryPolicy, RunId};
use pd_types::{PdResult, Params};
use tracing::info;
use uuid::Uuid;

use crate::artifacts::ArtifactStore;
use crate::dataset::DataSplit;
use crate::evaluator::Evaluator;
use crate::preprocess::Preprocessor;
use crate::trainer::Trainer;

pub const PREPROCESSOR_ARTIFACT: &str = "preprocessor/preprocessor.json";
pub const MODEL_ARTIFACT: &str = "model/model.json";

/// The fitted model plus where it was recorded.
#[derive(Debug, Clone)]
pub struct FinalModel<M> {
    pub model: M,
    pub rmse: f64,
    pub run_id: RunId,
    pub artifacts: Vec<ArtifactRef>,
}

/// Retrains once with the chosen parameters and records the result as a run.
pub struct FinalTrainer<'a, T: Trainer> {
    evaluator: &'a Evaluator<T>,
    artifacts: &'a dyn ArtifactStore,
    registry: &'a dyn Registry,
    retry: RetryPolicy,
    experiment_scope: String,
}

impl<'a, T: Trainer> FinalTrainer<'a, T> {
    pub fn new(
        evaluator: &'a Evaluator<T>,
        artifacts: &'a dyn ArtifactStore,
        registry: &'a dyn Registry,
        experiment_scope: impl Into<String>,
    ) -> Self {
        Self {
            evaluator,
            artifacts,
            registry,
            retry: RetryPolicy::default(),
            experiment_scope: experiment_scope.into(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fit, score on the validation split, store both artifacts, then record
    /// one run carrying the `rmse` metric. Only the registry call is retried.
    pub fn finalize(
        &self,
        params: &Params,
        split: &DataSplit,
        preprocessor: &Preprocessor,
    ) -> PdResult<FinalModel<T::Model>> {
        let (model, rmse) = self.evaluator.fit_and_score(params, split)?;
        info!(rmse, "final model trained");

        let artifact_id = Uuid::new_v4();
        let preprocessor_ref = self.artifacts.put(
            &preprocessor.to_bytes()?,
            &format!("{artifact_id}/{PREPROCESSOR_ARTIFACT}"),
        )?;
        let model_ref = self.artifacts.put(
            &serde_json::to_vec_pretty(&model)?,
            &format!("{artifact_id}/{MODEL_ARTIFACT}"),
        )?;
        let artifacts = vec![preprocessor_ref, model_ref];

        let run = artifacts.iter().cloned().fold(
            NewRun::named("final")
                .with_metric("rmse", rmse)
                .with_params(params)
                .with_tag("model_family", self.evaluator.trainer().name())
                .with_tag("kind", "final")
                .with_tag("artifact_id", artifact_id.to_string()),
            NewRun::with_artifact,
        );

        let run_id = self.retry.with_retry("create_run", || {
            self.registry.create_run(&self.experiment_scope, run.clone())
        })?;
        info!(run_id = %run_id, scope = %self.experiment_scope, "recorded final run");

        Ok(FinalModel {
            model,
            rmse,
            run_id,
            artifacts,
        })
    }
}
