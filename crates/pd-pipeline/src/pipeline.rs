//! The end-to-end pipeline.

use pd_optimizer::{SearchSpace, TpeConfig, TpeOptimizer};
use pd_promote::{Challenger, PromotionDecision, PromotionStateMachine};
use pd_registry::{ArtifactRef, NewRun, Registry, RetryPolicy, RunId};
use pd_train::{
    ArtifactStore, BoostedTreeTrainer, BoostingConfig, DataSplit, Dataset, Evaluator, FinalTrainer,
    Preprocessor, Trainer,
};
use pd_types::{EvaluationError, Params, PdResult, PromotionError};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;

/// A promotion step that did not complete.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromotionFailure {
    pub step: String,
    /// Registry preconditions (no runs, unset alias, missing metric) are
    /// reportable; exhausted retries are not.
    pub reportable: bool,
    pub message: String,
}

impl PromotionFailure {
    fn from_error(step: &str, err: &PromotionError) -> Self {
        Self {
            step: step.to_string(),
            reportable: err.is_reportable(),
            message: err.to_string(),
        }
    }
}

/// What one invocation did.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub best_params: Params,
    pub best_trial_loss: f64,
    pub trials: usize,
    pub failed_trials: usize,
    /// Running minimum of the trial losses.
    pub loss_curve: Vec<f64>,
    pub final_run_id: RunId,
    pub final_rmse: f64,
    pub artifacts: Vec<ArtifactRef>,
    pub challenger: Option<Challenger>,
    /// Version installed as the first champion, when bootstrapping applied.
    pub bootstrapped_champion: Option<u64>,
    pub decision: Option<PromotionDecision>,
    pub promotion_failure: Option<PromotionFailure>,
}

impl PipelineReport {
    /// False only when a promotion step failed for a reason other than an
    /// unmet registry precondition.
    pub fn is_healthy(&self) -> bool {
        self.promotion_failure.as_ref().map_or(true, |f| f.reportable)
    }
}

/// Runs search, final training and promotion against one registry.
pub struct Pipeline<'a> {
    config: PipelineConfig,
    registry: &'a dyn Registry,
    artifacts: &'a dyn ArtifactStore,
    space: SearchSpace,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: PipelineConfig,
        registry: &'a dyn Registry,
        artifacts: &'a dyn ArtifactStore,
    ) -> Self {
        Self {
            config,
            registry,
            artifacts,
            space: SearchSpace::boosting_default(),
        }
    }

    pub fn with_space(mut self, space: SearchSpace) -> Self {
        self.space = space;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load, split and impute the configured data source.
    pub fn prepare(&self) -> PdResult<(DataSplit, Preprocessor)> {
        let dataset = Dataset::from_csv(&self.config.data_source, &self.config.csv_options())?;
        let split = dataset.split(self.config.test_fraction, self.config.split_seed);
        split.validate()?;

        let preprocessor = Preprocessor::fit(
            &split.train,
            &self.config.target_column,
            &self.config.drop_columns,
        );
        let split = DataSplit {
            train: preprocessor.transform(&split.train)?,
            validation: preprocessor.transform(&split.validation)?,
        };
        info!(
            train_rows = split.train.len(),
            validation_rows = split.validation.len(),
            features = split.train.n_features(),
            "data prepared"
        );
        Ok((split, preprocessor))
    }

    pub fn run(&self) -> PdResult<PipelineReport> {
        self.config.validate()?;
        let retry = self.config.retry_policy();
        info!(
            experiment = %self.config.experiment_scope,
            model = %self.config.model_scope,
            trial_budget = self.config.trial_budget,
            "pipeline started"
        );

        let (split, preprocessor) = self.prepare()?;

        let evaluator = Evaluator::new(BoostedTreeTrainer::new(BoostingConfig {
            num_boost_round: self.config.num_boost_round,
        }))
        .with_early_stopping(self.config.early_stopping_rounds);

        let mut tpe = TpeConfig::default().with_startup(self.config.warm_up);
        if let Some(seed) = self.config.search_seed {
            tpe = tpe.with_seed(seed);
        }

        let mut trial_number = 0usize;
        let objective = |params: &Params| {
            let number = trial_number;
            trial_number += 1;
            let loss = evaluator.evaluate(params, &split);
            if self.config.record_trials {
                self.record_trial(&retry, evaluator.trainer(), number, params, &loss);
            }
            loss
        };
        let outcome =
            TpeOptimizer::new(tpe).search(&self.space, self.config.trial_budget, objective)?;
        info!(
            best_loss = outcome.best_loss(),
            trials = outcome.history.len(),
            failed = outcome.history.failed_count(),
            "search finished"
        );

        let best_params = outcome.best_parameters().clone();
        let final_model = FinalTrainer::new(
            &evaluator,
            self.artifacts,
            self.registry,
            self.config.experiment_scope.as_str(),
        )
        .with_retry(retry)
        .finalize(&best_params, &split, &preprocessor)?;

        let mut report = PipelineReport {
            best_trial_loss: outcome.best_loss(),
            trials: outcome.history.len(),
            failed_trials: outcome.history.failed_count(),
            loss_curve: outcome.history.best_loss_curve(),
            best_params,
            final_run_id: final_model.run_id,
            final_rmse: final_model.rmse,
            artifacts: final_model.artifacts,
            challenger: None,
            bootstrapped_champion: None,
            decision: None,
            promotion_failure: None,
        };

        self.promote(retry, &mut report);
        info!(healthy = report.is_healthy(), "pipeline finished");
        Ok(report)
    }

    /// Select, then compare. Failures are recorded in the report and stop the
    /// remaining promotion steps without undoing earlier ones.
    fn promote(&self, retry: RetryPolicy, report: &mut PipelineReport) {
        let machine = PromotionStateMachine::new(self.registry, retry);
        let model_scope = self.config.model_scope.as_str();

        match machine.select_challenger(&self.config.experiment_scope, model_scope) {
            Ok(challenger) => report.challenger = Some(challenger),
            Err(e) => {
                report.promotion_failure = Some(Self::failure("select_challenger", &e));
                return;
            }
        }

        if self.config.bootstrap_champion {
            match machine.bootstrap_champion(model_scope) {
                Ok(installed) => report.bootstrapped_champion = installed,
                Err(e) => {
                    report.promotion_failure = Some(Self::failure("bootstrap_champion", &e));
                    return;
                }
            }
        }

        match machine.update_champion(model_scope) {
            Ok(decision) => report.decision = Some(decision),
            Err(e) => report.promotion_failure = Some(Self::failure("update_champion", &e)),
        }
    }

    fn failure(step: &str, err: &PromotionError) -> PromotionFailure {
        if err.is_reportable() {
            warn!(step, error = %err, "promotion step skipped");
        } else {
            error!(step, error = %err, "promotion step failed");
        }
        PromotionFailure::from_error(step, err)
    }

    /// Trial runs are best-effort; a registry failure here never fails the trial.
    fn record_trial<T: Trainer>(
        &self,
        retry: &RetryPolicy,
        trainer: &T,
        number: usize,
        params: &Params,
        loss: &Result<f64, EvaluationError>,
    ) {
        let mut run = NewRun::named(format!("trial-{number}"))
            .with_params(params)
            .with_tag("kind", "trial")
            .with_tag("model_family", trainer.name())
            .with_tag("trial", number.to_string());
        match loss {
            Ok(value) if value.is_finite() => run = run.with_metric("rmse", *value),
            Ok(_) => run = run.with_tag("status", "failed"),
            Err(e) => run = run.with_tag("status", "failed").with_tag("error", e.to_string()),
        }

        match retry.with_retry("create_run", || {
            self.registry.create_run(&self.config.experiment_scope, run.clone())
        }) {
            Ok(run_id) => debug!(trial = number, run_id = %run_id, "recorded trial"),
            Err(e) => warn!(trial = number, error = %e, "could not record trial"),
        }
    }
}
