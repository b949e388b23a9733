//! Tree-structured Parzen Estimator search loop.

use pd_types::{EvaluationError, Params, SearchError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::search::SearchSpace;
use crate::surrogate::Surrogate;
use crate::trial::{Trial, TrialHistory};

/// Tuning knobs for the TPE search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TpeConfig {
    /// Trials sampled uniformly before the surrogate is used.
    pub n_startup: usize,
    /// Fraction of trials (lowest loss) forming the "good" group.
    pub gamma: f64,
    /// Candidates drawn from the good density per proposal.
    pub n_candidates: usize,
    /// Weight of the uniform prior inside each Parzen estimator.
    pub prior_weight: f64,
    /// Seed for reproducible searches; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for TpeConfig {
    fn default() -> Self {
        Self {
            n_startup: 3,
            gamma: 0.25,
            n_candidates: 24,
            prior_weight: 1.0,
            seed: None,
        }
    }
}

impl TpeConfig {
    pub fn with_startup(mut self, n: usize) -> Self {
        self.n_startup = n.max(1);
        self
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma.clamp(0.01, 0.99);
        self
    }

    pub fn with_candidates(mut self, n: usize) -> Self {
        self.n_candidates = n.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Result of a finished search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// The minimum-loss trial (earliest on ties).
    pub best: Trial,
    /// Every trial in the order it ran.
    pub history: TrialHistory,
}

impl SearchOutcome {
    pub fn best_parameters(&self) -> &Params {
        &self.best.parameters
    }

    pub fn best_loss(&self) -> f64 {
        self.best.ranking_loss()
    }
}

/// Sequential model-based optimizer.
///
/// The optimizer keeps no state between searches; each call to
/// [`TpeOptimizer::search`] owns its trial history and drops it on return.
#[derive(Debug, Clone, Default)]
pub struct TpeOptimizer {
    config: TpeConfig,
}

impl TpeOptimizer {
    pub fn new(config: TpeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TpeConfig {
        &self.config
    }

    /// Run `max_trials` sequential trials of `objective` over `space` and
    /// return the best one.
    ///
    /// An objective error, or a non-finite loss, marks the trial as failed.
    /// Failed trials never win but still shape the "bad" density. If every
    /// trial fails the search returns [`SearchError::Exhausted`].
    pub fn search<F>(
        &self,
        space: &SearchSpace,
        max_trials: usize,
        mut objective: F,
    ) -> Result<SearchOutcome, SearchError>
    where
        F: FnMut(&Params) -> Result<f64, EvaluationError>,
    {
        space.validate()?;
        if max_trials == 0 {
            return Err(SearchError::ZeroBudget);
        }

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut history = TrialHistory::new();

        info!(
            max_trials,
            n_startup = self.config.n_startup,
            dimensions = space.sampled().count(),
            "starting TPE search"
        );

        for number in 0..max_trials {
            let parameters = if history.len() < self.config.n_startup {
                space.sample_uniform(&mut rng)
            } else {
                let surrogate =
                    Surrogate::fit(space, &history, self.config.gamma, self.config.prior_weight);
                surrogate.propose(&mut rng, self.config.n_candidates)
            };

            let trial = match objective(&parameters) {
                Ok(loss) if loss.is_finite() => {
                    debug!(trial = number, loss, "trial completed");
                    Trial::completed(number, parameters, loss)
                }
                Ok(loss) => {
                    warn!(trial = number, loss, "trial returned a non-finite loss");
                    Trial::failed(number, parameters)
                }
                Err(e) => {
                    warn!(trial = number, error = %e, "trial failed");
                    Trial::failed(number, parameters)
                }
            };
            history.record(trial);
        }

        let best = history
            .best()
            .cloned()
            .ok_or(SearchError::Exhausted { trials: max_trials })?;

        info!(
            best_trial = best.number,
            best_loss = best.ranking_loss(),
            failed = history.failed_count(),
            "TPE search finished"
        );

        Ok(SearchOutcome { best, history })
    }
}
