//! Trial bookkeeping for a single search.

use pd_types::Params;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A single trial: one sampled parameter set and its measured loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    /// Position in the search sequence (0-indexed).
    pub number: usize,
    pub parameters: Params,
    /// Validation loss, or `None` if the evaluation failed.
    pub loss: Option<f64>,
}

impl Trial {
    pub fn completed(number: usize, parameters: Params, loss: f64) -> Self {
        Self {
            number,
            parameters,
            loss: Some(loss),
        }
    }

    pub fn failed(number: usize, parameters: Params) -> Self {
        Self {
            number,
            parameters,
            loss: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.loss.is_none()
    }

    /// Loss used for ranking; failed trials rank last.
    pub fn ranking_loss(&self) -> f64 {
        self.loss.unwrap_or(f64::INFINITY)
    }

    /// Order by loss, then by trial number.
    pub(crate) fn rank_cmp(&self, other: &Self) -> Ordering {
        self.ranking_loss()
            .total_cmp(&other.ranking_loss())
            .then(self.number.cmp(&other.number))
    }
}

/// Append-only record of every trial a search has run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialHistory {
    trials: Vec<Trial>,
}

impl TrialHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, trial: Trial) {
        debug_assert_eq!(trial.number, self.trials.len());
        self.trials.push(trial);
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trial> {
        self.trials.iter()
    }

    pub fn failed_count(&self) -> usize {
        self.trials.iter().filter(|t| t.is_failed()).count()
    }

    /// Best completed trial; ties go to the earliest.
    pub fn best(&self) -> Option<&Trial> {
        self.trials
            .iter()
            .filter(|t| !t.is_failed())
            .min_by(|a, b| a.rank_cmp(b))
    }

    /// Trials sorted best-first (failed last, ties by trial number).
    pub fn ranked(&self) -> Vec<&Trial> {
        let mut sorted: Vec<&Trial> = self.trials.iter().collect();
        sorted.sort_by(|a, b| a.rank_cmp(b));
        sorted
    }

    /// Running minimum of the loss after each trial (`+inf` until the first
    /// success).
    pub fn best_loss_curve(&self) -> Vec<f64> {
        self.trials
            .iter()
            .scan(f64::INFINITY, |best, trial| {
                *best = best.min(trial.ranking_loss());
                Some(*best)
            })
            .collect()
    }
}
