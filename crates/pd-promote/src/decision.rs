//! Promotion states and the records returned by each step.

use chrono::{DateTime, Utc};
use pd_registry::RunId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a model version stands in the promotion lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PromotionState {
    Unregistered,
    Registered,
    /// Holds the challenger alias.
    Staged,
    /// Holds the champion alias.
    Champion,
    /// Compared against the champion and lost (or tied).
    RejectedChallenger,
}

/// The version staged by `select_challenger`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenger {
    pub model_scope: String,
    pub version: u64,
    pub run_id: RunId,
    pub metric: f64,
    pub state: PromotionState,
    /// False when an earlier selection already registered this run.
    pub newly_registered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Promoted,
    Retained,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Promoted => write!(f, "promoted"),
            Self::Retained => write!(f, "retained"),
        }
    }
}

/// Result of one champion/challenger comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionDecision {
    pub model_scope: String,
    pub outcome: Outcome,
    pub metric: String,
    pub champion_version: u64,
    pub champion_metric: f64,
    pub challenger_version: u64,
    pub challenger_metric: f64,
    pub decided_at: DateTime<Utc>,
}

impl PromotionDecision {
    pub fn promoted(&self) -> bool {
        self.outcome == Outcome::Promoted
    }

    /// State of the challenger version after the decision.
    pub fn challenger_state(&self) -> PromotionState {
        match self.outcome {
            Outcome::Promoted => PromotionState::Champion,
            Outcome::Retained => PromotionState::RejectedChallenger,
        }
    }

    /// Version holding the champion alias after the decision.
    pub fn current_champion(&self) -> u64 {
        match self.outcome {
            Outcome::Promoted => self.challenger_version,
            Outcome::Retained => self.champion_version,
        }
    }
}

impl fmt::Display for PromotionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: challenger v{} ({}={}) vs champion v{} ({}={}): {}",
            self.model_scope,
            self.challenger_version,
            self.metric,
            self.challenger_metric,
            self.champion_version,
            self.metric,
            self.champion_metric,
            self.outcome
        )
    }
}
