//! # pd-optimizer
//!
//! Sequential model-based hyperparameter search for Podium.
//!
//! Provides search space definitions, the trial history owned by a search, the
//! Parzen-estimator surrogate, and the Tree-structured Parzen Estimator loop
//! that drives an objective one trial at a time.

mod search;
mod surrogate;
mod tpe;
mod trial;

pub use search::{ParameterDef, ParameterKind, SearchSpace};
pub use surrogate::{ParzenEstimator, Surrogate};
pub use tpe::{SearchOutcome, TpeConfig, TpeOptimizer};
pub use trial::{Trial, TrialHistory};
