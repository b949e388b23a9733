//! # pd-train
//!
//! Everything between raw CSV rows and a recorded model: dataset loading and
//! splitting, the fitted preprocessor, the [`Trainer`] capability with a
//! gradient-boosted tree implementation, per-trial evaluation, and the final
//! fit that stores artifacts and records a run.

pub mod artifacts;
pub mod boost;
pub mod dataset;
pub mod evaluator;
pub mod finalize;
pub mod preprocess;
pub mod trainer;

pub use artifacts::{ArtifactStore, FileArtifactStore};
pub use boost::{BoostedModel, BoostedTreeTrainer, BoostingConfig};
pub use dataset::{CsvOptions, DataSplit, Dataset};
pub use evaluator::Evaluator;
pub use finalize::{FinalModel, FinalTrainer};
pub use preprocess::Preprocessor;
pub use trainer::{rmse, EarlyStopping, Trainer};
