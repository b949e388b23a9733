//! # pd-pipeline
//!
//! Wires the stages together in order: load and split the data, search the
//! boosting parameter space, retrain with the winner, record the run, stage
//! the best run as challenger and compare it against the champion.

pub mod config;
pub mod pipeline;

pub use config::PipelineConfig;
pub use pipeline::{Pipeline, PipelineReport, PromotionFailure};
