//! # pd-promote
//!
//! Two-slot promotion over a model registry. [`PromotionStateMachine::select_challenger`]
//! ranks the runs of an experiment and stages the best one under the
//! challenger alias; [`PromotionStateMachine::update_champion`] compares the
//! challenger against the current champion and moves the champion alias when
//! the challenger is strictly better.

mod decision;
mod machine;

pub use decision::{Challenger, Outcome, PromotionDecision, PromotionState};
pub use machine::PromotionStateMachine;
