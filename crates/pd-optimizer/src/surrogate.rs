//! Parzen-estimator surrogate used by the TPE search.
//!
//! The surrogate splits the trial history into a "good" and a "bad" group by
//! loss, fits one density per sampled dimension over each group, and scores
//! candidates by the ratio `l(x) / g(x)` of good to bad density.

use pd_types::{ParameterValue, Params};
use rand::Rng;
use std::f64::consts::PI;

use crate::search::{ParameterKind, SearchSpace};
use crate::trial::TrialHistory;

/// Smallest kernel width, as a fraction of the dimension's range.
const MIN_BANDWIDTH_FRACTION: f64 = 0.01;

/// One-dimensional Parzen window estimator over a bounded interval.
///
/// The density mixes a uniform prior over `[low, high]` (weight
/// `prior_weight`) with one Gaussian kernel per observation (weight 1 each).
#[derive(Debug, Clone, PartialEq)]
pub struct ParzenEstimator {
    low: f64,
    high: f64,
    centers: Vec<f64>,
    bandwidth: f64,
    prior_weight: f64,
}

impl ParzenEstimator {
    pub fn fit(observations: &[f64], low: f64, high: f64, prior_weight: f64) -> Self {
        let range = high - low;
        let n = observations.len() as f64;
        let bandwidth = (range / (1.0 + n).sqrt()).max(range * MIN_BANDWIDTH_FRACTION);
        let centers = observations.iter().map(|v| v.clamp(low, high)).collect();

        Self {
            low,
            high,
            centers,
            bandwidth,
            prior_weight: prior_weight.max(0.0),
        }
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    pub fn len(&self) -> usize {
        self.centers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    pub fn pdf(&self, x: f64) -> f64 {
        let uniform = 1.0 / (self.high - self.low);
        let total_weight = self.prior_weight + self.centers.len() as f64;
        if total_weight <= 0.0 {
            return uniform;
        }

        let norm = 1.0 / (self.bandwidth * (2.0 * PI).sqrt());
        let kernels: f64 = self
            .centers
            .iter()
            .map(|c| {
                let z = (x - c) / self.bandwidth;
                norm * (-0.5 * z * z).exp()
            })
            .sum();

        (self.prior_weight * uniform + kernels) / total_weight
    }

    pub fn log_pdf(&self, x: f64) -> f64 {
        self.pdf(x).max(f64::MIN_POSITIVE).ln()
    }

    /// Draw from the mixture: pick a component by weight, then sample it.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        let n = self.centers.len();
        let total_weight = self.prior_weight + n as f64;
        let pick = rng.random::<f64>() * total_weight;

        if n == 0 || pick < self.prior_weight {
            return rng.random_range(self.low..=self.high);
        }

        let idx = ((pick - self.prior_weight) as usize).min(n - 1);
        let candidate = self.centers[idx] + standard_normal(rng) * self.bandwidth;
        candidate.clamp(self.low, self.high)
    }
}

/// Box-Muller transform.
fn standard_normal<R: Rng>(rng: &mut R) -> f64 {
    let u1: f64 = rng.random::<f64>().max(1e-12);
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

#[derive(Debug, Clone)]
enum Dimension {
    Fixed {
        name: String,
        value: ParameterValue,
    },
    Modeled {
        name: String,
        kind: ParameterKind,
        good: ParzenEstimator,
        bad: ParzenEstimator,
    },
}

/// Belief state over the objective, built from the full trial history.
///
/// A surrogate is never updated in place; the search fits a fresh one before
/// every model-based proposal, so it is a pure function of the history.
#[derive(Debug, Clone)]
pub struct Surrogate {
    dimensions: Vec<Dimension>,
    n_good: usize,
    n_bad: usize,
}

impl Surrogate {
    /// Size of the "good" group for `n` trials at quantile `gamma`.
    pub fn good_count(n: usize, gamma: f64) -> usize {
        if n <= 1 {
            return n;
        }
        ((gamma * n as f64).ceil() as usize).clamp(1, n - 1)
    }

    /// Failed trials only ever count as bad evidence. With no completed trial
    /// the good group is empty and proposals follow the uniform prior.
    pub fn fit(
        space: &SearchSpace,
        history: &TrialHistory,
        gamma: f64,
        prior_weight: f64,
    ) -> Self {
        let ranked = history.ranked();
        let completed = ranked.len() - history.failed_count();
        let n_good = Self::good_count(ranked.len(), gamma).min(completed);
        let (good, bad) = ranked.split_at(n_good);

        let dimensions = space
            .parameters
            .iter()
            .map(|param| match (&param.kind, param.kind.internal_bounds()) {
                (kind, Some((low, high))) => {
                    let observe = |group: &[&crate::trial::Trial]| -> Vec<f64> {
                        group
                            .iter()
                            .filter_map(|t| kind.to_internal(t.parameters.get(&param.name)?))
                            .collect()
                    };
                    Dimension::Modeled {
                        name: param.name.clone(),
                        kind: kind.clone(),
                        good: ParzenEstimator::fit(&observe(good), low, high, prior_weight),
                        bad: ParzenEstimator::fit(&observe(bad), low, high, prior_weight),
                    }
                }
                // Constants decode to themselves from any point.
                (kind, None) => Dimension::Fixed {
                    name: param.name.clone(),
                    value: kind.from_internal(0.0),
                },
            })
            .collect();

        Self {
            dimensions,
            n_good: good.len(),
            n_bad: bad.len(),
        }
    }

    pub fn n_good(&self) -> usize {
        self.n_good
    }

    pub fn n_bad(&self) -> usize {
        self.n_bad
    }

    /// Log of `l(x) / g(x)` summed over modeled dimensions. `point` holds one
    /// internal-space coordinate per modeled dimension, in space order.
    pub fn score(&self, point: &[f64]) -> f64 {
        self.modeled()
            .zip(point)
            .map(|((good, bad), x)| good.log_pdf(*x) - bad.log_pdf(*x))
            .sum()
    }

    /// Draw `n_candidates` points from the good densities and return the one
    /// with the highest score. Ties keep the first-sampled candidate.
    pub fn propose<R: Rng>(&self, rng: &mut R, n_candidates: usize) -> Params {
        let mut best: Option<(f64, Vec<f64>)> = None;

        for _ in 0..n_candidates.max(1) {
            let point: Vec<f64> = self
                .dimensions
                .iter()
                .filter_map(|dim| match dim {
                    Dimension::Modeled { kind, good, .. } => {
                        // Score the value that will actually be evaluated.
                        let raw = good.sample(rng);
                        Some(snap(kind, raw))
                    }
                    Dimension::Fixed { .. } => None,
                })
                .collect();

            let score = self.score(&point);
            let better = match &best {
                None => true,
                Some((best_score, _)) => score > *best_score,
            };
            if better {
                best = Some((score, point));
            }
        }

        let point = best.map(|(_, p)| p).unwrap_or_default();
        self.decode(&point)
    }

    fn modeled(&self) -> impl Iterator<Item = (&ParzenEstimator, &ParzenEstimator)> {
        self.dimensions.iter().filter_map(|dim| match dim {
            Dimension::Modeled { good, bad, .. } => Some((good, bad)),
            Dimension::Fixed { .. } => None,
        })
    }

    fn decode(&self, point: &[f64]) -> Params {
        let mut coords = point.iter();
        self.dimensions
            .iter()
            .filter_map(|dim| match dim {
                Dimension::Fixed { name, value } => Some((name.clone(), value.clone())),
                Dimension::Modeled { name, kind, .. } => {
                    let x = coords.next()?;
                    Some((name.clone(), kind.from_internal(*x)))
                }
            })
            .collect()
    }
}

/// Snap integer dimensions onto the integer grid inside internal space.
fn snap(kind: &ParameterKind, x: f64) -> f64 {
    match kind {
        ParameterKind::IntRange { low, high } => (x.round() as i64).clamp(*low, *high) as f64,
        _ => x,
    }
}
