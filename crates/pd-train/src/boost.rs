//! Second-order gradient boosting of regression trees under squared error.
//!
//! Each round fits one tree to the gradient and hessian of the current
//! predictions using exact greedy split search. Leaf weights are
//! `-soft(G, alpha) / (H + lambda)` scaled by the learning rate, where `soft`
//! is the L1 soft-threshold. A split is kept only when it has positive gain
//! and both children carry at least `min_child_weight` of hessian mass.

use pd_types::{Params, TrainerError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::Dataset;
use crate::trainer::{rmse, EarlyStopping, Trainer};

const SQUARED_ERROR: &str = "reg:squarederror";
const MIN_GAIN: f64 = 1e-12;

/// Settings that are not searched over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoostingConfig {
    pub num_boost_round: usize,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self { num_boost_round: 100 }
    }
}

/// Tree hyperparameters resolved from a parameter assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub learning_rate: f64,
    pub reg_alpha: f64,
    pub reg_lambda: f64,
    pub min_child_weight: f64,
    /// Recorded with the model only. Exact greedy splitting uses every row and
    /// every feature, so training draws no random numbers.
    pub seed: u64,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 6,
            learning_rate: 0.3,
            reg_alpha: 0.0,
            reg_lambda: 1.0,
            min_child_weight: 1.0,
            seed: 0,
        }
    }
}

fn invalid(name: &str, message: impl Into<String>) -> TrainerError {
    TrainerError::InvalidParameter {
        name: name.to_string(),
        message: message.into(),
    }
}

fn non_negative(params: &Params, name: &str, default: f64) -> Result<f64, TrainerError> {
    match params.get(name) {
        None => Ok(default),
        Some(value) => {
            let v = value
                .as_f64()
                .ok_or_else(|| invalid(name, format!("expected a number, got {value}")))?;
            if v.is_finite() && v >= 0.0 {
                Ok(v)
            } else {
                Err(invalid(name, format!("must be finite and non-negative, got {v}")))
            }
        }
    }
}

impl TreeParams {
    /// Missing entries fall back to the defaults; unknown keys are ignored.
    pub fn from_params(params: &Params) -> Result<Self, TrainerError> {
        if let Some(objective) = params.get("objective") {
            let name = objective.as_str().ok_or_else(|| invalid("objective", "expected a string"))?;
            if name != SQUARED_ERROR {
                return Err(TrainerError::UnsupportedObjective {
                    objective: name.to_string(),
                });
            }
        }

        let defaults = Self::default();

        let max_depth = match params.get("max_depth") {
            None => defaults.max_depth,
            Some(value) => match value.as_i64() {
                Some(d) if d >= 1 => d as usize,
                _ => {
                    return Err(invalid(
                        "max_depth",
                        format!("expected a positive integer, got {value}"),
                    ))
                }
            },
        };

        let learning_rate = non_negative(params, "learning_rate", defaults.learning_rate)?;
        if learning_rate == 0.0 {
            return Err(invalid("learning_rate", "must be positive"));
        }

        let seed = match params.get("seed") {
            None => defaults.seed,
            Some(value) => match value.as_i64() {
                Some(s) if s >= 0 => s as u64,
                _ => {
                    return Err(invalid(
                        "seed",
                        format!("expected a non-negative integer, got {value}"),
                    ))
                }
            },
        };

        Ok(Self {
            max_depth,
            learning_rate,
            reg_alpha: non_negative(params, "reg_alpha", defaults.reg_alpha)?,
            reg_lambda: non_negative(params, "reg_lambda", defaults.reg_lambda)?,
            min_child_weight: non_negative(params, "min_child_weight", defaults.min_child_weight)?,
            seed,
        })
    }

    fn soft_threshold(&self, g: f64) -> f64 {
        g.signum() * (g.abs() - self.reg_alpha).max(0.0)
    }

    fn leaf_weight(&self, g: f64, h: f64) -> f64 {
        let denom = h + self.reg_lambda;
        if denom <= 0.0 {
            return 0.0;
        }
        -self.soft_threshold(g) / denom
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        let denom = h + self.reg_lambda;
        if denom <= 0.0 {
            return 0.0;
        }
        self.soft_threshold(g).powi(2) / denom
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A regression tree stored as a flat node list rooted at index 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    // Missing values follow the right branch.
                    idx = if row[feature] < threshold { left } else { right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, left).max(walk(nodes, right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

struct SplitCandidate {
    gain: f64,
    feature: usize,
    threshold: f64,
    /// Number of sorted rows that go left.
    left_len: usize,
}

struct TreeBuilder<'a> {
    params: &'a TreeParams,
    rows: &'a [Vec<f64>],
    grad: &'a [f64],
    hess: &'a [f64],
    nodes: Vec<Node>,
}

impl TreeBuilder<'_> {
    fn build(mut self, indices: &mut [usize]) -> Tree {
        self.grow(indices, 0);
        Tree { nodes: self.nodes }
    }

    fn grow(&mut self, indices: &mut [usize], depth: usize) -> usize {
        let g: f64 = indices.iter().map(|&i| self.grad[i]).sum();
        let h: f64 = indices.iter().map(|&i| self.hess[i]).sum();

        let node_idx = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: self.params.leaf_weight(g, h) * self.params.learning_rate,
        });

        if depth >= self.params.max_depth || indices.len() < 2 {
            return node_idx;
        }

        let Some(best) = self.best_split(indices, g, h) else {
            return node_idx;
        };

        indices.sort_by(|&a, &b| self.rows[a][best.feature].total_cmp(&self.rows[b][best.feature]));
        let (left_idx, right_idx) = indices.split_at_mut(best.left_len);

        let left = self.grow(left_idx, depth + 1);
        let right = self.grow(right_idx, depth + 1);
        self.nodes[node_idx] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        node_idx
    }

    fn best_split(&self, indices: &[usize], g: f64, h: f64) -> Option<SplitCandidate> {
        let parent = self.params.score(g, h);
        let n_features = self.rows[indices[0]].len();
        let mut best: Option<SplitCandidate> = None;
        let mut sorted = indices.to_vec();

        for feature in 0..n_features {
            sorted.sort_by(|&a, &b| self.rows[a][feature].total_cmp(&self.rows[b][feature]));

            let mut gl = 0.0;
            let mut hl = 0.0;
            for pos in 0..sorted.len() - 1 {
                let i = sorted[pos];
                gl += self.grad[i];
                hl += self.hess[i];

                let here = self.rows[i][feature];
                let next = self.rows[sorted[pos + 1]][feature];
                if !here.is_finite() || !next.is_finite() || here == next {
                    continue;
                }

                let gr = g - gl;
                let hr = h - hl;
                if hl < self.params.min_child_weight || hr < self.params.min_child_weight {
                    continue;
                }

                let gain = 0.5 * (self.params.score(gl, hl) + self.params.score(gr, hr) - parent);
                if gain > MIN_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        gain,
                        feature,
                        threshold: here + (next - here) / 2.0,
                        left_len: pos + 1,
                    });
                }
            }
        }

        best
    }
}

/// A fitted ensemble. Predictions are `base_score` plus the sum of tree outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedModel {
    pub base_score: f64,
    pub trees: Vec<Tree>,
    pub n_features: usize,
    pub feature_names: Vec<String>,
    pub params: TreeParams,
    /// Round with the lowest validation error when early stopping was active.
    pub best_iteration: Option<usize>,
}

impl BoostedModel {
    fn predict_row(&self, row: &[f64]) -> f64 {
        self.base_score + self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }
}

/// Gradient-boosted regression trees.
#[derive(Debug, Clone, Default)]
pub struct BoostedTreeTrainer {
    config: BoostingConfig,
}

impl BoostedTreeTrainer {
    pub fn new(config: BoostingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BoostingConfig {
        &self.config
    }
}

fn check_width(expected: usize, rows: &[Vec<f64>]) -> Result<(), TrainerError> {
    match rows.iter().find(|r| r.len() != expected) {
        Some(row) => Err(TrainerError::FeatureMismatch {
            expected,
            actual: row.len(),
        }),
        None => Ok(()),
    }
}

impl Trainer for BoostedTreeTrainer {
    type Model = BoostedModel;

    fn name(&self) -> &str {
        "gradient_boosting"
    }

    fn fit(
        &self,
        params: &Params,
        train: &Dataset,
        early_stopping: Option<EarlyStopping<'_>>,
    ) -> Result<BoostedModel, TrainerError> {
        let tree_params = TreeParams::from_params(params)?;
        let n_features = train.n_features();
        check_width(n_features, &train.rows)?;
        if let Some(es) = &early_stopping {
            check_width(n_features, &es.validation.rows)?;
        }

        let base_score = if train.is_empty() {
            0.0
        } else {
            train.labels.iter().sum::<f64>() / train.len() as f64
        };

        let mut model = BoostedModel {
            base_score,
            trees: Vec::with_capacity(self.config.num_boost_round),
            n_features,
            feature_names: train.feature_names.clone(),
            params: tree_params,
            best_iteration: None,
        };

        if train.is_empty() {
            return Ok(model);
        }

        let mut train_preds = vec![base_score; train.len()];
        let mut val_preds = early_stopping
            .as_ref()
            .map(|es| vec![base_score; es.validation.len()]);
        let hess = vec![1.0; train.len()];
        let mut best: Option<(usize, f64)> = None;

        for round in 0..self.config.num_boost_round {
            let grad: Vec<f64> = train_preds
                .iter()
                .zip(&train.labels)
                .map(|(p, y)| p - y)
                .collect();

            let mut indices: Vec<usize> = (0..train.len()).collect();
            let tree = TreeBuilder {
                params: &model.params,
                rows: &train.rows,
                grad: &grad,
                hess: &hess,
                nodes: Vec::new(),
            }
            .build(&mut indices);

            for (pred, row) in train_preds.iter_mut().zip(&train.rows) {
                *pred += tree.predict(row);
            }
            if train_preds.iter().any(|p| !p.is_finite()) {
                return Err(TrainerError::NumericOverflow { round });
            }

            if let (Some(es), Some(preds)) = (&early_stopping, val_preds.as_mut()) {
                for (pred, row) in preds.iter_mut().zip(&es.validation.rows) {
                    *pred += tree.predict(row);
                }
                model.trees.push(tree);

                let score = rmse(preds, &es.validation.labels)
                    .map_err(|_| TrainerError::NumericOverflow { round })?;
                debug!(round, validation_rmse = score, "boosting round");

                match best {
                    Some((_, best_score)) if score >= best_score => {}
                    _ => best = Some((round, score)),
                }
                if let Some((best_round, _)) = best {
                    if es.rounds > 0 && round - best_round >= es.rounds {
                        debug!(round, best_round, "early stopping");
                        break;
                    }
                }
            } else {
                model.trees.push(tree);
            }
        }

        if let Some((best_round, _)) = best {
            model.trees.truncate(best_round + 1);
            model.best_iteration = Some(best_round);
        }

        Ok(model)
    }

    fn predict(&self, model: &BoostedModel, rows: &[Vec<f64>]) -> Result<Vec<f64>, TrainerError> {
        check_width(model.n_features, rows)?;
        Ok(rows.iter().map(|row| model.predict_row(row)).collect())
    }
}
