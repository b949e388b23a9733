//! Search space definitions and uniform sampling.

use pd_types::{ParameterValue, Params, SearchError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A single parameter dimension in the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Parameter name as the trainer reads it (e.g. "max_depth").
    pub name: String,
    /// The kind of search range.
    pub kind: ParameterKind,
}

/// Describes how a parameter is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterKind {
    /// Integer range [low, high] inclusive, uniform over the integers.
    IntRange { low: i64, high: i64 },
    /// Continuous uniform range [low, high].
    FloatRange { low: f64, high: f64 },
    /// Log-uniform range (sampled in log-space then exponentiated).
    LogUniform { low: f64, high: f64 },
    /// Constant passed through unchanged; never sampled.
    Fixed { value: ParameterValue },
}

impl ParameterKind {
    /// Whether the search has any freedom in this dimension.
    pub fn is_sampled(&self) -> bool {
        !matches!(self, Self::Fixed { .. })
    }

    /// Bounds of the continuous space the surrogate models this dimension in.
    ///
    /// Integers are widened by half a step on each side so the end points get
    /// the same mass as interior values after rounding.
    pub(crate) fn internal_bounds(&self) -> Option<(f64, f64)> {
        match self {
            Self::IntRange { low, high } => Some((*low as f64 - 0.5, *high as f64 + 0.5)),
            Self::FloatRange { low, high } => Some((*low, *high)),
            Self::LogUniform { low, high } => Some((low.ln(), high.ln())),
            Self::Fixed { .. } => None,
        }
    }

    /// Map a concrete value into the surrogate's space.
    pub(crate) fn to_internal(&self, value: &ParameterValue) -> Option<f64> {
        let v = value.as_f64()?;
        match self {
            Self::IntRange { .. } | Self::FloatRange { .. } => Some(v),
            Self::LogUniform { .. } if v > 0.0 => Some(v.ln()),
            Self::LogUniform { .. } | Self::Fixed { .. } => None,
        }
    }

    /// Map a point of the surrogate's space back to a concrete value, clamped
    /// into the declared range.
    pub(crate) fn from_internal(&self, x: f64) -> ParameterValue {
        match self {
            Self::IntRange { low, high } => {
                ParameterValue::Int((x.round() as i64).clamp(*low, *high))
            }
            Self::FloatRange { low, high } => ParameterValue::Float(x.clamp(*low, *high)),
            Self::LogUniform { low, high } => ParameterValue::Float(x.exp().clamp(*low, *high)),
            Self::Fixed { value } => value.clone(),
        }
    }

    /// Draw one value uniformly from the declared distribution.
    pub(crate) fn sample_uniform<R: Rng>(&self, rng: &mut R) -> ParameterValue {
        match self {
            Self::IntRange { low, high } => ParameterValue::Int(rng.random_range(*low..=*high)),
            Self::FloatRange { low, high } => ParameterValue::Float(rng.random_range(*low..=*high)),
            Self::LogUniform { low, high } => {
                let log_val: f64 = rng.random_range(low.ln()..=high.ln());
                ParameterValue::Float(log_val.exp().clamp(*low, *high))
            }
            Self::Fixed { value } => value.clone(),
        }
    }
}

/// The full search space: an ordered list of parameter definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterDef>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    /// The gradient-boosting space the pipeline tunes by default.
    pub fn boosting_default() -> Self {
        Self::new()
            .add_int("max_depth", 4, 100)
            .add_log_uniform("learning_rate", (-3.0f64).exp(), 1.0)
            .add_log_uniform("reg_alpha", (-5.0f64).exp(), (-1.0f64).exp())
            .add_log_uniform("reg_lambda", (-6.0f64).exp(), (-1.0f64).exp())
            .add_log_uniform("min_child_weight", (-1.0f64).exp(), 3.0f64.exp())
            .add_fixed("objective", "reg:squarederror")
            .add_fixed("seed", 42i64)
    }

    pub fn add_int(mut self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::IntRange { low, high },
        });
        self
    }

    pub fn add_float(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::FloatRange { low, high },
        });
        self
    }

    pub fn add_log_uniform(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::LogUniform { low, high },
        });
        self
    }

    pub fn add_fixed(mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::Fixed {
                value: value.into(),
            },
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Dimensions the search actually samples (everything except constants).
    pub fn sampled(&self) -> impl Iterator<Item = &ParameterDef> {
        self.parameters.iter().filter(|p| p.kind.is_sampled())
    }

    pub fn get(&self, name: &str) -> Option<&ParameterDef> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Check that the space can be searched.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.parameters.is_empty() {
            return Err(SearchError::EmptySpace);
        }

        let mut seen = HashSet::new();
        for param in &self.parameters {
            let invalid = |message: &str| SearchError::InvalidSpace {
                parameter: param.name.clone(),
                message: message.to_string(),
            };

            if !seen.insert(param.name.as_str()) {
                return Err(invalid("duplicate parameter name"));
            }

            match &param.kind {
                ParameterKind::IntRange { low, high } if low > high => {
                    return Err(invalid("low is greater than high"));
                }
                ParameterKind::FloatRange { low, high } => {
                    if !(low.is_finite() && high.is_finite()) || low >= high {
                        return Err(invalid("bounds must be finite with low < high"));
                    }
                }
                ParameterKind::LogUniform { low, high } => {
                    if !(low.is_finite() && high.is_finite()) || *low <= 0.0 || low >= high {
                        return Err(invalid("bounds must satisfy 0 < low < high"));
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Independent uniform draw across every dimension.
    pub fn sample_uniform<R: Rng>(&self, rng: &mut R) -> Params {
        self.parameters
            .iter()
            .map(|param| (param.name.clone(), param.kind.sample_uniform(rng)))
            .collect()
    }
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self::new()
    }
}
