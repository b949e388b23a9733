//! Recorded training runs.

use chrono::{DateTime, Utc};
use pd_types::{ParameterValue, Params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Registry-assigned run identifier.
pub type RunId = String;

/// Pointer to a stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Logical path inside the run (e.g. "preprocessor/preprocessor.json").
    pub logical_path: String,
    /// Where the bytes actually live.
    pub uri: String,
}

/// A recorded training event. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: RunId,
    /// Experiment scope the run was recorded under.
    pub scope: String,
    pub name: Option<String>,
    pub metrics: BTreeMap<String, f64>,
    pub parameters: Params,
    pub tags: BTreeMap<String, String>,
    pub artifacts: Vec<ArtifactRef>,
    pub created_at: DateTime<Utc>,
    /// Registry-wide creation order; larger is more recent.
    pub sequence: u64,
}

impl Run {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

/// Everything a caller supplies when recording a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewRun {
    pub name: Option<String>,
    pub metrics: BTreeMap<String, f64>,
    pub parameters: Params,
    pub tags: BTreeMap<String, String>,
    pub artifacts: Vec<ArtifactRef>,
}

impl NewRun {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    pub fn with_params(mut self, params: &Params) -> Self {
        self.parameters
            .extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_artifact(mut self, artifact: ArtifactRef) -> Self {
        self.artifacts.push(artifact);
        self
    }
}
