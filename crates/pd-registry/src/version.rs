//! Registered model versions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::run::RunId;

/// Lifecycle stage recorded when a version is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    None,
    Staging,
    Production,
    Archived,
}

impl Default for Stage {
    fn default() -> Self {
        Self::None
    }
}

/// A registered model backed by exactly one run.
///
/// `aliases` is a snapshot taken when the version was read; the registry's
/// alias table is the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub model_scope: String,
    pub version: u64,
    /// Back-reference to the run that produced the model.
    pub run_id: RunId,
    pub aliases: BTreeSet<String>,
    pub stage: Stage,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl ModelVersion {
    pub fn has_alias(&self, alias: &str) -> bool {
        self.aliases.contains(alias)
    }
}

impl std::fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} v{}", self.model_scope, self.version)
    }
}
