//! Pipeline configuration.

use pd_registry::RetryPolicy;
use pd_train::CsvOptions;
use pd_types::{config_error, PdResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything a pipeline invocation needs. Missing JSON fields take the
/// defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data_source: PathBuf,
    /// Number of search trials.
    pub trial_budget: usize,
    pub experiment_scope: String,
    pub model_scope: String,
    pub target_column: String,
    pub drop_columns: Vec<String>,
    pub test_fraction: f64,
    pub split_seed: u64,
    /// Fixed seed for the search; `None` draws one from the OS.
    pub search_seed: Option<u64>,
    /// Random trials before the surrogate takes over.
    pub warm_up: usize,
    pub num_boost_round: usize,
    pub early_stopping_rounds: usize,
    /// Record every search trial as its own run.
    pub record_trials: bool,
    /// Install the first challenger as champion when no champion exists.
    pub bootstrap_champion: bool,
    pub artifact_dir: PathBuf,
    pub registry_path: PathBuf,
    pub retry_max_attempts: u32,
    pub retry_delay_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_source: PathBuf::from("data/raw/data.csv"),
            trial_budget: 10,
            experiment_scope: "podium-experiment".to_string(),
            model_scope: "MyModel".to_string(),
            target_column: "temp".to_string(),
            drop_columns: vec!["device".to_string()],
            test_fraction: 0.33,
            split_seed: 42,
            search_seed: None,
            warm_up: 3,
            num_boost_round: 100,
            early_stopping_rounds: 10,
            record_trials: false,
            bootstrap_champion: false,
            artifact_dir: PathBuf::from("models"),
            registry_path: PathBuf::from("registry.json"),
            retry_max_attempts: 5,
            retry_delay_secs: 30,
        }
    }
}

impl PipelineConfig {
    pub fn new(data_source: impl Into<PathBuf>, experiment_scope: &str, model_scope: &str) -> Self {
        Self {
            data_source: data_source.into(),
            experiment_scope: experiment_scope.to_string(),
            model_scope: model_scope.to_string(),
            ..Self::default()
        }
    }

    /// Parse a JSON config file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> PdResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| config_error!("cannot read {}: {}", path.display(), e))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| config_error!("invalid config {}: {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `PODIUM_*` environment variables.
    pub fn from_env() -> PdResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> PdResult<Self> {
        let mut config = Self::default();

        if let Some(v) = lookup("PODIUM_DATA_SOURCE") {
            config.data_source = PathBuf::from(v);
        }
        if let Some(v) = lookup("PODIUM_TRIAL_BUDGET") {
            config.trial_budget = v.parse().map_err(|_| {
                config_error!(
                    "PODIUM_TRIAL_BUDGET must be a non-negative integer, got '{}'",
                    v
                )
            })?;
        }
        if let Some(v) = lookup("PODIUM_EXPERIMENT_SCOPE") {
            config.experiment_scope = v;
        }
        if let Some(v) = lookup("PODIUM_MODEL_SCOPE") {
            config.model_scope = v;
        }
        if let Some(v) = lookup("PODIUM_SEARCH_SEED") {
            config.search_seed = Some(
                v.parse()
                    .map_err(|_| {
                        config_error!("PODIUM_SEARCH_SEED must be an integer, got '{}'", v)
                    })?,
            );
        }
        if let Some(v) = lookup("PODIUM_REGISTRY_PATH") {
            config.registry_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("PODIUM_ARTIFACT_DIR") {
            config.artifact_dir = PathBuf::from(v);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PdResult<()> {
        if self.trial_budget == 0 {
            return Err(config_error!("trial_budget must be positive"));
        }
        if self.experiment_scope.trim().is_empty() {
            return Err(config_error!("experiment_scope must not be empty"));
        }
        if self.model_scope.trim().is_empty() {
            return Err(config_error!("model_scope must not be empty"));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(config_error!(
                "test_fraction must be in (0, 1), got {}",
                self.test_fraction
            ));
        }
        if self.num_boost_round == 0 {
            return Err(config_error!("num_boost_round must be positive"));
        }
        Ok(())
    }

    pub fn csv_options(&self) -> CsvOptions {
        CsvOptions {
            target: self.target_column.clone(),
            drop: self.drop_columns.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_secs(self.retry_delay_secs),
        )
    }
}
