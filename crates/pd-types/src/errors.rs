use thiserror::Error;

/// Main error type for the Podium pipeline
#[derive(Error, Debug)]
pub enum PdError {
    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Promotion error: {0}")]
    Promotion(#[from] PromotionError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Fatal errors raised by a trainer implementation.
#[derive(Error, Debug)]
pub enum TrainerError {
    #[error("Invalid hyperparameter {name}: {message}")]
    InvalidParameter { name: String, message: String },

    #[error("Unsupported objective: {objective}")]
    UnsupportedObjective { objective: String },

    #[error("Feature width mismatch: model expects {expected}, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },

    #[error("Numeric overflow during training at round {round}")]
    NumericOverflow { round: usize },
}

/// A single trial or final fit could not complete.
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Empty {split} split")]
    EmptySplit { split: &'static str },

    #[error("Non-numeric value in column '{column}' at line {line}")]
    NonNumeric { column: String, line: usize },

    #[error("Non-finite label in {split} split at row {row}")]
    NonFiniteLabel { split: &'static str, row: usize },

    #[error("Column not found: {column}")]
    ColumnNotFound { column: String },

    #[error("Data loading failed: {message}")]
    LoadingFailed { message: String },

    #[error("Prediction count {predictions} does not match label count {labels}")]
    LengthMismatch { predictions: usize, labels: usize },

    #[error("Validation loss is not finite")]
    NonFiniteLoss,

    #[error(transparent)]
    Trainer(#[from] TrainerError),
}

/// Failures of the sequential search itself.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Empty search space")]
    EmptySpace,

    #[error("Invalid search space: parameter {parameter}, message: {message}")]
    InvalidSpace { parameter: String, message: String },

    #[error("Trial budget must be positive")]
    ZeroBudget,

    #[error("All {trials} trials failed; no usable parameters found")]
    Exhausted { trials: usize },
}

/// Errors surfaced by a model registry backend.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Registry unavailable: {message}")]
    Unavailable { message: String },

    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    #[error("Model version not found: {model_scope} v{version}")]
    VersionNotFound { model_scope: String, version: u64 },

    #[error("Registry storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Registry serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the champion/challenger promotion steps.
#[derive(Error, Debug)]
pub enum PromotionError {
    #[error("No runs with a recorded metric found in experiment '{experiment_scope}'")]
    NoRunsFound { experiment_scope: String },

    #[error("Alias '{alias}' is not set in model scope '{model_scope}'")]
    AliasNotFound { model_scope: String, alias: String },

    #[error("Metric '{metric}' missing for '{alias}' ({model_scope} v{version}, run {run_id})")]
    MetricMissing {
        model_scope: String,
        alias: String,
        version: u64,
        run_id: String,
        metric: String,
    },

    #[error("Registry step '{step}' failed for scope '{scope}': {source}")]
    Registry {
        step: &'static str,
        scope: String,
        #[source]
        source: RegistryError,
    },
}

impl PromotionError {
    /// Registry-state preconditions that should be reported to the caller
    /// without aborting the pipeline.
    pub fn is_reportable(&self) -> bool {
        matches!(
            self,
            Self::NoRunsFound { .. } | Self::AliasNotFound { .. } | Self::MetricMissing { .. }
        )
    }
}

/// Errors from artifact persistence.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Invalid artifact path: {path}")]
    InvalidPath { path: String },

    #[error("Failed to write artifact {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for Podium operations
pub type PdResult<T> = Result<T, PdError>;

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::PdError::Config(format!($($arg)*))
    };
}
