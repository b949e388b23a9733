//! The registry interface the pipeline and promotion logic are written against.

use pd_types::RegistryError;

use crate::run::{NewRun, Run, RunId};
use crate::version::{ModelVersion, Stage};

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Stores runs, metrics, and model versions with mutable aliases.
///
/// Implementations must keep aliases unique per model scope: setting an alias
/// on one version removes it from whichever version held it before, and the
/// move must be observed as a single transition (never zero or two holders).
pub trait Registry: Send + Sync {
    /// Record a run under an experiment scope.
    fn create_run(&self, scope: &str, run: NewRun) -> RegistryResult<RunId>;

    /// All runs in `scope`, oldest first.
    fn list_runs(&self, scope: &str) -> RegistryResult<Vec<Run>>;

    fn get_run(&self, run_id: &str) -> RegistryResult<Option<Run>>;

    /// Register a new version of `model_scope` backed by `run_id`.
    fn register_model_version(
        &self,
        model_scope: &str,
        run_id: &str,
        stage: Stage,
        description: &str,
    ) -> RegistryResult<ModelVersion>;

    /// The most recent version of `model_scope` registered from `run_id`.
    fn find_version_by_run(
        &self,
        model_scope: &str,
        run_id: &str,
    ) -> RegistryResult<Option<ModelVersion>>;

    fn get_version(&self, model_scope: &str, version: u64) -> RegistryResult<Option<ModelVersion>>;

    /// The version currently holding `alias`, if any.
    fn get_alias(&self, model_scope: &str, alias: &str) -> RegistryResult<Option<ModelVersion>>;

    /// Point `alias` at `version`, detaching it from any previous holder.
    fn set_alias(&self, model_scope: &str, alias: &str, version: u64) -> RegistryResult<()>;

    /// Remove `alias`; returns whether it was set.
    fn delete_alias(&self, model_scope: &str, alias: &str) -> RegistryResult<bool>;

    /// Metric `name` recorded on the run backing `version`.
    fn get_metric(
        &self,
        model_scope: &str,
        version: u64,
        name: &str,
    ) -> RegistryResult<Option<f64>>;
}
