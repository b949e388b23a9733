//! Process-local registry held behind a single lock.

use parking_lot::RwLock;
use tracing::debug;

use crate::registry::{Registry, RegistryResult};
use crate::run::{NewRun, Run, RunId};
use crate::state::RegistryState;
use crate::version::{ModelVersion, Stage};

/// Process-local registry. Each mutation runs inside one write-lock critical
/// section.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    state: RwLock<RegistryState>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Registry for InMemoryRegistry {
    fn create_run(&self, scope: &str, run: NewRun) -> RegistryResult<RunId> {
        let run_id = self.state.write().create_run(scope, run);
        debug!(scope, run_id = %run_id, "recorded run");
        Ok(run_id)
    }

    fn list_runs(&self, scope: &str) -> RegistryResult<Vec<Run>> {
        Ok(self.state.read().list_runs(scope))
    }

    fn get_run(&self, run_id: &str) -> RegistryResult<Option<Run>> {
        Ok(self.state.read().get_run(run_id).cloned())
    }

    fn register_model_version(
        &self,
        model_scope: &str,
        run_id: &str,
        stage: Stage,
        description: &str,
    ) -> RegistryResult<ModelVersion> {
        self.state
            .write()
            .register_model_version(model_scope, run_id, stage, description)
    }

    fn find_version_by_run(
        &self,
        model_scope: &str,
        run_id: &str,
    ) -> RegistryResult<Option<ModelVersion>> {
        Ok(self.state.read().find_version_by_run(model_scope, run_id))
    }

    fn get_version(&self, model_scope: &str, version: u64) -> RegistryResult<Option<ModelVersion>> {
        Ok(self.state.read().get_version(model_scope, version))
    }

    fn get_alias(&self, model_scope: &str, alias: &str) -> RegistryResult<Option<ModelVersion>> {
        Ok(self.state.read().get_alias(model_scope, alias))
    }

    fn set_alias(&self, model_scope: &str, alias: &str, version: u64) -> RegistryResult<()> {
        self.state.write().set_alias(model_scope, alias, version)
    }

    fn delete_alias(&self, model_scope: &str, alias: &str) -> RegistryResult<bool> {
        Ok(self.state.write().delete_alias(model_scope, alias))
    }

    fn get_metric(
        &self,
        model_scope: &str,
        version: u64,
        name: &str,
    ) -> RegistryResult<Option<f64>> {
        self.state.read().get_metric(model_scope, version, name)
    }
}
