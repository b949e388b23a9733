//! Registry persisted as a single JSON document.

use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::registry::{Registry, RegistryResult};
use crate::run::{NewRun, Run, RunId};
use crate::state::RegistryState;
use crate::version::{ModelVersion, Stage};

/// Registry whose contents live in a JSON file so aliases survive between
/// pipeline invocations.
///
/// Mutations are applied to a copy of the state, written to a temporary file
/// and renamed over the existing file, and only then made visible in memory. A
/// failed write leaves both the file and the in-memory view unchanged.
///
/// Each mutation starts from the state currently on disk, so handles opened
/// one after another on the same path see each other's writes. There is no
/// cross-process lock: two processes mutating the file at the same moment can
/// still lose one of the writes, so run one writer per registry file.
#[derive(Debug)]
pub struct JsonFileRegistry {
    path: PathBuf,
    state: RwLock<RegistryState>,
}

impl JsonFileRegistry {
    /// Open the registry at `path`, starting empty if the file does not exist.
    pub fn open<P: AsRef<Path>>(path: P) -> RegistryResult<Self> {
        let path = path.as_ref().to_path_buf();
        let state = match Self::load(&path)? {
            Some(state) => {
                info!("Loaded registry from {}", path.display());
                state
            }
            None => {
                info!("Starting new registry at {}", path.display());
                RegistryState::default()
            }
        };

        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> RegistryResult<Option<RegistryState>> {
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn persist(&self, state: &RegistryState) -> RegistryResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
        fs::rename(&tmp, &self.path)?;
        debug!("Persisted registry to {}", self.path.display());
        Ok(())
    }

    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut RegistryState) -> RegistryResult<T>,
    ) -> RegistryResult<T> {
        let mut guard = self.state.write();
        let mut next = match Self::load(&self.path)? {
            Some(on_disk) => on_disk,
            None => guard.clone(),
        };
        let out = f(&mut next)?;
        self.persist(&next)?;
        *guard = next;
        Ok(out)
    }
}

impl Registry for JsonFileRegistry {
    fn create_run(&self, scope: &str, run: NewRun) -> RegistryResult<RunId> {
        self.mutate(|state| Ok(state.create_run(scope, run)))
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
        self.mutate(|state| state.register_model_version(model_scope, run_id, stage, description))
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
        self.mutate(|state| state.set_alias(model_scope, alias, version))
    }

    fn delete_alias(&self, model_scope: &str, alias: &str) -> RegistryResult<bool> {
        self.mutate(|state| Ok(state.delete_alias(model_scope, alias)))
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
