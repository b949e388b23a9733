//! Registry contents shared by every backend.

use chrono::{DateTime, Utc};
use pd_types::RegistryError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::registry::RegistryResult;
use crate::run::{NewRun, Run, RunId};
use crate::version::{ModelVersion, Stage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredVersion {
    version: u64,
    run_id: RunId,
    stage: Stage,
    description: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct ModelRecord {
    versions: Vec<StoredVersion>,
    /// alias -> version. One entry per alias keeps aliases unique by
    /// construction.
    aliases: BTreeMap<String, u64>,
}

impl ModelRecord {
    fn stored(&self, version: u64) -> Option<&StoredVersion> {
        self.versions.iter().find(|v| v.version == version)
    }

    fn materialize(&self, model_scope: &str, stored: &StoredVersion) -> ModelVersion {
        ModelVersion {
            model_scope: model_scope.to_string(),
            version: stored.version,
            run_id: stored.run_id.clone(),
            aliases: self
                .aliases
                .iter()
                .filter(|(_, v)| **v == stored.version)
                .map(|(alias, _)| alias.clone())
                .collect(),
            stage: stored.stage,
            description: stored.description.clone(),
            created_at: stored.created_at,
        }
    }
}

/// Plain-data registry contents. Every mutation is a single method call, so
/// a backend that applies it under one lock (or one file write) gets the
/// atomicity the [`Registry`](crate::Registry) contract asks for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct RegistryState {
    runs: Vec<Run>,
    models: BTreeMap<String, ModelRecord>,
    next_sequence: u64,
}

impl RegistryState {
    pub(crate) fn create_run(&mut self, scope: &str, new_run: NewRun) -> RunId {
        let run_id = Uuid::new_v4().simple().to_string();
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        self.runs.push(Run {
            run_id: run_id.clone(),
            scope: scope.to_string(),
            name: new_run.name,
            metrics: new_run.metrics,
            parameters: new_run.parameters,
            tags: new_run.tags,
            artifacts: new_run.artifacts,
            created_at: Utc::now(),
            sequence,
        });
        run_id
    }

    pub(crate) fn list_runs(&self, scope: &str) -> Vec<Run> {
        self.runs.iter().filter(|r| r.scope == scope).cloned().collect()
    }

    pub(crate) fn get_run(&self, run_id: &str) -> Option<&Run> {
        self.runs.iter().find(|r| r.run_id == run_id)
    }

    pub(crate) fn register_model_version(
        &mut self,
        model_scope: &str,
        run_id: &str,
        stage: Stage,
        description: &str,
    ) -> RegistryResult<ModelVersion> {
        if self.get_run(run_id).is_none() {
            return Err(RegistryError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }

        let record = self.models.entry(model_scope.to_string()).or_default();
        let version = record.versions.last().map_or(1, |v| v.version + 1);
        let stored = StoredVersion {
            version,
            run_id: run_id.to_string(),
            stage,
            description: description.to_string(),
            created_at: Utc::now(),
        };
        let materialized = record.materialize(model_scope, &stored);
        record.versions.push(stored);
        Ok(materialized)
    }

    pub(crate) fn find_version_by_run(
        &self,
        model_scope: &str,
        run_id: &str,
    ) -> Option<ModelVersion> {
        let record = self.models.get(model_scope)?;
        record
            .versions
            .iter()
            .rev()
            .find(|v| v.run_id == run_id)
            .map(|stored| record.materialize(model_scope, stored))
    }

    pub(crate) fn get_version(&self, model_scope: &str, version: u64) -> Option<ModelVersion> {
        let record = self.models.get(model_scope)?;
        record
            .stored(version)
            .map(|stored| record.materialize(model_scope, stored))
    }

    pub(crate) fn get_alias(&self, model_scope: &str, alias: &str) -> Option<ModelVersion> {
        let record = self.models.get(model_scope)?;
        let version = *record.aliases.get(alias)?;
        record
            .stored(version)
            .map(|stored| record.materialize(model_scope, stored))
    }

    pub(crate) fn set_alias(
        &mut self,
        model_scope: &str,
        alias: &str,
        version: u64,
    ) -> RegistryResult<()> {
        let record = self
            .models
            .get_mut(model_scope)
            .filter(|r| r.stored(version).is_some())
            .ok_or_else(|| RegistryError::VersionNotFound {
                model_scope: model_scope.to_string(),
                version,
            })?;

        // Insert replaces the previous holder in one step.
        record.aliases.insert(alias.to_string(), version);
        Ok(())
    }

    pub(crate) fn delete_alias(&mut self, model_scope: &str, alias: &str) -> bool {
        self.models
            .get_mut(model_scope)
            .map(|r| r.aliases.remove(alias).is_some())
            .unwrap_or(false)
    }

    pub(crate) fn get_metric(
        &self,
        model_scope: &str,
        version: u64,
        name: &str,
    ) -> RegistryResult<Option<f64>> {
        let model_version =
            self.get_version(model_scope, version)
                .ok_or_else(|| RegistryError::VersionNotFound {
                    model_scope: model_scope.to_string(),
                    version,
                })?;

        let run = self
            .get_run(&model_version.run_id)
            .ok_or_else(|| RegistryError::RunNotFound {
                run_id: model_version.run_id.clone(),
            })?;

        Ok(run.metric(name))
    }

    /// Every version in `model_scope` holding `alias` (at most one).
    #[cfg(test)]
    pub(crate) fn holders(&self, model_scope: &str, alias: &str) -> Vec<u64> {
        self.models
            .get(model_scope)
            .map(|record| {
                record
                    .versions
                    .iter()
                    .map(|stored| record.materialize(model_scope, stored))
                    .filter(|mv| mv.has_alias(alias))
                    .map(|mv| mv.version)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_versions(n: usize) -> (RegistryState, Vec<u64>) {
        let mut state = RegistryState::default();
        let mut versions = Vec::new();
        for i in 0..n {
            let run_id = state.create_run("exp", NewRun::new().with_metric("rmse", 5.0 - i as f64));
            let mv = state
                .register_model_version("MyModel", &run_id, Stage::Staging, "")
                .unwrap();
            versions.push(mv.version);
        }
        (state, versions)
    }

    #[test]
    fn versions_are_numbered_per_scope() {
        let (mut state, versions) = state_with_versions(3);
        assert_eq!(versions, vec![1, 2, 3]);

        let run_id = state.create_run("exp", NewRun::new());
        let other = state
            .register_model_version("OtherModel", &run_id, Stage::None, "")
            .unwrap();
        assert_eq!(other.version, 1);
    }

    #[test]
    fn set_alias_moves_holder() {
        let (mut state, _) = state_with_versions(3);

        state.set_alias("MyModel", "champion", 1).unwrap();
        assert_eq!(state.holders("MyModel", "champion"), vec![1]);

        state.set_alias("MyModel", "champion", 3).unwrap();
        assert_eq!(state.holders("MyModel", "champion"), vec![3]);
        assert!(!state.get_version("MyModel", 1).unwrap().has_alias("champion"));
        assert!(state.get_alias("MyModel", "champion").unwrap().has_alias("champion"));
    }

    #[test]
    fn a_version_can_hold_several_aliases() {
        let (mut state, _) = state_with_versions(1);
        state.set_alias("MyModel", "champion", 1).unwrap();
        state.set_alias("MyModel", "challenger", 1).unwrap();
        let mv = state.get_version("MyModel", 1).unwrap();
        assert!(mv.has_alias("champion") && mv.has_alias("challenger"));
    }

    #[test]
    fn set_alias_on_unknown_version_fails_without_change() {
        let (mut state, _) = state_with_versions(1);
        state.set_alias("MyModel", "champion", 1).unwrap();
        let before = state.clone();

        let err = state.set_alias("MyModel", "champion", 9).unwrap_err();
        assert!(matches!(err, RegistryError::VersionNotFound { version: 9, .. }));
        assert_eq!(state, before);
    }

    #[test]
    fn register_requires_existing_run() {
        let mut state = RegistryState::default();
        let err = state
            .register_model_version("MyModel", "missing", Stage::Staging, "")
            .unwrap_err();
        assert!(matches!(err, RegistryError::RunNotFound { .. }));
    }

    #[test]
    fn metric_is_read_through_backing_run() {
        let (state, _) = state_with_versions(2);
        assert_eq!(state.get_metric("MyModel", 2, "rmse").unwrap(), Some(4.0));
        assert_eq!(state.get_metric("MyModel", 2, "mae").unwrap(), None);
        assert!(state.get_metric("MyModel", 7, "rmse").is_err());
    }

    #[test]
    fn find_version_by_run_returns_latest_registration() {
        let mut state = RegistryState::default();
        let run_id = state.create_run("exp", NewRun::new());
        state.register_model_version("MyModel", &run_id, Stage::Staging, "").unwrap();
        state.register_model_version("MyModel", &run_id, Stage::Staging, "").unwrap();
        assert_eq!(state.find_version_by_run("MyModel", &run_id).unwrap().version, 2);
        assert!(state.find_version_by_run("MyModel", "nope").is_none());
    }

    #[test]
    fn runs_are_listed_in_creation_order_per_scope() {
        let mut state = RegistryState::default();
        let a = state.create_run("exp", NewRun::named("a"));
        state.create_run("other", NewRun::named("x"));
        let b = state.create_run("exp", NewRun::named("b"));

        let runs = state.list_runs("exp");
        let ids: Vec<&str> = runs.iter().map(|r| r.run_id.as_str()).collect();
        assert_eq!(ids, vec![a.as_str(), b.as_str()]);
        assert!(runs[0].sequence < runs[1].sequence);
    }

    #[test]
    fn state_survives_json_round_trip() {
        let (mut state, _) = state_with_versions(2);
        state.set_alias("MyModel", "challenger", 2).unwrap();
        let json = serde_json::to_string(&state).unwrap();
        let back: RegistryState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
