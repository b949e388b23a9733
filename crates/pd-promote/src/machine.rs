//! Champion/challenger promotion over a registry.

use chrono::Utc;
use pd_registry::{ModelVersion, Registry, RegistryResult, RetryPolicy, Run, Stage};
use pd_types::PromotionError;
use tracing::{info, warn};

use crate::decision::{Challenger, Outcome, PromotionDecision, PromotionState};

/// Manages the challenger and champion aliases of a model scope.
///
/// Every registry call goes through the retry policy individually. Missing
/// runs, aliases and metrics come back as successful empty reads and are
/// reported as precondition errors without being retried.
pub struct PromotionStateMachine<'a> {
    registry: &'a dyn Registry,
    retry: RetryPolicy,
    metric: String,
    challenger_alias: String,
    champion_alias: String,
}

impl<'a> PromotionStateMachine<'a> {
    pub fn new(registry: &'a dyn Registry, retry: RetryPolicy) -> Self {
        Self {
            registry,
            retry,
            metric: "rmse".to_string(),
            challenger_alias: "challenger".to_string(),
            champion_alias: "champion".to_string(),
        }
    }

    /// Metric compared between versions; lower is better.
    pub fn with_metric(mut self, metric: impl Into<String>) -> Self {
        self.metric = metric.into();
        self
    }

    pub fn with_aliases(
        mut self,
        challenger: impl Into<String>,
        champion: impl Into<String>,
    ) -> Self {
        self.challenger_alias = challenger.into();
        self.champion_alias = champion.into();
        self
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    fn call<T>(
        &self,
        step: &'static str,
        scope: &str,
        op: impl FnMut() -> RegistryResult<T>,
    ) -> Result<T, PromotionError> {
        self.retry
            .with_retry(step, op)
            .map_err(|source| PromotionError::Registry {
                step,
                scope: scope.to_string(),
                source,
            })
    }

    /// Stage the lowest-metric run of `experiment_scope` as the challenger of
    /// `model_scope`. Ties go to the most recent run. Re-running against
    /// unchanged runs reuses the version registered the first time.
    pub fn select_challenger(
        &self,
        experiment_scope: &str,
        model_scope: &str,
    ) -> Result<Challenger, PromotionError> {
        let runs = self.call("list_runs", experiment_scope, || {
            self.registry.list_runs(experiment_scope)
        })?;

        let (best, metric) =
            best_run(&runs, &self.metric).ok_or_else(|| PromotionError::NoRunsFound {
                experiment_scope: experiment_scope.to_string(),
            })?;
        info!(
            scope = experiment_scope,
            run_id = %best.run_id,
            metric = %self.metric,
            value = metric,
            candidates = runs.len(),
            "selected best run"
        );

        let existing = self.call("find_version_by_run", model_scope, || {
            self.registry.find_version_by_run(model_scope, &best.run_id)
        })?;
        let newly_registered = existing.is_none();
        let version = match existing {
            Some(version) => version,
            None => {
                let description = format!("{} {}={}", self.challenger_alias, self.metric, metric);
                self.call("register_model_version", model_scope, || {
                    self.registry.register_model_version(
                        model_scope,
                        &best.run_id,
                        Stage::Staging,
                        &description,
                    )
                })?
            }
        };

        self.call("set_alias", model_scope, || {
            self.registry
                .set_alias(model_scope, &self.challenger_alias, version.version)
        })?;
        info!(
            scope = model_scope,
            alias = %self.challenger_alias,
            version = version.version,
            newly_registered,
            "challenger staged"
        );

        Ok(Challenger {
            model_scope: model_scope.to_string(),
            version: version.version,
            run_id: version.run_id,
            metric,
            state: PromotionState::Staged,
            newly_registered,
        })
    }

    /// Compare challenger and champion; move the champion alias only when the
    /// challenger's metric is strictly lower. A tie keeps the champion.
    pub fn update_champion(&self, model_scope: &str) -> Result<PromotionDecision, PromotionError> {
        let champion = self.resolve_alias(model_scope, &self.champion_alias)?;
        let challenger = self.resolve_alias(model_scope, &self.challenger_alias)?;

        let champion_metric =
            self.version_metric(model_scope, &self.champion_alias, &champion)?;
        let challenger_metric =
            self.version_metric(model_scope, &self.challenger_alias, &challenger)?;

        let outcome = if challenger_metric < champion_metric {
            self.call("set_alias", model_scope, || {
                self.registry
                    .set_alias(model_scope, &self.champion_alias, challenger.version)
            })?;
            Outcome::Promoted
        } else {
            Outcome::Retained
        };

        let decision = PromotionDecision {
            model_scope: model_scope.to_string(),
            outcome,
            metric: self.metric.clone(),
            champion_version: champion.version,
            champion_metric,
            challenger_version: challenger.version,
            challenger_metric,
            decided_at: Utc::now(),
        };
        info!(
            scope = model_scope,
            outcome = %decision.outcome,
            champion_version = decision.current_champion(),
            "champion update: {}",
            decision
        );
        Ok(decision)
    }

    /// Point the champion alias at the current challenger when no champion
    /// exists yet. Returns the installed version, or `None` when a champion is
    /// already set.
    pub fn bootstrap_champion(&self, model_scope: &str) -> Result<Option<u64>, PromotionError> {
        let current = self.call("get_alias", model_scope, || {
            self.registry.get_alias(model_scope, &self.champion_alias)
        })?;
        if current.is_some() {
            return Ok(None);
        }

        let challenger = self.resolve_alias(model_scope, &self.challenger_alias)?;
        self.call("set_alias", model_scope, || {
            self.registry
                .set_alias(model_scope, &self.champion_alias, challenger.version)
        })?;
        info!(
            scope = model_scope,
            version = challenger.version,
            "no champion set; installed challenger as champion"
        );
        Ok(Some(challenger.version))
    }

    fn resolve_alias(
        &self,
        model_scope: &str,
        alias: &str,
    ) -> Result<ModelVersion, PromotionError> {
        self.call("get_alias", model_scope, || self.registry.get_alias(model_scope, alias))?
            .ok_or_else(|| {
                warn!(scope = model_scope, alias, "alias not set");
                PromotionError::AliasNotFound {
                    model_scope: model_scope.to_string(),
                    alias: alias.to_string(),
                }
            })
    }

    fn version_metric(
        &self,
        model_scope: &str,
        alias: &str,
        version: &ModelVersion,
    ) -> Result<f64, PromotionError> {
        self.call("get_metric", model_scope, || {
            self.registry.get_metric(model_scope, version.version, &self.metric)
        })?
        .filter(|v| v.is_finite())
        .ok_or_else(|| PromotionError::MetricMissing {
            model_scope: model_scope.to_string(),
            alias: alias.to_string(),
            version: version.version,
            run_id: version.run_id.clone(),
            metric: self.metric.clone(),
        })
    }
}

/// Lowest finite `metric`, most recent run on ties.
fn best_run<'r>(runs: &'r [Run], metric: &str) -> Option<(&'r Run, f64)> {
    runs.iter()
        .filter_map(|run| run.metric(metric).filter(|v| v.is_finite()).map(|v| (run, v)))
        .min_by(|(a, va), (b, vb)| va.total_cmp(vb).then_with(|| b.sequence.cmp(&a.sequence)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pd_registry::{InMemoryRegistry, NewRun, RunId};
    use pd_types::RegistryError;
    use std::sync::atomic::{AtomicU32, Ordering};

    const EXP: &str = "exp";
    const MODEL: &str = "MyModel";

    /// Fails one named method a fixed number of times, counting its calls.
    struct FlakyRegistry {
        inner: InMemoryRegistry,
        failing: &'static str,
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    impl FlakyRegistry {
        fn new(failing: &'static str, failures: u32) -> Self {
            Self {
                inner: InMemoryRegistry::new(),
                failing,
                failures_left: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
            }
        }

        fn gate(&self, method: &str) -> RegistryResult<()> {
            if method != self.failing {
                return Ok(());
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(RegistryError::Unavailable {
                    message: format!("{method} timed out"),
                });
            }
            Ok(())
        }
    }

    impl Registry for FlakyRegistry {
        fn create_run(&self, scope: &str, run: NewRun) -> RegistryResult<RunId> {
            self.gate("create_run")?;
            self.inner.create_run(scope, run)
        }
        fn list_runs(&self, scope: &str) -> RegistryResult<Vec<Run>> {
            self.gate("list_runs")?;
            self.inner.list_runs(scope)
        }
        fn get_run(&self, run_id: &str) -> RegistryResult<Option<Run>> {
            self.gate("get_run")?;
            self.inner.get_run(run_id)
        }
        fn register_model_version(
            &self,
            model_scope: &str,
            run_id: &str,
            stage: Stage,
            description: &str,
        ) -> RegistryResult<ModelVersion> {
            self.gate("register_model_version")?;
            self.inner.register_model_version(model_scope, run_id, stage, description)
        }
        fn find_version_by_run(
            &self,
            model_scope: &str,
            run_id: &str,
        ) -> RegistryResult<Option<ModelVersion>> {
            self.gate("find_version_by_run")?;
            self.inner.find_version_by_run(model_scope, run_id)
        }
        fn get_version(
            &self,
            model_scope: &str,
            version: u64,
        ) -> RegistryResult<Option<ModelVersion>> {
            self.gate("get_version")?;
            self.inner.get_version(model_scope, version)
        }
        fn get_alias(
            &self,
            model_scope: &str,
            alias: &str,
        ) -> RegistryResult<Option<ModelVersion>> {
            self.gate("get_alias")?;
            self.inner.get_alias(model_scope, alias)
        }
        fn set_alias(&self, model_scope: &str, alias: &str, version: u64) -> RegistryResult<()> {
            self.gate("set_alias")?;
            self.inner.set_alias(model_scope, alias, version)
        }
        fn delete_alias(&self, model_scope: &str, alias: &str) -> RegistryResult<bool> {
            self.gate("delete_alias")?;
            self.inner.delete_alias(model_scope, alias)
        }
        fn get_metric(
            &self,
            model_scope: &str,
            version: u64,
            name: &str,
        ) -> RegistryResult<Option<f64>> {
            self.gate("get_metric")?;
            self.inner.get_metric(model_scope, version, name)
        }
    }

    fn record(registry: &dyn Registry, rmse: f64) -> RunId {
        registry
            .create_run(EXP, NewRun::named("final").with_metric("rmse", rmse))
            .unwrap()
    }

    /// Register a run and point `alias` at it.
    fn install(registry: &dyn Registry, alias: &str, rmse: f64) -> u64 {
        let run_id = record(registry, rmse);
        let version = registry
            .register_model_version(MODEL, &run_id, Stage::Production, "")
            .unwrap()
            .version;
        registry.set_alias(MODEL, alias, version).unwrap();
        version
    }

    fn machine(registry: &dyn Registry) -> PromotionStateMachine<'_> {
        PromotionStateMachine::new(registry, RetryPolicy::immediate(4))
    }

    #[test]
    fn selects_lowest_metric_and_stages_it() {
        let registry = InMemoryRegistry::new();
        record(&registry, 5.1);
        let best = record(&registry, 3.9);
        record(&registry, 4.4);

        let challenger = machine(&registry).select_challenger(EXP, MODEL).unwrap();
        assert_eq!(challenger.run_id, best);
        assert_eq!(challenger.metric, 3.9);
        assert_eq!(challenger.state, PromotionState::Staged);
        assert!(challenger.newly_registered);

        let staged = registry.get_alias(MODEL, "challenger").unwrap().unwrap();
        assert_eq!(staged.version, challenger.version);
        assert_eq!(staged.stage, Stage::Staging);
    }

    #[test]
    fn selection_is_idempotent() {
        let registry = InMemoryRegistry::new();
        record(&registry, 4.0);
        record(&registry, 3.0);

        let m = machine(&registry);
        let first = m.select_challenger(EXP, MODEL).unwrap();
        let second = m.select_challenger(EXP, MODEL).unwrap();

        assert_eq!(first.version, second.version);
        assert!(!second.newly_registered);
        assert!(registry.get_version(MODEL, first.version + 1).unwrap().is_none());
        assert_eq!(
            registry.get_alias(MODEL, "challenger").unwrap().unwrap().version,
            first.version
        );
    }

    #[test]
    fn metric_tie_prefers_most_recent_run() {
        let registry = InMemoryRegistry::new();
        record(&registry, 2.5);
        let latest = record(&registry, 2.5);

        let challenger = machine(&registry).select_challenger(EXP, MODEL).unwrap();
        assert_eq!(challenger.run_id, latest);
    }

    #[test]
    fn runs_without_metric_are_skipped() {
        let registry = InMemoryRegistry::new();
        registry.create_run(EXP, NewRun::named("trial")).unwrap();
        let with_metric = record(&registry, 7.0);

        let challenger = machine(&registry).select_challenger(EXP, MODEL).unwrap();
        assert_eq!(challenger.run_id, with_metric);
    }

    #[test]
    fn no_runs_is_reportable() {
        let registry = InMemoryRegistry::new();
        registry.create_run(EXP, NewRun::named("no metric")).unwrap();

        for scope in [EXP, "empty"] {
            let err = machine(&registry).select_challenger(scope, MODEL).unwrap_err();
            assert!(matches!(
                err,
                PromotionError::NoRunsFound { ref experiment_scope } if experiment_scope == scope
            ));
            assert!(err.is_reportable());
        }
        assert!(registry.get_alias(MODEL, "challenger").unwrap().is_none());
    }

    #[test]
    fn promotes_strictly_better_challenger() {
        let registry = InMemoryRegistry::new();
        let champion = install(&registry, "champion", 5.0);
        let challenger = install(&registry, "challenger", 4.2);

        let decision = machine(&registry).update_champion(MODEL).unwrap();
        assert_eq!(decision.outcome, Outcome::Promoted);
        assert_eq!(decision.champion_metric, 5.0);
        assert_eq!(decision.challenger_metric, 4.2);

        let holder = registry.get_alias(MODEL, "champion").unwrap().unwrap();
        assert_eq!(holder.version, challenger);
        assert!(!registry.get_version(MODEL, champion).unwrap().unwrap().has_alias("champion"));
    }

    #[test]
    fn tie_keeps_champion() {
        let registry = InMemoryRegistry::new();
        let champion = install(&registry, "champion", 5.0);
        install(&registry, "challenger", 5.0);

        let decision = machine(&registry).update_champion(MODEL).unwrap();
        assert_eq!(decision.outcome, Outcome::Retained);
        assert_eq!(decision.challenger_state(), PromotionState::RejectedChallenger);
        assert_eq!(registry.get_alias(MODEL, "champion").unwrap().unwrap().version, champion);
    }

    #[test]
    fn missing_champion_is_reported_without_mutation() {
        let registry = InMemoryRegistry::new();
        let challenger = install(&registry, "challenger", 4.2);

        let err = machine(&registry).update_champion(MODEL).unwrap_err();
        match &err {
            PromotionError::AliasNotFound { model_scope, alias } => {
                assert_eq!(model_scope, MODEL);
                assert_eq!(alias, "champion");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_reportable());
        assert!(registry.get_alias(MODEL, "champion").unwrap().is_none());
        assert_eq!(registry.get_alias(MODEL, "challenger").unwrap().unwrap().version, challenger);
    }

    #[test]
    fn missing_metric_names_the_version() {
        let registry = InMemoryRegistry::new();
        let run_id = registry.create_run(EXP, NewRun::named("legacy")).unwrap();
        let legacy = registry
            .register_model_version(MODEL, &run_id, Stage::Production, "")
            .unwrap()
            .version;
        registry.set_alias(MODEL, "champion", legacy).unwrap();
        install(&registry, "challenger", 4.2);

        let err = machine(&registry).update_champion(MODEL).unwrap_err();
        match err {
            PromotionError::MetricMissing {
                alias,
                version,
                run_id: missing_run,
                metric,
                ..
            } => {
                assert_eq!(alias, "champion");
                assert_eq!(version, legacy);
                assert_eq!(missing_run, run_id);
                assert_eq!(metric, "rmse");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn transient_failures_are_retried() {
        let registry = FlakyRegistry::new("list_runs", 2);
        record(&registry, 3.0);

        let challenger = machine(&registry).select_challenger(EXP, MODEL).unwrap();
        assert_eq!(challenger.metric, 3.0);
        assert_eq!(registry.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn retry_exhaustion_names_the_step() {
        let registry = FlakyRegistry::new("list_runs", u32::MAX);
        record(&registry, 3.0);

        let err = machine(&registry).select_challenger(EXP, MODEL).unwrap_err();
        assert_eq!(registry.calls.load(Ordering::SeqCst), 4);
        assert!(!err.is_reportable());
        match err {
            PromotionError::Registry { step, scope, source } => {
                assert_eq!(step, "list_runs");
                assert_eq!(scope, EXP);
                assert!(matches!(source, RegistryError::Unavailable { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn failed_champion_update_keeps_challenger_alias() {
        let registry = FlakyRegistry::new("set_alias", 0);
        let champion = install(&registry, "champion", 5.0);
        record(&registry, 4.2);

        let m = machine(&registry);
        let challenger = m.select_challenger(EXP, MODEL).unwrap();

        registry.failures_left.store(u32::MAX, Ordering::SeqCst);
        let err = m.update_champion(MODEL).unwrap_err();
        assert!(matches!(err, PromotionError::Registry { step: "set_alias", .. }));

        assert_eq!(
            registry.inner.get_alias(MODEL, "challenger").unwrap().unwrap().version,
            challenger.version
        );
        assert_eq!(registry.inner.get_alias(MODEL, "champion").unwrap().unwrap().version, champion);
    }

    #[test]
    fn bootstrap_installs_first_champion_only() {
        let registry = InMemoryRegistry::new();
        let first = install(&registry, "challenger", 6.0);

        let m = machine(&registry);
        assert_eq!(m.bootstrap_champion(MODEL).unwrap(), Some(first));
        assert_eq!(registry.get_alias(MODEL, "champion").unwrap().unwrap().version, first);

        install(&registry, "challenger", 9.0);
        assert_eq!(m.bootstrap_champion(MODEL).unwrap(), None);
        assert_eq!(registry.get_alias(MODEL, "champion").unwrap().unwrap().version, first);
    }

    #[test]
    fn custom_metric_and_aliases() {
        let registry = InMemoryRegistry::new();
        let run_id = registry
            .create_run(EXP, NewRun::new().with_metric("mae", 1.5))
            .unwrap();

        let m = machine(&registry)
            .with_metric("mae")
            .with_aliases("candidate", "production");
        let challenger = m.select_challenger(EXP, MODEL).unwrap();
        assert_eq!(challenger.run_id, run_id);
        assert!(registry.get_alias(MODEL, "candidate").unwrap().is_some());
        assert!(registry.get_alias(MODEL, "challenger").unwrap().is_none());
    }
}
