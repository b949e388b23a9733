use pd_pipeline::{Pipeline, PipelineConfig};
use pd_promote::Outcome;
use pd_registry::{InMemoryRegistry, JsonFileRegistry, Registry};
use pd_train::FileArtifactStore;
use pd_types::{EvaluationError, PdError};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const EXP: &str = "thermo-exp";
const MODEL: &str = "Thermo";

/// Sensor readings where temperature depends on hour and humidity.
fn write_readings(dir: &Path) -> PathBuf {
    let mut csv = String::from("device,hour,humidity,temp\n");
    for i in 0..150 {
        let hour = (i % 24) as f64;
        let humidity = 0.3 + ((i * 7) % 50) as f64 / 100.0;
        let temp = 15.0 + 0.4 * hour + 6.0 * humidity;
        let device = ["a", "b", "c"][i % 3];
        if i % 17 == 0 {
            writeln!(csv, "{device},{hour},,{temp}").unwrap();
        } else {
            writeln!(csv, "{device},{hour},{humidity},{temp}").unwrap();
        }
    }
    let path = dir.join("readings.csv");
    std::fs::write(&path, csv).unwrap();
    path
}

fn config(dir: &Path) -> PipelineConfig {
    PipelineConfig {
        trial_budget: 5,
        search_seed: Some(7),
        num_boost_round: 20,
        retry_max_attempts: 2,
        retry_delay_secs: 0,
        artifact_dir: dir.join("models"),
        registry_path: dir.join("registry.json"),
        ..PipelineConfig::new(write_readings(dir), EXP, MODEL)
    }
}

#[test]
fn first_run_stages_challenger_and_reports_missing_champion() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    let registry = InMemoryRegistry::new();
    let artifacts = FileArtifactStore::new(&config.artifact_dir);

    let report = Pipeline::new(config, &registry, &artifacts).run().unwrap();

    assert_eq!(report.trials, 5);
    assert_eq!(report.loss_curve.len(), 5);
    assert!(report.final_rmse.is_finite());
    assert_eq!(report.final_rmse, report.best_trial_loss);
    for artifact in &report.artifacts {
        assert!(Path::new(&artifact.uri).exists(), "{} missing", artifact.uri);
    }

    let challenger = report.challenger.as_ref().unwrap();
    assert_eq!(challenger.run_id, report.final_run_id);
    assert_eq!(
        registry.get_alias(MODEL, "challenger").unwrap().unwrap().version,
        challenger.version
    );

    let failure = report.promotion_failure.as_ref().unwrap();
    assert_eq!(failure.step, "update_champion");
    assert!(failure.reportable);
    assert!(failure.message.contains("champion"));
    assert!(report.is_healthy());
    assert!(registry.get_alias(MODEL, "champion").unwrap().is_none());
}

#[test]
fn repeated_runs_keep_champion_on_equal_metric() {
    let dir = TempDir::new().unwrap();
    let config = PipelineConfig {
        bootstrap_champion: true,
        ..config(dir.path())
    };
    let registry = InMemoryRegistry::new();
    let artifacts = FileArtifactStore::new(&config.artifact_dir);

    let first = Pipeline::new(config.clone(), &registry, &artifacts).run().unwrap();
    let champion = first.bootstrapped_champion.unwrap();
    assert_eq!(first.decision.as_ref().unwrap().outcome, Outcome::Retained);

    // Same seeds give the same metric; the newer run becomes challenger but ties keep the champion.
    let second = Pipeline::new(config, &registry, &artifacts).run().unwrap();
    assert_eq!(second.final_rmse, first.final_rmse);
    assert_eq!(second.bootstrapped_champion, None);

    let challenger = second.challenger.unwrap();
    assert_eq!(challenger.run_id, second.final_run_id);
    assert_ne!(challenger.version, champion);

    let decision = second.decision.unwrap();
    assert_eq!(decision.outcome, Outcome::Retained);
    assert_eq!(registry.get_alias(MODEL, "champion").unwrap().unwrap().version, champion);
    assert_eq!(registry.list_runs(EXP).unwrap().len(), 2);
}

#[test]
fn recorded_trials_are_tagged() {
    let dir = TempDir::new().unwrap();
    let config = PipelineConfig {
        record_trials: true,
        ..config(dir.path())
    };
    let registry = InMemoryRegistry::new();
    let artifacts = FileArtifactStore::new(&config.artifact_dir);

    let report = Pipeline::new(config, &registry, &artifacts).run().unwrap();

    let runs = registry.list_runs(EXP).unwrap();
    assert_eq!(runs.len(), 6);
    let trials: Vec<_> = runs
        .iter()
        .filter(|r| r.tags.get("kind").map(String::as_str) == Some("trial"))
        .collect();
    assert_eq!(trials.len(), 5);
    assert!(trials.iter().all(|r| !r.parameters.is_empty()));

    // The final run ties the best trial and is more recent.
    assert_eq!(report.challenger.unwrap().run_id, report.final_run_id);
}

#[test]
fn champion_survives_reopening_the_registry() {
    let dir = TempDir::new().unwrap();
    let config = PipelineConfig {
        bootstrap_champion: true,
        ..config(dir.path())
    };
    let artifacts = FileArtifactStore::new(&config.artifact_dir);

    let champion = {
        let registry = JsonFileRegistry::open(&config.registry_path).unwrap();
        let report = Pipeline::new(config.clone(), &registry, &artifacts).run().unwrap();
        report.bootstrapped_champion.unwrap()
    };

    let registry = JsonFileRegistry::open(&config.registry_path).unwrap();
    let holder = registry.get_alias(MODEL, "champion").unwrap().unwrap();
    assert_eq!(holder.version, champion);
    assert!(registry.get_metric(MODEL, champion, "rmse").unwrap().is_some());
}

#[test]
fn missing_data_source_aborts() {
    let dir = TempDir::new().unwrap();
    let config = PipelineConfig::new(dir.path().join("absent.csv"), EXP, MODEL);
    let registry = InMemoryRegistry::new();
    let artifacts = FileArtifactStore::new(dir.path().join("models"));

    let err = Pipeline::new(config, &registry, &artifacts).run().unwrap_err();
    assert!(matches!(err, PdError::Evaluation(EvaluationError::LoadingFailed { .. })));
    assert!(registry.list_runs(EXP).unwrap().is_empty());
}
