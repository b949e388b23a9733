use anyhow::Context;
use pd_pipeline::{Pipeline, PipelineConfig};
use pd_registry::JsonFileRegistry;
use pd_train::FileArtifactStore;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => PipelineConfig::from_file(&path)
            .with_context(|| format!("loading config from {path}"))?,
        None => PipelineConfig::from_env().context("loading config from environment")?,
    };

    let registry = JsonFileRegistry::open(&config.registry_path)
        .with_context(|| format!("opening registry {}", config.registry_path.display()))?;
    let artifacts = FileArtifactStore::new(&config.artifact_dir);

    let report = Pipeline::new(config, &registry, &artifacts).run()?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.is_healthy() {
        anyhow::bail!("promotion did not complete; see promotion_failure in the report");
    }
    Ok(())
}
