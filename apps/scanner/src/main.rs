mod config;
mod main_lib;
mod sources;

use config::Config;
use main_lib::{build_engine, init_tracing};
use sources::JsonFileSink;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    init_tracing();

    let engine = build_engine(&config).await?;
    let sink = JsonFileSink::new(&config.output_path);
    let outcome = engine.run_into(&sink).await?;

    let stats = &outcome.statistics;
    tracing::info!("{}", stats.summary());
    if !stats.met_targets() {
        tracing::warn!(
            "Targets missed: completeness {} (target {}), runtime {}",
            stats.met_completeness_target,
            config.engine.required_completeness,
            stats.met_runtime_target
        );
    }
    Ok(())
}
