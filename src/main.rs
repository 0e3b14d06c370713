//! sumo2gral - command-line entry point

use anyhow::Context;
use clap::Parser;
use sumo2gral::config::{Cli, RunConfig};
use sumo2gral::gral::GralEngine;
use sumo2gral::pipeline::Pipeline;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "jemalloc")]
use tikv_jemallocator::Jemalloc;

#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sumo2gral=info")),
        )
        .with_target(false)
        .init();

    if let Err(e) = run(Cli::parse()).await {
        tracing::error!("✗ {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    tracing::info!("sumo2gral v{}", env!("CARGO_PKG_VERSION"));

    let config = RunConfig::from_cli(cli).context("invalid configuration")?;
    config.log_summary();

    let engine = config.gral_dll.clone().map(GralEngine::new);
    let pipeline = Pipeline::new(config, engine);
    let summary = pipeline
        .run()
        .await
        .with_context(|| format!("process '{}' failed", pipeline.config().process))?;

    if !summary.results.is_empty() {
        tracing::info!("Result files:");
        for path in &summary.results {
            tracing::info!("  {}", path.display());
        }
    }
    Ok(())
}
