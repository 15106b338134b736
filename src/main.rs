use anyhow::{Context, Result};
use clap::Parser;
use countrypanel::{config::PipelineConfig, logging, pipeline};
use std::path::PathBuf;
use tokio::time::Instant;
use tracing::info;

/// Fetch, normalize, merge and enrich a country-year panel from a YAML config.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Pipeline configuration; built-in defaults when omitted.
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    logging::init();
    let args = Args::parse();
    info!("startup");

    // ─── 2) load config ──────────────────────────────────────────────
    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if config.sources.is_empty() {
        anyhow::bail!("no sources configured; nothing to merge");
    }
    info!(
        sources = config.sources.len(),
        indicators = config.fetch.indicators.len(),
        join = %config.merge.join,
        collision = %config.merge.collision,
        "config loaded"
    );

    // ─── 3) fetch → normalize → merge → write ───────────────────────
    let start = Instant::now();
    let report = pipeline::run(&config)
        .await
        .with_context(|| format!("building {}", config.output.display()))?;

    // ─── 4) summary ──────────────────────────────────────────────────
    for (name, src) in &report.sources {
        info!(
            source = %name,
            rows_in = src.rows_in,
            rows_out = src.rows_out,
            unresolved = src.unresolved_rows(),
            "source summary"
        );
    }
    info!(
        rows = report.rows,
        output = %report.output.display(),
        elapsed = ?start.elapsed(),
        "all done"
    );
    Ok(())
}
