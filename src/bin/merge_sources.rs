// src/bin/merge_sources.rs

use anyhow::{Context, Result};
use clap::Parser;
use countrypanel::{
    config::{CollisionPolicy, EnrichConfig, JoinMode, MergeConfig, PipelineConfig},
    logging, pipeline,
    source::SourceSpec,
};
use std::path::PathBuf;
use tracing::info;

/// Merge a WHO PM2.5 table with World Bank indicators on (country, year).
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long)]
    who_csv: PathBuf,

    /// worldbank_all.csv from fetch_indicators.
    #[arg(long)]
    wb_csv: PathBuf,

    /// `.parquet` writes Parquet, anything else CSV.
    #[arg(long, default_value = "data/processed/merged_country_year.csv")]
    outpath: PathBuf,

    #[arg(long, default_value_t = JoinMode::Inner)]
    join: JoinMode,

    #[arg(long, default_value_t = CollisionPolicy::Reject)]
    collision: CollisionPolicy,

    /// Minimum fuzzy similarity for a country name match.
    #[arg(long, default_value_t = 0.90)]
    threshold: f64,

    /// worldbank_countries.csv for region and income group columns.
    #[arg(long)]
    metadata: Option<PathBuf>,

    /// Rename indicator codes to dashboard column names.
    #[arg(long)]
    enrich: bool,
}

fn main() -> Result<()> {
    logging::init();
    let args = Args::parse();

    for (flag, path) in [("--who-csv", &args.who_csv), ("--wb-csv", &args.wb_csv)] {
        if !path.is_file() {
            anyhow::bail!("{flag} {} does not exist", path.display());
        }
    }
    if let Some(meta) = &args.metadata {
        if !meta.is_file() {
            anyhow::bail!("--metadata {} does not exist", meta.display());
        }
    }

    let config = PipelineConfig {
        merge: MergeConfig {
            join: args.join,
            collision: args.collision,
            match_threshold: args.threshold,
        },
        sources: vec![
            SourceSpec::who_pm25(&args.who_csv),
            SourceSpec::world_bank(&args.wb_csv),
        ],
        enrich: EnrichConfig {
            enabled: args.enrich || args.metadata.is_some(),
            metadata: args.metadata.clone(),
            ..EnrichConfig::default()
        },
        output: args.outpath.clone(),
        ..PipelineConfig::default()
    };
    config.validate()?;

    let started = chrono::Utc::now();
    let build = pipeline::build_panel(&config).context("merging sources")?;
    if !build.failed_sources.is_empty() {
        let reasons: Vec<String> = build
            .failed_sources
            .iter()
            .map(|(name, err)| format!("{name}: {err}"))
            .collect();
        anyhow::bail!("source normalization failed: {}", reasons.join("; "));
    }
    let report = pipeline::write_outputs(&config, build, None, started)
        .with_context(|| format!("writing {}", args.outpath.display()))?;

    for (name, src) in &report.sources {
        info!(
            source = %name,
            rows_out = src.rows_out,
            unresolved = src.unresolved_rows(),
            "source merged"
        );
    }
    info!(
        "saved {} rows to {}",
        report.rows,
        args.outpath.display()
    );
    Ok(())
}
