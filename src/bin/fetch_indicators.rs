// src/bin/fetch_indicators.rs

use anyhow::{Context, Result};
use clap::Parser;
use countrypanel::{config::FetchConfig, fetch, logging};
use std::path::PathBuf;
use tracing::{error, info};

/// Download World Bank indicators to `worldbank_{indicator}.csv` files.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Indicator codes, e.g. SP.DYN.LE00.IN NY.GDP.PCAP.CD.
    #[arg(long, num_args = 1.., required = true)]
    indicators: Vec<String>,

    #[arg(long, default_value_t = 2000)]
    start: i32,

    #[arg(long, default_value_t = 2023)]
    end: i32,

    #[arg(long, default_value = "data/external")]
    outdir: PathBuf,

    /// Per-request timeout.
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// Indicators fetched at the same time.
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// Also write worldbank_countries.csv (region, income group).
    #[arg(long)]
    with_metadata: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let args = Args::parse();
    if args.start > args.end {
        anyhow::bail!("--start {} is after --end {}", args.start, args.end);
    }

    let cfg = FetchConfig {
        indicators: args.indicators,
        start_year: args.start,
        end_year: args.end,
        outdir: args.outdir,
        timeout_secs: args.timeout_secs,
        concurrency: args.concurrency.max(1),
        with_metadata: args.with_metadata,
        ..FetchConfig::default()
    };

    let report = fetch::fetch_all(&cfg)
        .await
        .with_context(|| format!("fetching into {}", cfg.outdir.display()))?;

    for (indicator, rows) in &report.fetched {
        info!(%indicator, rows, "saved");
    }
    if let Some(path) = &report.combined {
        let total: usize = report.fetched.iter().map(|(_, n)| n).sum();
        info!("saved {} rows to {}", total, path.display());
    }
    for failure in &report.failed {
        error!(indicator = %failure.indicator, "{}", failure.reason);
    }
    if report.fetched.is_empty() {
        anyhow::bail!("no indicator could be fetched");
    }
    Ok(())
}
