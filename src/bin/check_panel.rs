// src/bin/check_panel.rs

use anyhow::{Context, Result};
use clap::Parser;
use countrypanel::{contract, logging};
use std::path::PathBuf;
use tracing::info;

/// Verify a merged panel carries every column the dashboard reads.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Panel file (CSV or Parquet).
    path: PathBuf,

    /// Required columns; defaults to the dashboard's set.
    #[arg(long, value_delimiter = ',')]
    require: Vec<String>,
}

fn main() -> Result<()> {
    logging::init();
    let args = Args::parse();
    if !args.path.is_file() {
        anyhow::bail!("{} does not exist", args.path.display());
    }

    let required = if args.require.is_empty() {
        contract::presentation_columns()
    } else {
        args.require
    };
    let summary = contract::check_panel_file(&args.path, &required)
        .with_context(|| format!("checking {}", args.path.display()))?;

    info!(path = %args.path.display(), "{summary}");
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
