// src/pipeline.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

use crate::config::{CollisionPolicy, JoinMode, PipelineConfig};
use crate::contract::check_required_columns;
use crate::country::{Canonicalizer, ReferenceList, Resolver};
use crate::enrich::{attach_metadata, load_metadata, rename_indicators};
use crate::error::{MergeError, PipelineResult};
use crate::fetch::{fetch_all, FetchReport};
use crate::merge::{merge, write_panel, Panel};
use crate::source::{normalize_sources, SourceReport};

/// Written next to the panel as `<output>.report.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub output: PathBuf,
    pub join: JoinMode,
    pub collision: CollisionPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch: Option<FetchReport>,
    pub sources: BTreeMap<String, SourceReport>,
    /// Source name -> error for sources left out of the merge.
    pub failed_sources: BTreeMap<String, String>,
    pub rows: usize,
    pub columns: Vec<String>,
}

/// A merged panel and what each source contributed to it.
#[derive(Debug, Clone)]
pub struct PanelBuild {
    pub panel: Panel,
    pub sources: BTreeMap<String, SourceReport>,
    pub failed_sources: BTreeMap<String, String>,
}

/// Canonicalizer over the configured reference list, or the built-in one.
pub fn canonicalizer(config: &PipelineConfig) -> PipelineResult<Canonicalizer> {
    let reference = match &config.reference {
        Some(path) => ReferenceList::from_csv(path)?,
        None => ReferenceList::builtin()?,
    };
    Ok(Canonicalizer::new(Resolver::new(
        reference,
        config.merge.match_threshold,
    )))
}

/// Normalize every source, merge the survivors and apply enrichment.
pub fn build_panel(config: &PipelineConfig) -> PipelineResult<PanelBuild> {
    let mut canon = canonicalizer(config)?;

    let mut normalized = Vec::new();
    let mut sources = BTreeMap::new();
    let mut failed_sources = BTreeMap::new();
    for (name, res) in normalize_sources(&config.sources, &mut canon) {
        match res {
            Ok(src) => {
                sources.insert(name, src.report.clone());
                normalized.push(src);
            }
            Err(e) => {
                failed_sources.insert(name, e.to_string());
            }
        }
    }
    if normalized.is_empty() {
        return Err(MergeError::NoSources.into());
    }
    if !failed_sources.is_empty() {
        warn!(
            failed = failed_sources.len(),
            merged = normalized.len(),
            "merging without the failed sources"
        );
    }

    let mut panel = merge(&normalized, &config.merge)?;

    if config.enrich.enabled {
        rename_indicators(&mut panel, &config.enrich.aliases)?;
        if let Some(path) = &config.enrich.metadata {
            attach_metadata(&mut panel, &load_metadata(path)?)?;
        }
    }

    Ok(PanelBuild {
        panel,
        sources,
        failed_sources,
    })
}

pub fn report_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".report.json");
    PathBuf::from(name)
}

/// Check the boundary contract, write the panel and its run report.
pub fn write_outputs(
    config: &PipelineConfig,
    build: PanelBuild,
    fetch: Option<FetchReport>,
    started_at: DateTime<Utc>,
) -> PipelineResult<RunReport> {
    let columns = build.panel.headers();
    check_required_columns(
        &config.output.display().to_string(),
        &columns,
        &config.required_columns,
    )?;

    write_panel(&build.panel, &config.output)?;

    let report = RunReport {
        started_at,
        finished_at: Utc::now(),
        output: config.output.clone(),
        join: config.merge.join,
        collision: config.merge.collision,
        fetch,
        sources: build.sources,
        failed_sources: build.failed_sources,
        rows: build.panel.len(),
        columns,
    };
    let path = report_path(&config.output);
    fs::write(&path, serde_json::to_string_pretty(&report)?)?;
    info!(path = %path.display(), "run report written");
    Ok(report)
}

/// Full run: fetch (when indicators are configured), normalize, merge,
/// enrich, check, write.
pub async fn run(config: &PipelineConfig) -> PipelineResult<RunReport> {
    let started_at = Utc::now();
    config.validate()?;

    let fetch = if config.fetch.indicators.is_empty() {
        None
    } else {
        Some(fetch_all(&config.fetch).await?)
    };

    let build = build_panel(config)?;
    let report = write_outputs(config, build, fetch, started_at)?;
    info!(
        rows = report.rows,
        sources = report.sources.len(),
        failed = report.failed_sources.len(),
        "pipeline finished"
    );
    Ok(report)
}
