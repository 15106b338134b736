//! Per-source adapters: declarative rules in, normalized observations out.

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::PathBuf};
use tracing::{debug, error, info, warn};

use crate::country::{Canonicalizer, Resolution};
use crate::error::{PipelineError, PipelineResult};
use crate::reshape::{reshape, LongRow, ReshapeSpec};

pub use crate::reshape::{ColumnRules, Layout};
use crate::table::{read_csv, RawTable};

/// How to read one external table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub layout: Layout,
    #[serde(default)]
    pub columns: ColumnRules,
    /// Fixed indicator name for single-indicator sources.
    #[serde(default)]
    pub indicator: Option<String>,
    /// Keywords that must all appear in the value column header.
    #[serde(default)]
    pub value_keywords: Vec<String>,
    /// Take the row's ISO3 code as final. Known codes are used directly;
    /// unknown ones are dropped as unresolved. Rows without a code fall back
    /// to the name.
    #[serde(default)]
    pub trust_codes: bool,
}

impl SourceSpec {
    /// `worldbank_all.csv` as written by the fetch step.
    pub fn world_bank(path: impl Into<PathBuf>) -> Self {
        Self {
            name: "worldbank".into(),
            path: path.into(),
            layout: Layout::Long,
            columns: ColumnRules {
                country: Some("country".into()),
                iso3: Some("iso3".into()),
                year: Some("year".into()),
                value: Some("value".into()),
                indicator: Some("indicator".into()),
            },
            indicator: None,
            value_keywords: Vec::new(),
            trust_codes: true,
        }
    }

    /// A WHO PM2.5 export with whatever headers it happens to carry.
    pub fn who_pm25(path: impl Into<PathBuf>) -> Self {
        Self {
            name: "who_pm25".into(),
            path: path.into(),
            layout: Layout::Auto,
            columns: ColumnRules::default(),
            indicator: Some("pm25".into()),
            value_keywords: vec!["pm".into(), "2.5".into()],
            trust_codes: false,
        }
    }

    pub fn reshape_spec(&self) -> ReshapeSpec<'_> {
        ReshapeSpec {
            layout: self.layout,
            columns: &self.columns,
            indicator: self.indicator.as_deref(),
            value_keywords: &self.value_keywords,
        }
    }
}

/// One normalized fact. At most one per (country_code, year, indicator) is
/// expected per source; the merge engine enforces it.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub country_code: String,
    pub country_name: String,
    pub year: i32,
    pub indicator: String,
    pub value: Option<f64>,
}

/// What normalization kept and what it dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceReport {
    pub rows_in: usize,
    pub rows_out: usize,
    /// Raw name -> number of rows dropped because it did not resolve.
    pub unresolved: BTreeMap<String, usize>,
    pub bad_years: usize,
    pub unparsed_values: usize,
    /// Rows dropped because they named no indicator.
    pub missing_indicator: usize,
    /// Rows whose name resolved only by fuzzy matching.
    pub fuzzy_matches: usize,
}

impl SourceReport {
    pub fn unresolved_rows(&self) -> usize {
        self.unresolved.values().sum()
    }
}

#[derive(Debug, Clone)]
pub struct NormalizedSource {
    pub name: String,
    pub observations: Vec<Observation>,
    pub report: SourceReport,
}

/// Normalize an in-memory table according to `spec`.
#[tracing::instrument(level = "info", skip_all, fields(source = %spec.name))]
pub fn normalize_table(
    table: &RawTable,
    spec: &SourceSpec,
    canon: &mut Canonicalizer,
) -> PipelineResult<NormalizedSource> {
    let reshaped =
        reshape(table, &spec.reshape_spec()).map_err(|error| PipelineError::SchemaInference {
            source_name: spec.name.clone(),
            error,
        })?;

    let mut report = SourceReport {
        rows_in: table.len(),
        bad_years: reshaped.bad_years,
        unparsed_values: reshaped.unparsed_values,
        missing_indicator: reshaped.missing_indicator,
        ..Default::default()
    };

    let resolved = canon.resolve_all(reshaped.rows.iter().map(|r| r.country.as_str()));
    let reference = canon.resolver().reference().clone();

    let mut observations = Vec::with_capacity(reshaped.rows.len());
    for row in reshaped.rows {
        let LongRow {
            country,
            iso3,
            year,
            indicator,
            value,
        } = row;

        // A trusted source's own code is final: unknown codes (WLD, SAS, NAC)
        // are aggregates and never fall back to the name.
        let trusted = iso3.as_deref().filter(|_| spec.trust_codes);
        let (code, name) = match (trusted, resolved.get(&country)) {
            (Some(code), _) => match reference.by_code(code) {
                Some(entry) => (entry.iso3.clone(), entry.name.clone()),
                None => {
                    debug!(name = %country, code, "code not in reference list");
                    *report.unresolved.entry(country).or_default() += 1;
                    continue;
                }
            },
            (None, Some(Resolution::Matched(m))) => {
                if m.score < 1.0 {
                    report.fuzzy_matches += 1;
                }
                (m.iso3.clone(), m.name.clone())
            }
            (None, _) => {
                debug!(name = %country, "unresolved country");
                *report.unresolved.entry(country).or_default() += 1;
                continue;
            }
        };

        observations.push(Observation {
            country_code: code,
            country_name: name,
            year,
            indicator,
            value,
        });
    }

    report.rows_out = observations.len();
    if !report.unresolved.is_empty() {
        warn!(
            names = report.unresolved.len(),
            rows = report.unresolved_rows(),
            "dropped rows with unresolved countries"
        );
    }
    info!(
        rows_in = report.rows_in,
        rows_out = report.rows_out,
        bad_years = report.bad_years,
        missing_indicator = report.missing_indicator,
        "normalized"
    );

    Ok(NormalizedSource {
        name: spec.name.clone(),
        observations,
        report,
    })
}

/// Read `spec.path` and normalize it.
pub fn load_source(spec: &SourceSpec, canon: &mut Canonicalizer) -> PipelineResult<NormalizedSource> {
    let table = read_csv(&spec.path)?;
    normalize_table(&table, spec, canon)
}

/// Normalize every source independently. A failing source is logged and
/// returned as an error next to the others; it never stops the batch.
pub fn normalize_sources(
    specs: &[SourceSpec],
    canon: &mut Canonicalizer,
) -> Vec<(String, PipelineResult<NormalizedSource>)> {
    specs
        .iter()
        .map(|spec| {
            let res = load_source(spec, canon);
            if let Err(e) = &res {
                error!(source = %spec.name, path = %spec.path.display(), "normalization failed: {e}");
            }
            (spec.name.clone(), res)
        })
        .collect()
}
