//! Boundary check for the artifact handed to the dashboard.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use crate::error::{PipelineError, PipelineResult};
use crate::merge::{read_panel_headers, read_panel_table};
use crate::table::RawTable;

/// Columns the presentation layer reads unconditionally.
pub const REQUIRED_PRESENTATION_COLUMNS: &[&str] = &[
    "country_code",
    "country_name",
    "year",
    "pm25",
    "life_expectancy_yrs",
    "gdp_per_capita_usd",
    "urban_pop_pct",
    "region",
    "income_group",
];

pub fn presentation_columns() -> Vec<String> {
    REQUIRED_PRESENTATION_COLUMNS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Required names absent from `headers`, in the order they were required.
pub fn missing_columns<S: AsRef<str>>(headers: &[String], required: &[S]) -> Vec<String> {
    let required: Vec<&str> = required.iter().map(|r| r.as_ref()).collect();
    required
        .into_iter()
        .filter(|r| !headers.iter().any(|h| h == r))
        .map(String::from)
        .collect()
}

pub fn check_required_columns<S: AsRef<str>>(
    label: &str,
    headers: &[String],
    required: &[S],
) -> PipelineResult<()> {
    let missing = missing_columns(headers, required);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::MissingColumns {
            path: label.to_string(),
            missing,
        })
    }
}

/// What a dashboard would see in a panel file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PanelSummary {
    pub rows: usize,
    pub countries: usize,
    pub first_year: Option<i32>,
    pub last_year: Option<i32>,
    pub regions: BTreeSet<String>,
    pub income_groups: BTreeSet<String>,
}

impl PanelSummary {
    pub fn from_table(table: &RawTable) -> Self {
        let distinct = |name: &str| -> BTreeSet<String> {
            table
                .column_index(name)
                .map(|c| {
                    (0..table.len())
                        .map(|r| table.cell(r, c))
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default()
        };
        let years: Vec<i32> = table
            .column_index("year")
            .map(|c| {
                (0..table.len())
                    .filter_map(|r| table.cell(r, c).parse().ok())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            rows: table.len(),
            countries: distinct("country_code").len(),
            first_year: years.iter().min().copied(),
            last_year: years.iter().max().copied(),
            regions: distinct("region"),
            income_groups: distinct("income_group"),
        }
    }
}

impl fmt::Display for PanelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rows, {} countries", self.rows, self.countries)?;
        if let (Some(a), Some(b)) = (self.first_year, self.last_year) {
            write!(f, ", years {a}-{b}")?;
        }
        write!(
            f,
            ", {} regions, {} income groups",
            self.regions.len(),
            self.income_groups.len()
        )
    }
}

/// Fail with the missing column names, else summarise the file.
pub fn check_panel_file<S: AsRef<str>>(path: &Path, required: &[S]) -> PipelineResult<PanelSummary> {
    let headers = read_panel_headers(path)?;
    check_required_columns(&path.display().to_string(), &headers, required)?;
    Ok(PanelSummary::from_table(&read_panel_table(path)?))
}
