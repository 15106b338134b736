//! Pivot normalized observations to one column per indicator and join the
//! per-source tables on (country_code, year).
//!
//! Rows come out sorted by key and indicator columns sorted by name, so the
//! panel does not depend on source order and serializes identically on every
//! run with the same inputs.

pub mod write;

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::config::{CollisionPolicy, JoinMode, MergeConfig};
use crate::error::MergeError;
use crate::source::{NormalizedSource, Observation};
use crate::table::RawTable;

pub use write::{read_panel_headers, read_panel_table, write_panel};

/// Join key.
pub type Key = (String, i32);

pub const KEY_COLUMNS: [&str; 3] = ["country_code", "country_name", "year"];

/// One source pivoted to wide form.
#[derive(Debug, Clone, PartialEq)]
pub struct WideTable {
    pub source: String,
    /// Sorted indicator names.
    pub indicators: Vec<String>,
    pub rows: BTreeMap<Key, WideRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WideRow {
    pub country_name: String,
    /// Aligned with `WideTable::indicators`.
    pub values: Vec<Option<f64>>,
}

/// Pivot one source. Duplicate (country_code, year, indicator) keys are
/// handled per `policy`.
pub fn pivot(source: &NormalizedSource, policy: CollisionPolicy) -> Result<WideTable, MergeError> {
    let mut groups: BTreeMap<(&str, i32, &str), (&str, Vec<Option<f64>>)> = BTreeMap::new();
    for Observation {
        country_code,
        country_name,
        year,
        indicator,
        value,
    } in &source.observations
    {
        groups
            .entry((country_code.as_str(), *year, indicator.as_str()))
            .or_insert_with(|| (country_name.as_str(), Vec::new()))
            .1
            .push(*value);
    }

    let collisions: Vec<&(&str, i32, &str)> = groups
        .iter()
        .filter(|(_, (_, vals))| vals.len() > 1)
        .map(|(k, _)| k)
        .collect();
    if let Some(&&(code, year, ind)) = collisions.first() {
        match policy {
            CollisionPolicy::Reject => {
                return Err(MergeError::Collision {
                    source_name: source.name.clone(),
                    count: collisions.len(),
                    first: (code.to_string(), year, ind.to_string()),
                });
            }
            CollisionPolicy::Mean | CollisionPolicy::First => warn!(
                source = %source.name,
                keys = collisions.len(),
                %policy,
                "collapsing duplicate keys"
            ),
        }
    }

    let indicators: Vec<String> = groups
        .keys()
        .map(|(_, _, ind)| *ind)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(String::from)
        .collect();
    let column: BTreeMap<&str, usize> = indicators
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let mut rows: BTreeMap<Key, WideRow> = BTreeMap::new();
    for ((code, year, ind), (name, vals)) in &groups {
        let row = rows
            .entry((code.to_string(), *year))
            .or_insert_with(|| WideRow {
                country_name: name.to_string(),
                values: vec![None; indicators.len()],
            });
        row.values[column[ind]] = collapse(vals, policy);
    }

    debug!(source = %source.name, rows = rows.len(), indicators = indicators.len(), "pivoted");
    Ok(WideTable {
        source: source.name.clone(),
        indicators,
        rows,
    })
}

fn collapse(vals: &[Option<f64>], policy: CollisionPolicy) -> Option<f64> {
    match policy {
        CollisionPolicy::Reject | CollisionPolicy::First => vals.first().copied().flatten(),
        CollisionPolicy::Mean => {
            let present: Vec<f64> = vals.iter().flatten().copied().collect();
            if present.is_empty() {
                None
            } else {
                Some(present.iter().sum::<f64>() / present.len() as f64)
            }
        }
    }
}

/// The merged wide table: key columns, indicator columns, then text
/// attribute columns such as region.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Panel {
    pub indicators: Vec<String>,
    pub attributes: Vec<String>,
    pub rows: Vec<PanelRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PanelRow {
    pub country_code: String,
    pub country_name: String,
    pub year: i32,
    pub values: Vec<Option<f64>>,
    pub attributes: Vec<String>,
}

impl Panel {
    pub fn headers(&self) -> Vec<String> {
        KEY_COLUMNS
            .iter()
            .map(|s| s.to_string())
            .chain(self.indicators.iter().cloned())
            .chain(self.attributes.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn indicator_index(&self, name: &str) -> Option<usize> {
        self.indicators.iter().position(|i| i == name)
    }

    /// Value of `indicator` for (code, year), if the row exists.
    pub fn value(&self, code: &str, year: i32, indicator: &str) -> Option<Option<f64>> {
        let col = self.indicator_index(indicator)?;
        self.rows
            .iter()
            .find(|r| r.country_code == code && r.year == year)
            .map(|r| r.values[col])
    }

    pub fn keys(&self) -> impl Iterator<Item = (&str, i32)> + '_ {
        self.rows.iter().map(|r| (r.country_code.as_str(), r.year))
    }

    /// Text rendering: floats in shortest round-trip form, missing cells empty.
    pub fn to_table(&self) -> RawTable {
        let rows = self
            .rows
            .iter()
            .map(|r| {
                [r.country_code.clone(), r.country_name.clone(), r.year.to_string()]
                    .into_iter()
                    .chain(r.values.iter().map(|v| v.map(|x| x.to_string()).unwrap_or_default()))
                    .chain(r.attributes.iter().cloned())
                    .collect()
            })
            .collect();
        RawTable::new(self.headers(), rows)
    }
}

/// Join pivoted tables on (country_code, year).
pub fn join(tables: &[WideTable], mode: JoinMode) -> Result<Panel, MergeError> {
    if tables.is_empty() {
        return Err(MergeError::NoSources);
    }

    // indicator -> (table, column); each indicator must come from one source
    let mut owners: BTreeMap<&str, Vec<(usize, usize)>> = BTreeMap::new();
    for (t, table) in tables.iter().enumerate() {
        for (c, ind) in table.indicators.iter().enumerate() {
            owners.entry(ind.as_str()).or_default().push((t, c));
        }
    }
    if let Some((ind, owned)) = owners.iter().find(|(_, o)| o.len() > 1) {
        let mut sources: Vec<String> = owned.iter().map(|(t, _)| tables[*t].source.clone()).collect();
        sources.sort();
        return Err(MergeError::DuplicateIndicator {
            indicator: ind.to_string(),
            sources,
        });
    }

    let keys: BTreeSet<&Key> = match mode {
        JoinMode::Inner => {
            let mut iter = tables.iter();
            let first: BTreeSet<&Key> = iter.next().map(|t| t.rows.keys().collect()).unwrap_or_default();
            iter.fold(first, |acc, t| acc.into_iter().filter(|k| t.rows.contains_key(*k)).collect())
        }
        JoinMode::Outer => tables.iter().flat_map(|t| t.rows.keys()).collect(),
    };

    let rows: Vec<PanelRow> = keys
        .into_iter()
        .map(|key| {
            let country_name = tables
                .iter()
                .find_map(|t| t.rows.get(key))
                .map(|r| r.country_name.clone())
                .unwrap_or_default();
            let values = owners
                .values()
                .map(|owned| {
                    let (t, c) = owned[0];
                    tables[t].rows.get(key).and_then(|r| r.values[c])
                })
                .collect();
            PanelRow {
                country_code: key.0.clone(),
                country_name,
                year: key.1,
                values,
                attributes: Vec::new(),
            }
        })
        .collect();

    let indicators: Vec<String> = owners.keys().map(|s| s.to_string()).collect();
    info!(
        sources = tables.len(),
        rows = rows.len(),
        indicators = indicators.len(),
        %mode,
        "joined"
    );
    Ok(Panel {
        indicators,
        attributes: Vec::new(),
        rows,
    })
}

/// Pivot every source and join them.
pub fn merge(sources: &[NormalizedSource], cfg: &MergeConfig) -> Result<Panel, MergeError> {
    let tables = sources
        .iter()
        .map(|s| pivot(s, cfg.collision))
        .collect::<Result<Vec<_>, _>>()?;
    join(&tables, cfg.join)
}
