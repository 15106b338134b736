//! Presentation-facing touches on a merged panel: friendly indicator column
//! names and per-country classification attributes.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::merge::{Panel, KEY_COLUMNS};
use crate::table::{read_csv, RawTable};

pub const REGION: &str = "region";
pub const INCOME_GROUP: &str = "income_group";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountryMetadata {
    pub region: String,
    pub income_group: String,
}

/// Rename indicator columns through `aliases` (code -> column name). Columns
/// stay sorted by their new names.
pub fn rename_indicators(panel: &mut Panel, aliases: &BTreeMap<String, String>) -> PipelineResult<()> {
    let renamed: Vec<String> = panel
        .indicators
        .iter()
        .map(|ind| aliases.get(ind).cloned().unwrap_or_else(|| ind.clone()))
        .collect();

    let mut seen = BTreeSet::new();
    for name in &renamed {
        if KEY_COLUMNS.contains(&name.as_str()) || panel.attributes.contains(name) || !seen.insert(name) {
            return Err(PipelineError::Config(format!(
                "indicator alias `{name}` collides with another column"
            )));
        }
    }

    let mut order: Vec<usize> = (0..renamed.len()).collect();
    order.sort_by(|&a, &b| renamed[a].cmp(&renamed[b]));

    panel.indicators = order.iter().map(|&i| renamed[i].clone()).collect();
    for row in &mut panel.rows {
        row.values = order.iter().map(|&i| row.values[i]).collect();
    }
    Ok(())
}

/// Parse an `iso3,...,region,income_group` table. Rows with an empty code are
/// skipped.
pub fn metadata_from_table(table: &RawTable) -> PipelineResult<BTreeMap<String, CountryMetadata>> {
    let col = |name: &str| {
        table
            .column_index(name)
            .ok_or_else(|| PipelineError::MissingColumns {
                path: "country metadata".into(),
                missing: vec![name.to_string()],
            })
    };
    let (code, region, income) = (col("iso3")?, col(REGION)?, col(INCOME_GROUP)?);

    Ok((0..table.len())
        .filter(|&r| !table.cell(r, code).is_empty())
        .map(|r| {
            (
                table.cell(r, code).to_ascii_uppercase(),
                CountryMetadata {
                    region: table.cell(r, region).to_string(),
                    income_group: table.cell(r, income).to_string(),
                },
            )
        })
        .collect())
}

pub fn load_metadata(path: &Path) -> PipelineResult<BTreeMap<String, CountryMetadata>> {
    metadata_from_table(&read_csv(path)?)
}

/// Left-join region and income group onto every row by country code. Countries
/// without metadata get empty cells.
pub fn attach_metadata(panel: &mut Panel, meta: &BTreeMap<String, CountryMetadata>) -> PipelineResult<()> {
    for name in [REGION, INCOME_GROUP] {
        if panel.headers().iter().any(|h| h == name) {
            return Err(PipelineError::Config(format!("panel already has a `{name}` column")));
        }
    }

    let mut missing = BTreeSet::new();
    for row in &mut panel.rows {
        let m = match meta.get(&row.country_code) {
            Some(m) => m.clone(),
            None => {
                missing.insert(row.country_code.clone());
                CountryMetadata::default()
            }
        };
        row.attributes.push(m.region);
        row.attributes.push(m.income_group);
    }
    panel.attributes.push(REGION.to_string());
    panel.attributes.push(INCOME_GROUP.to_string());

    if !missing.is_empty() {
        warn!(countries = missing.len(), "no metadata for some countries");
    }
    info!(rows = panel.len(), "attached country metadata");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_indicator_aliases;
    use crate::merge::PanelRow;
    use crate::table::read_csv_from;
    use anyhow::Result;
    use std::io::Cursor;

    fn panel() -> Panel {
        Panel {
            indicators: vec!["NY.GDP.PCAP.CD".into(), "SP.DYN.LE00.IN".into(), "pm25".into()],
            attributes: vec![],
            rows: vec![
                PanelRow {
                    country_code: "DEU".into(),
                    country_name: "Germany".into(),
                    year: 2020,
                    values: vec![Some(45000.0), Some(81.0), Some(12.3)],
                    attributes: vec![],
                },
                PanelRow {
                    country_code: "XKX".into(),
                    country_name: "Kosovo".into(),
                    year: 2020,
                    values: vec![Some(5000.0), None, Some(20.0)],
                    attributes: vec![],
                },
            ],
        }
    }

    #[test]
    fn renames_and_reorders_columns() -> Result<()> {
        let mut p = panel();
        rename_indicators(&mut p, &default_indicator_aliases())?;
        assert_eq!(p.indicators, vec!["gdp_per_capita_usd", "life_expectancy_yrs", "pm25"]);
        assert_eq!(p.value("DEU", 2020, "life_expectancy_yrs"), Some(Some(81.0)));
        assert_eq!(p.value("DEU", 2020, "gdp_per_capita_usd"), Some(Some(45000.0)));
        Ok(())
    }

    #[test]
    fn rename_onto_existing_column_is_rejected() {
        let mut p = panel();
        let aliases = BTreeMap::from([("NY.GDP.PCAP.CD".to_string(), "pm25".to_string())]);
        assert!(matches!(
            rename_indicators(&mut p, &aliases),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn metadata_is_a_left_join() -> Result<()> {
        let csv = "iso3,name,region,income_group\nDEU,Germany,Europe & Central Asia,High income\n";
        let meta = metadata_from_table(&read_csv_from(Cursor::new(csv))?)?;
        let mut p = panel();
        attach_metadata(&mut p, &meta)?;
        assert_eq!(p.attributes, vec![REGION, INCOME_GROUP]);
        assert_eq!(p.rows[0].attributes, vec!["Europe & Central Asia", "High income"]);
        assert_eq!(p.rows[1].attributes, vec!["", ""]);
        assert_eq!(p.len(), 2);

        assert!(attach_metadata(&mut p, &meta).is_err());
        Ok(())
    }

    #[test]
    fn metadata_without_region_column_names_it() -> Result<()> {
        let table = read_csv_from(Cursor::new("iso3,income_group\nDEU,High income\n"))?;
        match metadata_from_table(&table) {
            Err(PipelineError::MissingColumns { missing, .. }) => assert_eq!(missing, vec!["region"]),
            other => panic!("unexpected {other:?}"),
        }
        Ok(())
    }
}
