//! Conversion of long and wide source tables into one long shape:
//! one `LongRow` per (country, year, indicator, value).

pub mod infer;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::InferenceError;
use crate::table::RawTable;
use infer::{
    country_predicates, explicit_column, indicator_predicates, infer_column, is_missing_marker,
    iso3_predicates, parse_year, profile, require_column, value_predicates, year_predicates, ColumnMatch,
    ColumnProfile, Role, YEAR_RANGE,
};

/// Declared shape of a source table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Decide from the headers: year-named headers without a year column mean wide.
    #[default]
    Auto,
    Long,
    Wide,
}

/// Exact column names for a source whose schema is fixed. Any role left
/// unset is inferred.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnRules {
    pub country: Option<String>,
    pub iso3: Option<String>,
    pub year: Option<String>,
    pub value: Option<String>,
    pub indicator: Option<String>,
}

/// Everything the reshaper needs to know about a source.
#[derive(Clone, Copy, Debug)]
pub struct ReshapeSpec<'a> {
    pub layout: Layout,
    pub columns: &'a ColumnRules,
    /// Fixed indicator name; overrides any indicator column.
    pub indicator: Option<&'a str>,
    pub value_keywords: &'a [String],
}

/// A row in the common long shape, before country canonicalization.
#[derive(Debug, Clone, PartialEq)]
pub struct LongRow {
    pub country: String,
    pub iso3: Option<String>,
    pub year: i32,
    pub indicator: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongColumns {
    pub country: ColumnMatch,
    pub iso3: Option<ColumnMatch>,
    pub year: ColumnMatch,
    pub value: ColumnMatch,
    pub indicator: Option<ColumnMatch>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WideColumns {
    pub country: ColumnMatch,
    pub iso3: Option<ColumnMatch>,
    pub indicator: Option<ColumnMatch>,
    /// (column index, year) for every year header, in table order.
    pub years: Vec<(usize, i32)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    Long(LongColumns),
    Wide(WideColumns),
}

/// Output of a reshape with the rows it had to give up on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reshaped {
    pub rows: Vec<LongRow>,
    /// Rows whose year cell was not a plausible year.
    pub bad_years: usize,
    /// Non-empty value cells that were not numeric.
    pub unparsed_values: usize,
    /// Rows dropped because their indicator cell was empty.
    pub missing_indicator: usize,
}

/// A parsed value cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell {
    Missing,
    Number(f64),
    Invalid,
}

impl Cell {
    pub fn value(self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(v),
            _ => None,
        }
    }
}

/// Parse a value cell. The leading numeric token is used, so WHO-style
/// `"12.3 [10.1-14.5]"` reads as 12.3.
pub fn parse_value(raw: &str) -> Cell {
    let s = raw.trim();
    if is_missing_marker(s) {
        return Cell::Missing;
    }
    let token = s.split_whitespace().next().unwrap_or("");
    match token.parse::<f64>() {
        Ok(v) if v.is_finite() => Cell::Number(v),
        Ok(_) => Cell::Missing,
        Err(_) => Cell::Invalid,
    }
}

static YEAR_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(\d{4})|(\d{4})\s*\[YR\d{4}\]|YR(\d{4}))$").expect("year header regex")
});

/// Year encoded in a wide-table header: `2000`, `2000 [YR2000]` or `YR2000`.
pub fn year_header(header: &str) -> Option<i32> {
    let caps = YEAR_HEADER.captures(header.trim())?;
    let digits = caps.iter().skip(1).flatten().next()?.as_str();
    digits
        .parse::<i32>()
        .ok()
        .filter(|y| YEAR_RANGE.contains(y))
}

/// Pick the columns of `table` for each role.
pub fn detect_shape(table: &RawTable, spec: &ReshapeSpec<'_>) -> Result<Shape, InferenceError> {
    let columns = profile(table);
    let year_headers: Vec<(usize, i32)> = table
        .headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| year_header(h).map(|y| (i, y)))
        .collect();
    let year_header_idx: Vec<usize> = year_headers.iter().map(|(i, _)| *i).collect();
    let rules = spec.columns;

    let wide = match spec.layout {
        Layout::Wide => true,
        Layout::Long => false,
        Layout::Auto => {
            rules.year.is_none()
                && !year_headers.is_empty()
                && infer_column(Role::Year, &columns, &year_predicates(), &year_header_idx)?
                    .is_none()
        }
    };

    if wide {
        if year_headers.is_empty() {
            return Err(InferenceError::Missing {
                role: "year header".into(),
                columns: table.headers.join(", "),
            });
        }
        let mut taken = year_header_idx.clone();
        let iso3 = pick(Role::Iso3, table, &columns, rules.iso3.as_deref(), &taken)?;
        taken.extend(iso3.iter().map(|m| m.index));
        let indicator = if spec.indicator.is_some() {
            None
        } else {
            let m = pick_required(Role::Indicator, table, &columns, rules.indicator.as_deref(), &taken)?;
            taken.push(m.index);
            Some(m)
        };
        let country = pick_required(Role::Country, table, &columns, rules.country.as_deref(), &taken)?;
        return Ok(Shape::Wide(WideColumns {
            country,
            iso3,
            indicator,
            years: year_headers,
        }));
    }

    let mut taken = Vec::new();
    let year = pick_required(Role::Year, table, &columns, rules.year.as_deref(), &taken)?;
    taken.push(year.index);
    let iso3 = pick(Role::Iso3, table, &columns, rules.iso3.as_deref(), &taken)?;
    taken.extend(iso3.iter().map(|m| m.index));
    let indicator = if spec.indicator.is_some() {
        None
    } else {
        let m = pick_required(Role::Indicator, table, &columns, rules.indicator.as_deref(), &taken)?;
        taken.push(m.index);
        Some(m)
    };
    let value = match rules.value.as_deref() {
        Some(name) => explicit_column(Role::Value, table, name)?,
        None => require_column(
            Role::Value,
            &columns,
            &value_predicates(spec.indicator, spec.value_keywords),
            &taken,
        )?,
    };
    taken.push(value.index);
    let country = pick_required(Role::Country, table, &columns, rules.country.as_deref(), &taken)?;

    Ok(Shape::Long(LongColumns {
        country,
        iso3,
        year,
        value,
        indicator,
    }))
}

fn predicates_for(role: Role) -> Vec<infer::Predicate<'static>> {
    match role {
        Role::Country => country_predicates(),
        Role::Iso3 => iso3_predicates(),
        Role::Year => year_predicates(),
        Role::Indicator => indicator_predicates(),
        Role::Value => value_predicates(None, &[]),
    }
}

fn pick(
    role: Role,
    table: &RawTable,
    columns: &[ColumnProfile<'_>],
    explicit: Option<&str>,
    taken: &[usize],
) -> Result<Option<ColumnMatch>, InferenceError> {
    match explicit {
        Some(name) => explicit_column(role, table, name).map(Some),
        None => infer_column(role, columns, &predicates_for(role), taken),
    }
}

fn pick_required(
    role: Role,
    table: &RawTable,
    columns: &[ColumnProfile<'_>],
    explicit: Option<&str>,
    taken: &[usize],
) -> Result<ColumnMatch, InferenceError> {
    match explicit {
        Some(name) => explicit_column(role, table, name),
        None => require_column(role, columns, &predicates_for(role), taken),
    }
}

/// Detect the shape of `table` and convert it to long rows.
pub fn reshape(table: &RawTable, spec: &ReshapeSpec<'_>) -> Result<Reshaped, InferenceError> {
    let shape = detect_shape(table, spec)?;
    debug!(?shape, "detected table shape");
    Ok(match &shape {
        Shape::Long(cols) => long_rows(table, cols, spec.indicator),
        Shape::Wide(cols) => wide_to_long(table, cols, spec.indicator),
    })
}

fn optional_cell(table: &RawTable, row: usize, col: Option<&ColumnMatch>) -> Option<String> {
    col.map(|m| table.cell(row, m.index))
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn indicator_for(
    table: &RawTable,
    row: usize,
    fixed: Option<&str>,
    col: Option<&ColumnMatch>,
) -> Option<String> {
    fixed
        .map(String::from)
        .or_else(|| optional_cell(table, row, col))
}

/// Long table: one output row per input row.
pub fn long_rows(table: &RawTable, cols: &LongColumns, indicator: Option<&str>) -> Reshaped {
    let mut out = Reshaped::default();
    for r in 0..table.len() {
        let Some(year) = parse_year(table.cell(r, cols.year.index)) else {
            out.bad_years += 1;
            continue;
        };
        let Some(indicator) = indicator_for(table, r, indicator, cols.indicator.as_ref()) else {
            out.missing_indicator += 1;
            continue;
        };
        let cell = parse_value(table.cell(r, cols.value.index));
        if cell == Cell::Invalid {
            out.unparsed_values += 1;
        }
        out.rows.push(LongRow {
            country: table.cell(r, cols.country.index).to_string(),
            iso3: optional_cell(table, r, cols.iso3.as_ref()),
            year,
            indicator,
            value: cell.value(),
        });
    }
    out
}

/// Wide table: one output row per (input row, year column). Missing cells are
/// kept as missing values so the row count is exactly rows × year columns.
pub fn wide_to_long(table: &RawTable, cols: &WideColumns, indicator: Option<&str>) -> Reshaped {
    let mut out = Reshaped::default();
    out.rows.reserve(table.len() * cols.years.len());
    for r in 0..table.len() {
        let Some(indicator) = indicator_for(table, r, indicator, cols.indicator.as_ref()) else {
            out.missing_indicator += 1;
            continue;
        };
        let country = table.cell(r, cols.country.index);
        let iso3 = optional_cell(table, r, cols.iso3.as_ref());
        for &(c, year) in &cols.years {
            let cell = parse_value(table.cell(r, c));
            if cell == Cell::Invalid {
                out.unparsed_values += 1;
            }
            out.rows.push(LongRow {
                country: country.to_string(),
                iso3: iso3.clone(),
                year,
                indicator: indicator.clone(),
                value: cell.value(),
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::read_csv_from;
    use anyhow::Result;
    use std::io::Cursor;

    fn spec<'a>(
        layout: Layout,
        rules: &'a ColumnRules,
        indicator: Option<&'a str>,
        keywords: &'a [String],
    ) -> ReshapeSpec<'a> {
        ReshapeSpec {
            layout,
            columns: rules,
            indicator,
            value_keywords: keywords,
        }
    }

    #[test]
    fn wide_table_triples_rows_and_keeps_values() -> Result<()> {
        let csv = "Country,2000,2001,2002\nGermany,1.5,,2.5\nFrance,3,4,5\n";
        let table = read_csv_from(Cursor::new(csv))?;
        let rules = ColumnRules::default();
        let out = reshape(&table, &spec(Layout::Auto, &rules, Some("pm25"), &[]))?;

        assert_eq!(out.rows.len(), 3 * table.len());
        let germany: Vec<(i32, Option<f64>)> = out
            .rows
            .iter()
            .filter(|r| r.country == "Germany")
            .map(|r| (r.year, r.value))
            .collect();
        assert_eq!(germany, vec![(2000, Some(1.5)), (2001, None), (2002, Some(2.5))]);
        let france_sum: f64 = out
            .rows
            .iter()
            .filter(|r| r.country == "France")
            .filter_map(|r| r.value)
            .sum();
        assert_eq!(france_sum, 12.0);
        assert!(out.rows.iter().all(|r| r.indicator == "pm25"));
        Ok(())
    }

    #[test]
    fn databank_wide_export_uses_series_code_per_row() -> Result<()> {
        let csv = "Country Name,Country Code,Series Name,Series Code,2019 [YR2019],2020 [YR2020]\n\
                   Germany,DEU,GDP per capita,NY.GDP.PCAP.CD,46000,45000\n\
                   Germany,DEU,Life expectancy,SP.DYN.LE00.IN,81,..\n";
        let table = read_csv_from(Cursor::new(csv))?;
        let rules = ColumnRules::default();
        let shape = detect_shape(&table, &spec(Layout::Auto, &rules, None, &[]))?;
        let Shape::Wide(cols) = &shape else {
            panic!("expected wide, got {shape:?}");
        };
        assert_eq!(cols.years, vec![(4, 2019), (5, 2020)]);
        assert_eq!(cols.indicator.as_ref().map(|m| m.name.as_str()), Some("Series Code"));
        assert_eq!(cols.iso3.as_ref().map(|m| m.name.as_str()), Some("Country Code"));
        assert_eq!(cols.country.name, "Country Name");

        let out = wide_to_long(&table, cols, None);
        assert_eq!(out.rows.len(), 4);
        assert_eq!(out.rows[3].indicator, "SP.DYN.LE00.IN");
        assert_eq!(out.rows[3].value, None);
        assert_eq!(out.rows[0].iso3.as_deref(), Some("DEU"));
        Ok(())
    }

    #[test]
    fn rows_without_an_indicator_are_counted() -> Result<()> {
        let long = "country,year,value,indicator\n\
                    Germany,2020,45000,NY.GDP.PCAP.CD\n\
                    France,2020,39000,\n";
        let table = read_csv_from(Cursor::new(long))?;
        let rules = ColumnRules {
            country: Some("country".into()),
            iso3: None,
            year: Some("year".into()),
            value: Some("value".into()),
            indicator: Some("indicator".into()),
        };
        let out = reshape(&table, &spec(Layout::Long, &rules, None, &[]))?;
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.missing_indicator, 1);

        let wide = "Country Name,Series Code,2019 [YR2019],2020 [YR2020]\n\
                    Germany,NY.GDP.PCAP.CD,46000,45000\n\
                    France,,38000,39000\n";
        let table = read_csv_from(Cursor::new(wide))?;
        let rules = ColumnRules {
            country: Some("Country Name".into()),
            indicator: Some("Series Code".into()),
            ..ColumnRules::default()
        };
        let Shape::Wide(cols) = detect_shape(&table, &spec(Layout::Wide, &rules, None, &[]))? else {
            panic!("expected wide");
        };
        let out = wide_to_long(&table, &cols, None);
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.missing_indicator, 1);
        Ok(())
    }

    #[test]
    fn who_long_table_by_heuristics() -> Result<()> {
        let csv = "Location,Period,Dim1,PM2.5 (ug/m3)\n\
                   Germany,2020,Total,12.3 [10.1-14.5]\n\
                   France,2020,Total,\n\
                   Spain,n/a,Total,9.0\n\
                   Italy,2020,Total,high\n";
        let table = read_csv_from(Cursor::new(csv))?;
        let rules = ColumnRules::default();
        let keywords = vec!["pm".to_string(), "2.5".to_string()];
        let out = reshape(&table, &spec(Layout::Auto, &rules, Some("pm25"), &keywords))?;
        assert_eq!(out.bad_years, 1);
        assert_eq!(out.unparsed_values, 1);
        assert_eq!(out.rows.len(), 3);
        assert_eq!(
            out.rows[0],
            LongRow {
                country: "Germany".into(),
                iso3: None,
                year: 2020,
                indicator: "pm25".into(),
                value: Some(12.3),
            }
        );
        assert_eq!(out.rows[1].value, None);
        Ok(())
    }

    #[test]
    fn explicit_rules_override_inference() -> Result<()> {
        let csv = "country,iso3,year,value,indicator\nGermany,DEU,2020,45000,NY.GDP.PCAP.CD\n";
        let table = read_csv_from(Cursor::new(csv))?;
        let rules = ColumnRules {
            country: Some("country".into()),
            iso3: Some("iso3".into()),
            year: Some("year".into()),
            value: Some("value".into()),
            indicator: Some("indicator".into()),
        };
        let shape = detect_shape(&table, &spec(Layout::Long, &rules, None, &[]))?;
        let Shape::Long(cols) = shape else {
            panic!("expected long");
        };
        assert_eq!(cols.value.rule, "explicit");
        assert_eq!(cols.indicator.map(|m| m.index), Some(4));

        let bad = ColumnRules {
            year: Some("date".into()),
            ..rules
        };
        let err = detect_shape(&table, &spec(Layout::Long, &bad, None, &[])).unwrap_err();
        assert_eq!(
            err,
            InferenceError::NotPresent {
                role: "year".into(),
                column: "date".into()
            }
        );
        Ok(())
    }

    #[test]
    fn long_without_value_column_is_an_error() -> Result<()> {
        let csv = "Country,Year,Note\nGermany,2020,abc\n";
        let table = read_csv_from(Cursor::new(csv))?;
        let rules = ColumnRules::default();
        let err = reshape(&table, &spec(Layout::Auto, &rules, Some("pm25"), &[])).unwrap_err();
        assert!(matches!(err, InferenceError::Missing { ref role, .. } if role == "value"));
        Ok(())
    }

    #[test]
    fn value_cells() {
        assert_eq!(parse_value("12.3"), Cell::Number(12.3));
        assert_eq!(parse_value(" 45000 "), Cell::Number(45000.0));
        assert_eq!(parse_value("1,5"), Cell::Invalid);
        assert_eq!(parse_value(".."), Cell::Missing);
        assert_eq!(parse_value("NaN"), Cell::Missing);
        assert_eq!(parse_value("abc"), Cell::Invalid);
    }

    #[test]
    fn year_headers() {
        assert_eq!(year_header("2000"), Some(2000));
        assert_eq!(year_header("2000 [YR2000]"), Some(2000));
        assert_eq!(year_header("YR1999"), Some(1999));
        assert_eq!(year_header("1800"), None);
        assert_eq!(year_header("Year"), None);
    }
}
