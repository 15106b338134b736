// src/fetch/payload.rs

use serde::Deserialize;
use serde_json::Value;

use crate::error::{PipelineError, PipelineResult};

/// Paging block of a World Bank response (`[meta, rows]`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageMeta {
    pub page: u32,
    pub pages: u32,
    pub total: u64,
}

impl PageMeta {
    pub fn is_last(&self) -> bool {
        self.page >= self.pages
    }
}

/// One row of `worldbank_{indicator}.csv`.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRecord {
    pub country: String,
    pub iso3: String,
    pub year: i32,
    pub value: Option<f64>,
    pub indicator: String,
}

/// One row of `worldbank_countries.csv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryRecord {
    pub iso3: String,
    pub name: String,
    pub region: String,
    pub income_group: String,
}

#[derive(Debug, Default, Deserialize)]
struct IdValue {
    #[serde(default)]
    id: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawObservation {
    #[serde(default)]
    country: IdValue,
    #[serde(default, rename = "countryiso3code")]
    iso3: String,
    date: String,
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCountry {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    region: IdValue,
    #[serde(default)]
    income_level: IdValue,
}

/// Numbers arrive as either JSON numbers or strings depending on the field.
fn loose_u64(v: Option<&Value>) -> u64 {
    match v {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn fetch_error(label: &str, reason: impl Into<String>) -> PipelineError {
    PipelineError::Fetch {
        indicator: label.to_string(),
        reason: reason.into(),
    }
}

/// Split a response into its paging block and row array. An API error body
/// (`[{"message": [...]}]`) or any other shape is a fetch error for `label`.
fn split_payload(body: &str, label: &str) -> PipelineResult<(PageMeta, Value)> {
    let root: Value =
        serde_json::from_str(body).map_err(|e| fetch_error(label, format!("malformed JSON: {e}")))?;
    let Value::Array(mut parts) = root else {
        return Err(fetch_error(label, "response is not a JSON array"));
    };
    if parts.is_empty() {
        return Err(fetch_error(label, "empty response"));
    }

    let meta = &parts[0];
    if let Some(messages) = meta.get("message") {
        let text = messages
            .as_array()
            .map(|ms| {
                ms.iter()
                    .filter_map(|m| m.get("value").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("; ")
            })
            .unwrap_or_else(|| messages.to_string());
        return Err(fetch_error(label, format!("API error: {text}")));
    }

    let page = PageMeta {
        page: loose_u64(meta.get("page")) as u32,
        pages: loose_u64(meta.get("pages")) as u32,
        total: loose_u64(meta.get("total")),
    };
    let rows = if parts.len() > 1 {
        parts.swap_remove(1)
    } else {
        Value::Null
    };
    Ok((page, rows))
}

/// Parse one page of `country/all/indicator/{indicator}`. Rows whose date is
/// not a plain year are skipped.
pub fn parse_indicator_payload(
    body: &str,
    indicator: &str,
) -> PipelineResult<(PageMeta, Vec<IndicatorRecord>)> {
    let (meta, rows) = split_payload(body, indicator)?;
    let raw: Vec<RawObservation> = match rows {
        Value::Null => Vec::new(),
        other => serde_json::from_value(other)
            .map_err(|e| fetch_error(indicator, format!("unexpected row shape: {e}")))?,
    };

    let records = raw
        .into_iter()
        .filter_map(|r| {
            let year = r.date.trim().parse::<i32>().ok()?;
            Some(IndicatorRecord {
                country: r.country.value,
                iso3: r.iso3,
                year,
                value: r.value,
                indicator: indicator.to_string(),
            })
        })
        .collect();
    Ok((meta, records))
}

/// Parse one page of the `country` listing. Aggregates (region id `NA`) are
/// dropped.
pub fn parse_country_payload(body: &str) -> PipelineResult<(PageMeta, Vec<CountryRecord>)> {
    let (meta, rows) = split_payload(body, "country metadata")?;
    let raw: Vec<RawCountry> = match rows {
        Value::Null => Vec::new(),
        other => serde_json::from_value(other)
            .map_err(|e| fetch_error("country metadata", format!("unexpected row shape: {e}")))?,
    };

    let records = raw
        .into_iter()
        .filter(|c| c.region.id != "NA" && !c.region.id.is_empty())
        .map(|c| CountryRecord {
            iso3: c.id,
            name: c.name.trim().to_string(),
            region: c.region.value.trim().to_string(),
            income_group: c.income_level.value.trim().to_string(),
        })
        .collect();
    Ok((meta, records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    const GDP_PAGE: &str = r#"[
        {"page":1,"pages":2,"per_page":"2","total":3,"sourceid":"2","lastupdated":"2024-06-28"},
        [
            {"indicator":{"id":"NY.GDP.PCAP.CD","value":"GDP per capita (current US$)"},
             "country":{"id":"DE","value":"Germany"},"countryiso3code":"DEU",
             "date":"2020","value":45000.0,"unit":"","obs_status":"","decimal":1},
            {"indicator":{"id":"NY.GDP.PCAP.CD","value":"GDP per capita (current US$)"},
             "country":{"id":"1W","value":"World"},"countryiso3code":"WLD",
             "date":"2020","value":null,"unit":"","obs_status":"","decimal":1}
        ]
    ]"#;

    #[test]
    fn parses_indicator_rows_and_paging() -> Result<()> {
        let (meta, rows) = parse_indicator_payload(GDP_PAGE, "NY.GDP.PCAP.CD")?;
        assert_eq!(
            meta,
            PageMeta {
                page: 1,
                pages: 2,
                total: 3
            }
        );
        assert!(!meta.is_last());
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            IndicatorRecord {
                country: "Germany".into(),
                iso3: "DEU".into(),
                year: 2020,
                value: Some(45000.0),
                indicator: "NY.GDP.PCAP.CD".into(),
            }
        );
        assert_eq!(rows[1].value, None);
        Ok(())
    }

    #[test]
    fn empty_result_has_no_rows() -> Result<()> {
        let body = r#"[{"page":0,"pages":0,"per_page":20000,"total":0},null]"#;
        let (meta, rows) = parse_indicator_payload(body, "X")?;
        assert!(rows.is_empty());
        assert!(meta.is_last());
        Ok(())
    }

    #[test]
    fn api_errors_and_garbage_are_fetch_errors() {
        let body = r#"[{"message":[{"id":"120","key":"Invalid value","value":"The provided parameter value is not valid"}]}]"#;
        match parse_indicator_payload(body, "BAD.CODE") {
            Err(PipelineError::Fetch { indicator, reason }) => {
                assert_eq!(indicator, "BAD.CODE");
                assert!(reason.contains("not valid"), "{reason}");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(parse_indicator_payload("<html>", "X").is_err());
        assert!(parse_indicator_payload("{}", "X").is_err());
    }

    #[test]
    fn country_listing_skips_aggregates() -> Result<()> {
        let body = r#"[{"page":1,"pages":1,"per_page":"400","total":2},[
            {"id":"DEU","iso2Code":"DE","name":"Germany",
             "region":{"id":"ECS","iso2code":"Z7","value":"Europe & Central Asia"},
             "incomeLevel":{"id":"HIC","iso2code":"XD","value":"High income"}},
            {"id":"WLD","iso2Code":"1W","name":"World",
             "region":{"id":"NA","iso2code":"NA","value":"Aggregates"},
             "incomeLevel":{"id":"NA","iso2code":"NA","value":"Aggregates"}}
        ]]"#;
        let (_, rows) = parse_country_payload(body)?;
        assert_eq!(
            rows,
            vec![CountryRecord {
                iso3: "DEU".into(),
                name: "Germany".into(),
                region: "Europe & Central Asia".into(),
                income_group: "High income".into(),
            }]
        );
        Ok(())
    }
}
