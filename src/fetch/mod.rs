// src/fetch/mod.rs

//! World Bank indicator download. Each indicator is fetched, retried and
//! written independently; one failing indicator never stops the others.

pub mod payload;

use futures::{stream, StreamExt};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::{path::Path, path::PathBuf, time::Duration};
use tokio::time::sleep;
use tracing::{error, info, warn};
use url::Url;

use crate::config::FetchConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::table::{write_csv, RawTable};
pub use payload::{parse_country_payload, parse_indicator_payload, CountryRecord, IndicatorRecord, PageMeta};

pub const INDICATOR_COLUMNS: [&str; 5] = ["country", "iso3", "year", "value", "indicator"];
pub const COUNTRY_COLUMNS: [&str; 4] = ["iso3", "name", "region", "income_group"];
pub const ALL_INDICATORS_FILE: &str = "worldbank_all.csv";
pub const COUNTRIES_FILE: &str = "worldbank_countries.csv";

pub fn indicator_file(outdir: &Path, indicator: &str) -> PathBuf {
    outdir.join(format!("worldbank_{indicator}.csv"))
}

/// `{base}/country/all/indicator/{indicator}?format=json&per_page=..&date=start:end&page=..`
pub fn indicator_url(cfg: &FetchConfig, indicator: &str, page: u32) -> PipelineResult<Url> {
    let mut url = api_url(&cfg.base_url, &["country", "all", "indicator", indicator])?;
    url.query_pairs_mut()
        .append_pair("format", "json")
        .append_pair("per_page", &cfg.per_page.to_string())
        .append_pair("date", &format!("{}:{}", cfg.start_year, cfg.end_year))
        .append_pair("page", &page.to_string());
    Ok(url)
}

/// `{base}/country?format=json&per_page=400&page=..`
pub fn country_url(cfg: &FetchConfig, page: u32) -> PipelineResult<Url> {
    let mut url = api_url(&cfg.base_url, &["country"])?;
    url.query_pairs_mut()
        .append_pair("format", "json")
        .append_pair("per_page", "400")
        .append_pair("page", &page.to_string());
    Ok(url)
}

fn api_url(base: &str, segments: &[&str]) -> PipelineResult<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| PipelineError::Config(format!("invalid base url `{base}`: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| PipelineError::Config(format!("base url `{base}` cannot take a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

pub fn build_client(cfg: &FetchConfig) -> PipelineResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .connect_timeout(Duration::from_secs(cfg.timeout_secs.min(30)))
        .build()
        .map_err(|e| PipelineError::Config(format!("building HTTP client: {e}")))
}

fn retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// GET `url` as text. Transport errors, 5xx and 429 are retried up to
/// `max_retries` attempts in total; other statuses fail at once.
async fn get_text(client: &Client, url: &Url, label: &str, cfg: &FetchConfig) -> PipelineResult<String> {
    let retry_delay = Duration::from_millis(cfg.retry_delay_ms);
    let max_attempts = cfg.max_retries.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let failure = match client.get(url.clone()).send().await {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(body) => return Ok(body),
                Err(e) => format!("reading body: {e}"),
            },
            Ok(resp) if retryable(resp.status()) => format!("HTTP {}", resp.status()),
            Ok(resp) => {
                return Err(PipelineError::Fetch {
                    indicator: label.to_string(),
                    reason: format!("HTTP {}", resp.status()),
                })
            }
            Err(e) if e.is_timeout() => format!("timed out after {}s", cfg.timeout_secs),
            Err(e) => format!("request failed: {e}"),
        };

        if attempt >= max_attempts {
            return Err(PipelineError::Fetch {
                indicator: label.to_string(),
                reason: format!("{failure} (after {attempt} attempts)"),
            });
        }
        warn!(%label, attempt, "{failure}; retrying");
        sleep(retry_delay).await;
    }
}

/// All pages of one indicator.
#[tracing::instrument(level = "info", skip(client, cfg))]
pub async fn fetch_indicator(
    client: &Client,
    cfg: &FetchConfig,
    indicator: &str,
) -> PipelineResult<Vec<IndicatorRecord>> {
    let mut records = Vec::new();
    let mut page = 1;
    loop {
        let url = indicator_url(cfg, indicator, page)?;
        let body = get_text(client, &url, indicator, cfg).await?;
        let (meta, rows) = parse_indicator_payload(&body, indicator)?;
        records.extend(rows);
        if meta.is_last() {
            break;
        }
        page += 1;
        sleep(Duration::from_millis(cfg.request_delay_ms)).await;
    }
    info!(rows = records.len(), "fetched");
    Ok(records)
}

/// Country classification listing, aggregates removed.
#[tracing::instrument(level = "info", skip_all)]
pub async fn fetch_country_metadata(client: &Client, cfg: &FetchConfig) -> PipelineResult<Vec<CountryRecord>> {
    let mut records = Vec::new();
    let mut page = 1;
    loop {
        let url = country_url(cfg, page)?;
        let body = get_text(client, &url, "country metadata", cfg).await?;
        let (meta, rows) = parse_country_payload(&body)?;
        records.extend(rows);
        if meta.is_last() {
            break;
        }
        page += 1;
        sleep(Duration::from_millis(cfg.request_delay_ms)).await;
    }
    records.sort_by(|a, b| a.iso3.cmp(&b.iso3));
    info!(countries = records.len(), "fetched country metadata");
    Ok(records)
}

pub fn indicator_table(records: &[IndicatorRecord]) -> RawTable {
    RawTable::new(
        INDICATOR_COLUMNS.iter().map(|s| s.to_string()).collect(),
        records
            .iter()
            .map(|r| {
                vec![
                    r.country.clone(),
                    r.iso3.clone(),
                    r.year.to_string(),
                    r.value.map(|v| v.to_string()).unwrap_or_default(),
                    r.indicator.clone(),
                ]
            })
            .collect(),
    )
}

pub fn country_table(records: &[CountryRecord]) -> RawTable {
    RawTable::new(
        COUNTRY_COLUMNS.iter().map(|s| s.to_string()).collect(),
        records
            .iter()
            .map(|c| vec![c.iso3.clone(), c.name.clone(), c.region.clone(), c.income_group.clone()])
            .collect(),
    )
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchFailure {
    pub indicator: String,
    pub reason: String,
}

/// Outcome of a fetch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchReport {
    /// (indicator, rows) for every indicator written, in request order.
    pub fetched: Vec<(String, usize)>,
    pub failed: Vec<FetchFailure>,
    pub combined: Option<PathBuf>,
    pub metadata: Option<PathBuf>,
}

/// Write one CSV per fetched indicator and the combined file, in the given
/// order. A failed fetch or a failed per-indicator write is recorded and
/// skipped; only the combined file is fatal.
pub fn write_indicators<I>(outdir: &Path, results: I) -> PipelineResult<FetchReport>
where
    I: IntoIterator<Item = (String, PipelineResult<Vec<IndicatorRecord>>)>,
{
    let mut report = FetchReport::default();
    let mut combined = Vec::new();
    for (indicator, res) in results {
        let written = res.and_then(|records| {
            write_csv(&indicator_table(&records), indicator_file(outdir, &indicator))?;
            Ok(records)
        });
        match written {
            Ok(records) => {
                report.fetched.push((indicator, records.len()));
                combined.extend(records);
            }
            Err(e) => {
                error!(%indicator, "skipping indicator: {e}");
                report.failed.push(FetchFailure {
                    indicator,
                    reason: e.to_string(),
                });
            }
        }
    }

    if !report.fetched.is_empty() {
        let path = outdir.join(ALL_INDICATORS_FILE);
        write_csv(&indicator_table(&combined), &path)?;
        info!(rows = combined.len(), path = %path.display(), "saved combined indicators");
        report.combined = Some(path);
    }
    Ok(report)
}

/// Fetch every configured indicator with at most `cfg.concurrency` requests
/// in flight, write one CSV per indicator plus the combined file.
pub async fn fetch_all(cfg: &FetchConfig) -> PipelineResult<FetchReport> {
    std::fs::create_dir_all(&cfg.outdir)?;
    let client = build_client(cfg)?;
    let delay = Duration::from_millis(cfg.request_delay_ms);
    let concurrency = cfg.concurrency.max(1);

    let mut results: Vec<(usize, String, PipelineResult<Vec<IndicatorRecord>>)> =
        stream::iter(cfg.indicators.iter().enumerate())
            .map(|(i, ind)| {
                let client = &client;
                async move {
                    // stagger starts so the API sees spaced requests
                    let slot = (i % concurrency) as u32;
                    if i > 0 {
                        sleep(delay * (slot + 1)).await;
                    }
                    (i, ind.clone(), fetch_indicator(client, cfg, ind).await)
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;
    results.sort_by_key(|(i, _, _)| *i);

    let mut report = write_indicators(
        &cfg.outdir,
        results.into_iter().map(|(_, indicator, res)| (indicator, res)),
    )?;

    if cfg.with_metadata {
        match fetch_country_metadata(&client, cfg).await {
            Ok(countries) => {
                let path = cfg.outdir.join(COUNTRIES_FILE);
                write_csv(&country_table(&countries), &path)?;
                report.metadata = Some(path);
            }
            Err(e) => {
                error!("skipping country metadata: {e}");
                report.failed.push(FetchFailure {
                    indicator: "country metadata".into(),
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(report)
}
