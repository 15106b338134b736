// src/config.rs

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, fs, path::Path, path::PathBuf, str::FromStr};

use crate::error::{PipelineError, PipelineResult};
use crate::source::SourceSpec;

pub const WORLD_BANK_API: &str = "https://api.worldbank.org/v2";

/// How per-source tables are combined on (country_code, year).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinMode {
    /// Keep a key only when every source has it.
    #[default]
    Inner,
    /// Keep a key present in any source; absent indicators are left empty.
    Outer,
}

/// What to do when one source carries the same (country_code, year, indicator)
/// more than once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Fail the merge and report the offending keys.
    #[default]
    Reject,
    /// Average the non-missing values.
    Mean,
    /// Keep the first row in input order.
    First,
}

impl FromStr for JoinMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inner" => Ok(JoinMode::Inner),
            "outer" => Ok(JoinMode::Outer),
            other => Err(PipelineError::Config(format!("unknown join mode `{other}`"))),
        }
    }
}

impl FromStr for CollisionPolicy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(CollisionPolicy::Reject),
            "mean" => Ok(CollisionPolicy::Mean),
            "first" => Ok(CollisionPolicy::First),
            other => Err(PipelineError::Config(format!(
                "unknown collision policy `{other}`"
            ))),
        }
    }
}

impl fmt::Display for JoinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JoinMode::Inner => "inner",
            JoinMode::Outer => "outer",
        })
    }
}

impl fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CollisionPolicy::Reject => "reject",
            CollisionPolicy::Mean => "mean",
            CollisionPolicy::First => "first",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub base_url: String,
    pub indicators: Vec<String>,
    pub start_year: i32,
    pub end_year: i32,
    pub outdir: PathBuf,
    pub timeout_secs: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    /// Pause between successive requests.
    pub request_delay_ms: u64,
    pub concurrency: usize,
    pub per_page: u32,
    pub with_metadata: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: WORLD_BANK_API.to_string(),
            indicators: Vec::new(),
            start_year: 2000,
            end_year: 2023,
            outdir: PathBuf::from("data/external"),
            timeout_secs: 60,
            max_retries: 3,
            retry_delay_ms: 1_000,
            request_delay_ms: 500,
            concurrency: 1,
            per_page: 20_000,
            with_metadata: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub join: JoinMode,
    pub collision: CollisionPolicy,
    /// Minimum Jaro-Winkler similarity for a fuzzy country match.
    pub match_threshold: f64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            join: JoinMode::Inner,
            collision: CollisionPolicy::Reject,
            match_threshold: 0.90,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    pub enabled: bool,
    /// Indicator code -> output column name.
    pub aliases: BTreeMap<String, String>,
    /// `iso3,name,region,income_group` CSV as written by the metadata fetch.
    pub metadata: Option<PathBuf>,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            aliases: default_indicator_aliases(),
            metadata: None,
        }
    }
}

pub fn default_indicator_aliases() -> BTreeMap<String, String> {
    [
        ("SP.DYN.LE00.IN", "life_expectancy_yrs"),
        ("NY.GDP.PCAP.CD", "gdp_per_capita_usd"),
        ("SP.URB.TOTL.IN.ZS", "urban_pop_pct"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Full configuration of one pipeline run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub fetch: FetchConfig,
    pub merge: MergeConfig,
    pub sources: Vec<SourceSpec>,
    /// Optional `iso3,name,aliases` CSV replacing the built-in country list.
    pub reference: Option<PathBuf>,
    pub enrich: EnrichConfig,
    pub output: PathBuf,
    /// Columns the final artifact must carry; empty disables the check.
    pub required_columns: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            merge: MergeConfig::default(),
            sources: Vec::new(),
            reference: None,
            enrich: EnrichConfig::default(),
            output: PathBuf::from("data/processed/merged_country_year.csv"),
            required_columns: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let cfg: PipelineConfig = serde_yaml::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.fetch.start_year > self.fetch.end_year {
            return Err(PipelineError::Config(format!(
                "start year {} is after end year {}",
                self.fetch.start_year, self.fetch.end_year
            )));
        }
        if !(0.0..=1.0).contains(&self.merge.match_threshold) {
            return Err(PipelineError::Config(format!(
                "match threshold {} must lie in [0, 1]",
                self.merge.match_threshold
            )));
        }
        if self.fetch.concurrency == 0 {
            return Err(PipelineError::Config("fetch concurrency must be >= 1".into()));
        }
        let mut names: Vec<&str> = self.sources.iter().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        if let Some(w) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(PipelineError::Config(format!(
                "source name `{}` is used twice",
                w[0]
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Layout;
    use anyhow::Result;

    #[test]
    fn yaml_fills_defaults() -> Result<()> {
        let yaml = r#"
merge:
  join: outer
sources:
  - name: who
    path: data/raw/who.csv
    indicator: pm25
    value_keywords: [pm, "2.5"]
"#;
        let cfg: PipelineConfig = serde_yaml::from_str(yaml)?;
        cfg.validate()?;
        assert_eq!(cfg.merge.join, JoinMode::Outer);
        assert_eq!(cfg.merge.collision, CollisionPolicy::Reject);
        assert_eq!(cfg.fetch.timeout_secs, 60);
        assert_eq!(cfg.sources.len(), 1);
        assert_eq!(cfg.sources[0].layout, Layout::Auto);
        assert_eq!(cfg.sources[0].indicator.as_deref(), Some("pm25"));
        Ok(())
    }

    #[test]
    fn rejects_bad_threshold_and_duplicate_sources() {
        let mut cfg = PipelineConfig::default();
        cfg.merge.match_threshold = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.sources = vec![SourceSpec::who_pm25("a.csv"), SourceSpec::who_pm25("b.csv")];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parses_modes_from_cli_strings() -> Result<()> {
        assert_eq!("Inner".parse::<JoinMode>()?, JoinMode::Inner);
        assert_eq!("mean".parse::<CollisionPolicy>()?, CollisionPolicy::Mean);
        assert!("left".parse::<JoinMode>().is_err());
        Ok(())
    }
}
