use anyhow::Result;
use countrypanel::{
    config::{CollisionPolicy, JoinMode, MergeConfig, PipelineConfig},
    contract::{check_panel_file, REQUIRED_PRESENTATION_COLUMNS},
    error::PipelineError,
    logging,
    pipeline::{build_panel, report_path, run},
    source::SourceSpec,
};
use std::{fs, path::Path};
use tempfile::{tempdir, TempDir};

const WHO: &str = "\
Location,Period,Dim1,FactValueNumeric,PM2.5 (ug/m3)
Germany,2020,Total,12.3,12.3 [10.1-14.5]
Atlantis,2020,Total,5.0,5.0
TÃ¼rkiye,2020,Total,30.1,30.1
Frnace,2020,Total,10.0,10.0
";

const WB: &str = "\
country,iso3,year,value,indicator
Germany,DEU,2020,45000.0,NY.GDP.PCAP.CD
Turkiye,TUR,2020,8600.5,NY.GDP.PCAP.CD
Spain,ESP,2020,27000.0,NY.GDP.PCAP.CD
World,WLD,2020,11000.0,NY.GDP.PCAP.CD
Germany,DEU,2020,81.0,SP.DYN.LE00.IN
Germany,DEU,2020,77.5,SP.URB.TOTL.IN.ZS
";

const META: &str = "\
iso3,name,region,income_group
DEU,Germany,Europe & Central Asia,High income
TUR,Turkiye,Europe & Central Asia,Upper middle income
";

fn fixture() -> Result<TempDir> {
    let dir = tempdir()?;
    fs::write(dir.path().join("who.csv"), WHO)?;
    fs::write(dir.path().join("wb.csv"), WB)?;
    fs::write(dir.path().join("meta.csv"), META)?;
    Ok(dir)
}

fn config(dir: &Path, output: &str) -> PipelineConfig {
    PipelineConfig {
        sources: vec![
            SourceSpec::who_pm25(dir.join("who.csv")),
            SourceSpec::world_bank(dir.join("wb.csv")),
        ],
        output: dir.join(output),
        ..PipelineConfig::default()
    }
}

#[test]
fn germany_merges_into_one_row() -> Result<()> {
    logging::init_test();
    let dir = fixture()?;
    let build = build_panel(&config(dir.path(), "out.csv"))?;
    let panel = &build.panel;

    let keys: Vec<(&str, i32)> = panel.keys().collect();
    assert_eq!(keys, vec![("DEU", 2020), ("TUR", 2020)]);
    assert_eq!(panel.value("DEU", 2020, "pm25"), Some(Some(12.3)));
    assert_eq!(panel.value("DEU", 2020, "NY.GDP.PCAP.CD"), Some(Some(45000.0)));
    assert_eq!(panel.rows[0].country_name, "Germany");
    assert_eq!(panel.rows[1].country_name, "Türkiye");
    Ok(())
}

#[test]
fn unresolved_names_are_counted_not_merged() -> Result<()> {
    let dir = fixture()?;
    let build = build_panel(&config(dir.path(), "out.csv"))?;

    let who = &build.sources["who_pm25"];
    assert_eq!(who.unresolved.get("Atlantis"), Some(&1));
    assert_eq!(who.fuzzy_matches, 1);
    assert_eq!(build.sources["worldbank"].unresolved.get("World"), Some(&1));
    assert!(build.panel.rows.iter().all(|r| r.country_code != "WLD"));
    assert!(build
        .panel
        .rows
        .iter()
        .all(|r| !r.country_name.contains("Atlantis")));
    Ok(())
}

#[test]
fn outer_join_keeps_single_source_keys() -> Result<()> {
    let dir = fixture()?;
    let mut cfg = config(dir.path(), "out.csv");
    cfg.merge = MergeConfig {
        join: JoinMode::Outer,
        ..MergeConfig::default()
    };
    let panel = build_panel(&cfg)?.panel;

    let codes: Vec<&str> = panel.keys().map(|(c, _)| c).collect();
    assert_eq!(codes, vec!["DEU", "ESP", "FRA", "TUR"]);
    assert_eq!(panel.value("ESP", 2020, "pm25"), Some(None));
    assert_eq!(panel.value("FRA", 2020, "NY.GDP.PCAP.CD"), Some(None));
    Ok(())
}

#[test]
fn source_order_does_not_change_the_output() -> Result<()> {
    let dir = fixture()?;
    let forward = config(dir.path(), "forward.csv");
    let mut backward = config(dir.path(), "backward.csv");
    backward.sources.reverse();

    for cfg in [&forward, &backward] {
        let build = build_panel(cfg)?;
        countrypanel::pipeline::write_outputs(cfg, build, None, chrono::Utc::now())?;
    }
    assert_eq!(
        fs::read(dir.path().join("forward.csv"))?,
        fs::read(dir.path().join("backward.csv"))?
    );
    Ok(())
}

#[tokio::test]
async fn rerun_is_byte_identical() -> Result<()> {
    let dir = fixture()?;
    let cfg = config(dir.path(), "processed/merged.csv");

    run(&cfg).await?;
    let first = fs::read(&cfg.output)?;
    run(&cfg).await?;
    assert_eq!(first, fs::read(&cfg.output)?);

    let text = String::from_utf8(first)?;
    assert_eq!(
        text.lines().next(),
        Some("country_code,country_name,year,NY.GDP.PCAP.CD,SP.DYN.LE00.IN,SP.URB.TOTL.IN.ZS,pm25")
    );
    assert!(text.contains("DEU,Germany,2020,45000,81,77.5,12.3"));

    let report: serde_json::Value = serde_json::from_str(&fs::read_to_string(report_path(&cfg.output))?)?;
    assert_eq!(report["rows"], 2);
    assert_eq!(report["join"], "inner");
    assert_eq!(report["sources"]["who_pm25"]["unresolved"]["Atlantis"], 1);
    Ok(())
}

#[tokio::test]
async fn enriched_parquet_satisfies_the_dashboard_contract() -> Result<()> {
    let dir = fixture()?;
    let mut cfg = config(dir.path(), "panel.parquet");
    cfg.enrich.enabled = true;
    cfg.enrich.metadata = Some(dir.path().join("meta.csv"));
    cfg.required_columns = REQUIRED_PRESENTATION_COLUMNS.iter().map(|s| s.to_string()).collect();

    let report = run(&cfg).await?;
    assert_eq!(report.rows, 2);

    let summary = check_panel_file(&cfg.output, REQUIRED_PRESENTATION_COLUMNS)?;
    assert_eq!(summary.countries, 2);
    assert_eq!(summary.regions.len(), 1);
    assert_eq!(summary.income_groups.len(), 2);
    Ok(())
}

#[tokio::test]
async fn missing_dashboard_columns_halt_before_writing() -> Result<()> {
    let dir = fixture()?;
    let mut cfg = config(dir.path(), "panel.csv");
    cfg.required_columns = REQUIRED_PRESENTATION_COLUMNS.iter().map(|s| s.to_string()).collect();

    match run(&cfg).await {
        Err(PipelineError::MissingColumns { missing, .. }) => {
            assert!(missing.contains(&"region".to_string()));
            assert!(missing.contains(&"life_expectancy_yrs".to_string()));
            assert!(!missing.contains(&"pm25".to_string()));
        }
        other => panic!("expected missing columns, got {other:?}"),
    }
    assert!(!cfg.output.exists());
    Ok(())
}

#[test]
fn one_broken_source_does_not_block_the_other() -> Result<()> {
    let dir = fixture()?;
    fs::write(dir.path().join("broken.csv"), "foo,bar\nx,y\n")?;
    let mut cfg = config(dir.path(), "out.csv");
    cfg.sources[0] = SourceSpec::who_pm25(dir.path().join("broken.csv"));

    let build = build_panel(&cfg)?;
    assert!(build.failed_sources.contains_key("who_pm25"));
    assert_eq!(build.panel.indicators.len(), 3);
    assert_eq!(build.panel.len(), 3);
    Ok(())
}

#[test]
fn duplicate_keys_need_an_explicit_policy() -> Result<()> {
    let dir = fixture()?;
    fs::write(
        dir.path().join("who.csv"),
        "Country,Year,PM2.5\nGermany,2020,12.0\nDeutschland,2020,14.0\n",
    )?;
    let mut cfg = config(dir.path(), "out.csv");
    assert!(matches!(build_panel(&cfg), Err(PipelineError::Merge(_))));

    cfg.merge.collision = CollisionPolicy::Mean;
    let panel = build_panel(&cfg)?.panel;
    assert_eq!(panel.value("DEU", 2020, "pm25"), Some(Some(13.0)));
    Ok(())
}

#[test]
fn world_bank_aggregates_do_not_collide_with_countries() -> Result<()> {
    let dir = fixture()?;
    fs::write(
        dir.path().join("wb.csv"),
        "country,iso3,year,value,indicator\n\
         South Africa,ZAF,2020,5600,NY.GDP.PCAP.CD\n\
         South Asia,SAS,2020,1800,NY.GDP.PCAP.CD\n\
         Germany,DEU,2020,45000,NY.GDP.PCAP.CD\n",
    )?;
    let mut cfg = config(dir.path(), "out.csv");
    cfg.merge.join = JoinMode::Outer;

    let build = build_panel(&cfg)?;
    assert!(build.failed_sources.is_empty());
    assert_eq!(build.panel.value("ZAF", 2020, "NY.GDP.PCAP.CD"), Some(Some(5600.0)));
    assert_eq!(build.sources["worldbank"].unresolved.get("South Asia"), Some(&1));
    Ok(())
}
