// src/merge/write.rs

use arrow::array::{ArrayRef, Float64Array, Int32Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::{fs, fs::File, path::Path, sync::Arc};
use tracing::info;

use super::{Panel, KEY_COLUMNS};
use crate::error::PipelineResult;
use crate::table::{clean_str, read_csv, write_csv, RawTable};

fn is_parquet(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("parquet"))
}

/// Write the panel to `path`: Parquet for `.parquet`, CSV otherwise.
/// The file is written next to its final name and renamed into place.
#[tracing::instrument(level = "info", skip(panel), fields(rows = panel.len()))]
pub fn write_panel(panel: &Panel, path: &Path) -> PipelineResult<()> {
    if is_parquet(path) {
        write_parquet(panel, path)?;
    } else {
        write_csv(&panel.to_table(), path)?;
    }
    info!(path = %path.display(), "panel written");
    Ok(())
}

fn panel_schema(panel: &Panel) -> Arc<Schema> {
    let mut fields = vec![
        Field::new(KEY_COLUMNS[0], DataType::Utf8, false),
        Field::new(KEY_COLUMNS[1], DataType::Utf8, false),
        Field::new(KEY_COLUMNS[2], DataType::Int32, false),
    ];
    fields.extend(
        panel
            .indicators
            .iter()
            .map(|name| Field::new(name, DataType::Float64, true)),
    );
    fields.extend(
        panel
            .attributes
            .iter()
            .map(|name| Field::new(name, DataType::Utf8, true)),
    );
    Arc::new(Schema::new(fields))
}

fn panel_batch(panel: &Panel, schema: Arc<Schema>) -> PipelineResult<RecordBatch> {
    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(
            panel.rows.iter().map(|r| r.country_code.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            panel.rows.iter().map(|r| r.country_name.as_str()),
        )),
        Arc::new(Int32Array::from_iter_values(panel.rows.iter().map(|r| r.year))),
    ];
    for c in 0..panel.indicators.len() {
        columns.push(Arc::new(Float64Array::from(
            panel.rows.iter().map(|r| r.values[c]).collect::<Vec<_>>(),
        )));
    }
    for c in 0..panel.attributes.len() {
        columns.push(Arc::new(StringArray::from(
            panel
                .rows
                .iter()
                .map(|r| Some(r.attributes[c].as_str()).filter(|s| !s.is_empty()))
                .collect::<Vec<_>>(),
        )));
    }
    Ok(RecordBatch::try_new(schema, columns)?)
}

fn write_parquet(panel: &Panel, path: &Path) -> PipelineResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let schema = panel_schema(panel);
    let batch = panel_batch(panel, schema.clone())?;

    let tmp_path = path.with_extension("parquet.tmp");
    let tmp_file = File::create(&tmp_path)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(tmp_file, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Column names of a panel file without reading its rows.
pub fn read_panel_headers(path: &Path) -> PipelineResult<Vec<String>> {
    if is_parquet(path) {
        let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?;
        return Ok(builder
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect());
    }
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    Ok(rdr.headers()?.iter().map(clean_str).collect())
}

/// A panel file as text cells, whichever format it was written in.
pub fn read_panel_table(path: &Path) -> PipelineResult<RawTable> {
    if !is_parquet(path) {
        return read_csv(path);
    }
    let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?;
    let headers: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let mut rows = Vec::new();
    for batch in builder.build()? {
        let batch = batch?;
        for r in 0..batch.num_rows() {
            let row = batch
                .columns()
                .iter()
                .map(|col| array_value_to_string(col.as_ref(), r))
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(row);
        }
    }
    Ok(RawTable::new(headers, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::PanelRow;
    use anyhow::Result;
    use tempfile::tempdir;

    fn panel() -> Panel {
        Panel {
            indicators: vec!["gdp".into(), "pm25".into()],
            attributes: vec!["region".into()],
            rows: vec![
                PanelRow {
                    country_code: "DEU".into(),
                    country_name: "Germany".into(),
                    year: 2020,
                    values: vec![Some(45000.0), Some(12.3)],
                    attributes: vec!["Europe & Central Asia".into()],
                },
                PanelRow {
                    country_code: "FRA".into(),
                    country_name: "France".into(),
                    year: 2020,
                    values: vec![None, Some(10.5)],
                    attributes: vec![String::new()],
                },
            ],
        }
    }

    #[test]
    fn csv_output_is_deterministic() -> Result<()> {
        let dir = tempdir()?;
        let a = dir.path().join("out/a.csv");
        let b = dir.path().join("out/b.csv");
        write_panel(&panel(), &a)?;
        write_panel(&panel(), &b)?;
        let text = fs::read_to_string(&a)?;
        assert_eq!(text, fs::read_to_string(&b)?);
        assert_eq!(
            text,
            "country_code,country_name,year,gdp,pm25,region\n\
             DEU,Germany,2020,45000,12.3,Europe & Central Asia\n\
             FRA,France,2020,,10.5,\n"
        );
        assert_eq!(read_panel_headers(&a)?, panel().headers());
        Ok(())
    }

    #[test]
    fn parquet_output_reads_back() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("panel.parquet");
        write_panel(&panel(), &path)?;
        assert!(!dir.path().join("panel.parquet.tmp").exists());

        assert_eq!(read_panel_headers(&path)?, panel().headers());
        let table = read_panel_table(&path)?;
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0][0], "DEU");
        assert_eq!(table.rows[0][2], "2020");
        assert_eq!(table.rows[0][4], "12.3");
        assert_eq!(table.rows[1][3], "");
        Ok(())
    }
}
