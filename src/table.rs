// src/table.rs

use csv::{ReaderBuilder, WriterBuilder};
use std::{
    fs::{self, File},
    io::{Read, Write},
    path::Path,
};

use crate::error::PipelineResult;

/// A source table as read from disk: every cell still a string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    /// Column names from the header row, cleaned with [`clean_str`].
    pub headers: Vec<String>,
    /// Each data row, one String per header (short rows are padded).
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cell at (`row`, `col`), empty when the row is short.
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Up to `limit` cleaned, non-empty values of column `col`.
    pub fn sample(&self, col: usize, limit: usize) -> Vec<&str> {
        self.rows
            .iter()
            .take(limit)
            .filter_map(|r| r.get(col))
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Trim whitespace, a leading BOM and stray outer quotes from a header.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches('\u{feff}');
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Parse CSV with a header row. Records with a different field count are
/// accepted and padded/truncated to the header width.
pub fn read_csv_from<R: Read>(reader: R) -> PipelineResult<RawTable> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr.headers()?.iter().map(clean_str).collect();
    let width = headers.len();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        // cells are already unquoted by the reader; only trim them
        let mut row: Vec<String> = record
            .iter()
            .take(width)
            .map(|f| f.trim().to_string())
            .collect();
        row.resize(width, String::new());
        rows.push(row);
    }

    Ok(RawTable { headers, rows })
}

#[tracing::instrument(level = "debug", skip(path), fields(path = %path.as_ref().display()))]
pub fn read_csv(path: impl AsRef<Path>) -> PipelineResult<RawTable> {
    let file = File::open(path.as_ref())?;
    read_csv_from(file)
}

pub fn write_csv_to<W: Write>(table: &RawTable, writer: W) -> PipelineResult<()> {
    let mut wtr = WriterBuilder::new().from_writer(writer);
    wtr.write_record(&table.headers)?;
    for row in &table.rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write `table` to `path`, creating parent directories. The file is written
/// to a temporary sibling first and renamed into place.
pub fn write_csv(table: &RawTable, path: impl AsRef<Path>) -> PipelineResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "table.csv".into());
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));
    {
        let file = File::create(&tmp_path)?;
        write_csv_to(table, file)?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[test]
    fn reads_ragged_rows_and_cleans_cells() -> Result<()> {
        let data = "\u{feff}Country , Year,\"PM 2.5\"\n Germany ,2020,12.3\nFrance,2020\n,,\n";
        let table = read_csv_from(Cursor::new(data))?;
        assert_eq!(table.headers, vec!["Country", "Year", "PM 2.5"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0], vec!["Germany", "2020", "12.3"]);
        assert_eq!(table.rows[1], vec!["France", "2020", ""]);
        assert_eq!(table.cell(1, 2), "");
        assert_eq!(table.cell(9, 0), "");
        Ok(())
    }

    #[test]
    fn clean_str_strips_quotes() {
        assert_eq!(clean_str("  \"abc\" "), "abc");
        assert_eq!(clean_str("\""), "\"");
        assert_eq!(clean_str(" x "), "x");
    }

    #[test]
    fn quoted_cell_content_survives() -> Result<()> {
        let data = "\"Location\",Note\nGermany,\"\"\"high\"\"\"\n";
        let table = read_csv_from(Cursor::new(data))?;
        assert_eq!(table.headers, vec!["Location", "Note"]);
        assert_eq!(table.cell(0, 1), "\"high\"");

        let dir = tempdir()?;
        let path = dir.path().join("quoted.csv");
        write_csv(&table, &path)?;
        assert_eq!(read_csv(&path)?, table);
        Ok(())
    }

    #[test]
    fn write_then_read_preserves_table() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested/out.csv");
        let table = RawTable::new(
            vec!["a".into(), "b".into()],
            vec![vec!["1".into(), "x, y".into()]],
        );
        write_csv(&table, &path)?;
        assert_eq!(read_csv(&path)?, table);
        Ok(())
    }
}
