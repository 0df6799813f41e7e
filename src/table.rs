//! Tabular data boundary: a thin value type over the `csv` crate.
//!
//! [`Table`] owns the pipeline's merge semantics (row-wise concatenation
//! with union-of-columns alignment); delimited-text parsing and
//! serialization are delegated to `csv` and treated as a black box.

use crate::error::{Error, Result};
use std::io::Read;
use std::path::Path;

/// An in-memory table: a column header plus string rows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Create an empty table with the given columns
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Column header, in order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Data rows, in order
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of data rows (header excluded)
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// True if the table has no data rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row; its arity must match the column count
    pub fn push_row(&mut self, row: Vec<String>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::Table(format!(
                "row has {} fields, table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Parse delimited text from a reader; first record is the header.
    ///
    /// Ragged rows are a hard error: a malformed body must abort, not
    /// silently truncate.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().from_reader(reader);
        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self { columns, rows })
    }

    /// Parse delimited text; an entirely empty input yields an empty table
    pub fn from_csv_str(text: &str) -> Result<Self> {
        Self::from_csv_reader(text.as_bytes())
    }

    /// Load a table from a CSV file
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(file)
    }

    /// Serialize to CSV text (header line plus one line per row)
    pub fn to_csv_string(&self) -> Result<String> {
        if self.columns.is_empty() {
            return Ok(String::new());
        }
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| Error::Table(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| Error::Table(e.to_string()))
    }

    /// Write the table as a CSV file
    pub fn write_csv_path(&self, path: &Path) -> Result<()> {
        if self.columns.is_empty() {
            std::fs::write(path, "")?;
            return Ok(());
        }
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Row-wise concatenation.
    ///
    /// The result's columns are the union of all input columns in
    /// first-seen order; cells absent from a source table are filled with
    /// the empty string. Row order follows input order.
    pub fn concat<I: IntoIterator<Item = Table>>(tables: I) -> Table {
        let tables: Vec<Table> = tables.into_iter().collect();

        let mut columns: Vec<String> = Vec::new();
        for table in &tables {
            for column in &table.columns {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }

        let mut rows = Vec::new();
        for table in &tables {
            // Map each output column to its index in this table, if present
            let mapping: Vec<Option<usize>> = columns
                .iter()
                .map(|c| table.columns.iter().position(|tc| tc == c))
                .collect();
            for row in &table.rows {
                rows.push(
                    mapping
                        .iter()
                        .map(|idx| idx.map(|i| row[i].clone()).unwrap_or_default())
                        .collect(),
                );
            }
        }

        Table { columns, rows }
    }
}
