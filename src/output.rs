//! File sinks: CSV and Parquet tables and JSONL append logs.
//!
//! Output files double as resume markers, so every writer here either appends
//! to what is already on disk or replaces a file atomically.

use std::{
    collections::HashSet,
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use clap::ValueEnum;
use serde::Serialize;

use crate::{columnar, error::StateError};

/// Table file formats, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FileFormat {
    Csv,
    Parquet,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Result<Self, StateError> {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "csv" => Ok(FileFormat::Csv),
            "parquet" => Ok(FileFormat::Parquet),
            _ => Err(StateError::CriticalError(format!(
                "unsupported file extension of '{}', expected .csv or .parquet",
                path.display()
            ))),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Parquet => "parquet",
        }
    }
}

/// An ordered set of named columns, built field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record(Vec<(String, String)>);

impl Record {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl ToString) -> &mut Self {
        self.0.push((column.into(), value.to_string()));
        self
    }

    pub fn push_opt<T: ToString>(&mut self, column: impl Into<String>, value: Option<T>) -> &mut Self {
        let value = value.map(|v| v.to_string()).unwrap_or_default();
        self.0.push((column.into(), value));
        self
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }
}

/// An in-memory CSV table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<S: Into<String>>(headers: impl IntoIterator<Item = S>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Builds a table whose columns are the union of all record columns in
    /// first-seen order. Missing values are left empty.
    pub fn from_records(records: &[Record]) -> Self {
        let mut headers: Vec<String> = Vec::new();
        for record in records {
            for column in record.columns() {
                if !headers.iter().any(|h| h == column) {
                    headers.push(column.to_string());
                }
            }
        }

        let rows = records
            .iter()
            .map(|record| {
                headers
                    .iter()
                    .map(|h| record.get(h).unwrap_or_default().to_string())
                    .collect()
            })
            .collect();

        Self { headers, rows }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Writes the table to `path` as CSV or Parquet, depending on the
    /// extension.
    pub fn write(&self, path: &Path) -> Result<(), StateError> {
        match FileFormat::from_path(path)? {
            FileFormat::Csv => self.write_csv(path),
            FileFormat::Parquet => {
                ensure_parent(path)?;
                columnar::write_parquet(path, &self.headers, &self.rows)
            }
        }
    }

    /// Writes the table to `path`, replacing any existing file.
    pub fn write_csv(&self, path: &Path) -> Result<(), StateError> {
        ensure_parent(path)?;
        let tmp = part_path(path);
        {
            let mut writer = csv::Writer::from_path(&tmp)?;
            writer.write_record(&self.headers)?;
            for row in &self.rows {
                writer.write_record(row)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Appends rows to an existing CSV file, reordering them to the header
    /// already on disk. Columns unknown to that header are dropped and their
    /// names returned. Falls back to [`Table::write_csv`] for new files.
    pub fn append_csv(&self, path: &Path) -> Result<Vec<String>, StateError> {
        if !path.is_file() {
            self.write_csv(path)?;
            return Ok(Vec::new());
        }

        let existing_headers: Vec<String> = {
            let mut reader = csv::Reader::from_path(path)?;
            reader.headers()?.iter().map(str::to_string).collect()
        };

        let dropped: Vec<String> = self
            .headers
            .iter()
            .filter(|h| !existing_headers.contains(h))
            .cloned()
            .collect();

        let index: Vec<Option<usize>> = existing_headers
            .iter()
            .map(|h| self.headers.iter().position(|own| own == h))
            .collect();

        let file = OpenOptions::new().append(true).open(path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        for row in &self.rows {
            let ordered: Vec<&str> = index
                .iter()
                .map(|i| (*i).and_then(|i| row.get(i)).map(String::as_str).unwrap_or(""))
                .collect();
            writer.write_record(&ordered)?;
        }
        writer.flush()?;
        Ok(dropped)
    }
}

/// Named tables that are written side by side into one directory as
/// `<name>.csv`.
#[derive(Debug, Clone, Default)]
pub struct TableSet {
    tables: Vec<(String, Table)>,
}

impl TableSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, table: Table) {
        self.tables.push((name.into(), table));
    }

    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, table)| table)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|(name, _)| name.as_str())
    }

    /// Appends every non-empty table to `<dir>/<name>.csv`, in insertion
    /// order, and returns the columns each file had to drop.
    pub fn append_to(&self, dir: &Path) -> Result<Vec<(String, Vec<String>)>, StateError> {
        fs::create_dir_all(dir)?;
        let mut dropped = Vec::new();
        for (name, table) in &self.tables {
            if table.is_empty() {
                continue;
            }
            let columns = table.append_csv(&dir.join(format!("{}.csv", name)))?;
            if !columns.is_empty() {
                dropped.push((name.clone(), columns));
            }
        }
        Ok(dropped)
    }
}

/// Reads the distinct values of `column` from a CSV or Parquet file, in file
/// order.
pub fn read_column(path: &Path, column: &str) -> Result<Vec<String>, StateError> {
    let mut seen = HashSet::new();
    let mut values = Vec::new();
    for row in read_rows(path, &[column])? {
        if let Some(value) = row.into_iter().next() {
            if !value.is_empty() && seen.insert(value.clone()) {
                values.push(value);
            }
        }
    }
    Ok(values)
}

/// Reads `columns` of every row of a CSV or Parquet file. Files with another
/// extension are read as CSV.
pub fn read_rows(path: &Path, columns: &[&str]) -> Result<Vec<Vec<String>>, StateError> {
    if matches!(FileFormat::from_path(path), Ok(FileFormat::Parquet)) {
        return columnar::read_parquet_rows(path, columns);
    }

    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let positions = columns
        .iter()
        .map(|column| {
            headers.iter().position(|h| h == *column).ok_or_else(|| {
                StateError::CriticalError(format!(
                    "'{}' has no '{}' column",
                    path.display(),
                    column
                ))
            })
        })
        .collect::<Result<Vec<usize>, _>>()?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            positions
                .iter()
                .map(|i| record.get(*i).unwrap_or_default().to_string())
                .collect(),
        );
    }
    Ok(rows)
}

/// Append-only JSON-lines writer. Each value is flushed as soon as it is
/// written so an interrupted run loses at most the line in flight.
pub struct JsonlWriter {
    writer: BufWriter<File>,
    written: usize,
}

impl JsonlWriter {
    pub fn open(path: &Path) -> Result<Self, StateError> {
        ensure_parent(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn append<T: Serialize>(&mut self, value: &T) -> Result<(), StateError> {
        let line = serde_json::to_string(value)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

pub fn ensure_parent(path: &Path) -> Result<(), StateError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Temporary sibling used while a file is being written.
pub fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}
