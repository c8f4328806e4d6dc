//! Tabular rendering and export of inspection results.
//!
//! A report is a flat list of two-column rows. Every file contributes a
//! `File:` row carrying its base name, one row per field and a blank
//! separator row. Files appear sorted by path.

use core_metadata::{AggregateResult, ExtractionOutcome};
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::Result;

pub const FILE_MARKER: &str = "File:";
pub const ERROR_FIELD: &str = "Error";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub field: String,
    pub value: String,
}

impl ReportRow {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    fn separator() -> Self {
        Self::new("", "")
    }

    pub fn is_separator(&self) -> bool {
        self.field.is_empty() && self.value.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataReport {
    rows: Vec<ReportRow>,
}

impl MetadataReport {
    pub fn from_aggregate(results: &AggregateResult) -> Self {
        let mut rows = Vec::new();
        for (path, outcome) in results.sorted() {
            rows.push(ReportRow::new(FILE_MARKER, display_name(path)));
            match outcome {
                ExtractionOutcome::Success(result) => {
                    rows.extend(
                        result
                            .iter()
                            .map(|(name, value)| ReportRow::new(name, value.to_string())),
                    );
                }
                ExtractionOutcome::Failure(error) => {
                    rows.push(ReportRow::new(ERROR_FIELD, error.message.clone()));
                }
            }
            rows.push(ReportRow::separator());
        }
        Self { rows }
    }

    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Writes the rows as headerless two-column CSV.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        for row in &self.rows {
            csv.write_record([row.field.as_str(), row.value.as_str()])?;
        }
        csv.flush()?;
        Ok(())
    }

    /// Writes the report to `path`, replacing any existing file.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        self.write_to(file)
    }

    /// Writes the report next to `path` without overwriting anything and
    /// returns where it went.
    pub fn export_csv(&self, path: &Path) -> Result<PathBuf> {
        let target = unique_path(path);
        self.write_csv(&target)?;
        info!(path = %target.display(), rows = self.rows.len(), "report exported");
        Ok(target)
    }
}

impl fmt::Display for MetadataReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .rows
            .iter()
            .map(|row| row.field.chars().count())
            .max()
            .unwrap_or(0);
        for row in &self.rows {
            if row.is_separator() {
                writeln!(f)?;
            } else {
                writeln!(f, "{:<width$}  {}", row.field, row.value, width = width)?;
            }
        }
        Ok(())
    }
}

/// `path` itself when free, else `stem_1.ext`, `stem_2.ext`, … .
pub fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (1u32..)
        .map(|i| path.with_file_name(format!("{}_{}{}", stem, i, extension)))
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| path.to_path_buf())
}

/// Pretty JSON object keyed by path, in path order.
pub fn to_json(results: &AggregateResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(results)?)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
