//! Chart-date input files.
//!
//! Each file is a CSV with `track`, `artist` and optionally `position`
//! columns, named `<anything><YYYY-MM-DD>.csv`. Files sharing a date are
//! grouped so the date, not the file, is the unit of work.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::{chart_instance_id, ChartRow};

/// Trailing ISO date segment of a file stem, e.g. `hot100_2020-01-04`.
static DATE_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2})$").unwrap());

#[derive(Debug, Error)]
pub enum ChartFileError {
    #[error("file name does not end in a valid YYYY-MM-DD date")]
    InvalidDateInName,
    #[error("missing required column '{0}'")]
    MissingColumn(&'static str),
    #[error("line {line}: position '{value}' is not a positive integer")]
    InvalidPosition { line: u64, value: String },
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// All input files for one chart date, in file-name order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChartDate {
    pub date: NaiveDate,
    pub files: Vec<PathBuf>,
}

impl ChartDate {
    pub fn id(&self) -> String {
        chart_instance_id(self.date)
    }
}

#[derive(Debug)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: ChartFileError,
}

/// Result of scanning an input directory.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Ascending by date.
    pub dates: Vec<ChartDate>,
    pub skipped: Vec<SkippedFile>,
}

/// Parse the chart date from a file name like `hot100_2020-01-04.csv`.
pub fn date_from_file_name(path: &Path) -> Result<NaiveDate, ChartFileError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or(ChartFileError::InvalidDateInName)?;
    let caps = DATE_SUFFIX
        .captures(stem)
        .ok_or(ChartFileError::InvalidDateInName)?;
    NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").map_err(|_| ChartFileError::InvalidDateInName)
}

fn is_chart_csv(path: &Path) -> bool {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    let is_artifact = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("Unnamed"));
    path.is_file() && is_csv && !is_artifact
}

/// Scan `dir` for chart CSVs and group them by date.
/// Files whose name has no valid date are reported in `skipped`.
pub fn discover(dir: &Path) -> io::Result<Discovery> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<_>>()?;
    paths.sort();

    let mut by_date: BTreeMap<NaiveDate, Vec<PathBuf>> = BTreeMap::new();
    let mut skipped = Vec::new();

    for path in paths.into_iter().filter(|p| is_chart_csv(p)) {
        match date_from_file_name(&path) {
            Ok(date) => by_date.entry(date).or_default().push(path),
            Err(reason) => skipped.push(SkippedFile { path, reason }),
        }
    }

    let dates = by_date
        .into_iter()
        .map(|(date, files)| ChartDate { date, files })
        .collect();

    Ok(Discovery { dates, skipped })
}

/// Read every row of a chart CSV.
///
/// Columns are matched by header name. Without a `position` column, or when
/// a row's position cell is empty, the 1-based row index is used.
pub fn read_rows(path: &Path) -> Result<Vec<ChartRow>, ChartFileError> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;
    read_rows_from(reader)
}

fn read_rows_from<R: io::Read>(
    mut reader: csv::Reader<R>,
) -> Result<Vec<ChartRow>, ChartFileError> {
    let headers = reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));

    let track_col = column("track").ok_or(ChartFileError::MissingColumn("track"))?;
    let artist_col = column("artist").ok_or(ChartFileError::MissingColumn("artist"))?;
    let position_col = column("position");

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let row_number = index as u32 + 1;
        let line = record.position().map_or(0, |p| p.line());

        let position = match position_col.and_then(|c| record.get(c)).filter(|v| !v.is_empty()) {
            None => row_number,
            Some(value) => parse_position(value).ok_or_else(|| ChartFileError::InvalidPosition {
                line,
                value: value.to_string(),
            })?,
        };

        rows.push(ChartRow {
            track: record.get(track_col).unwrap_or_default().to_string(),
            artist: record.get(artist_col).unwrap_or_default().to_string(),
            position,
        });
    }
    Ok(rows)
}

/// Positive integer rank. Accepts `"3.0"` as written by some spreadsheet exports.
fn parse_position(value: &str) -> Option<u32> {
    let parsed = value.parse::<u32>().ok().or_else(|| {
        value
            .parse::<f64>()
            .ok()
            .filter(|f| f.fract() == 0.0 && *f >= 1.0 && *f <= u32::MAX as f64)
            .map(|f| f as u32)
    })?;
    (parsed > 0).then_some(parsed)
}
