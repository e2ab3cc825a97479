// src/clean/mod.rs

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use csv::ReaderBuilder;
use std::path::Path;

/// One parsed CSV export: header row plus every data row as strings, exactly
/// as read. Owned by the cleaner for the duration of the transformation.
#[derive(Debug)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Value of the `Level` column in the first data row, used as the
    /// eligibility gate before any cleaning happens.
    pub fn first_level(&self) -> Option<&str> {
        let idx = self.headers.iter().position(|h| h == "Level")?;
        self.rows.first()?.get(idx).map(String::as_str)
    }
}

/// Read `path` into a `RawTable`. Flexible parsing: short rows are padded
/// with nulls later, extra fields are ignored.
pub fn read_csv_table(path: impl AsRef<Path>) -> Result<RawTable> {
    let path = path.as_ref();
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let headers = rdr
        .headers()
        .with_context(|| format!("reading header row of {}", path.display()))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record
            .with_context(|| format!("CSV parse error in {} at record {}", path.display(), idx))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(RawTable { headers, rows })
}

/// Declared kind of a destination column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Date,
    Time,
    Numeric,
    Text,
}

#[derive(Debug, Clone)]
pub struct CleanColumn {
    pub name: String,
    pub kind: ColumnKind,
}

/// A typed cell value ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Real(f64),
    Date(NaiveDate),
    Time(NaiveTime),
}

/// A `RawTable` after normalization: renamed columns, typed date/time cells,
/// per-column kinds decided up front, and the derived `RowID` appended as the
/// last column.
#[derive(Debug)]
pub struct CleanTable {
    pub columns: Vec<CleanColumn>,
    pub rows: Vec<Vec<Value>>,
    /// Rows dropped because `GameID` or `PitchNo` was missing, so no usable
    /// `RowID` could be derived.
    pub dropped_rows: usize,
}

pub const ROW_ID: &str = "RowID";

/// Normalize one raw table. Pure transformation over in-memory data:
/// - `Top/Bottom` is renamed to `Top_Bottom`;
/// - `Date` parses to a date, `Time` to a time of day (microsecond format
///   first, seconds-only fallback); unparsable values become null;
/// - every other column is classified numeric or text by scanning its
///   non-empty values, and cells are converted against that kind;
/// - `RowID = GameID + "_" + PitchNo` is appended; rows missing either piece
///   are dropped and counted rather than given a degenerate key.
pub fn clean_table(raw: &RawTable) -> CleanTable {
    let mut columns: Vec<CleanColumn> = raw
        .headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let name = if h == "Top/Bottom" {
                "Top_Bottom".to_string()
            } else {
                h.clone()
            };
            let kind = match name.as_str() {
                "Date" => ColumnKind::Date,
                "Time" => ColumnKind::Time,
                _ => classify_column(raw, i),
            };
            CleanColumn { name, kind }
        })
        .collect();
    columns.push(CleanColumn {
        name: ROW_ID.to_string(),
        kind: ColumnKind::Text,
    });

    let game_idx = raw.headers.iter().position(|h| h == "GameID");
    let pitch_idx = raw.headers.iter().position(|h| h == "PitchNo");

    let mut rows = Vec::with_capacity(raw.rows.len());
    let mut dropped_rows = 0;
    for row in &raw.rows {
        let game = cell(row, game_idx);
        let pitch = cell(row, pitch_idx);
        let (game, pitch) = match (game, pitch) {
            (Some(g), Some(p)) => (g, p),
            _ => {
                dropped_rows += 1;
                continue;
            }
        };

        let mut values: Vec<Value> = columns[..columns.len() - 1]
            .iter()
            .enumerate()
            .map(|(i, col)| convert(row.get(i).map(String::as_str), col.kind))
            .collect();
        values.push(Value::Text(format!("{}_{}", game, pitch)));
        rows.push(values);
    }

    CleanTable {
        columns,
        rows,
        dropped_rows,
    }
}

fn cell<'a>(row: &'a [String], idx: Option<usize>) -> Option<&'a str> {
    let v = row.get(idx?)?.trim();
    if v.is_empty() {
        None
    } else {
        Some(v)
    }
}

/// Numeric if every non-empty value in the column parses as a number, else
/// text. An all-empty column stays text.
fn classify_column(raw: &RawTable, idx: usize) -> ColumnKind {
    let mut saw_value = false;
    for row in &raw.rows {
        let v = match row.get(idx) {
            Some(v) if !v.trim().is_empty() => v.trim(),
            _ => continue,
        };
        saw_value = true;
        if v.parse::<f64>().is_err() {
            return ColumnKind::Text;
        }
    }
    if saw_value {
        ColumnKind::Numeric
    } else {
        ColumnKind::Text
    }
}

fn convert(cell: Option<&str>, kind: ColumnKind) -> Value {
    let v = match cell {
        Some(v) if !v.trim().is_empty() => v.trim(),
        _ => return Value::Null,
    };
    match kind {
        ColumnKind::Date => parse_date(v).map(Value::Date).unwrap_or(Value::Null),
        ColumnKind::Time => parse_time(v).map(Value::Time).unwrap_or(Value::Null),
        ColumnKind::Numeric => v.parse().map(Value::Real).unwrap_or(Value::Null),
        ColumnKind::Text => Value::Text(v.to_string()),
    }
}

/// `YYYY-MM-DD` first, then the `M/D/YYYY` form older exports use.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%m/%d/%Y"))
        .ok()
}

/// Microsecond-precision `HH:MM:SS.ffffff` first, seconds-only fallback.
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}
