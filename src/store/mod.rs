// src/store/mod.rs

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{
    ffi, params_from_iter,
    types::{ToSqlOutput, Value as SqlValue, ValueRef},
    Connection, ToSql,
};
use std::path::Path;
use thiserror::Error;

use crate::clean::{CleanColumn, CleanTable, ColumnKind, Value, ROW_ID};

/// Structured storage-error kinds. Callers match on the variant instead of
/// parsing engine message text.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Uniqueness-constraint violation on insert. `key` carries the offending
    /// value when the engine message exposes it.
    #[error("duplicate key violation: {message}")]
    DuplicateKey {
        key: Option<String>,
        message: String,
    },
    /// Any other storage-layer failure.
    #[error("storage error: {0}")]
    Persistence(rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(err, msg) = &e {
            if err.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || err.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
            {
                let message = msg.clone().unwrap_or_else(|| err.to_string());
                return StoreError::DuplicateKey {
                    key: extract_duplicate_key(&message),
                    message,
                };
            }
        }
        StoreError::Persistence(e)
    }
}

/// Some engines spell out the offending value, e.g.
/// `The duplicate key value is (G1_7)`. SQLite does not; then this is `None`.
static DUPLICATE_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)duplicate key value is \(([^)]*)\)").unwrap());

fn extract_duplicate_key(message: &str) -> Option<String> {
    DUPLICATE_KEY_RE
        .captures(message)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Real(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Value::Date(d) => ToSqlOutput::Owned(SqlValue::Text(d.format("%Y-%m-%d").to_string())),
            Value::Time(t) => {
                ToSqlOutput::Owned(SqlValue::Text(t.format("%H:%M:%S%.6f").to_string()))
            }
        })
    }
}

/// The destination connection, shared across all batches and files. One
/// transaction per file; no transaction ever spans more than one file.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the destination database. Failure here is fatal to
    /// the run, before any file is processed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("opening destination database {}", path.display()))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory database")?;
        Ok(Self { conn })
    }

    /// Create the destination table from the declared column kinds if it does
    /// not exist yet. `RowID` is the primary key; duplicate inserts surface as
    /// `StoreError::DuplicateKey`.
    pub fn ensure_table(&self, table: &str, columns: &[CleanColumn]) -> Result<(), StoreError> {
        let cols: Vec<String> = columns
            .iter()
            .map(|c| {
                let ty = if c.name == ROW_ID {
                    "TEXT PRIMARY KEY"
                } else {
                    sql_type(c.kind)
                };
                format!("{} {}", quote_ident(&c.name), ty)
            })
            .collect();
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(table),
            cols.join(", ")
        );
        self.conn.execute(&sql, [])?;
        Ok(())
    }

    /// Append all rows of one cleaned table as a single unit of work. On any
    /// failure the whole file's insert rolls back and the error is returned
    /// classified; earlier files' committed rows are unaffected.
    pub fn append_table(&self, table: &str, t: &CleanTable) -> Result<usize, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let cols: Vec<String> = t.columns.iter().map(|c| quote_ident(&c.name)).collect();
            let placeholders: Vec<String> = (1..=t.columns.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(table),
                cols.join(", "),
                placeholders.join(", ")
            );
            let mut stmt = tx.prepare(&sql)?;
            for row in &t.rows {
                stmt.execute(params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;
        Ok(t.rows.len())
    }

    pub fn row_count(&self, table: &str) -> Result<i64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let n = self.conn.query_row(&sql, [], |r| r.get(0))?;
        Ok(n)
    }
}

fn sql_type(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Numeric => "REAL",
        ColumnKind::Date | ColumnKind::Time | ColumnKind::Text => "TEXT",
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clean::{clean_table, RawTable};

    fn raw(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    fn pitch_table(rows: &[&[&str]]) -> CleanTable {
        clean_table(&raw(
            &["Level", "Date", "Time", "GameID", "PitchNo", "RelSpeed"],
            rows,
        ))
    }

    #[test]
    fn ensure_and_append_round_trip() -> Result<()> {
        let store = Store::open_in_memory()?;
        let t = pitch_table(&[
            &["D1", "2025-04-12", "14:05:30.123456", "G1", "1", "92.4"],
            &["D1", "2025-04-12", "14:05:45", "G1", "2", "88.1"],
        ]);
        store.ensure_table("pitches", &t.columns)?;
        let inserted = store.append_table("pitches", &t)?;
        assert_eq!(inserted, 2);
        assert_eq!(store.row_count("pitches")?, 2);
        Ok(())
    }

    #[test]
    fn duplicate_row_id_is_classified_as_duplicate_key() -> Result<()> {
        let store = Store::open_in_memory()?;
        let t = pitch_table(&[&["D1", "2025-04-12", "14:05:30", "G1", "7", "92.4"]]);
        store.ensure_table("pitches", &t.columns)?;
        store.append_table("pitches", &t)?;

        match store.append_table("pitches", &t) {
            Err(StoreError::DuplicateKey { message, .. }) => {
                assert!(message.to_lowercase().contains("unique"), "{}", message);
            }
            other => panic!("expected DuplicateKey, got {:?}", other.map(|_| ())),
        }
        Ok(())
    }

    #[test]
    fn failed_file_rolls_back_all_of_its_rows() -> Result<()> {
        let store = Store::open_in_memory()?;
        let first = pitch_table(&[&["D1", "2025-04-12", "14:05:30", "G1", "1", "92.4"]]);
        store.ensure_table("pitches", &first.columns)?;
        store.append_table("pitches", &first)?;

        // one fresh row, then a duplicate of G1_1: the whole file rolls back
        let second = pitch_table(&[
            &["D1", "2025-04-12", "14:06:00", "G1", "2", "90.0"],
            &["D1", "2025-04-12", "14:05:30", "G1", "1", "92.4"],
        ]);
        assert!(store.append_table("pitches", &second).is_err());
        assert_eq!(store.row_count("pitches")?, 1);
        Ok(())
    }

    #[test]
    fn missing_table_is_a_persistence_error() -> Result<()> {
        let store = Store::open_in_memory()?;
        let t = pitch_table(&[&["D1", "2025-04-12", "14:05:30", "G1", "1", "92.4"]]);
        match store.append_table("nowhere", &t) {
            Err(StoreError::Persistence(_)) => {}
            other => panic!("expected Persistence, got {:?}", other.map(|_| ())),
        }
        Ok(())
    }

    #[test]
    fn extracts_offending_key_when_the_message_exposes_it() {
        assert_eq!(
            extract_duplicate_key("The duplicate key value is (G1_7)."),
            Some("G1_7".to_string())
        );
        assert_eq!(
            extract_duplicate_key("UNIQUE constraint failed: pitches.RowID"),
            None
        );
    }

    #[test]
    fn dates_and_times_are_stored_as_iso_text() -> Result<()> {
        let store = Store::open_in_memory()?;
        let t = pitch_table(&[&["D1", "2025-04-12", "14:05:30.123456", "G1", "1", "92.4"]]);
        store.ensure_table("pitches", &t.columns)?;
        store.append_table("pitches", &t)?;

        let (date, time): (String, String) = store
            .conn
            .query_row("SELECT \"Date\", \"Time\" FROM pitches", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .map_err(StoreError::from)?;
        assert_eq!(date, "2025-04-12");
        assert_eq!(time, "14:05:30.123456");
        Ok(())
    }
}
