// src/load/mod.rs

use anyhow::Result;
use tracing::{error, info, warn};

use crate::{
    clean::{self, CleanTable},
    config::Config,
    metrics::{MemorySampler, RunMetrics, RunSummary},
    scan::SourceFile,
    store::{Store, StoreError},
};

/// Only rows from files whose first `Level` value equals this are eligible.
pub const ELIGIBLE_LEVEL: &str = "D1";

/// Per-file result. Logged at the file boundary; never terminates the run.
#[derive(Debug)]
pub enum LoadOutcome {
    Inserted { rows: usize, dropped: usize },
    SkippedLevel(Option<String>),
    Failed(FailureKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Unreadable or malformed CSV.
    Read,
    /// Uniqueness violation on insert.
    DuplicateKey,
    /// Any other storage-layer failure.
    Storage,
    /// Anything not recognized as a storage error.
    Unexpected,
}

/// Process the full file list in fixed-size batches. Every file-scoped
/// failure is absorbed here; only the caller's discovery and connection setup
/// can abort a run.
pub fn run(cfg: &Config, store: &Store, files: &[SourceFile]) -> Result<RunSummary> {
    let mut metrics = RunMetrics::new(files.len());
    if files.is_empty() {
        info!("no CSV files found");
        return Ok(metrics.finish());
    }

    let mut sampler = MemorySampler::new();
    let batch_size = cfg.batch_size.max(1);
    for (idx, batch) in files.chunks(batch_size).enumerate() {
        let mem_before = sampler.rss_mib();

        for file in batch {
            match process_file(cfg, store, file) {
                LoadOutcome::Inserted { rows, dropped } => metrics.record_inserted(rows, dropped),
                LoadOutcome::SkippedLevel(_) => metrics.record_level_skip(),
                LoadOutcome::Failed(_) => metrics.record_failure(),
            }
        }

        let mem_after = sampler.rss_mib();
        info!(
            "processed batch {} | mem: {:.2} MiB -> {:.2} MiB",
            idx + 1,
            mem_before,
            mem_after
        );
    }

    Ok(metrics.finish())
}

/// Read, gate, clean, and insert one file, classifying any failure.
pub fn process_file(cfg: &Config, store: &Store, file: &SourceFile) -> LoadOutcome {
    let path = &file.path;

    let raw = match clean::read_csv_table(path) {
        Ok(raw) => raw,
        Err(e) => {
            error!("error reading {}: {:#}", path.display(), e);
            return LoadOutcome::Failed(FailureKind::Read);
        }
    };

    match raw.first_level() {
        Some(ELIGIBLE_LEVEL) => {}
        level => {
            info!(
                "skipped {}, Level = {}",
                path.display(),
                level.unwrap_or("<missing>")
            );
            return LoadOutcome::SkippedLevel(level.map(str::to_string));
        }
    }

    let table = clean::clean_table(&raw);
    if table.dropped_rows > 0 {
        warn!(
            "{}: dropped {} rows with missing GameID/PitchNo",
            path.display(),
            table.dropped_rows
        );
    }

    match insert_table(cfg, store, &table) {
        Ok(rows) => {
            info!("{} -> inserted {} rows", path.display(), rows);
            LoadOutcome::Inserted {
                rows,
                dropped: table.dropped_rows,
            }
        }
        Err(e) => LoadOutcome::Failed(classify_insert_error(path, e)),
    }
}

fn insert_table(cfg: &Config, store: &Store, table: &CleanTable) -> Result<usize> {
    store.ensure_table(&cfg.table, &table.columns)?;
    let rows = store.append_table(&cfg.table, table)?;
    Ok(rows)
}

fn classify_insert_error(path: &std::path::Path, e: anyhow::Error) -> FailureKind {
    match e.downcast_ref::<StoreError>() {
        Some(StoreError::DuplicateKey { key, message }) => {
            match key {
                Some(k) => error!("duplicate key '{}' in {}", k, path.display()),
                None => error!("duplicate key in {}: {}", path.display(), message),
            }
            FailureKind::DuplicateKey
        }
        Some(StoreError::Persistence(err)) => {
            error!("storage error for {}: {}", path.display(), err);
            FailureKind::Storage
        }
        None => {
            error!("unhandled error for {}: {:#}", path.display(), e);
            FailureKind::Unexpected
        }
    }
}
