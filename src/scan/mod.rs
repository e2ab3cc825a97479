// src/scan/mod.rs

use anyhow::{bail, Context, Result};
use chrono::{Datelike, Days, NaiveDate};
use glob::glob;
use std::path::{Path, PathBuf};
use tracing::info;

/// One candidate CSV export discovered under the dated drop directory.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    /// `YYYY-MM-DD` derived from the directory structure, if present.
    pub partition: Option<String>,
}

/// Result of a directory scan: the ordered candidate list plus the counters
/// for the two name-based exclusion categories.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub files: Vec<SourceFile>,
    pub unverified: usize,
    pub player_tracking: usize,
}

/// Recursively enumerate CSV files under `root`, applying the filename rules:
/// anything containing `unverified` is excluded and counted, anything
/// containing `playerpositioning`/`playertracking` is excluded and counted,
/// remaining `.csv` files are included. Other files are ignored. Matching is
/// case-insensitive. The returned list is sorted by path so batches are
/// deterministic.
pub fn scan_csv_files(root: impl AsRef<Path>) -> Result<ScanOutcome> {
    let root = root.as_ref();
    if !root.is_dir() {
        bail!("source directory {} is missing or unreadable", root.display());
    }

    let mut outcome = ScanOutcome::default();
    let pattern = format!("{}/**/*", root.display());
    for entry in glob(&pattern).context("building scan pattern")? {
        let path = entry.context("reading directory entry")?;
        if !path.is_file() {
            continue;
        }
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_lowercase(),
            None => continue,
        };
        if name.contains("unverified") {
            outcome.unverified += 1;
            continue;
        }
        if name.contains("playerpositioning") || name.contains("playertracking") {
            outcome.player_tracking += 1;
            continue;
        }
        if name.ends_with(".csv") {
            let partition = partition_from_path(&path);
            outcome.files.push(SourceFile { path, partition });
        }
    }
    outcome.files.sort_by(|a, b| a.path.cmp(&b.path));

    info!(
        "files skipped: {} unverified, {} player tracking",
        outcome.unverified, outcome.player_tracking
    );
    info!("total CSV files to process: {}", outcome.files.len());
    Ok(outcome)
}

/// The `v3/YYYY/MM/DD` subdirectory the transfer job used for the day before
/// `today`, mirroring its drop layout.
pub fn yesterday_partition(today: NaiveDate) -> PathBuf {
    let yesterday = today
        .checked_sub_days(Days::new(1))
        .unwrap_or(today);
    PathBuf::from("v3")
        .join(format!("{:04}", yesterday.year()))
        .join(format!("{:02}", yesterday.month()))
        .join(format!("{:02}", yesterday.day()))
}

/// Walk the path components looking for a `YYYY/MM/DD` run and render it as
/// `YYYY-MM-DD`. Returns `None` when the file does not sit under a dated
/// directory.
fn partition_from_path(path: &Path) -> Option<String> {
    let parts: Vec<&str> = path
        .parent()?
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();

    for window in parts.windows(3) {
        let (y, m, d) = (window[0], window[1], window[2]);
        if y.len() == 4 && m.len() == 2 && d.len() == 2 {
            if let (Ok(year), Ok(month), Ok(day)) =
                (y.parse::<i32>(), m.parse::<u32>(), d.parse::<u32>())
            {
                if NaiveDate::from_ymd_opt(year, month, day).is_some() {
                    return Some(format!("{:04}-{:02}-{:02}", year, month, day));
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn filters_by_filename_and_counts_exclusions() -> Result<()> {
        let tmp = tempdir()?;
        let day = tmp.path().join("2025").join("04").join("12");
        fs::create_dir_all(&day)?;

        touch(&day, "game_one.csv");
        touch(&day, "game_two.CSV");
        touch(&day, "game_three_UNVERIFIED.csv");
        touch(&day, "Unverified_game_four.csv");
        touch(&day, "game_five_playerpositioning.csv");
        touch(&day, "game_six_PlayerTracking.csv");
        touch(&day, "notes.txt");

        let outcome = scan_csv_files(tmp.path())?;
        assert_eq!(outcome.files.len(), 2);
        assert_eq!(outcome.unverified, 2);
        assert_eq!(outcome.player_tracking, 2);
        // notes.txt is neither included nor counted
        Ok(())
    }

    #[test]
    fn exclusion_wins_over_csv_extension() -> Result<()> {
        let tmp = tempdir()?;
        touch(tmp.path(), "unverified_playertracking.csv");

        let outcome = scan_csv_files(tmp.path())?;
        assert!(outcome.files.is_empty());
        // counted once, in the first matching category only
        assert_eq!(outcome.unverified, 1);
        assert_eq!(outcome.player_tracking, 0);
        Ok(())
    }

    #[test]
    fn derives_date_partition_from_directory_structure() -> Result<()> {
        let tmp = tempdir()?;
        let day = tmp.path().join("v3").join("2025").join("04").join("12");
        fs::create_dir_all(&day)?;
        touch(&day, "game.csv");

        let outcome = scan_csv_files(tmp.path())?;
        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.files[0].partition.as_deref(), Some("2025-04-12"));
        Ok(())
    }

    #[test]
    fn files_outside_dated_directories_have_no_partition() -> Result<()> {
        let tmp = tempdir()?;
        touch(tmp.path(), "stray.csv");

        let outcome = scan_csv_files(tmp.path())?;
        assert_eq!(outcome.files[0].partition, None);
        Ok(())
    }

    #[test]
    fn missing_root_is_fatal() {
        let tmp = tempdir().unwrap();
        let gone = tmp.path().join("nope");
        assert!(scan_csv_files(&gone).is_err());
    }

    #[test]
    fn results_are_sorted_by_path() -> Result<()> {
        let tmp = tempdir()?;
        touch(tmp.path(), "b.csv");
        touch(tmp.path(), "a.csv");
        touch(tmp.path(), "c.csv");

        let outcome = scan_csv_files(tmp.path())?;
        let names: Vec<_> = outcome
            .files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.csv", "b.csv", "c.csv"]);
        Ok(())
    }

    #[test]
    fn yesterday_partition_matches_drop_layout() {
        let today = NaiveDate::from_ymd_opt(2025, 4, 13).unwrap();
        assert_eq!(
            yesterday_partition(today),
            PathBuf::from("v3").join("2025").join("04").join("12")
        );

        // month boundary
        let first = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        assert_eq!(
            yesterday_partition(first),
            PathBuf::from("v3").join("2025").join("04").join("30")
        );
    }
}
