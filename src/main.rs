use anyhow::{Context, Result};
use chrono::Local;
use std::{env, process::ExitCode};
use trackloader::{config::Config, load, scan, store::Store};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> ExitCode {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env_filter).init();
    info!("startup");

    // Per-file failures never reach here; only discovery and connection
    // setup abort the run, each as a single fatal log entry.
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // ─── 2) configuration ────────────────────────────────────────────
    let cfg = match env::args().nth(1) {
        Some(path) => Config::load(&path)?,
        None => Config::from_env().context("no config file argument and environment incomplete")?,
    };

    // ─── 3) destination connection ───────────────────────────────────
    let store = Store::open(&cfg.db_path)?;

    // ─── 4) discover yesterday's drop directory ──────────────────────
    let root = cfg
        .local_base_dir
        .join(scan::yesterday_partition(Local::now().date_naive()));
    info!("scanning {}", root.display());
    let outcome = scan::scan_csv_files(&root)?;

    // ─── 5) clean and load ───────────────────────────────────────────
    let summary = load::run(&cfg, &store, &outcome.files)?;
    info!(
        "run summary: {} inserted, {} level-skipped, {} failed, {} rows dropped",
        summary.files_inserted,
        summary.files_skipped_level,
        summary.files_failed,
        summary.rows_dropped
    );
    Ok(())
}
