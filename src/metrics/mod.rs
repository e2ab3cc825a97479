// src/metrics/mod.rs

use std::time::{Duration, Instant};
use sysinfo::{get_current_pid, Pid, ProcessesToUpdate, System};
use tracing::info;

/// Samples the current process's resident memory, logged around each batch as
/// an instrumentation signal. Never drives flow control; sampling failures
/// degrade to 0.
pub struct MemorySampler {
    sys: System,
    pid: Option<Pid>,
}

impl MemorySampler {
    pub fn new() -> Self {
        Self {
            sys: System::new(),
            pid: get_current_pid().ok(),
        }
    }

    /// Current RSS in MiB, or 0.0 when the process cannot be sampled.
    pub fn rss_mib(&mut self) -> f64 {
        let Some(pid) = self.pid else {
            return 0.0;
        };
        self.sys
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        self.sys
            .process(pid)
            .map(|p| p.memory() as f64 / (1024.0 * 1024.0))
            .unwrap_or(0.0)
    }
}

impl Default for MemorySampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregate counts for one run, emitted once at completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub files_total: usize,
    pub files_inserted: usize,
    pub files_skipped_level: usize,
    pub files_failed: usize,
    pub rows_inserted: usize,
    pub rows_dropped: usize,
    pub elapsed: Duration,
}

/// Incrementally maintained counters for the whole run.
pub struct RunMetrics {
    started: Instant,
    files_total: usize,
    files_inserted: usize,
    files_skipped_level: usize,
    files_failed: usize,
    rows_inserted: usize,
    rows_dropped: usize,
}

impl RunMetrics {
    pub fn new(files_total: usize) -> Self {
        Self {
            started: Instant::now(),
            files_total,
            files_inserted: 0,
            files_skipped_level: 0,
            files_failed: 0,
            rows_inserted: 0,
            rows_dropped: 0,
        }
    }

    pub fn record_inserted(&mut self, rows: usize, dropped: usize) {
        self.files_inserted += 1;
        self.rows_inserted += rows;
        self.rows_dropped += dropped;
    }

    pub fn record_level_skip(&mut self) {
        self.files_skipped_level += 1;
    }

    pub fn record_failure(&mut self) {
        self.files_failed += 1;
    }

    /// Emit the run-end summary line and hand back the final counts.
    pub fn finish(self) -> RunSummary {
        let elapsed = self.started.elapsed();
        info!(
            "complete: {} files, {} rows inserted in {:.2}s",
            self.files_total,
            self.rows_inserted,
            elapsed.as_secs_f64()
        );
        RunSummary {
            files_total: self.files_total,
            files_inserted: self.files_inserted,
            files_skipped_level: self.files_skipped_level,
            files_failed: self.files_failed,
            rows_inserted: self.rows_inserted,
            rows_dropped: self.rows_dropped,
            elapsed,
        }
    }
}
