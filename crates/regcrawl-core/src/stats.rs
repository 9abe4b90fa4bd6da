//! Per-run crawl counters.
//!
//! [`Statistics`] is an explicit value threaded through the orchestrator and
//! the region crawler by `&mut`. It is flushed once, at shutdown, whatever
//! the reason the run ended.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::AppError;

/// Counts for one region within a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegionTally {
    pub total: u64,
    pub with_data: u64,
    pub without_data: u64,
}

/// Monotonic counters for one process run.
#[derive(Debug, Clone)]
pub struct Statistics {
    started: Instant,
    started_at: DateTime<Utc>,
    total_processed: u64,
    with_data: u64,
    without_data: u64,
    errors: u64,
    skipped: u64,
    regions: BTreeMap<String, RegionTally>,
}

/// Serializable end-of-run summary.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub execution_time_seconds: f64,
    pub execution_time_human: String,
    pub total_processed: u64,
    pub total_with_data: u64,
    pub total_without_data: u64,
    pub errors: u64,
    pub skipped_duplicates: u64,
    pub region_stats: BTreeMap<String, RegionTally>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

impl Statistics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            started_at: Utc::now(),
            total_processed: 0,
            with_data: 0,
            without_data: 0,
            errors: 0,
            skipped: 0,
            regions: BTreeMap::new(),
        }
    }

    /// Record one fetched facility in `region_code`.
    pub fn add_facility(&mut self, region_code: &str, has_data: bool) {
        self.total_processed += 1;
        let tally = self.regions.entry(region_code.to_string()).or_default();
        tally.total += 1;
        if has_data {
            self.with_data += 1;
            tally.with_data += 1;
        } else {
            self.without_data += 1;
            tally.without_data += 1;
        }
    }

    pub fn add_error(&mut self) {
        self.errors += 1;
    }

    /// Record an item skipped because its id is already in the ledger.
    pub fn add_skip(&mut self) {
        self.skipped += 1;
    }

    pub fn total_processed(&self) -> u64 {
        self.total_processed
    }

    pub fn with_data(&self) -> u64 {
        self.with_data
    }

    pub fn without_data(&self) -> u64 {
        self.without_data
    }

    pub fn errors(&self) -> u64 {
        self.errors
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn region(&self, region_code: &str) -> RegionTally {
        self.regions.get(region_code).copied().unwrap_or_default()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let elapsed = self.elapsed();
        StatsSnapshot {
            execution_time_seconds: elapsed.as_secs_f64(),
            execution_time_human: format_duration(elapsed),
            total_processed: self.total_processed,
            total_with_data: self.with_data,
            total_without_data: self.without_data,
            errors: self.errors,
            skipped_duplicates: self.skipped,
            region_stats: self.regions.clone(),
            started_at: self.started_at,
            completed_at: Utc::now(),
        }
    }

    /// Write the snapshot as pretty JSON to `path`.
    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Statistics saved");
        Ok(())
    }

    /// Print a human-readable summary to stdout.
    pub fn print_summary(&self) {
        let elapsed = self.elapsed();
        println!();
        println!("{}", "=".repeat(60));
        println!("Crawl statistics");
        println!("{}", "=".repeat(60));
        println!("Elapsed:          {}", format_duration(elapsed));
        println!("Facilities:       {}", self.total_processed);
        println!("  with value:     {}", self.with_data);
        println!("  without value:  {}", self.without_data);
        println!("Errors:           {}", self.errors);
        println!("Skipped (dedup):  {}", self.skipped);
        if !self.regions.is_empty() {
            println!();
            println!("{:<8} {:>8} {:>10} {:>10}", "Region", "Total", "With", "Without");
            for (code, tally) in &self.regions {
                println!(
                    "{:<8} {:>8} {:>10} {:>10}",
                    code, tally.total, tally.with_data, tally.without_data
                );
            }
        }
        println!("{}", "=".repeat(60));
    }
}

/// `H:MM:SS`
fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
