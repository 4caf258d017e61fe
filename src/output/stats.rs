//! Run history from the ledger
//!
//! This module provides functionality for extracting and displaying
//! per-source run statistics from the run ledger.

use crate::storage::{RunLedger, RunRecord, RunStatus, StorageResult};
use std::collections::BTreeMap;

/// Totals over the recorded runs of one source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStatistics {
    pub runs: u64,
    pub completed_runs: u64,
    pub items_new: u64,
    pub items_failed: u64,
    pub attachments_failed: u64,
    /// Start time of the latest run
    pub last_run: Option<String>,
}

/// Run history summary
#[derive(Debug, Clone, Default)]
pub struct HarvestStatistics {
    /// Most recent runs, newest first
    pub recent: Vec<RunRecord>,
    pub by_source: BTreeMap<String, SourceStatistics>,
}

/// Loads the recent run history
///
/// # Arguments
///
/// * `ledger` - The run ledger to query
/// * `source` - Restrict to one source
/// * `limit` - Number of runs to load
pub fn load_statistics(
    ledger: &RunLedger,
    source: Option<&str>,
    limit: usize,
) -> StorageResult<HarvestStatistics> {
    let recent = ledger.recent_runs(source, limit)?;

    let mut by_source: BTreeMap<String, SourceStatistics> = BTreeMap::new();
    for run in &recent {
        let stats = by_source.entry(run.source.clone()).or_default();
        stats.runs += 1;
        if run.status == RunStatus::Completed {
            stats.completed_runs += 1;
        }
        stats.items_new += run.items_new;
        stats.items_failed += run.items_failed;
        stats.attachments_failed += run.attachments_failed;
        if stats.last_run.is_none() {
            stats.last_run = Some(run.started_at.clone());
        }
    }

    Ok(HarvestStatistics { recent, by_source })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    if stats.recent.is_empty() {
        println!("No runs recorded yet.");
        return;
    }

    println!("Sources:");
    for (source, totals) in &stats.by_source {
        println!(
            "  {}: {} run(s), {} completed, {} new item(s), {} failed item(s), {} failed attachment(s), last run {}",
            source,
            totals.runs,
            totals.completed_runs,
            totals.items_new,
            totals.items_failed,
            totals.attachments_failed,
            totals.last_run.as_deref().unwrap_or("-")
        );
    }
    println!();

    println!("Recent Runs:");
    for run in &stats.recent {
        println!(
            "  #{} {} [{}] {} {}: {} page(s), {} discovered, {} new, {} duplicate(s), stop: {}",
            run.id,
            run.source,
            run.mode,
            run.started_at,
            run.status.to_db_string(),
            run.pages_fetched,
            run.items_discovered,
            run.items_new,
            run.items_skipped_duplicate,
            run.stop_reason
                .map(|reason| reason.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
    }
    println!();
}
