//! Statistics generation from the run ledger
//!
//! This module provides functionality for extracting and displaying
//! harvest statistics from the ledger.

use crate::storage::{Ledger, LedgerResult, RunRecord};

/// Number of runs listed by `--stats`
const RECENT_RUNS: usize = 10;

/// Harvest statistics summary
#[derive(Debug, Clone)]
pub struct LedgerStatistics {
    /// Most recent runs, newest first
    pub recent_runs: Vec<RunRecord>,

    /// Deferred documents still waiting for a successful fetch
    pub deferred_pending: u64,

    /// Deferred documents that were published by a later run
    pub deferred_recovered: u64,
}

impl LedgerStatistics {
    /// Documents published across the listed runs
    pub fn published_in_recent_runs(&self) -> u64 {
        self.recent_runs.iter().map(|run| run.published).sum()
    }
}

/// Loads statistics from the ledger
pub fn load_statistics(ledger: &dyn Ledger) -> LedgerResult<LedgerStatistics> {
    Ok(LedgerStatistics {
        recent_runs: ledger.recent_runs(RECENT_RUNS)?,
        deferred_pending: ledger.count_deferred_pending()?,
        deferred_recovered: ledger.count_deferred_recovered()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &LedgerStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Deferred Documents:");
    println!("  Pending: {}", stats.deferred_pending);
    println!("  Recovered: {}", stats.deferred_recovered);
    println!();

    if stats.recent_runs.is_empty() {
        println!("No runs recorded yet");
        return;
    }

    println!("Recent Runs ({}):", stats.recent_runs.len());
    for run in &stats.recent_runs {
        let range = match run.end_offset {
            Some(end) => format!("{}..{}", run.start_offset, end),
            None => format!("{}..", run.start_offset),
        };
        println!(
            "  #{} {} [{}] offsets {}: {} examined, {} published, {} unresolved, {} failed, {} recovered",
            run.id,
            run.started_at,
            run.phase,
            range,
            run.examined,
            run.published,
            run.resolution_misses,
            run.fetch_failures,
            run.recovered
        );
        if let Some(message) = &run.error_message {
            println!("      error: {}", message);
        }
    }
    println!();

    println!(
        "Published in listed runs: {}",
        stats.published_in_recent_runs()
    );
}
