//! Output module for run reports and ledger statistics
//!
//! This module handles:
//! - Printing the report of a finished run
//! - Loading and printing harvest statistics from the ledger

mod report;
pub mod stats;

pub use report::print_run_report;
pub use stats::{load_statistics, print_statistics, LedgerStatistics};
