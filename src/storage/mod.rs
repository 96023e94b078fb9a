//! Storage module for the run ledger
//!
//! This module handles all database operations for the harvester:
//! - SQLite database initialization and schema management
//! - Run history with per-run counters
//! - Deferred documents whose text could not be fetched yet

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteLedger;
pub use traits::{Ledger, LedgerError, LedgerResult};

use crate::state::RunPhase;
use std::path::Path;

/// Opens or creates the ledger database at `path`
pub fn open_ledger(path: &Path) -> LedgerResult<SqliteLedger> {
    SqliteLedger::open(path)
}

/// A harvest run as stored in the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub start_offset: u64,
    pub end_offset: Option<u64>,
    pub examined: u64,
    pub published: u64,
    pub resolution_misses: u64,
    pub fetch_failures: u64,
    pub recovered: u64,
    pub phase: RunPhase,
    pub error_message: Option<String>,
}

/// Final counters of a run, written when it ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub end_offset: u64,
    pub examined: u64,
    pub published: u64,
    pub resolution_misses: u64,
    pub fetch_failures: u64,
    pub recovered: u64,
    pub phase: RunPhase,
    pub error_message: Option<String>,
}

/// A document fetch failure to be retried by a later run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredFailure {
    pub identifier: String,
    pub reference: Option<String>,
    pub record_offset: Option<u64>,
    pub error: String,
}

/// A deferred document as stored in the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredRecord {
    pub identifier: String,
    pub reference: Option<String>,
    pub record_offset: Option<u64>,
    pub attempts: u32,
    pub last_error: String,
    pub first_failed_at: String,
    pub last_failed_at: String,
    pub recovered_at: Option<String>,
}
