//! Ledger trait and error types

use crate::storage::{DeferredFailure, DeferredRecord, RunOutcome, RunRecord};
use thiserror::Error;

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Corrupt ledger value: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Bookkeeping store for runs and deferred documents
///
/// The ledger never decides which records are harvested; the checkpoint
/// does. Losing the ledger only loses history and pending retries.
pub trait Ledger: Send {
    // ===== Runs =====

    /// Opens a run record and returns its id
    fn begin_run(&mut self, config_hash: &str, start_offset: u64) -> LedgerResult<i64>;

    /// Closes a run record with its final counters and phase
    fn finish_run(&mut self, run_id: i64, outcome: &RunOutcome) -> LedgerResult<()>;

    fn get_run(&self, run_id: i64) -> LedgerResult<RunRecord>;

    /// Most recent runs first
    fn recent_runs(&self, limit: usize) -> LedgerResult<Vec<RunRecord>>;

    // ===== Deferred documents =====

    /// Records a fetch failure; a known identifier has its attempts bumped
    fn record_deferred(&mut self, failure: &DeferredFailure) -> LedgerResult<()>;

    /// Bumps the attempt count of a pending deferred document
    ///
    /// Returns false when the identifier is unknown or already recovered.
    fn bump_deferred_attempt(&mut self, identifier: &str, error: &str) -> LedgerResult<bool>;

    /// Pending documents with fewer than `max_attempts` attempts, oldest first
    fn due_deferred(&self, limit: usize, max_attempts: u32) -> LedgerResult<Vec<DeferredRecord>>;

    /// Marks a deferred document as recovered
    ///
    /// Returns false when there was no pending entry for the identifier.
    fn mark_recovered(&mut self, identifier: &str) -> LedgerResult<bool>;

    /// Number of deferred documents not yet recovered
    fn count_deferred_pending(&self) -> LedgerResult<u64>;

    /// Number of deferred documents that were eventually published
    fn count_deferred_recovered(&self) -> LedgerResult<u64>;
}
