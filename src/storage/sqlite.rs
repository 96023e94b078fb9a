//! SQLite ledger implementation

use crate::state::RunPhase;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Ledger, LedgerError, LedgerResult};
use crate::storage::{DeferredFailure, DeferredRecord, RunOutcome, RunRecord};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const RUN_COLUMNS: &str = "id, started_at, finished_at, config_hash, start_offset, end_offset, \
     examined, published, resolution_misses, fetch_failures, recovered, phase, error_message";

const DEFERRED_COLUMNS: &str = "identifier, reference, record_offset, attempts, last_error, \
     first_failed_at, last_failed_at, recovered_at";

/// SQLite ledger backend
pub struct SqliteLedger {
    conn: Connection,
}

impl SqliteLedger {
    /// Opens or creates the ledger at `path`, creating parent directories
    pub fn open(path: &Path) -> LedgerResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory ledger
    pub fn in_memory() -> LedgerResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn to_db_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_db_int(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<(RunRecord, String)> {
    let phase: String = row.get(11)?;
    let record = RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        start_offset: from_db_int(row.get(4)?),
        end_offset: row.get::<_, Option<i64>>(5)?.map(from_db_int),
        examined: from_db_int(row.get(6)?),
        published: from_db_int(row.get(7)?),
        resolution_misses: from_db_int(row.get(8)?),
        fetch_failures: from_db_int(row.get(9)?),
        recovered: from_db_int(row.get(10)?),
        phase: RunPhase::Start,
        error_message: row.get(12)?,
    };
    Ok((record, phase))
}

/// Resolves the phase column, which rusqlite cannot map to an enum itself
fn with_phase((mut record, phase): (RunRecord, String)) -> LedgerResult<RunRecord> {
    record.phase = RunPhase::from_db_string(&phase)
        .ok_or_else(|| LedgerError::Corrupt(format!("run {} has phase {:?}", record.id, phase)))?;
    Ok(record)
}

fn deferred_from_row(row: &Row<'_>) -> rusqlite::Result<DeferredRecord> {
    Ok(DeferredRecord {
        identifier: row.get(0)?,
        reference: row.get(1)?,
        record_offset: row.get::<_, Option<i64>>(2)?.map(from_db_int),
        attempts: row.get(3)?,
        last_error: row.get(4)?,
        first_failed_at: row.get(5)?,
        last_failed_at: row.get(6)?,
        recovered_at: row.get(7)?,
    })
}

impl Ledger for SqliteLedger {
    // ===== Runs =====

    fn begin_run(&mut self, config_hash: &str, start_offset: u64) -> LedgerResult<i64> {
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, start_offset, phase) VALUES (?1, ?2, ?3, ?4)",
            params![
                now(),
                config_hash,
                to_db_int(start_offset),
                RunPhase::Start.to_db_string()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(&mut self, run_id: i64, outcome: &RunOutcome) -> LedgerResult<()> {
        let updated = self.conn.execute(
            "UPDATE runs SET finished_at = ?1, end_offset = ?2, examined = ?3, published = ?4,
                resolution_misses = ?5, fetch_failures = ?6, recovered = ?7, phase = ?8,
                error_message = ?9
             WHERE id = ?10",
            params![
                now(),
                to_db_int(outcome.end_offset),
                to_db_int(outcome.examined),
                to_db_int(outcome.published),
                to_db_int(outcome.resolution_misses),
                to_db_int(outcome.fetch_failures),
                to_db_int(outcome.recovered),
                outcome.phase.to_db_string(),
                outcome.error_message,
                run_id
            ],
        )?;
        if updated == 0 {
            return Err(LedgerError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> LedgerResult<RunRecord> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(LedgerError::RunNotFound(run_id))?;
        with_phase(row)
    }

    fn recent_runs(&self, limit: usize) -> LedgerResult<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM runs ORDER BY id DESC LIMIT ?1",
            RUN_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![to_db_int(limit as u64)], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(with_phase).collect()
    }

    // ===== Deferred documents =====

    fn record_deferred(&mut self, failure: &DeferredFailure) -> LedgerResult<()> {
        let timestamp = now();
        self.conn.execute(
            "INSERT INTO deferred_documents
                (identifier, reference, record_offset, attempts, last_error,
                 first_failed_at, last_failed_at, recovered_at)
             VALUES (?1, ?2, ?3, 1, ?4, ?5, ?5, NULL)
             ON CONFLICT(identifier) DO UPDATE SET
                attempts = attempts + 1,
                last_error = excluded.last_error,
                last_failed_at = excluded.last_failed_at,
                reference = COALESCE(excluded.reference, reference),
                record_offset = COALESCE(excluded.record_offset, record_offset),
                recovered_at = NULL",
            params![
                failure.identifier,
                failure.reference,
                failure.record_offset.map(to_db_int),
                failure.error,
                timestamp
            ],
        )?;
        Ok(())
    }

    fn bump_deferred_attempt(&mut self, identifier: &str, error: &str) -> LedgerResult<bool> {
        let updated = self.conn.execute(
            "UPDATE deferred_documents
             SET attempts = attempts + 1, last_error = ?1, last_failed_at = ?2
             WHERE identifier = ?3 AND recovered_at IS NULL",
            params![error, now(), identifier],
        )?;
        Ok(updated > 0)
    }

    fn due_deferred(&self, limit: usize, max_attempts: u32) -> LedgerResult<Vec<DeferredRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM deferred_documents
             WHERE recovered_at IS NULL AND attempts < ?1
             ORDER BY first_failed_at ASC, rowid ASC
             LIMIT ?2",
            DEFERRED_COLUMNS
        ))?;
        let records = stmt
            .query_map(
                params![max_attempts, to_db_int(limit as u64)],
                deferred_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn mark_recovered(&mut self, identifier: &str) -> LedgerResult<bool> {
        let updated = self.conn.execute(
            "UPDATE deferred_documents SET recovered_at = ?1
             WHERE identifier = ?2 AND recovered_at IS NULL",
            params![now(), identifier],
        )?;
        Ok(updated > 0)
    }

    fn count_deferred_pending(&self) -> LedgerResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM deferred_documents WHERE recovered_at IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(from_db_int(count))
    }

    fn count_deferred_recovered(&self) -> LedgerResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM deferred_documents WHERE recovered_at IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(from_db_int(count))
    }
}
