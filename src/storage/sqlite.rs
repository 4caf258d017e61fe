//! SQLite run ledger
//!
//! Records when each source ran, under which configuration, and what it produced.

use crate::output::RunSummary;
use crate::state::StopReason;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const RUN_COLUMNS: &str = "id, source, started_at, finished_at, config_hash, mode, status, \
     pages_fetched, items_discovered, items_new, items_skipped_duplicate, items_failed, \
     attachments_failed, warnings, stop_reason";

/// SQLite-backed history of source runs
pub struct RunLedger {
    conn: Connection,
}

impl RunLedger {
    /// Opens (or creates) the ledger database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file; parent directories are created
    ///
    /// # Returns
    ///
    /// * `Ok(RunLedger)` - Successfully opened/created ledger
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
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
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Records the start of a source run
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    pub fn start_run(&mut self, source: &str, config_hash: &str, mode: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (source, started_at, config_hash, mode, status) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![source, now, config_hash, mode, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Stores the final counters and status of a run
    pub fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        summary: &RunSummary,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET finished_at = ?1, status = ?2, pages_fetched = ?3, items_discovered = ?4,
                 items_new = ?5, items_skipped_duplicate = ?6, items_failed = ?7,
                 attachments_failed = ?8, warnings = ?9, stop_reason = ?10
             WHERE id = ?11",
            params![
                now,
                status.to_db_string(),
                summary.pages_fetched as i64,
                summary.items_discovered as i64,
                summary.items_new as i64,
                summary.items_skipped_duplicate as i64,
                summary.items_failed as i64,
                summary.attachments_failed as i64,
                summary.warnings.len() as i64,
                summary.stop_reason.map(|reason| reason.to_db_string()),
                run_id,
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    /// Gets a run by ID
    pub fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let sql = format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS);
        self.conn
            .query_row(&sql, params![run_id], run_from_row)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    /// Most recent runs, newest first, optionally restricted to one source
    pub fn recent_runs(&self, source: Option<&str>, limit: usize) -> StorageResult<Vec<RunRecord>> {
        let sql = format!(
            "SELECT {} FROM runs WHERE (?1 IS NULL OR source = ?1) ORDER BY id DESC LIMIT ?2",
            RUN_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let runs = stmt
            .query_map(params![source, limit as i64], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    /// Marks runs left in `running` state by a killed process as interrupted
    ///
    /// # Returns
    ///
    /// The number of runs updated
    pub fn mark_stale_runs_interrupted(&mut self) -> StorageResult<usize> {
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1 WHERE status = ?2",
            params![
                RunStatus::Interrupted.to_db_string(),
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(updated)
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let status: String = row.get(6)?;
    let stop_reason: Option<String> = row.get(14)?;

    Ok(RunRecord {
        id: row.get(0)?,
        source: row.get(1)?,
        started_at: row.get(2)?,
        finished_at: row.get(3)?,
        config_hash: row.get(4)?,
        mode: row.get(5)?,
        status: RunStatus::from_db_string(&status).unwrap_or(RunStatus::Failed),
        pages_fetched: row.get::<_, i64>(7)? as u64,
        items_discovered: row.get::<_, i64>(8)? as u64,
        items_new: row.get::<_, i64>(9)? as u64,
        items_skipped_duplicate: row.get::<_, i64>(10)? as u64,
        items_failed: row.get::<_, i64>(11)? as u64,
        attachments_failed: row.get::<_, i64>(12)? as u64,
        warnings: row.get::<_, i64>(13)? as u64,
        stop_reason: stop_reason.as_deref().and_then(StopReason::from_db_string),
    })
}
