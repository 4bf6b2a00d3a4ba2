//! sync_history table queries.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use shark_core::errors::StorageError;

use super::{parse_ts, parse_ts_opt, sq, ts};

/// One recorded sync run.
#[derive(Debug, Clone)]
pub struct SyncHistoryRow {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub files_scanned: i64,
    pub files_filtered: i64,
    pub files_skipped: i64,
    pub tasks_imported: i64,
    pub tasks_updated: i64,
    pub conflicts_detected: i64,
    pub conflicts_resolved: i64,
    pub status: String,
    pub error: Option<String>,
}

/// Record the start of a sync run; returns the history row id.
pub fn insert_start(conn: &Connection, started_at: DateTime<Utc>) -> Result<i64, StorageError> {
    let mut stmt = conn
        .prepare_cached("INSERT INTO sync_history (started_at) VALUES (?1)")
        .map_err(sq)?;
    stmt.execute(params![ts(started_at)]).map_err(sq)?;
    Ok(conn.last_insert_rowid())
}

/// Record the outcome of a sync run.
#[allow(clippy::too_many_arguments)]
pub fn update_complete(
    conn: &Connection,
    id: i64,
    completed_at: DateTime<Utc>,
    files_scanned: i64,
    files_filtered: i64,
    files_skipped: i64,
    tasks_imported: i64,
    tasks_updated: i64,
    conflicts_detected: i64,
    conflicts_resolved: i64,
    status: &str,
    error: Option<&str>,
) -> Result<(), StorageError> {
    let mut stmt = conn
        .prepare_cached(
            "UPDATE sync_history SET
             completed_at = ?2, files_scanned = ?3, files_filtered = ?4, files_skipped = ?5,
             tasks_imported = ?6, tasks_updated = ?7, conflicts_detected = ?8,
             conflicts_resolved = ?9, status = ?10, error = ?11
             WHERE id = ?1",
        )
        .map_err(sq)?;

    stmt.execute(params![
        id,
        ts(completed_at),
        files_scanned,
        files_filtered,
        files_skipped,
        tasks_imported,
        tasks_updated,
        conflicts_detected,
        conflicts_resolved,
        status,
        error,
    ])
    .map_err(sq)?;
    Ok(())
}

/// Most recent runs, newest first.
pub fn query_recent(conn: &Connection, limit: usize) -> Result<Vec<SyncHistoryRow>, StorageError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT id, started_at, completed_at, files_scanned, files_filtered,
                    files_skipped, tasks_imported, tasks_updated, conflicts_detected,
                    conflicts_resolved, status, error
             FROM sync_history ORDER BY started_at DESC LIMIT ?1",
        )
        .map_err(sq)?;

    let rows = stmt
        .query_map(params![limit as i64], |row| {
            Ok(SyncHistoryRow {
                id: row.get(0)?,
                started_at: parse_ts(1, row.get(1)?)?,
                completed_at: parse_ts_opt(2, row.get(2)?)?,
                files_scanned: row.get(3)?,
                files_filtered: row.get(4)?,
                files_skipped: row.get(5)?,
                tasks_imported: row.get(6)?,
                tasks_updated: row.get(7)?,
                conflicts_detected: row.get(8)?,
                conflicts_resolved: row.get(9)?,
                status: row.get(10)?,
                error: row.get(11)?,
            })
        })
        .map_err(sq)?;

    let mut result = Vec::new();
    for row in rows {
        result.push(row.map_err(sq)?);
    }
    Ok(result)
}

/// Count recorded runs.
pub fn count(conn: &Connection) -> Result<i64, StorageError> {
    conn.query_row("SELECT COUNT(*) FROM sync_history", [], |row| row.get(0))
        .map_err(sq)
}
