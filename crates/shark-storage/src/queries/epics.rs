//! epics table queries.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use shark_core::errors::StorageError;
use shark_core::types::records::EpicRecord;

use super::{parse_ts, sq, ts};

/// Look up an epic by its key.
pub fn get_by_key(conn: &Connection, epic_key: &str) -> Result<Option<EpicRecord>, StorageError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT id, epic_key, title, status, created_at, updated_at
             FROM epics WHERE epic_key = ?1",
        )
        .map_err(sq)?;

    stmt.query_row(params![epic_key], map_epic_row)
        .optional()
        .map_err(sq)
}

/// Insert a new epic; returns the row id.
pub fn insert(
    conn: &Connection,
    epic_key: &str,
    title: &str,
    now: DateTime<Utc>,
) -> Result<i64, StorageError> {
    let mut stmt = conn
        .prepare_cached(
            "INSERT INTO epics (epic_key, title, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .map_err(sq)?;
    stmt.execute(params![epic_key, title, ts(now), ts(now)])
        .map_err(sq)?;
    Ok(conn.last_insert_rowid())
}

/// Count total epics.
pub fn count(conn: &Connection) -> Result<i64, StorageError> {
    conn.query_row("SELECT COUNT(*) FROM epics", [], |row| row.get(0))
        .map_err(sq)
}

fn map_epic_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EpicRecord> {
    Ok(EpicRecord {
        id: row.get(0)?,
        epic_key: row.get(1)?,
        title: row.get(2)?,
        status: row.get(3)?,
        created_at: parse_ts(4, row.get(4)?)?,
        updated_at: parse_ts(5, row.get(5)?)?,
    })
}
