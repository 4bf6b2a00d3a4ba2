//! features table queries.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use shark_core::errors::StorageError;
use shark_core::types::records::FeatureRecord;

use super::{parse_ts, sq, ts};

/// Look up a feature by its key.
pub fn get_by_key(
    conn: &Connection,
    feature_key: &str,
) -> Result<Option<FeatureRecord>, StorageError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT id, epic_id, feature_key, title, status, created_at, updated_at
             FROM features WHERE feature_key = ?1",
        )
        .map_err(sq)?;

    stmt.query_row(params![feature_key], map_feature_row)
        .optional()
        .map_err(sq)
}

/// Insert a new feature; returns the row id.
pub fn insert(
    conn: &Connection,
    epic_id: i64,
    feature_key: &str,
    title: &str,
    now: DateTime<Utc>,
) -> Result<i64, StorageError> {
    let mut stmt = conn
        .prepare_cached(
            "INSERT INTO features (epic_id, feature_key, title, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .map_err(sq)?;
    stmt.execute(params![epic_id, feature_key, title, ts(now), ts(now)])
        .map_err(sq)?;
    Ok(conn.last_insert_rowid())
}

/// Count total features.
pub fn count(conn: &Connection) -> Result<i64, StorageError> {
    conn.query_row("SELECT COUNT(*) FROM features", [], |row| row.get(0))
        .map_err(sq)
}

fn map_feature_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FeatureRecord> {
    Ok(FeatureRecord {
        id: row.get(0)?,
        epic_id: row.get(1)?,
        feature_key: row.get(2)?,
        title: row.get(3)?,
        status: row.get(4)?,
        created_at: parse_ts(5, row.get(5)?)?,
        updated_at: parse_ts(6, row.get(6)?)?,
    })
}
