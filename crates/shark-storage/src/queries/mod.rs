//! Per-table query modules. Free functions over a borrowed `Connection`
//! so the orchestrator's transaction (which derefs to `Connection`) can
//! drive every query.

pub mod epics;
pub mod features;
pub mod sync_history;
pub mod tasks;

use chrono::{DateTime, SecondsFormat, Utc};
use shark_core::errors::StorageError;

/// StorageError from a rusqlite error. Constraint violations get their
/// own variant so per-file failures can be isolated from fatal ones.
pub(crate) fn sq(e: rusqlite::Error) -> StorageError {
    if let rusqlite::Error::SqliteFailure(inner, _) = &e {
        if inner.code == rusqlite::ErrorCode::ConstraintViolation {
            return StorageError::ConstraintViolation {
                message: e.to_string(),
            };
        }
    }
    StorageError::SqliteError {
        message: e.to_string(),
    }
}

/// Timestamps are stored as RFC 3339 TEXT with microsecond precision.
pub(crate) fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn ts_opt(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(ts)
}

/// Parse a stored timestamp inside a row mapper.
pub(crate) fn parse_ts(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

pub(crate) fn parse_ts_opt(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_ts(idx, s)).transpose()
}
