//! Database connection bootstrap.

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use shark_core::errors::StorageError;

use crate::migrations;

/// Owns the single connection used by one sync invocation.
///
/// Opening applies pragmas and runs migrations. Reads and writes share the
/// connection; the orchestrator serializes writes under one transaction.
pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Database {
    /// Open a file-backed database, creating parent directories as needed.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StorageError::SqliteError {
                    message: format!("failed to create database directory: {e}"),
                })?;
            }
        }

        let conn = Connection::open(path).map_err(|e| StorageError::SqliteError {
            message: e.to_string(),
        })?;
        Self::bootstrap(&conn)?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(|e| StorageError::SqliteError {
            message: e.to_string(),
        })?;
        Self::bootstrap(&conn)?;
        Ok(Self { conn, path: None })
    }

    fn bootstrap(conn: &Connection) -> Result<(), StorageError> {
        apply_pragmas(conn)?;
        migrations::run_migrations(conn)?;
        Ok(())
    }

    /// Database file path (None for in-memory).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a write transaction. Dropping without commit rolls back.
    pub fn transaction(&mut self) -> Result<rusqlite::Transaction<'_>, StorageError> {
        self.conn
            .transaction()
            .map_err(|e| StorageError::SqliteError {
                message: e.to_string(),
            })
    }
}

/// Apply connection pragmas. Idempotent, called on every open.
pub fn apply_pragmas(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        PRAGMA temp_store = MEMORY;
        ",
    )
    .map_err(|e| StorageError::SqliteError {
        message: e.to_string(),
    })
}
