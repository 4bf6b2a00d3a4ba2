//! Storage-layer errors for SQLite operations.

/// Errors that can occur in the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {message}")]
    SqliteError { message: String },

    /// Constraint violations are isolated per file by the orchestrator;
    /// other storage errors abort the transaction.
    #[error("Constraint violation: {message}")]
    ConstraintViolation { message: String },

    #[error("Migration failed at version {version}: {message}")]
    MigrationFailed { version: u32, message: String },
}
