//! Top-level sync errors.

use super::{ConfigError, PatternError, StorageError};

/// Fatal errors that abort a sync invocation.
///
/// Per-file problems (pattern mismatch, orphan paths, YAML errors) are
/// report warnings, not errors; only database failures, cancellation,
/// and pre-scan validation reach this enum.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pattern validation failed: {0}")]
    Pattern(#[from] PatternError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Sync timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
}

impl SyncError {
    /// Process exit status for a failed invocation: 3 for configuration
    /// or pattern validation failures, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Pattern(_) => 3,
            _ => 1,
        }
    }
}
