//! # shark-core
//!
//! Foundation crate for the Shark sync engine.
//! Defines the record types, errors, configuration model, report model,
//! and runtime seams (clock, cancellation) shared by every other crate
//! in the workspace.

pub mod config;
pub mod errors;
pub mod runtime;
pub mod types;

// Re-export the most commonly used types at the crate root.
pub use config::{ConfigStore, SharkConfig};
pub use errors::{ConfigError, PatternError, StorageError, SyncError};
pub use runtime::{CancellationToken, Clock, SystemClock};
pub use types::collections::{FxHashMap, FxHashSet};
pub use types::report::{Conflict, ConflictField, SyncReport, SyncWarning};
