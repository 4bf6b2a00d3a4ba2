//! # shark-sync
//!
//! The incremental sync engine: walks the documentation root, classifies
//! Markdown artifacts against the configured pattern registry, reduces
//! the set to files changed since the last successful sync, parses
//! frontmatter, synthesizes missing task keys, reconciles conflicts
//! against the database under one transaction, and advances the sync
//! watermark on commit.

pub mod conflict;
pub mod frontmatter;
pub mod incremental;
pub mod keygen;
pub mod orchestrator;
pub mod patterns;
pub mod scanner;

pub use conflict::resolver::{ConflictPrompter, LinePrompter, Strategy};
pub use orchestrator::{SyncOptions, SyncOrchestrator};
pub use patterns::registry::PatternRegistry;
