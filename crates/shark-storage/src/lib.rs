//! # shark-storage
//!
//! SQLite persistence layer for the Shark sync engine.
//! WAL mode, pragma bootstrap, `PRAGMA user_version` migrations, and
//! per-table query modules. The orchestrator owns the single writable
//! transaction; everything here operates over a borrowed `Connection`.

pub mod connection;
pub mod migrations;
pub mod queries;

pub use connection::Database;
