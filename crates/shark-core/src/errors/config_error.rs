//! Configuration persistence errors.
//!
//! Loading a malformed config file is NOT an error — the store falls back
//! to defaults with a warning. These variants cover the save path, where
//! losing data silently is unacceptable.

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error writing config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}
