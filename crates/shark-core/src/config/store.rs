//! Config file persistence with atomic writes.

use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Datelike, Duration, Utc};

use crate::errors::ConfigError;
use crate::types::report::SyncWarning;

use super::SharkConfig;

/// Earliest plausible watermark year.
const MIN_WATERMARK_YEAR: i32 = 2020;
/// Latest plausible watermark year.
const MAX_WATERMARK_YEAR: i32 = 2100;

/// Reads and writes `.sharkconfig.json`.
///
/// Loading never fails: a missing file yields defaults, a malformed file
/// yields defaults plus a warning. Saving is atomic: serialize to a
/// sibling temp file, fsync, rename over the target.
pub struct ConfigStore;

impl ConfigStore {
    /// Load the config at `path`. `now` anchors watermark plausibility
    /// checks so tests can inject a fixed clock.
    pub fn load(path: &Path, now: DateTime<Utc>) -> (SharkConfig, Vec<SyncWarning>) {
        let mut warnings = Vec::new();

        let mut config = match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str::<SharkConfig>(&text) {
                Ok(config) => config,
                Err(e) => {
                    let warning = SyncWarning::general(format!(
                        "malformed config {}: {e}; using defaults",
                        path.display()
                    ));
                    tracing::warn!("{}", warning.message);
                    warnings.push(warning);
                    SharkConfig::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SharkConfig::default(),
            Err(e) => {
                let warning = SyncWarning::general(format!(
                    "unreadable config {}: {e}; using defaults",
                    path.display()
                ));
                tracing::warn!("{}", warning.message);
                warnings.push(warning);
                SharkConfig::default()
            }
        };

        if let Some(ts) = config.last_sync_time {
            if !Self::watermark_plausible(ts, now) {
                let warning = SyncWarning::general(format!(
                    "last_sync_time {} is implausible; treating project as never synced",
                    ts.to_rfc3339()
                ));
                tracing::warn!("{}", warning.message);
                warnings.push(warning);
                config.last_sync_time = None;
            }
        }

        (config, warnings)
    }

    /// Atomically write `config` to `path`.
    pub fn save(path: &Path, config: &SharkConfig) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(config)?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(".sharkconfig.json");
        let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()));

        // Preserve mode bits of an existing target across the rename.
        let permissions = std::fs::metadata(path).ok().map(|m| m.permissions());

        let result = Self::write_and_rename(&tmp, path, &json, permissions);
        if result.is_err() {
            let _ = std::fs::remove_file(&tmp);
        }
        result.map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Read-modify-write the watermark, then save atomically.
    pub fn update_watermark(
        path: &Path,
        watermark: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), ConfigError> {
        let (mut config, _) = Self::load(path, now);
        config.last_sync_time = Some(watermark);
        Self::save(path, &config)
    }

    fn watermark_plausible(ts: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        (MIN_WATERMARK_YEAR..=MAX_WATERMARK_YEAR).contains(&ts.year())
            && ts <= now + Duration::hours(1)
    }

    fn write_and_rename(
        tmp: &Path,
        target: &Path,
        json: &str,
        permissions: Option<std::fs::Permissions>,
    ) -> Result<(), std::io::Error> {
        let mut file = std::fs::File::create(tmp)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        drop(file);

        if let Some(perms) = permissions {
            std::fs::set_permissions(tmp, perms)?;
        }
        std::fs::rename(tmp, target)?;
        Ok(())
    }
}
