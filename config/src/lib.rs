//! Configuration loading and policy defaults.
//!
//! Settings live in `~/.warden/config.toml`. Every field has a default, so a
//! missing or partial file is fine; a malformed file falls back to defaults
//! with a warning rather than taking the service down.
//!
//! The two policy thresholds here deliberately live outside the core: the
//! registry and ledger expose read-side filters (`list_stale`,
//! `list_overdue`) and callers decide what counts as stale or overdue.

use std::path::{Path, PathBuf};

use chrono::TimeDelta;
use serde::Deserialize;

/// Hours a person may stay inside before showing up in the overdue report.
const DEFAULT_OVERDUE_HOURS: u32 = 8;

/// Minutes without a heartbeat before a guard session counts as stale.
const DEFAULT_STALE_MINUTES: u32 = 10;

/// Service settings with policy defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Location of the access-control database.
    pub database_path: PathBuf,
    /// Overdue-presence threshold, in hours.
    pub overdue_threshold_hours: u32,
    /// Heartbeat staleness threshold, in minutes.
    pub heartbeat_stale_minutes: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            overdue_threshold_hours: DEFAULT_OVERDUE_HOURS,
            heartbeat_stale_minutes: DEFAULT_STALE_MINUTES,
        }
    }
}

impl Settings {
    /// Load settings from the default config path, falling back to defaults
    /// when the file is missing or malformed.
    #[must_use]
    pub fn load() -> Self {
        let Some(path) = config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Failed to load {}: {e}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Load settings from an explicit file.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })
    }

    /// Overdue-presence threshold as a duration.
    #[must_use]
    pub fn overdue_threshold(&self) -> TimeDelta {
        TimeDelta::hours(i64::from(self.overdue_threshold_hours))
    }

    /// Heartbeat staleness threshold as a duration.
    #[must_use]
    pub fn heartbeat_stale(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.heartbeat_stale_minutes))
    }
}

/// Failure to read or parse a settings file.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },
}

/// The default config file location (`~/.warden/config.toml`), if a home
/// directory exists.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".warden").join("config.toml"))
}

fn default_database_path() -> PathBuf {
    dirs::home_dir().map_or_else(
        || PathBuf::from("warden.db"),
        |home| home.join(".warden").join("warden.db"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy() {
        let settings = Settings::default();
        assert_eq!(settings.overdue_threshold(), TimeDelta::hours(8));
        assert_eq!(settings.heartbeat_stale(), TimeDelta::minutes(10));
    }

    #[test]
    fn full_file_overrides_everything() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            database_path = "/var/lib/warden/warden.db"
            overdue_threshold_hours = 12
            heartbeat_stale_minutes = 3
            "#,
        )
        .expect("write");

        let settings = Settings::load_from(&path).expect("load");
        assert_eq!(
            settings.database_path,
            PathBuf::from("/var/lib/warden/warden.db")
        );
        assert_eq!(settings.overdue_threshold(), TimeDelta::hours(12));
        assert_eq!(settings.heartbeat_stale(), TimeDelta::minutes(3));
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "overdue_threshold_hours = 10\n").expect("write");

        let settings = Settings::load_from(&path).expect("load");
        assert_eq!(settings.overdue_threshold(), TimeDelta::hours(10));
        assert_eq!(settings.heartbeat_stale_minutes, DEFAULT_STALE_MINUTES);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "overdue_threshold_hours = \"soon\"\n").expect("write");

        assert!(matches!(
            Settings::load_from(&path),
            Err(SettingsError::Parse { .. })
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            Settings::load_from(&dir.path().join("absent.toml")),
            Err(SettingsError::Read { .. })
        ));
    }
}
