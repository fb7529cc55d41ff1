//! Library preferences, stored as plain JSON beside the database.
//!
//! Read once when the library opens. The auto-delete pair drives the
//! default expiration applied by [`crate::apps::add_app`].

use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

// ── Preferences ────────────────────────────────────────────────────

/// Days used when auto-delete is on but no positive value is configured.
pub const FALLBACK_AUTO_DELETE_DAYS: i64 = 7;

/// Library-wide preferences.
///
/// Persisted to `{data_dir}/preferences.json`. All fields have defaults
/// via [`Default`], so partial files load cleanly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LibraryPreferences {
    /// Whether newly added apps receive an expiration date.
    #[serde(default)]
    pub default_auto_delete: bool,

    /// Lifetime given to new apps when auto-delete is on.
    #[serde(default = "default_auto_delete_days")]
    pub default_auto_delete_days: i64,

    /// Pause between items of an import batch, in milliseconds.
    #[serde(default = "default_import_item_pause")]
    pub import_item_pause_ms: u64,
}

impl Default for LibraryPreferences {
    fn default() -> Self {
        Self {
            default_auto_delete: false,
            default_auto_delete_days: default_auto_delete_days(),
            import_item_pause_ms: default_import_item_pause(),
        }
    }
}

const fn default_auto_delete_days() -> i64 {
    FALLBACK_AUTO_DELETE_DAYS
}
const fn default_import_item_pause() -> u64 {
    200
}

impl LibraryPreferences {
    /// Configured auto-delete lifetime in days; non-positive values fall
    /// back to [`FALLBACK_AUTO_DELETE_DAYS`].
    #[must_use]
    pub const fn effective_auto_delete_days(&self) -> i64 {
        if self.default_auto_delete_days > 0 {
            self.default_auto_delete_days
        } else {
            FALLBACK_AUTO_DELETE_DAYS
        }
    }

    /// Expiration date a new app added at `now` should receive, if any.
    ///
    /// `None` when auto-delete is off, or when the configured lifetime is
    /// so large the date is not representable.
    #[must_use]
    pub fn default_expiration_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.default_auto_delete {
            return None;
        }
        let lifetime = TimeDelta::try_days(self.effective_auto_delete_days())?;
        now.checked_add_signed(lifetime)
    }

    #[must_use]
    pub const fn import_item_pause(&self) -> Duration {
        Duration::from_millis(self.import_item_pause_ms)
    }
}

// ── File I/O ───────────────────────────────────────────────────────

const PREFERENCES_FILE: &str = "preferences.json";

impl LibraryPreferences {
    /// Load preferences from `{data_dir}/preferences.json`.
    ///
    /// Returns [`Default::default()`] when the file is missing or
    /// contains invalid JSON.
    #[must_use]
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(PREFERENCES_FILE);
        fs::read_to_string(&path).map_or_else(
            |_| Self::default(),
            |contents| {
                serde_json::from_str(&contents).unwrap_or_else(|e| {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable preferences");
                    Self::default()
                })
            },
        )
    }

    /// Persist preferences to `{data_dir}/preferences.json`.
    ///
    /// Writes to a `.tmp` sibling first, then renames over the target.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if the directory does not exist or the
    /// file system rejects the write/rename.
    pub fn save(&self, data_dir: &Path) -> std::io::Result<()> {
        let path = data_dir.join(PREFERENCES_FILE);
        let tmp = data_dir.join(".preferences.json.tmp");

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        fs::write(&tmp, &json)?;
        fs::rename(&tmp, &path)?;

        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn default_values_are_correct() {
        let prefs = LibraryPreferences::default();
        assert!(!prefs.default_auto_delete);
        assert_eq!(prefs.default_auto_delete_days, 7);
        assert_eq!(prefs.import_item_pause_ms, 200);
    }

    #[test]
    fn non_positive_days_fall_back_to_seven() {
        for days in [0, -3] {
            let prefs = LibraryPreferences {
                default_auto_delete_days: days,
                ..LibraryPreferences::default()
            };
            assert_eq!(prefs.effective_auto_delete_days(), 7);
        }
    }

    #[test]
    fn default_expiration_only_when_enabled() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let off = LibraryPreferences::default();
        assert_eq!(off.default_expiration_from(now), None);

        let on = LibraryPreferences {
            default_auto_delete: true,
            default_auto_delete_days: 14,
            ..LibraryPreferences::default()
        };
        assert_eq!(
            on.default_expiration_from(now),
            Some(Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn absurd_lifetime_yields_no_date() {
        let prefs = LibraryPreferences {
            default_auto_delete: true,
            default_auto_delete_days: i64::MAX,
            ..LibraryPreferences::default()
        };
        assert_eq!(prefs.default_expiration_from(Utc::now()), None);
    }

    #[test]
    fn load_returns_default_on_missing_file() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            LibraryPreferences::load(dir.path()),
            LibraryPreferences::default()
        );
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let prefs = LibraryPreferences {
            default_auto_delete: true,
            default_auto_delete_days: 30,
            import_item_pause_ms: 0,
        };

        prefs.save(dir.path()).unwrap();
        assert_eq!(LibraryPreferences::load(dir.path()), prefs);
        assert!(!dir.path().join(".preferences.json.tmp").exists());
    }

    #[test]
    fn load_recovers_from_corrupt_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(PREFERENCES_FILE), "{ nope").unwrap();
        assert_eq!(
            LibraryPreferences::load(dir.path()),
            LibraryPreferences::default()
        );
    }

    #[test]
    fn partial_json_fills_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(PREFERENCES_FILE),
            r#"{"defaultAutoDelete":true}"#,
        )
        .unwrap();

        let prefs = LibraryPreferences::load(dir.path());
        assert!(prefs.default_auto_delete);
        assert_eq!(prefs.default_auto_delete_days, 7);
        assert_eq!(prefs.import_item_pause_ms, 200);
    }

    #[test]
    fn serde_uses_camel_case() {
        let json = serde_json::to_string(&LibraryPreferences::default()).unwrap();
        assert!(json.contains("defaultAutoDeleteDays"));
        assert!(json.contains("importItemPauseMs"));
        assert!(!json.contains("default_auto_delete"));
    }
}
