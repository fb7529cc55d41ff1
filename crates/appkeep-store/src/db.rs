//! `SQLite` connection, migration runner, and shared row helpers.
//!
//! All record I/O flows through [`StoreDb`]. Timestamps are stored as
//! fixed-width UTC text (`YYYY-MM-DDTHH:MM:SSZ`) so that SQL string
//! comparison agrees with chronological order.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::Connection;

use crate::error::StoreError;

// ---------------------------------------------------------------------------
// Embedded migrations
// ---------------------------------------------------------------------------

/// Forward-only SQL migrations, embedded at compile time.
/// Index 0 → version 1, index 1 → version 2, etc.
const MIGRATIONS: &[&str] = &[
    include_str!("../migrations/001_initial_schema.sql"),
    include_str!("../migrations/002_add_fingerprint_and_indexes.sql"),
];

/// Storage format for timestamps.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

// ---------------------------------------------------------------------------
// StoreDb
// ---------------------------------------------------------------------------

/// Handle to an open, migrated library database.
pub struct StoreDb {
    conn: Connection,
}

impl fmt::Debug for StoreDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreDb")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl StoreDb {
    /// Open (or create) the library database at `path`.
    ///
    /// Enables WAL journal mode and foreign key enforcement, then runs any
    /// pending migrations.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Database`] if the file cannot be opened.
    /// - [`StoreError::Migration`] if a migration fails.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::init(conn)
    }

    /// Open a private in-memory database with the full schema.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let mut db = Self { conn };
        db.run_migrations()?;
        Ok(db)
    }

    /// Returns a reference to the underlying [`rusqlite::Connection`].
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Mutable access for operations that open a transaction.
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Returns the current schema version (`PRAGMA user_version`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the pragma query fails.
    pub fn schema_version(&self) -> Result<i32, StoreError> {
        let v: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;
        Ok(v)
    }

    // -----------------------------------------------------------------------
    // Migration runner
    // -----------------------------------------------------------------------

    /// Apply all pending migrations sequentially.
    ///
    /// Each migration is wrapped in a transaction. The `user_version` pragma
    /// is bumped atomically on commit.
    fn run_migrations(&mut self) -> Result<(), StoreError> {
        let current = self.schema_version()?;

        for (idx, sql) in MIGRATIONS.iter().enumerate() {
            let version = idx
                .checked_add(1)
                .and_then(|v| i32::try_from(v).ok())
                .ok_or_else(|| StoreError::Migration("migration index overflow".into()))?;

            if version <= current {
                continue;
            }

            let tx = self.conn.transaction().map_err(|e| {
                StoreError::Migration(format!(
                    "failed to start transaction for migration {version}: {e}"
                ))
            })?;

            tx.execute_batch(sql)
                .map_err(|e| StoreError::Migration(format!("migration {version} failed: {e}")))?;

            tx.pragma_update(None, "user_version", version)
                .map_err(|e| {
                    StoreError::Migration(format!(
                        "failed to update user_version to {version}: {e}"
                    ))
                })?;

            tx.commit().map_err(|e| {
                StoreError::Migration(format!("failed to commit migration {version}: {e}"))
            })?;
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Commit a transaction, mapping failure to [`StoreError::Commit`].
pub(crate) fn commit(tx: rusqlite::Transaction<'_>) -> Result<(), StoreError> {
    tx.commit().map_err(|e| StoreError::Commit(e.to_string()))
}

/// Generate a fresh record identifier.
pub(crate) fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current time truncated to whole seconds (the storage precision).
#[must_use]
pub fn now() -> DateTime<Utc> {
    truncate_to_seconds(Utc::now())
}

fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(dt.timestamp(), 0).unwrap_or(dt)
}

/// Format a timestamp for storage.
#[must_use]
pub fn to_db_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp.
///
/// Accepts the storage format and, leniently, any RFC 3339 timestamp.
///
/// # Errors
///
/// Returns [`StoreError::Database`] for unparseable text.
pub fn from_db_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)))
        .map_err(|e| StoreError::Database(format!("invalid timestamp {s:?}: {e}")))
}

/// Parse an optional stored timestamp.
pub(crate) fn from_db_timestamp_opt(s: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    s.as_deref().map(from_db_timestamp).transpose()
}

/// Render a timestamp for display (RFC 3339, second precision).
#[must_use]
pub fn display_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn in_memory_db_is_fully_migrated() {
        let db = StoreDb::open_in_memory().unwrap();
        let expected = i32::try_from(MIGRATIONS.len()).unwrap();
        assert_eq!(db.schema_version().unwrap(), expected);
    }

    #[test]
    fn reopening_file_db_does_not_rerun_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.db");
        {
            let _db = StoreDb::open(&path).unwrap();
        }
        let db = StoreDb::open(&path).unwrap();
        assert_eq!(db.schema_version().unwrap(), 2);
    }

    #[test]
    fn timestamp_roundtrip_is_second_precise() {
        let dt = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        let s = to_db_timestamp(&dt);
        assert_eq!(s, "2026-03-04T05:06:07Z");
        assert_eq!(from_db_timestamp(&s).unwrap(), dt);
    }

    #[test]
    fn stored_timestamps_sort_chronologically() {
        let earlier = Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert!(to_db_timestamp(&earlier) < to_db_timestamp(&later));
    }

    #[test]
    fn rfc3339_is_accepted_on_read() {
        let dt = from_db_timestamp("2026-03-04T05:06:07+02:00").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2026, 3, 4, 3, 6, 7).unwrap());
    }

    #[test]
    fn garbage_timestamp_is_an_error() {
        assert!(from_db_timestamp("yesterday").is_err());
    }

    #[test]
    fn now_has_no_subsecond_component() {
        assert_eq!(now().timestamp_subsec_nanos(), 0);
    }
}
