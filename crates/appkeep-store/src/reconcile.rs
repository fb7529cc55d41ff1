//! Reconciliation between the record store and the library directories.
//!
//! One pass removes every app row that either has no usable uuid
//! (malformed) or whose uuid directory is gone (orphan). Only rows are
//! touched; the filesystem is read, never written. A second pass with no
//! intervening changes deletes nothing.

use rusqlite::{params, Connection};
use serde::Serialize;

use crate::apps::{AppKey, AppKind};
use crate::db;
use crate::error::{ConsistencyError, StoreError};
use crate::paths::{self, LibraryPaths};

/// Rows removed by one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Rows deleted because their uuid was missing or unusable, per variant.
    pub malformed_removed: Vec<(AppKind, i64)>,
    /// Records deleted because their backing directory was missing.
    pub orphans_removed: Vec<AppKey>,
}

impl ReconcileReport {
    #[must_use]
    pub fn total_removed(&self) -> usize {
        self.malformed_removed
            .len()
            .saturating_add(self.orphans_removed.len())
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.malformed_removed.is_empty() && self.orphans_removed.is_empty()
    }
}

/// Classify one row. `None` means the row is consistent.
fn check_row(paths: &LibraryPaths, kind: AppKind, uuid: Option<&str>) -> Option<ConsistencyError> {
    let Some(uuid) = uuid else {
        return Some(ConsistencyError::MalformedRecord);
    };
    match paths.directory_for(&AppKey::new(kind, uuid)) {
        None => Some(ConsistencyError::MalformedRecord),
        Some(dir) if !paths::exists(&dir) => Some(ConsistencyError::OrphanRecord),
        Some(_) => None,
    }
}

/// Run one reconciliation pass over both app variants.
///
/// Malformed rows are deleted first, then orphans, all in one
/// transaction.
///
/// # Errors
///
/// Returns [`StoreError::Database`] or [`StoreError::Commit`] on failure.
pub fn reconcile(conn: &mut Connection, paths: &LibraryPaths) -> Result<ReconcileReport, StoreError> {
    let tx = conn
        .transaction()
        .map_err(|e| StoreError::Database(format!("failed to begin transaction: {e}")))?;
    let mut report = ReconcileReport::default();

    for kind in AppKind::ALL {
        let rows: Vec<(i64, Option<String>)> = {
            let mut stmt = tx
                .prepare(&format!("SELECT rowid, uuid FROM {} ORDER BY rowid", kind.table()))
                .map_err(|e| StoreError::Database(format!("failed to prepare scan: {e}")))?;
            let mapped = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(|e| StoreError::Database(format!("failed to scan apps: {e}")))?;
            mapped
                .collect::<Result<_, _>>()
                .map_err(|e| StoreError::Database(format!("failed to read app row: {e}")))?
        };

        let mut orphans = Vec::new();
        for (rowid, uuid) in rows {
            let uuid = uuid.filter(|u| !u.is_empty());
            match check_row(paths, kind, uuid.as_deref()) {
                Some(ConsistencyError::MalformedRecord) => {
                    delete_row(&tx, kind, rowid)?;
                    tracing::info!(kind = %kind, rowid, "removed malformed app record");
                    report.malformed_removed.push((kind, rowid));
                }
                Some(ConsistencyError::OrphanRecord) => orphans.push((rowid, uuid)),
                None => {}
            }
        }

        for (rowid, uuid) in orphans {
            delete_row(&tx, kind, rowid)?;
            let key = AppKey::new(kind, uuid.unwrap_or_default());
            tracing::info!(app = %key, "removed orphaned app record");
            report.orphans_removed.push(key);
        }
    }

    db::commit(tx)?;
    Ok(report)
}

fn delete_row(conn: &Connection, kind: AppKind, rowid: i64) -> Result<(), StoreError> {
    conn.execute(
        &format!("DELETE FROM {} WHERE rowid = ?1", kind.table()),
        params![rowid],
    )
    .map_err(|e| StoreError::Database(format!("failed to delete app row: {e}")))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
