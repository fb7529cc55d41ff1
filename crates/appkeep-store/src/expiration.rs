//! Expiration policy: per-app remaining lifetime, bulk expiration edits,
//! and the cleanup pass that evicts expired apps.
//!
//! Nothing here runs on a timer. The cleanup pass is invoked by the
//! caller at a trigger point (process start in the CLI).

use chrono::{DateTime, TimeDelta, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::apps::{self, AppKey, AppKind, AppRecord};
use crate::db::{self, to_db_timestamp};
use crate::error::{DirectoryWarning, StoreError};
use crate::paths::LibraryPaths;
use crate::reconcile::{self, ReconcileReport};

const MILLIS_PER_DAY: i64 = 86_400_000;

// ---------------------------------------------------------------------------
// Remaining lifetime
// ---------------------------------------------------------------------------

/// How urgently an expiration should be surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExpirationSeverity {
    /// Already expired.
    Neutral,
    /// One day or less.
    Severe,
    /// Three days or less.
    Warning,
    /// Seven days or less.
    Caution,
    Normal,
}

/// Remaining lifetime of one app at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpirationInfo {
    pub expiration_date: DateTime<Utc>,
    /// Whole days left, rounded toward negative infinity.
    pub days_remaining: i64,
    pub is_expired: bool,
}

impl ExpirationInfo {
    /// Compute the remaining lifetime of `expiration_date` as seen at `now`.
    #[must_use]
    pub fn at(expiration_date: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let millis = expiration_date.signed_duration_since(now).num_milliseconds();
        Self {
            expiration_date,
            days_remaining: millis.checked_div_euclid(MILLIS_PER_DAY).unwrap_or_default(),
            is_expired: expiration_date <= now,
        }
    }

    #[must_use]
    pub const fn severity(&self) -> ExpirationSeverity {
        match self.days_remaining {
            _ if self.is_expired => ExpirationSeverity::Neutral,
            ..=1 => ExpirationSeverity::Severe,
            ..=3 => ExpirationSeverity::Warning,
            ..=7 => ExpirationSeverity::Caution,
            _ => ExpirationSeverity::Normal,
        }
    }

    /// Whether callers should draw attention to this app.
    #[must_use]
    pub const fn should_show_badge(&self) -> bool {
        self.is_expired || self.days_remaining <= 7
    }

    /// Short human label: `Expired`, `Today`, `1 day`, `N days`.
    #[must_use]
    pub fn label(&self) -> String {
        match self.days_remaining {
            _ if self.is_expired => "Expired".to_string(),
            0 => "Today".to_string(),
            1 => "1 day".to_string(),
            n => format!("{n} days"),
        }
    }
}

/// Expiration info for an app, as of now. `None` when no date is set.
#[must_use]
pub fn get_expiration_info(app: &AppRecord) -> Option<ExpirationInfo> {
    expiration_info_at(app, Utc::now())
}

/// Expiration info for an app as of `now`.
#[must_use]
pub fn expiration_info_at(app: &AppRecord, now: DateTime<Utc>) -> Option<ExpirationInfo> {
    app.expiration_date
        .map(|date| ExpirationInfo::at(date, now))
}

// ---------------------------------------------------------------------------
// Bulk edits
// ---------------------------------------------------------------------------

/// Set every app of both variants to expire `days` days from now.
///
/// Applied in one transaction. Returns the date written and the number of
/// rows changed.
///
/// # Errors
///
/// - [`StoreError::InvalidInput`] if the resulting date is not representable
/// - [`StoreError::Database`] or [`StoreError::Commit`] on failure
pub fn set_expiration_for_all_apps(
    conn: &mut Connection,
    days: i64,
) -> Result<(DateTime<Utc>, usize), StoreError> {
    let date = TimeDelta::try_days(days)
        .and_then(|delta| db::now().checked_add_signed(delta))
        .ok_or_else(|| StoreError::InvalidInput(format!("{days} days is out of range")))?;
    let stored = to_db_timestamp(&date);

    let tx = conn
        .transaction()
        .map_err(|e| StoreError::Database(format!("failed to begin transaction: {e}")))?;
    let mut changed: usize = 0;
    for kind in AppKind::ALL {
        let n = tx
            .execute(
                &format!("UPDATE {} SET expiration_date = ?1", kind.table()),
                params![stored],
            )
            .map_err(|e| StoreError::Database(format!("failed to set expirations: {e}")))?;
        changed = changed.saturating_add(n);
    }
    db::commit(tx)?;

    tracing::info!(days, apps = changed, "expiration set for all apps");
    Ok((date, changed))
}

/// Clear the expiration date of every app that has one.
///
/// # Errors
///
/// Returns [`StoreError::Database`] or [`StoreError::Commit`] on failure.
pub fn clear_all_expirations(conn: &mut Connection) -> Result<usize, StoreError> {
    let tx = conn
        .transaction()
        .map_err(|e| StoreError::Database(format!("failed to begin transaction: {e}")))?;
    let mut changed: usize = 0;
    for kind in AppKind::ALL {
        let n = tx
            .execute(
                &format!(
                    "UPDATE {} SET expiration_date = NULL WHERE expiration_date IS NOT NULL",
                    kind.table()
                ),
                [],
            )
            .map_err(|e| StoreError::Database(format!("failed to clear expirations: {e}")))?;
        changed = changed.saturating_add(n);
    }
    db::commit(tx)?;

    tracing::info!(apps = changed, "expirations cleared");
    Ok(changed)
}

/// Counts for the expiration settings screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpirationStats {
    pub total_apps: u32,
    pub apps_with_expiration: u32,
}

/// Count apps, and apps with an expiration date, across both variants.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if a query fails.
pub fn expiration_stats(conn: &Connection) -> Result<ExpirationStats, StoreError> {
    let mut stats = ExpirationStats::default();
    for kind in AppKind::ALL {
        let (total, with_expiration): (u32, u32) = conn
            .query_row(
                &format!(
                    "SELECT COUNT(*), COUNT(expiration_date) FROM {}",
                    kind.table()
                ),
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| StoreError::Database(format!("failed to count apps: {e}")))?;
        stats.total_apps = stats.total_apps.saturating_add(total);
        stats.apps_with_expiration = stats.apps_with_expiration.saturating_add(with_expiration);
    }
    Ok(stats)
}

// ---------------------------------------------------------------------------
// Cleanup pass
// ---------------------------------------------------------------------------

/// Outcome of one cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    /// Apps evicted because their expiration date had passed.
    pub evicted: Vec<AppKey>,
    /// What the follow-up reconciliation removed.
    pub reconcile: ReconcileReport,
    /// Directories that could not be removed during eviction.
    pub warnings: Vec<DirectoryWarning>,
}

impl CleanupReport {
    #[must_use]
    pub fn total_removed(&self) -> usize {
        self.evicted.len().saturating_add(self.reconcile.total_removed())
    }
}

/// Apps of both variants whose expiration date is before `now`.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if a query fails.
pub fn expired_apps(conn: &Connection, now: DateTime<Utc>) -> Result<Vec<AppRecord>, StoreError> {
    let cutoff = to_db_timestamp(&now);
    let mut expired = Vec::new();
    for kind in AppKind::ALL {
        expired.extend(apps::query_apps(
            conn,
            kind,
            "AND expiration_date IS NOT NULL AND expiration_date < ?1",
            params![cutoff],
        )?);
    }
    Ok(expired)
}

/// Evict every expired app, then reconcile.
///
/// Each expired app goes through [`apps::delete_app`], so its directory is
/// removed best-effort and its record unconditionally.
///
/// # Errors
///
/// Returns [`StoreError::Database`] or [`StoreError::Commit`] if a record
/// change fails.
pub fn run_cleanup_pass(
    conn: &mut Connection,
    paths: &LibraryPaths,
) -> Result<CleanupReport, StoreError> {
    run_cleanup_pass_at(conn, paths, Utc::now())
}

/// [`run_cleanup_pass`] with an explicit notion of now.
///
/// # Errors
///
/// Same as [`run_cleanup_pass`].
pub fn run_cleanup_pass_at(
    conn: &mut Connection,
    paths: &LibraryPaths,
    now: DateTime<Utc>,
) -> Result<CleanupReport, StoreError> {
    let mut report = CleanupReport::default();

    for app in expired_apps(conn, now)? {
        let key = app.key();
        let outcome = apps::delete_app(conn, paths, &key)?;
        if outcome.deleted {
            tracing::info!(app = %key, expired_at = ?app.expiration_date, "evicted expired app");
            report.evicted.push(key);
        }
        report.warnings.extend(outcome.warning);
    }

    report.reconcile = reconcile::reconcile(conn, paths)?;
    Ok(report)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
