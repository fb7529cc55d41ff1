//! App records: signed and imported bundles sharing one field set.
//!
//! Each variant lives in its own table (`apps_signed`, `apps_imported`)
//! and its own directory root. A record and its directory are keyed by
//! the same uuid.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::categories::{self, CategoryRecord};
use crate::certificates::{self, CertificateRecord};
use crate::db::{from_db_timestamp, from_db_timestamp_opt, now, to_db_timestamp};
use crate::error::{is_unique_violation, DirectoryWarning, FsError, StoreError};
use crate::paths::{self, LibraryPaths};
use crate::preferences::LibraryPreferences;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which variant table / directory root an app belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AppKind {
    Signed,
    Imported,
}

impl AppKind {
    pub const ALL: [Self; 2] = [Self::Signed, Self::Imported];

    pub(crate) const fn table(self) -> &'static str {
        match self {
            Self::Signed => "apps_signed",
            Self::Imported => "apps_imported",
        }
    }

    /// Directory name of this variant's root under the library.
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Signed => "signed",
            Self::Imported => "imported",
        }
    }

    /// Column list for SELECTs; imported rows report a NULL certificate.
    const fn select_columns(self) -> &'static str {
        match self {
            Self::Signed => {
                "uuid, name, version, identifier, icon, source, size, installed_at, \
                 expiration_date, category_id, certificate_id"
            }
            Self::Imported => {
                "uuid, name, version, identifier, icon, source, size, installed_at, \
                 expiration_date, category_id, NULL"
            }
        }
    }
}

impl fmt::Display for AppKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for AppKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "signed" => Ok(Self::Signed),
            "imported" => Ok(Self::Imported),
            other => Err(StoreError::InvalidInput(format!(
                "unknown app kind {other:?} (expected signed or imported)"
            ))),
        }
    }
}

/// Identity of an app record: variant plus uuid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppKey {
    pub kind: AppKind,
    pub uuid: String,
}

impl AppKey {
    #[must_use]
    pub fn new(kind: AppKind, uuid: impl Into<String>) -> Self {
        Self {
            kind,
            uuid: uuid.into(),
        }
    }
}

impl fmt::Display for AppKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.uuid)
    }
}

/// Variant-specific payload of an app record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AppVariant {
    Signed {
        #[serde(rename = "certificateId")]
        certificate_id: Option<String>,
    },
    Imported,
}

impl AppVariant {
    #[must_use]
    pub const fn kind(&self) -> AppKind {
        match self {
            Self::Signed { .. } => AppKind::Signed,
            Self::Imported => AppKind::Imported,
        }
    }

    #[must_use]
    pub fn certificate_id(&self) -> Option<&str> {
        match self {
            Self::Signed { certificate_id } => certificate_id.as_deref(),
            Self::Imported => None,
        }
    }
}

/// Shared descriptive metadata of an app bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppMetadata {
    pub name: Option<String>,
    pub version: Option<String>,
    pub identifier: Option<String>,
    pub icon: Option<String>,
    pub source: Option<String>,
    pub size: Option<i64>,
}

/// A persisted app record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRecord {
    pub uuid: String,
    #[serde(flatten)]
    pub variant: AppVariant,
    #[serde(flatten)]
    pub metadata: AppMetadata,
    pub installed_at: DateTime<Utc>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub category_id: Option<String>,
}

impl AppRecord {
    #[must_use]
    pub const fn kind(&self) -> AppKind {
        self.variant.kind()
    }

    #[must_use]
    pub fn key(&self) -> AppKey {
        AppKey::new(self.kind(), self.uuid.clone())
    }

    /// Name for display; falls back to the bundle identifier, then uuid.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.metadata
            .name
            .as_deref()
            .or(self.metadata.identifier.as_deref())
            .unwrap_or(&self.uuid)
    }
}

/// Parameters for [`add_app`].
#[derive(Debug, Clone)]
pub struct NewApp {
    pub uuid: String,
    pub variant: AppVariant,
    pub metadata: AppMetadata,
}

/// What a deletion did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    /// Whether a record was removed.
    pub deleted: bool,
    /// Set when the backing directory could not be removed.
    pub warning: Option<DirectoryWarning>,
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Row as stored, before timestamp parsing.
struct RawApp {
    uuid: String,
    metadata: AppMetadata,
    installed_at: String,
    expiration_date: Option<String>,
    category_id: Option<String>,
    certificate_id: Option<String>,
}

fn read_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawApp> {
    Ok(RawApp {
        uuid: row.get(0)?,
        metadata: AppMetadata {
            name: row.get(1)?,
            version: row.get(2)?,
            identifier: row.get(3)?,
            icon: row.get(4)?,
            source: row.get(5)?,
            size: row.get(6)?,
        },
        installed_at: row.get(7)?,
        expiration_date: row.get(8)?,
        category_id: row.get(9)?,
        certificate_id: row.get(10)?,
    })
}

impl RawApp {
    fn into_record(self, kind: AppKind) -> Result<AppRecord, StoreError> {
        let variant = match kind {
            AppKind::Signed => AppVariant::Signed {
                certificate_id: self.certificate_id,
            },
            AppKind::Imported => AppVariant::Imported,
        };
        Ok(AppRecord {
            uuid: self.uuid,
            variant,
            metadata: self.metadata,
            installed_at: from_db_timestamp(&self.installed_at)?,
            expiration_date: from_db_timestamp_opt(self.expiration_date)?,
            category_id: self.category_id,
        })
    }
}

/// Run an app SELECT with a trailing clause and map every row.
pub(crate) fn query_apps(
    conn: &Connection,
    kind: AppKind,
    clause: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<AppRecord>, StoreError> {
    let sql = format!(
        "SELECT {} FROM {} WHERE uuid IS NOT NULL AND uuid != '' {clause}",
        kind.select_columns(),
        kind.table()
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| StoreError::Database(format!("failed to prepare app query: {e}")))?;

    let rows = stmt
        .query_map(params, read_raw)
        .map_err(|e| StoreError::Database(format!("failed to query apps: {e}")))?;

    let mut apps = Vec::new();
    for row in rows {
        let raw = row.map_err(|e| StoreError::Database(format!("failed to read app row: {e}")))?;
        apps.push(raw.into_record(kind)?);
    }
    Ok(apps)
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// Add an app record and make sure its bundle directory exists.
///
/// When `prefs.default_auto_delete` is set the record starts with an
/// expiration date of now plus the effective auto-delete lifetime;
/// otherwise it has none. If the insert fails, a bundle directory created
/// by this call is removed again.
///
/// # Errors
///
/// - [`StoreError::InvalidInput`] if the uuid is not a single path component
/// - [`StoreError::CertificateNotFound`] if a signed app names an unknown certificate
/// - [`StoreError::DuplicateUuid`] if the variant already has this uuid
/// - [`StoreError::Fs`] if the bundle directory cannot be created
/// - [`StoreError::Database`] if the INSERT fails
pub fn add_app(
    conn: &Connection,
    paths: &LibraryPaths,
    prefs: &LibraryPreferences,
    new: NewApp,
) -> Result<AppRecord, StoreError> {
    let kind = new.variant.kind();
    let key = AppKey::new(kind, new.uuid.clone());
    let bundle_dir = paths
        .bundle_directory_for(&key)
        .ok_or_else(|| StoreError::InvalidInput(format!("unusable app uuid {:?}", new.uuid)))?;

    if let Some(cert_id) = new.variant.certificate_id() {
        if !certificates::certificate_exists(conn, cert_id)? {
            return Err(StoreError::CertificateNotFound(cert_id.to_string()));
        }
    }

    let created_dir = !paths::exists(&bundle_dir);
    std::fs::create_dir_all(&bundle_dir).map_err(|source| FsError::DirectoryCreateFailed {
        path: bundle_dir.clone(),
        source,
    })?;

    let installed_at = now();
    let expiration_date = prefs.default_expiration_from(installed_at);

    let result = insert_app_row(conn, &new, installed_at, expiration_date);
    if let Err(err) = result {
        if created_dir {
            if let Some(dir) = paths.directory_for(&key) {
                let _ = paths::remove_best_effort(&dir);
            }
        }
        return Err(err);
    }

    tracing::info!(app = %key, expires = ?expiration_date, "app added");

    Ok(AppRecord {
        uuid: new.uuid,
        variant: new.variant,
        metadata: new.metadata,
        installed_at,
        expiration_date,
        category_id: None,
    })
}

fn insert_app_row(
    conn: &Connection,
    new: &NewApp,
    installed_at: DateTime<Utc>,
    expiration_date: Option<DateTime<Utc>>,
) -> Result<(), StoreError> {
    let m = &new.metadata;
    let installed = to_db_timestamp(&installed_at);
    let expires = expiration_date.as_ref().map(to_db_timestamp);

    let result = match &new.variant {
        AppVariant::Signed { certificate_id } => conn.execute(
            "INSERT INTO apps_signed (uuid, name, version, identifier, icon, source, size, \
             installed_at, expiration_date, category_id, certificate_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, ?10)",
            params![
                new.uuid,
                m.name,
                m.version,
                m.identifier,
                m.icon,
                m.source,
                m.size,
                installed,
                expires,
                certificate_id
            ],
        ),
        AppVariant::Imported => conn.execute(
            "INSERT INTO apps_imported (uuid, name, version, identifier, icon, source, size, \
             installed_at, expiration_date, category_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL)",
            params![
                new.uuid,
                m.name,
                m.version,
                m.identifier,
                m.icon,
                m.source,
                m.size,
                installed,
                expires
            ],
        ),
    };

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateUuid(new.uuid.clone())),
        Err(e) => Err(StoreError::Database(format!("failed to insert app: {e}"))),
    }
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// Look up one app. Absence is `Ok(None)`.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if the query fails.
pub fn get_app(conn: &Connection, key: &AppKey) -> Result<Option<AppRecord>, StoreError> {
    let sql = format!(
        "SELECT {} FROM {} WHERE uuid = ?1",
        key.kind.select_columns(),
        key.kind.table()
    );
    let raw = conn
        .query_row(&sql, params![key.uuid], read_raw)
        .optional()
        .map_err(|e| StoreError::Database(format!("failed to fetch app: {e}")))?;
    raw.map(|r| r.into_record(key.kind)).transpose()
}

/// All well-formed apps of one variant, newest install first.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if the query fails.
pub fn list_apps(conn: &Connection, kind: AppKind) -> Result<Vec<AppRecord>, StoreError> {
    query_apps(conn, kind, "ORDER BY installed_at DESC, rowid DESC", [])
}

/// All well-formed apps of both variants, signed first.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if a query fails.
pub fn list_all_apps(conn: &Connection) -> Result<Vec<AppRecord>, StoreError> {
    let mut apps = Vec::new();
    for kind in AppKind::ALL {
        apps.extend(list_apps(conn, kind)?);
    }
    Ok(apps)
}

/// Apps of both variants filed under `category_id`, sorted by name.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if a query fails.
pub fn apps_in_category(conn: &Connection, category_id: &str) -> Result<Vec<AppRecord>, StoreError> {
    let mut apps = Vec::new();
    for kind in AppKind::ALL {
        apps.extend(query_apps(conn, kind, "AND category_id = ?1", params![category_id])?);
    }
    apps.sort_by(|a, b| {
        a.metadata
            .name
            .as_deref()
            .unwrap_or_default()
            .cmp(b.metadata.name.as_deref().unwrap_or_default())
    });
    Ok(apps)
}

/// The category an app is filed under, if any.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if a query fails.
pub fn get_category(conn: &Connection, key: &AppKey) -> Result<Option<CategoryRecord>, StoreError> {
    let Some(app) = get_app(conn, key)? else {
        return Ok(None);
    };
    match app.category_id {
        Some(id) => categories::get_category_record(conn, &id),
        None => Ok(None),
    }
}

/// The certificate a signed app was signed with, if any.
///
/// Imported apps never reference a certificate.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if a query fails.
pub fn get_certificate(
    conn: &Connection,
    key: &AppKey,
) -> Result<Option<CertificateRecord>, StoreError> {
    let Some(app) = get_app(conn, key)? else {
        return Ok(None);
    };
    match app.variant.certificate_id() {
        Some(id) => certificates::get_certificate_record(conn, id),
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

/// File an app under a category, or clear it with `None`.
///
/// Returns `false` when the app does not exist.
///
/// # Errors
///
/// - [`StoreError::CategoryNotFound`] if `category_id` names no category
/// - [`StoreError::Database`] if the UPDATE fails
pub fn set_category(
    conn: &Connection,
    key: &AppKey,
    category_id: Option<&str>,
) -> Result<bool, StoreError> {
    if let Some(id) = category_id {
        if categories::get_category_record(conn, id)?.is_none() {
            return Err(StoreError::CategoryNotFound(id.to_string()));
        }
    }
    let updated = conn
        .execute(
            &format!("UPDATE {} SET category_id = ?1 WHERE uuid = ?2", key.kind.table()),
            params![category_id, key.uuid],
        )
        .map_err(|e| StoreError::Database(format!("failed to set category: {e}")))?;
    Ok(updated > 0)
}

/// Set or clear one app's expiration date.
///
/// Returns `false` when the app does not exist.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if the UPDATE fails.
pub fn set_expiration_date(
    conn: &Connection,
    key: &AppKey,
    expiration_date: Option<DateTime<Utc>>,
) -> Result<bool, StoreError> {
    let updated = conn
        .execute(
            &format!(
                "UPDATE {} SET expiration_date = ?1 WHERE uuid = ?2",
                key.kind.table()
            ),
            params![expiration_date.as_ref().map(to_db_timestamp), key.uuid],
        )
        .map_err(|e| StoreError::Database(format!("failed to set expiration date: {e}")))?;
    Ok(updated > 0)
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

/// Delete an app: its backing directory first, then its record.
///
/// Directory removal is best-effort. A failure is logged and returned as
/// a warning; the record is removed regardless.
///
/// # Errors
///
/// Returns [`StoreError::Database`] only if the record DELETE fails.
pub fn delete_app(
    conn: &Connection,
    paths: &LibraryPaths,
    key: &AppKey,
) -> Result<DeleteOutcome, StoreError> {
    let warning = paths
        .directory_for(key)
        .and_then(|dir| paths::remove_best_effort(&dir));

    let deleted = conn
        .execute(
            &format!("DELETE FROM {} WHERE uuid = ?1", key.kind.table()),
            params![key.uuid],
        )
        .map_err(|e| StoreError::Database(format!("failed to delete app: {e}")))?;

    if deleted > 0 {
        tracing::info!(app = %key, "app deleted");
    }

    Ok(DeleteOutcome {
        deleted: deleted > 0,
        warning,
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreDb;
    use chrono::TimeDelta;
    use tempfile::TempDir;

    fn setup() -> (TempDir, StoreDb, LibraryPaths) {
        let dir = TempDir::new().unwrap();
        let paths = LibraryPaths::new(dir.path());
        paths.ensure_layout().unwrap();
        (dir, StoreDb::open_in_memory().unwrap(), paths)
    }

    fn imported(uuid: &str, name: &str) -> NewApp {
        NewApp {
            uuid: uuid.into(),
            variant: AppVariant::Imported,
            metadata: AppMetadata {
                name: Some(name.into()),
                identifier: Some(format!("com.example.{name}")),
                ..AppMetadata::default()
            },
        }
    }

    #[test]
    fn add_creates_record_and_bundle_directory() {
        let (_dir, db, paths) = setup();
        let app = add_app(
            db.connection(),
            &paths,
            &LibraryPreferences::default(),
            imported("a1", "Alpha"),
        )
        .unwrap();

        assert_eq!(app.kind(), AppKind::Imported);
        assert!(app.expiration_date.is_none());
        assert!(paths.bundle_directory_for(&app.key()).unwrap().is_dir());
        assert_eq!(get_app(db.connection(), &app.key()).unwrap(), Some(app));
    }

    #[test]
    fn add_applies_default_expiration_when_enabled() {
        let (_dir, db, paths) = setup();
        let prefs = LibraryPreferences {
            default_auto_delete: true,
            default_auto_delete_days: 3,
            ..LibraryPreferences::default()
        };
        let app = add_app(db.connection(), &paths, &prefs, imported("a1", "Alpha")).unwrap();

        let expected = app.installed_at + TimeDelta::days(3);
        assert_eq!(app.expiration_date, Some(expected));
    }

    #[test]
    fn duplicate_uuid_within_variant_is_rejected() {
        let (_dir, db, paths) = setup();
        let prefs = LibraryPreferences::default();
        add_app(db.connection(), &paths, &prefs, imported("dup", "One")).unwrap();

        let err = add_app(db.connection(), &paths, &prefs, imported("dup", "Two")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateUuid(u) if u == "dup"));
        // The first app's directory survives the failed insert.
        assert!(paths
            .directory_for(&AppKey::new(AppKind::Imported, "dup"))
            .unwrap()
            .is_dir());
    }

    #[test]
    fn same_uuid_in_both_variants_is_allowed() {
        let (_dir, db, paths) = setup();
        let prefs = LibraryPreferences::default();
        add_app(db.connection(), &paths, &prefs, imported("same", "Imp")).unwrap();
        let signed = NewApp {
            uuid: "same".into(),
            variant: AppVariant::Signed {
                certificate_id: None,
            },
            metadata: AppMetadata::default(),
        };
        add_app(db.connection(), &paths, &prefs, signed).unwrap();
        assert_eq!(list_all_apps(db.connection()).unwrap().len(), 2);
    }

    #[test]
    fn unknown_certificate_is_rejected_without_leaving_a_directory() {
        let (_dir, db, paths) = setup();
        let signed = NewApp {
            uuid: "s1".into(),
            variant: AppVariant::Signed {
                certificate_id: Some("nope".into()),
            },
            metadata: AppMetadata::default(),
        };
        let err = add_app(db.connection(), &paths, &LibraryPreferences::default(), signed)
            .unwrap_err();
        assert!(matches!(err, StoreError::CertificateNotFound(_)));
        assert!(!paths.kind_root(AppKind::Signed).join("s1").exists());
    }

    #[test]
    fn invalid_uuid_is_rejected() {
        let (_dir, db, paths) = setup();
        let err = add_app(
            db.connection(),
            &paths,
            &LibraryPreferences::default(),
            imported("../escape", "Bad"),
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }

    #[test]
    fn missing_app_lookups_are_none() {
        let (_dir, db, _paths) = setup();
        let key = AppKey::new(AppKind::Signed, "ghost");
        assert!(get_app(db.connection(), &key).unwrap().is_none());
        assert!(get_category(db.connection(), &key).unwrap().is_none());
        assert!(get_certificate(db.connection(), &key).unwrap().is_none());
        assert!(!set_expiration_date(db.connection(), &key, None).unwrap());
    }

    #[test]
    fn delete_removes_directory_and_record() {
        let (_dir, db, paths) = setup();
        let app = add_app(
            db.connection(),
            &paths,
            &LibraryPreferences::default(),
            imported("a1", "Alpha"),
        )
        .unwrap();

        let outcome = delete_app(db.connection(), &paths, &app.key()).unwrap();
        assert!(outcome.deleted);
        assert!(outcome.warning.is_none());
        assert!(!paths.directory_for(&app.key()).unwrap().exists());
        assert!(get_app(db.connection(), &app.key()).unwrap().is_none());
    }

    #[test]
    fn delete_of_missing_app_is_not_an_error() {
        let (_dir, db, paths) = setup();
        let outcome = delete_app(db.connection(), &paths, &AppKey::new(AppKind::Signed, "x")).unwrap();
        assert_eq!(outcome, DeleteOutcome::default());
    }

    #[test]
    fn list_orders_newest_first() {
        let (_dir, db, paths) = setup();
        let prefs = LibraryPreferences::default();
        add_app(db.connection(), &paths, &prefs, imported("old", "Old")).unwrap();
        add_app(db.connection(), &paths, &prefs, imported("new", "New")).unwrap();
        db.connection()
            .execute(
                "UPDATE apps_imported SET installed_at = '2020-01-01T00:00:00Z' WHERE uuid = 'old'",
                [],
            )
            .unwrap();

        let uuids: Vec<_> = list_apps(db.connection(), AppKind::Imported)
            .unwrap()
            .into_iter()
            .map(|a| a.uuid)
            .collect();
        assert_eq!(uuids, vec!["new", "old"]);
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("Signed".parse::<AppKind>().unwrap(), AppKind::Signed);
        assert_eq!("imported".parse::<AppKind>().unwrap(), AppKind::Imported);
        assert!("other".parse::<AppKind>().is_err());
    }

    #[test]
    fn record_serializes_flat_camel_case() {
        let (_dir, db, paths) = setup();
        let app = add_app(
            db.connection(),
            &paths,
            &LibraryPreferences::default(),
            imported("a1", "Alpha"),
        )
        .unwrap();
        let json = serde_json::to_value(&app).unwrap();
        assert_eq!(json["kind"], "imported");
        assert_eq!(json["name"], "Alpha");
        assert!(json.get("installedAt").is_some());
    }
}
