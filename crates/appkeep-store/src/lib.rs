//! `appkeep-store`: Application & certificate lifecycle store for appkeep.
//!
//! Persists installed apps, signing certificates and categories in `SQLite`,
//! keeps those records consistent with the on-disk library tree, evicts
//! expired apps, and imports credential/profile pairs.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod db;
pub mod error;
pub mod paths;
pub mod preferences;

pub mod apps;
pub mod categories;
pub mod certificates;

pub mod expiration;
pub mod reconcile;

pub mod import;

pub mod service;

pub use apps::{
    add_app, apps_in_category, delete_app, get_app, get_category, get_certificate, list_all_apps,
    list_apps, set_category, set_expiration_date, AppKey, AppKind, AppMetadata, AppRecord,
    AppVariant, DeleteOutcome, NewApp,
};
pub use categories::{
    add_category, delete_category, fetch_categories, fetch_categories_with_counts,
    get_category_record, update_category, CategoryListItem, CategoryRecord, CategoryUpdate,
    CATEGORY_COLORS, CATEGORY_ICONS, DEFAULT_CATEGORY_COLOR, DEFAULT_CATEGORY_ICON,
};
pub use certificates::{
    add_certificate, delete_certificate, find_by_fingerprint, get_certificate_record,
    list_certificates, CertificateRecord, CertificateSecrets, NewCertificate,
};
pub use db::StoreDb;
pub use error::{
    ConsistencyError, DirectoryWarning, ExtractionError, FsError, StoreError, ValidationError,
};
pub use expiration::{
    clear_all_expirations, expiration_stats, get_expiration_info, run_cleanup_pass,
    set_expiration_for_all_apps, CleanupReport, ExpirationInfo, ExpirationSeverity,
    ExpirationStats,
};
pub use import::{
    find_profile_near, AcceptAll, ArchiveImport, CancelFlag, DirectImport, ExpiryAdvisory,
    ExpiryPolicy, ImportPipeline, ImportResult, ImportSource, ImportToolkit, PreviewEntry,
    RejectExpired, RejectReason,
};
pub use paths::LibraryPaths;
pub use preferences::LibraryPreferences;
pub use reconcile::{reconcile, ReconcileReport};
pub use service::{Library, StoreHandle, StoreService};
