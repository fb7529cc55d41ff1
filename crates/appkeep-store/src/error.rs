//! Store error types for `appkeep-store`.
//!
//! [`StoreError`] is what fallible store operations return. The smaller
//! enums below name the failure classes of the import pipeline and the
//! filesystem gateway; most of them are reported per item or as warnings
//! rather than propagated.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use appkeep_credentials::CredentialError;

/// Errors produced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` error.
    #[error("database error: {0}")]
    Database(String),

    /// Pending mutations could not be flushed to durable storage.
    #[error("commit failed: {0}")]
    Commit(String),

    /// Migration error during schema upgrade.
    #[error("migration error: {0}")]
    Migration(String),

    /// Caller supplied an unusable value (empty uuid, path separator, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A record with this uuid already exists in the target table.
    #[error("duplicate uuid: {0}")]
    DuplicateUuid(String),

    /// Category not found by uuid.
    #[error("category not found: {0}")]
    CategoryNotFound(String),

    /// Certificate not found by uuid.
    #[error("certificate not found: {0}")]
    CertificateNotFound(String),

    /// Filesystem gateway failure.
    #[error(transparent)]
    Fs(#[from] FsError),

    /// Credential primitive failure (delegated from appkeep-credentials).
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// I/O error from the filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The store worker has shut down and no longer accepts requests.
    #[error("store worker stopped")]
    WorkerStopped,
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Whether `err` is a UNIQUE / PRIMARY KEY violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(ffi_err, _)
            if ffi_err.code == rusqlite::ffi::ErrorCode::ConstraintViolation
                && (ffi_err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || ffi_err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
    )
}

/// Filesystem gateway failures.
#[derive(Debug, Error)]
pub enum FsError {
    /// A managed directory could not be created.
    #[error("cannot create directory {path}: {source}")]
    DirectoryCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Bytes could not be written into a managed directory.
    #[error("cannot write {path}: {source}")]
    CopyFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A managed directory could not be removed.
    #[error("cannot delete {path}: {source}")]
    DeleteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FsError {
    /// The path the failed operation targeted.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::DirectoryCreateFailed { path, .. }
            | Self::CopyFailed { path, .. }
            | Self::DeleteFailed { path, .. } => path,
        }
    }
}

/// Per-item validation failures in the import pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidationError {
    #[error("incorrect credential password")]
    BadPassword,
    #[error("missing credential file")]
    MissingCredential,
    #[error("missing provisioning profile")]
    MissingProfile,
}

/// Archive-level failures in the import pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExtractionError {
    #[error("archive is corrupt or unreadable")]
    CorruptArchive,
    #[error("archive contains no credential or profile files")]
    NoFilesFound,
}

/// Inconsistencies between the record store and the filesystem.
///
/// These are healed by the reconciler and only ever reported, never
/// returned as failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConsistencyError {
    #[error("record's backing directory is missing")]
    OrphanRecord,
    #[error("record has no uuid")]
    MalformedRecord,
}

/// A swallowed filesystem failure, surfaced for auditing.
///
/// Deletions always remove the record; when the backing directory could
/// not be removed the failure is logged and reported through this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryWarning {
    pub path: PathBuf,
    pub error: String,
}

impl From<&FsError> for DirectoryWarning {
    fn from(err: &FsError) -> Self {
        Self {
            path: err.path().to_path_buf(),
            error: err.to_string(),
        }
    }
}
