//! Filesystem gateway: maps records to directories under the library root.
//!
//! Layout:
//!
//! ```text
//! {root}/library.db
//! {root}/signed/{uuid}/app/**
//! {root}/imported/{uuid}/app/**
//! {root}/certificates/{uuid}/credential.p12
//! {root}/certificates/{uuid}/profile.mobileprovision
//! ```
//!
//! Paths are derived from (variant, uuid) alone; lookups never enumerate.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::apps::{AppKey, AppKind};
use crate::error::{DirectoryWarning, FsError};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const DATABASE_FILE: &str = "library.db";
const CERTIFICATES_DIR: &str = "certificates";
const BUNDLE_DIR: &str = "app";

/// File name of the stored credential inside a certificate directory.
pub const CREDENTIAL_FILE: &str = "credential.p12";

/// File name of the stored profile inside a certificate directory.
pub const PROFILE_FILE: &str = "profile.mobileprovision";

// ---------------------------------------------------------------------------
// LibraryPaths
// ---------------------------------------------------------------------------

/// Resolves record identities to on-disk locations under one root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryPaths {
    root: PathBuf,
}

impl LibraryPaths {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_FILE)
    }

    /// Root directory for one app variant.
    #[must_use]
    pub fn kind_root(&self, kind: AppKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    #[must_use]
    pub fn certificates_root(&self) -> PathBuf {
        self.root.join(CERTIFICATES_DIR)
    }

    /// Create the variant and certificate roots if missing.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::DirectoryCreateFailed`] for the first root that
    /// cannot be created.
    pub fn ensure_layout(&self) -> Result<(), FsError> {
        for dir in [
            self.kind_root(AppKind::Signed),
            self.kind_root(AppKind::Imported),
            self.certificates_root(),
        ] {
            fs::create_dir_all(&dir)
                .map_err(|source| FsError::DirectoryCreateFailed { path: dir, source })?;
        }
        Ok(())
    }

    /// The uuid directory backing an app record.
    ///
    /// `None` when the uuid is empty or not a single path component; such
    /// a record has no backing directory.
    #[must_use]
    pub fn directory_for(&self, key: &AppKey) -> Option<PathBuf> {
        is_safe_component(&key.uuid).then(|| self.kind_root(key.kind).join(&key.uuid))
    }

    /// The bundle content directory (`{uuid}/app`) of an app record.
    #[must_use]
    pub fn bundle_directory_for(&self, key: &AppKey) -> Option<PathBuf> {
        self.directory_for(key).map(|dir| dir.join(BUNDLE_DIR))
    }

    /// The directory holding an imported credential pair.
    #[must_use]
    pub fn certificate_directory_for(&self, uuid: &str) -> Option<PathBuf> {
        is_safe_component(uuid).then(|| self.certificates_root().join(uuid))
    }

    /// Write a credential pair into `certificates/{uuid}/`.
    ///
    /// On failure nothing is left behind: a partially written directory is
    /// removed before returning.
    ///
    /// # Errors
    ///
    /// - [`FsError::DirectoryCreateFailed`] if the directory cannot be created
    /// - [`FsError::CopyFailed`] if either file cannot be written
    pub fn write_certificate_files(
        &self,
        uuid: &str,
        credential: &[u8],
        profile: &[u8],
    ) -> Result<PathBuf, FsError> {
        let dir = self
            .certificate_directory_for(uuid)
            .ok_or_else(|| FsError::DirectoryCreateFailed {
                path: self.certificates_root().join(uuid),
                source: io::Error::new(io::ErrorKind::InvalidInput, "invalid uuid"),
            })?;

        fs::create_dir_all(&dir).map_err(|source| FsError::DirectoryCreateFailed {
            path: dir.clone(),
            source,
        })?;

        for (name, bytes) in [(CREDENTIAL_FILE, credential), (PROFILE_FILE, profile)] {
            let path = dir.join(name);
            if let Err(source) = fs::write(&path, bytes) {
                let _ = remove_recursive(&dir);
                return Err(FsError::CopyFailed { path, source });
            }
        }

        Ok(dir)
    }
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Whether `path` exists on disk.
#[must_use]
pub fn exists(path: &Path) -> bool {
    path.exists()
}

/// Recursively delete `path`. A path that is already gone counts as removed.
///
/// # Errors
///
/// Returns [`FsError::DeleteFailed`] if the removal fails for any reason
/// other than the path not existing.
pub fn remove_recursive(path: &Path) -> Result<(), FsError> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(FsError::DeleteFailed {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Delete `path`, logging and returning a warning instead of failing.
pub(crate) fn remove_best_effort(path: &Path) -> Option<DirectoryWarning> {
    match remove_recursive(path) {
        Ok(()) => None,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "backing directory not removed; record deleted anyway"
            );
            Some(DirectoryWarning::from(&err))
        }
    }
}

/// A uuid usable as one directory name: non-empty, no separators, not `.`/`..`.
pub(crate) fn is_safe_component(s: &str) -> bool {
    !s.is_empty()
        && s != "."
        && s != ".."
        && !s.contains(['/', '\\', '\0'])
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn key(kind: AppKind, uuid: &str) -> AppKey {
        AppKey {
            kind,
            uuid: uuid.to_string(),
        }
    }

    #[test]
    fn variants_have_disjoint_roots() {
        let paths = LibraryPaths::new("/lib");
        assert_eq!(
            paths.directory_for(&key(AppKind::Signed, "abc")).unwrap(),
            PathBuf::from("/lib/signed/abc")
        );
        assert_eq!(
            paths.directory_for(&key(AppKind::Imported, "abc")).unwrap(),
            PathBuf::from("/lib/imported/abc")
        );
        assert_eq!(
            paths.bundle_directory_for(&key(AppKind::Signed, "abc")).unwrap(),
            PathBuf::from("/lib/signed/abc/app")
        );
    }

    #[test]
    fn unsafe_uuids_have_no_directory() {
        let paths = LibraryPaths::new("/lib");
        for bad in ["", ".", "..", "a/b", "..\\x"] {
            assert!(paths.directory_for(&key(AppKind::Signed, bad)).is_none(), "{bad:?}");
            assert!(paths.certificate_directory_for(bad).is_none(), "{bad:?}");
        }
    }

    #[test]
    fn remove_recursive_tolerates_missing_paths() {
        let dir = tempfile::tempdir().unwrap();
        assert!(remove_recursive(&dir.path().join("never-existed")).is_ok());
    }

    #[test]
    fn remove_recursive_deletes_trees() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("f"), b"x").unwrap();

        remove_recursive(&dir.path().join("a")).unwrap();
        assert!(!exists(&dir.path().join("a")));
    }

    #[test]
    fn certificate_files_are_written_under_uuid() {
        let dir = tempfile::tempdir().unwrap();
        let paths = LibraryPaths::new(dir.path());
        paths.ensure_layout().unwrap();

        let written = paths
            .write_certificate_files("cert-1", b"p12", b"profile")
            .unwrap();
        assert_eq!(written, dir.path().join("certificates/cert-1"));
        assert_eq!(fs::read(written.join(CREDENTIAL_FILE)).unwrap(), b"p12");
        assert_eq!(fs::read(written.join(PROFILE_FILE)).unwrap(), b"profile");
    }
}
