//! Archive extraction for bundled credential imports.
//!
//! Extracts every file entry into a caller-owned destination directory and
//! returns the written paths in archive order. That order is the
//! "discovery order" the import pipeline pairs files by.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use zip::ZipArchive;

use crate::error::CredentialError;

/// Directory macOS adds to archives for resource forks.
const RESOURCE_FORK_DIR: &str = "__MACOSX";

/// Extracts an archive into a directory.
pub trait ArchiveExtractor: Send + Sync {
    /// Extract `archive` into `dest`, returning extracted file paths in
    /// discovery order.
    ///
    /// # Errors
    ///
    /// - [`CredentialError::CorruptArchive`] if the archive is unreadable or
    ///   an entry escapes `dest`
    /// - [`CredentialError::Io`] if the archive cannot be opened or a file
    ///   cannot be written
    fn extract(&self, archive: &Path, dest: &Path) -> Result<Vec<PathBuf>, CredentialError>;
}

/// Production extractor for `.zip` archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipExtractor;

impl ArchiveExtractor for ZipExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<Vec<PathBuf>, CredentialError> {
        let file = File::open(archive)?;
        let mut zip = ZipArchive::new(file)
            .map_err(|e| CredentialError::CorruptArchive(format!("cannot read archive: {e}")))?;

        let mut extracted = Vec::new();
        for index in 0..zip.len() {
            let mut entry = zip.by_index(index).map_err(|e| {
                CredentialError::CorruptArchive(format!("cannot read entry {index}: {e}"))
            })?;

            let Some(relative) = entry.enclosed_name() else {
                return Err(CredentialError::CorruptArchive(format!(
                    "entry {} escapes the extraction directory",
                    entry.name()
                )));
            };
            if is_resource_fork(&relative) {
                continue;
            }

            let out = dest.join(&relative);
            if entry.is_dir() {
                fs::create_dir_all(&out)?;
                continue;
            }
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent)?;
            }

            let mut target = File::create(&out)?;
            io::copy(&mut entry, &mut target).map_err(|e| {
                CredentialError::CorruptArchive(format!("cannot inflate {}: {e}", relative.display()))
            })?;
            extracted.push(out);
        }

        Ok(extracted)
    }
}

fn is_resource_fork(relative: &Path) -> bool {
    matches!(
        relative.components().next(),
        Some(Component::Normal(first)) if first == RESOURCE_FORK_DIR
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_fork_detection() {
        assert!(is_resource_fork(Path::new("__MACOSX/._cert.p12")));
        assert!(!is_resource_fork(Path::new("certs/__MACOSX")));
        assert!(!is_resource_fork(Path::new("cert.p12")));
    }

    #[test]
    fn non_zip_input_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.zip");
        fs::write(&bogus, b"this is not a zip file").unwrap();

        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        assert!(matches!(
            ZipExtractor.extract(&bogus, &out),
            Err(CredentialError::CorruptArchive(_))
        ));
    }

    #[test]
    fn missing_archive_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ZipExtractor.extract(&dir.path().join("absent.zip"), dir.path()),
            Err(CredentialError::Io(_))
        ));
    }
}
