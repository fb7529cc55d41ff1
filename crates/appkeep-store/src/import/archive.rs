//! Archive intake: extract, classify, pair positionally, apply the hint.
//!
//! Credential and profile files are paired by the order the extractor
//! reports them: the k-th credential goes with the k-th profile. File
//! names play no part. Surplus files on either side become single-sided
//! items that validation later rejects.

use std::fs;
use std::path::{Path, PathBuf};

use zeroize::Zeroizing;

use appkeep_credentials::{ArchiveExtractor, CredentialError};

use super::{classify, FileClass, ImportItem, ItemFile, ItemState, RejectReason};
use crate::error::ExtractionError;

/// File name (case-insensitive) of the password hint.
pub const HINT_FILE_NAME: &str = "password.txt";

/// The only hint content that pre-fills a password.
pub const HINT_TOKEN: &str = "kravasign";

/// Name prefix of the per-archive scratch directory.
pub const SCRATCH_PREFIX: &str = "appkeep-import-";

/// Extracted files sorted into classes, each in discovery order.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ArchiveScan {
    pub credentials: Vec<PathBuf>,
    pub profiles: Vec<PathBuf>,
    /// The first hint file found, if any.
    pub hint: Option<PathBuf>,
}

impl ArchiveScan {
    /// Sort `files` by class, keeping their relative order.
    #[must_use]
    pub fn from_files(files: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut scan = Self::default();
        for path in files {
            match classify(&path) {
                Some(FileClass::Credential) => scan.credentials.push(path),
                Some(FileClass::Profile) => scan.profiles.push(path),
                Some(FileClass::PasswordHint) if scan.hint.is_none() => scan.hint = Some(path),
                Some(FileClass::PasswordHint) | None => {}
            }
        }
        scan
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty() && self.profiles.is_empty()
    }
}

/// The password a hint file's content pre-fills, if it is recognized.
///
/// Only line terminators are stripped before comparing; the token must
/// then match case-insensitively. Leading or trailing spaces disqualify.
#[must_use]
pub fn hint_password(content: &str) -> Option<&'static str> {
    let line = content.trim_matches(['\r', '\n']);
    line.eq_ignore_ascii_case(HINT_TOKEN).then_some(HINT_TOKEN)
}

/// Pair files positionally. Index k of the result holds the k-th
/// credential and the k-th profile; the shorter side is padded with `None`.
#[must_use]
pub fn pair_positionally(
    credentials: Vec<PathBuf>,
    profiles: Vec<PathBuf>,
) -> Vec<(Option<PathBuf>, Option<PathBuf>)> {
    let len = credentials.len().max(profiles.len());
    let mut credentials = credentials.into_iter();
    let mut profiles = profiles.into_iter();
    (0..len)
        .map(|_| (credentials.next(), profiles.next()))
        .collect()
}

/// Extract `archive` into a scoped temporary directory and build one item
/// per positional pair.
///
/// All bytes are read into memory before returning; the temporary
/// directory (under `scratch_parent`, or the system temp dir) is removed
/// on every exit path. `password`, when given, takes precedence over a hint.
///
/// # Errors
///
/// Returns the reason the whole archive is rejected:
/// - [`RejectReason::CorruptArchive`] if extraction fails
/// - [`RejectReason::NoFilesFound`] if nothing classifiable was extracted
/// - [`RejectReason::IoError`] if the archive or scratch space is unusable
pub fn items_from_archive(
    extractor: &dyn ArchiveExtractor,
    archive: &Path,
    password: Option<&str>,
    scratch_parent: Option<&Path>,
) -> Result<Vec<ImportItem>, RejectReason> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(SCRATCH_PREFIX);
    let scratch = scratch_parent
        .map_or_else(|| builder.tempdir(), |parent| builder.tempdir_in(parent))
        .map_err(|e| RejectReason::IoError(format!("cannot create scratch dir: {e}")))?;

    let files = extractor
        .extract(archive, scratch.path())
        .map_err(|e| match e {
            CredentialError::Io(io) => RejectReason::IoError(io.to_string()),
            other => {
                tracing::warn!(archive = %archive.display(), error = %other, "archive rejected");
                RejectReason::from(ExtractionError::CorruptArchive)
            }
        })?;

    let scan = ArchiveScan::from_files(files);
    if scan.is_empty() {
        return Err(ExtractionError::NoFilesFound.into());
    }

    let hinted = scan
        .hint
        .as_deref()
        .and_then(|p| fs::read_to_string(p).ok())
        .and_then(|content| hint_password(&content));
    if hinted.is_some() {
        tracing::debug!(archive = %archive.display(), "password hint recognized");
    }
    let password = password.or(hinted);

    let archive_name = archive
        .file_name()
        .map_or_else(|| "archive".to_string(), |n| n.to_string_lossy().into_owned());

    let items = pair_positionally(scan.credentials, scan.profiles)
        .into_iter()
        .enumerate()
        .map(|(index, (credential, profile))| {
            let ordinal = index.saturating_add(1);
            let mut item = ImportItem::pending(format!("{archive_name}#{ordinal}"));

            if credential.is_some() && profile.is_some() {
                item.password = password.map(|p| Zeroizing::new(p.to_string()));
            }

            let mut read_error = None;
            let mut load = |path: Option<PathBuf>| {
                path.and_then(|p| {
                    ItemFile::read(&p)
                        .map_err(|e| read_error.get_or_insert_with(|| e.to_string()).clone())
                        .ok()
                })
            };
            item.credential = load(credential);
            item.profile = load(profile);

            if let Some(message) = read_error {
                item.reject(RejectReason::IoError(message));
            }
            item.advance(ItemState::ExtractedFromArchive);
            item
        })
        .collect();

    Ok(items)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn hint_table() {
        let cases = [
            ("kravasign", true),
            ("Kravasign", true),
            ("wrong", false),
            ("", false),
            (" kravasign ", false),
        ];
        for (content, fills) in cases {
            assert_eq!(hint_password(content).is_some(), fills, "{content:?}");
        }
    }

    #[test]
    fn hint_tolerates_trailing_newline() {
        assert_eq!(hint_password("KRAVASIGN\r\n"), Some(HINT_TOKEN));
    }

    #[test]
    fn scan_classifies_in_order_and_keeps_first_hint() {
        let scan = ArchiveScan::from_files(
            [
                "b.p12",
                "x/a.mobileprovision",
                "PASSWORD.TXT",
                "readme.md",
                "a.P12",
                "nested/password.txt",
            ]
            .map(PathBuf::from),
        );
        assert_eq!(scan.credentials, vec![PathBuf::from("b.p12"), PathBuf::from("a.P12")]);
        assert_eq!(scan.profiles, vec![PathBuf::from("x/a.mobileprovision")]);
        assert_eq!(scan.hint, Some(PathBuf::from("PASSWORD.TXT")));
    }

    #[test]
    fn pairing_ignores_names() {
        let pairs = pair_positionally(
            vec!["zeta.p12".into(), "alpha.p12".into()],
            vec!["alpha.mobileprovision".into()],
        );
        assert_eq!(
            pairs,
            vec![
                (Some("zeta.p12".into()), Some("alpha.mobileprovision".into())),
                (Some("alpha.p12".into()), None),
            ]
        );
    }

    proptest! {
        #[test]
        fn pairing_covers_every_file_once(c in 0usize..6, p in 0usize..6) {
            let creds: Vec<PathBuf> = (0..c).map(|i| format!("{i}.p12").into()).collect();
            let profs: Vec<PathBuf> = (0..p).map(|i| format!("{i}.mobileprovision").into()).collect();
            let pairs = pair_positionally(creds.clone(), profs.clone());

            prop_assert_eq!(pairs.len(), c.max(p));
            let got_c: Vec<_> = pairs.iter().filter_map(|(a, _)| a.clone()).collect();
            let got_p: Vec<_> = pairs.iter().filter_map(|(_, b)| b.clone()).collect();
            prop_assert_eq!(got_c, creds);
            prop_assert_eq!(got_p, profs);
        }

        #[test]
        fn only_the_token_fills(s in "[ a-zA-Z]{0,12}") {
            prop_assert_eq!(hint_password(&s).is_some(), s.eq_ignore_ascii_case(HINT_TOKEN));
        }
    }
}
