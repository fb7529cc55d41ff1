//! Direct intake: one credential/profile pair given as loose files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use zeroize::Zeroizing;

use super::{classify, FileClass, ImportItem, ItemFile, ItemState, RejectReason};

/// One pair of loose files to import.
#[derive(Clone, Default)]
pub struct DirectImport {
    pub credential: Option<PathBuf>,
    pub profile: Option<PathBuf>,
    pub password: Option<String>,
    /// Display name to store instead of the credential file stem.
    pub nickname: Option<String>,
}

impl std::fmt::Debug for DirectImport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectImport")
            .field("credential", &self.credential)
            .field("profile", &self.profile)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("nickname", &self.nickname)
            .finish()
    }
}

impl DirectImport {
    #[must_use]
    pub fn new(credential: impl Into<PathBuf>, profile: impl Into<PathBuf>) -> Self {
        Self {
            credential: Some(credential.into()),
            profile: Some(profile.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }

    /// Label used in results: the credential file name, else the profile's.
    #[must_use]
    pub fn identifier(&self) -> String {
        self.credential
            .as_deref()
            .or(self.profile.as_deref())
            .and_then(Path::file_name)
            .map_or_else(|| "direct import".to_string(), |n| n.to_string_lossy().into_owned())
    }
}

/// Read both files of `request` into an item.
///
/// A path that is absent from the request or missing on disk leaves that
/// half empty, so validation reports it as missing. Other read failures
/// reject the item with [`RejectReason::IoError`].
#[must_use]
pub fn load_direct(request: &DirectImport) -> ImportItem {
    let mut item = ImportItem::pending(request.identifier());
    item.password = request.password.clone().map(Zeroizing::new);
    item.nickname = request.nickname.clone();

    let mut read_error = None;
    let mut load = |path: Option<&Path>| {
        let path = path?;
        match ItemFile::read(path) {
            Ok(file) => Some(file),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                read_error.get_or_insert_with(|| format!("{}: {e}", path.display()));
                None
            }
        }
    };
    item.credential = load(request.credential.as_deref());
    item.profile = load(request.profile.as_deref());

    if let Some(message) = read_error {
        item.reject(RejectReason::IoError(message));
    }
    item.advance(ItemState::DirectFilesProvided);
    item
}

/// Why [`find_profile_near`] found no single profile.
#[derive(Debug, Error)]
pub enum ProfileLookupError {
    #[error("no provisioning profile next to the credential")]
    NoProfileFile,
    #[error("{0} provisioning profiles next to the credential; choose one")]
    MultipleProfileFiles(usize),
    #[error("cannot list directory: {0}")]
    Io(#[from] io::Error),
}

/// Locate the one profile in the same directory as `credential`.
///
/// # Errors
///
/// - [`ProfileLookupError::NoProfileFile`] if there is none
/// - [`ProfileLookupError::MultipleProfileFiles`] if there is more than one
/// - [`ProfileLookupError::Io`] if the directory cannot be listed
pub fn find_profile_near(credential: &Path) -> Result<PathBuf, ProfileLookupError> {
    let dir = match credential.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && classify(&path) == Some(FileClass::Profile) {
            found.push(path);
        }
    }

    match found.len() {
        0 => Err(ProfileLookupError::NoProfileFile),
        1 => Ok(found.swap_remove(0)),
        n => Err(ProfileLookupError::MultipleProfileFiles(n)),
    }
}
