//! Certificate import pipeline.
//!
//! Three input shapes feed one per-item state machine:
//!
//! ```text
//! Pending -> DirectFilesProvided | ExtractedFromArchive -> Validated -> Committed
//!                                                        \-> Rejected(reason)
//! ```
//!
//! Items are processed strictly one after another. A rejected item never
//! stops the batch; every attempted item yields one [`ImportResult`].
//! File work (reads, extraction, parsing, password checks, copies) runs on
//! the blocking pool; only the record insert goes through the store worker.

pub mod archive;
pub mod direct;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use zeroize::Zeroizing;

use appkeep_credentials::{
    credential_fingerprint, ArchiveExtractor, PasswordVerifier, Pkcs12Verifier,
    PlistProfileParser, ProfileParser, ProvisioningProfile, ZipExtractor,
};

use crate::certificates::{CertificateSecrets, NewCertificate};
use crate::db::{self, generate_uuid};
use crate::error::{DirectoryWarning, ExtractionError, StoreError, ValidationError};
use crate::expiration::ExpirationInfo;
use crate::paths;
use crate::service::StoreHandle;

pub use archive::{hint_password, items_from_archive, pair_positionally, ArchiveScan, SCRATCH_PREFIX};
pub use direct::{find_profile_near, load_direct, DirectImport, ProfileLookupError};

// ---------------------------------------------------------------------------
// File classes
// ---------------------------------------------------------------------------

/// What an extracted or supplied file is, judged by its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    Credential,
    Profile,
    PasswordHint,
}

/// Classify a file by extension (`.p12`, `.mobileprovision`) or, for the
/// hint, by its exact name. Comparisons ignore ASCII case.
#[must_use]
pub fn classify(path: &Path) -> Option<FileClass> {
    let name = path.file_name()?.to_str()?;
    if name.eq_ignore_ascii_case(archive::HINT_FILE_NAME) {
        return Some(FileClass::PasswordHint);
    }
    let ext = path.extension()?.to_str()?;
    if ext.eq_ignore_ascii_case("p12") {
        Some(FileClass::Credential)
    } else if ext.eq_ignore_ascii_case("mobileprovision") {
        Some(FileClass::Profile)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Item state
// ---------------------------------------------------------------------------

/// Why an item was not imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", content = "detail", rename_all = "camelCase")]
pub enum RejectReason {
    MissingCredential,
    MissingProfile,
    BadPassword,
    CorruptArchive,
    IoError(String),
    /// The profile could not be parsed.
    MalformedProfile(String),
    /// The archive held no credential or profile files.
    NoFilesFound,
    /// The expiry policy refused the item.
    DeclinedByPolicy,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCredential => f.write_str(&ValidationError::MissingCredential.to_string()),
            Self::MissingProfile => f.write_str(&ValidationError::MissingProfile.to_string()),
            Self::BadPassword => f.write_str(&ValidationError::BadPassword.to_string()),
            Self::CorruptArchive => f.write_str(&ExtractionError::CorruptArchive.to_string()),
            Self::NoFilesFound => f.write_str(&ExtractionError::NoFilesFound.to_string()),
            Self::IoError(detail) => write!(f, "I/O error: {detail}"),
            Self::MalformedProfile(detail) => write!(f, "malformed provisioning profile: {detail}"),
            Self::DeclinedByPolicy => f.write_str("declined because of the profile's expiration"),
        }
    }
}

impl From<ValidationError> for RejectReason {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::BadPassword => Self::BadPassword,
            ValidationError::MissingCredential => Self::MissingCredential,
            ValidationError::MissingProfile => Self::MissingProfile,
        }
    }
}

impl From<ExtractionError> for RejectReason {
    fn from(err: ExtractionError) -> Self {
        match err {
            ExtractionError::CorruptArchive => Self::CorruptArchive,
            ExtractionError::NoFilesFound => Self::NoFilesFound,
        }
    }
}

/// Where an item is in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ItemState {
    Pending,
    DirectFilesProvided,
    ExtractedFromArchive,
    Validated,
    Committed {
        #[serde(rename = "certificateId")]
        certificate_id: String,
    },
    Rejected {
        reason: RejectReason,
    },
}

/// One file's name and contents.
#[derive(Clone, PartialEq, Eq)]
pub struct ItemFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for ItemFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemFile")
            .field("file_name", &self.file_name)
            .field("bytes", &format_args!("[{} bytes]", self.bytes.len()))
            .finish()
    }
}

impl ItemFile {
    /// Read `path` fully into memory.
    ///
    /// # Errors
    ///
    /// Returns the underlying `io::Error` if the file cannot be read.
    pub fn read(path: &Path) -> std::io::Result<Self> {
        Ok(Self {
            file_name: path
                .file_name()
                .map_or_else(String::new, |n| n.to_string_lossy().into_owned()),
            bytes: std::fs::read(path)?,
        })
    }

    /// File name without its extension.
    #[must_use]
    pub fn stem(&self) -> &str {
        Path::new(&self.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.file_name)
    }
}

/// A credential/profile pair moving through the pipeline.
pub struct ImportItem {
    /// Caller-facing label (file name or `archive.zip#k`).
    pub identifier: String,
    pub credential: Option<ItemFile>,
    pub profile: Option<ItemFile>,
    pub password: Option<Zeroizing<String>>,
    /// Display name to store instead of the derived one.
    pub nickname: Option<String>,
    pub state: ItemState,
    /// Parsed profile, present once validation got that far.
    pub parsed_profile: Option<ProvisioningProfile>,
}

impl fmt::Debug for ImportItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportItem")
            .field("identifier", &self.identifier)
            .field("credential", &self.credential)
            .field("profile", &self.profile)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("nickname", &self.nickname)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ImportItem {
    #[must_use]
    pub fn pending(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            credential: None,
            profile: None,
            password: None,
            nickname: None,
            state: ItemState::Pending,
            parsed_profile: None,
        }
    }

    /// Both halves present.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.credential.is_some() && self.profile.is_some()
    }

    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self.state, ItemState::Rejected { .. })
    }

    /// The rejection reason, if rejected.
    #[must_use]
    pub const fn reject_reason(&self) -> Option<&RejectReason> {
        match &self.state {
            ItemState::Rejected { reason } => Some(reason),
            _ => None,
        }
    }

    /// Move to `next` unless already rejected.
    pub fn advance(&mut self, next: ItemState) {
        if !self.is_rejected() {
            tracing::debug!(item = %self.identifier, from = ?self.state, to = ?next, "import item advanced");
            self.state = next;
        }
    }

    /// Reject with `reason` unless already rejected (first reason wins).
    pub fn reject(&mut self, reason: RejectReason) {
        if !self.is_rejected() {
            tracing::debug!(item = %self.identifier, %reason, "import item rejected");
            self.state = ItemState::Rejected { reason };
        }
    }

    /// Name the committed certificate will carry: nickname, credential file
    /// stem, profile name, in that order.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.nickname
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .or_else(|| self.credential.as_ref().map(ItemFile::stem))
            .or_else(|| self.parsed_profile.as_ref().and_then(|p| p.name.as_deref()))
            .unwrap_or("Certificate")
            .to_string()
    }
}

// ---------------------------------------------------------------------------
// Expiry policy
// ---------------------------------------------------------------------------

/// Escalating warnings about a profile's expiration date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExpiryAdvisory {
    /// Less than thirty days left.
    ExpiresWithinMonth,
    /// Less than seven days left.
    ExpiresWithinWeek,
    /// Already expired.
    Expired,
}

impl ExpiryAdvisory {
    /// The advisory for a profile expiring at `expiration_date`, seen at
    /// `now`. `None` when thirty or more days remain.
    #[must_use]
    pub fn for_expiration(expiration_date: DateTime<Utc>, now: DateTime<Utc>) -> Option<Self> {
        let info = ExpirationInfo::at(expiration_date, now);
        if info.is_expired {
            Some(Self::Expired)
        } else if info.days_remaining < 7 {
            Some(Self::ExpiresWithinWeek)
        } else if info.days_remaining < 30 {
            Some(Self::ExpiresWithinMonth)
        } else {
            None
        }
    }
}

impl fmt::Display for ExpiryAdvisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ExpiresWithinMonth => "expires within 30 days",
            Self::ExpiresWithinWeek => "expires within 7 days",
            Self::Expired => "has already expired",
        })
    }
}

/// Decides whether an item carrying an expiry advisory is imported anyway.
pub trait ExpiryPolicy: Send + Sync {
    fn accept(&self, identifier: &str, expiration_date: DateTime<Utc>, advisory: ExpiryAdvisory)
        -> bool;
}

impl<F> ExpiryPolicy for F
where
    F: Fn(&str, DateTime<Utc>, ExpiryAdvisory) -> bool + Send + Sync,
{
    fn accept(
        &self,
        identifier: &str,
        expiration_date: DateTime<Utc>,
        advisory: ExpiryAdvisory,
    ) -> bool {
        self(identifier, expiration_date, advisory)
    }
}

/// Imports regardless of expiration.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl ExpiryPolicy for AcceptAll {
    fn accept(&self, _: &str, _: DateTime<Utc>, _: ExpiryAdvisory) -> bool {
        true
    }
}

/// Refuses profiles that have already expired; accepts the softer tiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectExpired;

impl ExpiryPolicy for RejectExpired {
    fn accept(&self, _: &str, _: DateTime<Utc>, advisory: ExpiryAdvisory) -> bool {
        advisory != ExpiryAdvisory::Expired
    }
}

// ---------------------------------------------------------------------------
// Collaborators and cancellation
// ---------------------------------------------------------------------------

/// The external primitives the pipeline calls out to.
#[derive(Clone)]
pub struct ImportToolkit {
    pub parser: Arc<dyn ProfileParser>,
    pub verifier: Arc<dyn PasswordVerifier>,
    pub extractor: Arc<dyn ArchiveExtractor>,
}

impl Default for ImportToolkit {
    fn default() -> Self {
        Self {
            parser: Arc::new(PlistProfileParser),
            verifier: Arc::new(Pkcs12Verifier),
            extractor: Arc::new(ZipExtractor),
        }
    }
}

impl fmt::Debug for ImportToolkit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportToolkit").finish_non_exhaustive()
    }
}

/// Cooperative cancellation for an import batch.
///
/// Setting it stops the batch from starting further items; the item in
/// flight runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate one item in place.
///
/// Checks, in order: both halves present, profile parses, password
/// verifies, expiry policy accepts. The first failure rejects the item;
/// otherwise it becomes [`ItemState::Validated`].
pub fn validate_item(
    toolkit: &ImportToolkit,
    policy: &dyn ExpiryPolicy,
    item: &mut ImportItem,
    now: DateTime<Utc>,
) {
    if item.is_rejected() {
        return;
    }
    let (Some(credential), Some(profile)) = (&item.credential, &item.profile) else {
        let reason = if item.credential.is_none() {
            ValidationError::MissingCredential
        } else {
            ValidationError::MissingProfile
        };
        item.reject(reason.into());
        return;
    };

    let parsed = match toolkit.parser.parse(&profile.bytes) {
        Ok(parsed) => parsed,
        Err(e) => {
            item.reject(RejectReason::MalformedProfile(e.to_string()));
            return;
        }
    };

    let password = item.password.as_deref().map_or("", String::as_str);
    if !toolkit
        .verifier
        .verify(&credential.bytes, &profile.bytes, password)
    {
        item.parsed_profile = Some(parsed);
        item.reject(ValidationError::BadPassword.into());
        return;
    }

    let expiration = parsed.expiration_date;
    item.parsed_profile = Some(parsed);

    if let Some(advisory) = ExpiryAdvisory::for_expiration(expiration, now) {
        tracing::debug!(item = %item.identifier, %advisory, "expiry advisory");
        if !policy.accept(&item.identifier, expiration, advisory) {
            item.reject(RejectReason::DeclinedByPolicy);
            return;
        }
    }

    item.advance(ItemState::Validated);
}

// ---------------------------------------------------------------------------
// Results and preview
// ---------------------------------------------------------------------------

/// Outcome of one attempted item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub identifier: String,
    pub success: bool,
    pub message: String,
    pub reason: Option<RejectReason>,
    pub certificate_id: Option<String>,
}

impl ImportResult {
    /// The result an item's final state stands for. Items that neither
    /// committed nor were rejected count as failed I/O.
    fn for_item(item: &ImportItem, name: &str) -> Self {
        match &item.state {
            ItemState::Committed { certificate_id } => Self {
                identifier: item.identifier.clone(),
                success: true,
                message: format!("imported as \"{name}\""),
                reason: None,
                certificate_id: Some(certificate_id.clone()),
            },
            ItemState::Rejected { reason } => Self::rejected(item.identifier.clone(), reason.clone()),
            state => Self::rejected(
                item.identifier.clone(),
                RejectReason::IoError(format!("import stopped in state {state:?}")),
            ),
        }
    }

    fn rejected(identifier: String, reason: RejectReason) -> Self {
        Self {
            identifier,
            success: false,
            message: reason.to_string(),
            reason: Some(reason),
            certificate_id: None,
        }
    }
}

/// Pre-commit view of one item, for callers that decide before importing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewEntry {
    pub identifier: String,
    /// Both credential and profile present.
    pub complete: bool,
    pub expiration_date: Option<DateTime<Utc>>,
    pub advisory: Option<ExpiryAdvisory>,
    /// Uuid of an existing certificate with the same credential.
    pub duplicate_of: Option<String>,
    /// Set when a password was pre-filled from a hint or the caller.
    pub has_password: bool,
    /// Why the item would be rejected, when already known.
    pub problem: Option<RejectReason>,
}

fn preview_item(toolkit: &ImportToolkit, item: &ImportItem, now: DateTime<Utc>) -> PreviewEntry {
    let mut problem = item.reject_reason().cloned();
    let mut expiration_date = None;

    if let Some(profile) = &item.profile {
        match toolkit.parser.parse(&profile.bytes) {
            Ok(parsed) => expiration_date = Some(parsed.expiration_date),
            Err(e) => {
                problem.get_or_insert(RejectReason::MalformedProfile(e.to_string()));
            }
        }
    }
    if problem.is_none() && !item.is_complete() {
        problem = Some(if item.credential.is_none() {
            RejectReason::MissingCredential
        } else {
            RejectReason::MissingProfile
        });
    }

    PreviewEntry {
        identifier: item.identifier.clone(),
        complete: item.is_complete(),
        expiration_date,
        advisory: expiration_date.and_then(|d| ExpiryAdvisory::for_expiration(d, now)),
        duplicate_of: None,
        has_password: item.password.is_some(),
        problem,
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// An archive holding one or more credential/profile pairs.
#[derive(Debug, Clone)]
pub struct ArchiveImport {
    pub archive: PathBuf,
    /// Overrides any hint file in the archive.
    pub password: Option<String>,
}

/// What to import.
#[derive(Debug, Clone)]
pub enum ImportSource {
    Direct(DirectImport),
    Batch(Vec<DirectImport>),
    Archive(ArchiveImport),
}

/// Turn a source into items (or one archive-level rejection).
fn gather_items(
    toolkit: &ImportToolkit,
    source: ImportSource,
    scratch_parent: Option<&Path>,
) -> Result<Vec<ImportItem>, ImportResult> {
    match source {
        ImportSource::Direct(request) => Ok(vec![load_direct(&request)]),
        ImportSource::Batch(requests) => Ok(requests.iter().map(load_direct).collect()),
        ImportSource::Archive(request) => {
            items_from_archive(
                &*toolkit.extractor,
                &request.archive,
                request.password.as_deref(),
                scratch_parent,
            )
                .map_err(|reason| {
                    let identifier = request
                        .archive
                        .file_name()
                        .map_or_else(|| request.archive.display().to_string(), |n| {
                            n.to_string_lossy().into_owned()
                        });
                    ImportResult::rejected(identifier, reason)
                })
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Drives import batches against a running store worker.
pub struct ImportPipeline {
    store: StoreHandle,
    toolkit: ImportToolkit,
    policy: Arc<dyn ExpiryPolicy>,
    cancel: CancelFlag,
    item_pause: Option<Duration>,
    scratch_dir: Option<PathBuf>,
}

impl fmt::Debug for ImportPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportPipeline")
            .field("store", &self.store)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("item_pause", &self.item_pause)
            .finish_non_exhaustive()
    }
}

impl ImportPipeline {
    /// A pipeline with the production toolkit and [`RejectExpired`].
    #[must_use]
    pub fn new(store: StoreHandle) -> Self {
        Self {
            store,
            toolkit: ImportToolkit::default(),
            policy: Arc::new(RejectExpired),
            cancel: CancelFlag::new(),
            item_pause: None,
            scratch_dir: None,
        }
    }

    #[must_use]
    pub fn with_toolkit(mut self, toolkit: ImportToolkit) -> Self {
        self.toolkit = toolkit;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn ExpiryPolicy>) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Override the inter-item pause from the library preferences.
    #[must_use]
    pub const fn with_item_pause(mut self, pause: Duration) -> Self {
        self.item_pause = Some(pause);
        self
    }

    /// Extract archives under `dir` instead of the system temp dir.
    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Import everything in `source`, one item at a time.
    ///
    /// Returns one result per attempted item, in order. Items not started
    /// because of cancellation have no result.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::WorkerStopped`] if the store worker is gone
    /// before the batch starts. Per-item failures are results, not errors.
    pub async fn run(&self, source: ImportSource) -> Result<Vec<ImportResult>, StoreError> {
        let pause = match self.item_pause {
            Some(pause) => pause,
            None => self.store.preferences().await?.import_item_pause(),
        };

        let items = match self.gather(source).await {
            Ok(items) => items,
            Err(rejection) => return Ok(vec![rejection]),
        };

        let total = items.len();
        let mut results = Vec::with_capacity(total);
        for (index, item) in items.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::info!(attempted = index, total, "import batch cancelled");
                break;
            }
            if index > 0 && !pause.is_zero() {
                tokio::time::sleep(pause).await;
                if self.cancel.is_cancelled() {
                    tracing::info!(attempted = index, total, "import batch cancelled");
                    break;
                }
            }
            results.push(self.process(item).await);
        }

        let imported = results.iter().filter(|r| r.success).count();
        tracing::info!(imported, failed = results.len().saturating_sub(imported), "import batch finished");
        Ok(results)
    }

    /// Build the pre-commit report for `source` without importing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::WorkerStopped`] if the store worker is gone.
    pub async fn preview(&self, source: ImportSource) -> Result<Vec<PreviewEntry>, StoreError> {
        let items = match self.gather(source).await {
            Ok(items) => items,
            Err(rejection) => {
                return Ok(vec![PreviewEntry {
                    identifier: rejection.identifier,
                    complete: false,
                    expiration_date: None,
                    advisory: None,
                    duplicate_of: None,
                    has_password: false,
                    problem: rejection.reason,
                }]);
            }
        };

        let mut entries = Vec::with_capacity(items.len());
        for item in items {
            let toolkit = self.toolkit.clone();
            let (mut entry, fingerprint) = tokio::task::spawn_blocking(move || {
                let entry = preview_item(&toolkit, &item, db::now());
                let fingerprint = item
                    .credential
                    .as_ref()
                    .map(|c| credential_fingerprint(&c.bytes));
                (entry, fingerprint)
            })
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))?;

            if let Some(fingerprint) = fingerprint {
                entry.duplicate_of = self.store.find_certificate_by_fingerprint(fingerprint).await?;
            }
            entries.push(entry);
        }
        Ok(entries)
    }

    async fn gather(&self, source: ImportSource) -> Result<Vec<ImportItem>, ImportResult> {
        let toolkit = self.toolkit.clone();
        let scratch_dir = self.scratch_dir.clone();
        tokio::task::spawn_blocking(move || gather_items(&toolkit, source, scratch_dir.as_deref()))
            .await
            .unwrap_or_else(|e| {
                Err(ImportResult::rejected(
                    "import".into(),
                    RejectReason::IoError(e.to_string()),
                ))
            })
    }

    /// Validate and commit one item. Never fails; problems become results.
    async fn process(&self, item: ImportItem) -> ImportResult {
        let identifier = item.identifier.clone();
        let toolkit = self.toolkit.clone();
        let policy = Arc::clone(&self.policy);

        let validated = tokio::task::spawn_blocking(move || {
            let mut item = item;
            validate_item(&toolkit, &*policy, &mut item, db::now());
            item
        })
        .await;

        let item = match validated {
            Ok(item) => item,
            Err(e) => return ImportResult::rejected(identifier, RejectReason::IoError(e.to_string())),
        };
        if item.is_rejected() {
            return ImportResult::for_item(&item, "");
        }

        self.commit(item).await
    }

    /// Copy the files into the library, then insert the record. If the
    /// insert fails the copied directory is removed again.
    async fn commit(&self, mut item: ImportItem) -> ImportResult {
        let name = item.display_name();
        let Some(new) = new_certificate(&mut item, name.clone()) else {
            item.reject(ValidationError::MissingProfile.into());
            return ImportResult::for_item(&item, &name);
        };

        let store_paths = match self.store.paths().await {
            Ok(p) => p,
            Err(e) => {
                item.reject(RejectReason::IoError(e.to_string()));
                return ImportResult::for_item(&item, &name);
            }
        };

        let uuid = new.uuid.clone();
        let credential = new.secrets.credential.clone();
        let profile = new.secrets.profile.clone();
        let written = tokio::task::spawn_blocking(move || {
            store_paths.write_certificate_files(&uuid, &credential, &profile)
        })
        .await;

        let dir = match written {
            Ok(Ok(dir)) => dir,
            Ok(Err(fs_err)) => {
                item.reject(RejectReason::IoError(fs_err.to_string()));
                return ImportResult::for_item(&item, &name);
            }
            Err(e) => {
                item.reject(RejectReason::IoError(e.to_string()));
                return ImportResult::for_item(&item, &name);
            }
        };

        match self.store.add_certificate(new).await {
            Ok(record) => {
                tracing::info!(item = %item.identifier, certificate = %record.uuid, "certificate imported");
                item.advance(ItemState::Committed {
                    certificate_id: record.uuid,
                });
            }
            Err(err) => {
                let cleanup = tokio::task::spawn_blocking(move || paths::remove_best_effort(&dir))
                    .await
                    .unwrap_or_else(|e| {
                        tracing::warn!(item = %item.identifier, error = %e, "certificate file cleanup did not run");
                        None
                    });
                item.reject(RejectReason::IoError(insert_failure_message(&err, cleanup.as_ref())));
            }
        }
        ImportResult::for_item(&item, &name)
    }
}

/// Failure text for an insert that did not happen, naming any certificate
/// files that could not be removed afterwards.
fn insert_failure_message(err: &StoreError, leftover: Option<&DirectoryWarning>) -> String {
    match leftover {
        Some(w) => format!("{err}; {} was not removed: {}", w.path.display(), w.error),
        None => err.to_string(),
    }
}

/// Move the files and parsed profile out of a validated item into a record.
fn new_certificate(item: &mut ImportItem, name: String) -> Option<NewCertificate> {
    let credential = item.credential.take()?;
    let profile = item.profile.take()?;
    let parsed = item.parsed_profile.take()?;

    Some(NewCertificate {
        uuid: generate_uuid(),
        name,
        team_name: parsed.team_name,
        fingerprint: credential_fingerprint(&credential.bytes),
        expiration_date: parsed.expiration_date,
        secrets: CertificateSecrets {
            credential: credential.bytes,
            profile: profile.bytes,
            password: item.password.take(),
        },
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
