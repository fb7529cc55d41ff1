#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Integration tests for the certificate import pipeline: direct files,
//! batches and archives, committed through a running store worker.

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use appkeep_credentials::{CredentialError, ProfileParser, ProvisioningProfile, ZipExtractor};
use appkeep_store::paths::{CREDENTIAL_FILE, PROFILE_FILE};
use appkeep_store::{
    AcceptAll, ArchiveImport, DirectImport, ExpiryAdvisory, ImportPipeline, ImportSource,
    ImportToolkit, Library, RejectReason, StoreService,
};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Profiles in these tests are an RFC 3339 expiration date.
struct TextProfileParser;

impl ProfileParser for TextProfileParser {
    fn parse(&self, blob: &[u8]) -> Result<ProvisioningProfile, CredentialError> {
        let text =
            std::str::from_utf8(blob).map_err(|e| CredentialError::ProfileParse(e.to_string()))?;
        let expiration_date = DateTime::parse_from_rfc3339(text.trim())
            .map_err(|e| CredentialError::ProfileParse(e.to_string()))?
            .with_timezone(&Utc);
        Ok(ProvisioningProfile {
            name: Some("From Profile".into()),
            team_name: Some("Test Team".into()),
            profile_uuid: None,
            creation_date: None,
            expiration_date,
            developer_certificates: Vec::new(),
        })
    }
}

/// Credentials in these tests are `pw:<password>`.
fn toolkit() -> ImportToolkit {
    ImportToolkit {
        parser: Arc::new(TextProfileParser),
        verifier: Arc::new(|cred: &[u8], _: &[u8], pw: &str| cred == format!("pw:{pw}").as_bytes()),
        extractor: Arc::new(ZipExtractor),
    }
}

fn credential(password: &str) -> Vec<u8> {
    format!("pw:{password}").into_bytes()
}

fn profile(expires_in_days: i64) -> Vec<u8> {
    (Utc::now() + TimeDelta::days(expires_in_days))
        .to_rfc3339()
        .into_bytes()
}

struct Harness {
    dir: TempDir,
    service: StoreService,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let library = Library::open(&dir.path().join("library")).unwrap();
        Self {
            service: StoreService::spawn(library).unwrap(),
            dir,
        }
    }

    fn pipeline(&self) -> ImportPipeline {
        ImportPipeline::new(self.service.handle())
            .with_toolkit(toolkit())
            .with_policy(Arc::new(AcceptAll))
            .with_item_pause(Duration::ZERO)
    }

    fn write(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    fn pair(&self, stem: &str, password: &str, expires_in_days: i64) -> DirectImport {
        DirectImport::new(
            self.write(&format!("{stem}.p12"), &credential(password)),
            self.write(&format!("{stem}.mobileprovision"), &profile(expires_in_days)),
        )
    }

    /// An empty directory to extract archives under.
    fn scratch(&self) -> PathBuf {
        let path = self.dir.path().join("scratch");
        fs::create_dir_all(&path).unwrap();
        path
    }

    fn zip(&self, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = self.dir.path().join(name);
        let mut zip = ZipWriter::new(File::create(&path).unwrap());
        for (entry, bytes) in entries {
            zip.start_file(*entry, SimpleFileOptions::default()).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap();
        path
    }
}

fn archive(path: PathBuf) -> ImportSource {
    ImportSource::Archive(ArchiveImport {
        archive: path,
        password: None,
    })
}

// ---------------------------------------------------------------------------
// Direct and batch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn direct_import_commits_files_and_record() {
    let h = Harness::new();
    let request = h.pair("dev", "secret", 90).with_password("secret");

    let results = h.pipeline().run(ImportSource::Direct(request)).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].success, "{:?}", results[0]);
    assert_eq!(results[0].identifier, "dev.p12");

    let uuid = results[0].certificate_id.clone().unwrap();
    let handle = h.service.handle();
    let record = handle.get_certificate_record(uuid.clone()).await.unwrap().unwrap();
    assert_eq!(record.name, "dev");
    assert_eq!(record.team_name.as_deref(), Some("Test Team"));

    let dir = handle
        .paths()
        .await
        .unwrap()
        .certificate_directory_for(&uuid)
        .unwrap();
    assert_eq!(fs::read(dir.join(CREDENTIAL_FILE)).unwrap(), credential("secret"));
    assert!(dir.join(PROFILE_FILE).is_file());
}

#[tokio::test]
async fn nickname_overrides_file_stem() {
    let h = Harness::new();
    let request = h
        .pair("dev", "", 90)
        .with_nickname("Work Phone");

    let results = h.pipeline().run(ImportSource::Direct(request)).await.unwrap();
    let uuid = results[0].certificate_id.clone().unwrap();
    let record = h
        .service
        .handle()
        .get_certificate_record(uuid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.name, "Work Phone");
}

#[tokio::test]
async fn one_bad_password_does_not_stop_the_batch() {
    let h = Harness::new();
    let batch = vec![
        h.pair("one", "a", 90).with_password("a"),
        h.pair("two", "b", 90).with_password("wrong"),
        h.pair("three", "c", 90).with_password("c"),
    ];

    let results = h.pipeline().run(ImportSource::Batch(batch)).await.unwrap();
    assert_eq!(results.len(), 3);
    assert!(results[0].success);
    assert!(!results[1].success);
    assert_eq!(results[1].reason, Some(RejectReason::BadPassword));
    assert!(results[2].success);

    assert_eq!(
        h.service.handle().list_certificates().await.unwrap().len(),
        2
    );
}

#[tokio::test]
async fn missing_profile_file_is_reported() {
    let h = Harness::new();
    let request = DirectImport::new(
        h.write("solo.p12", &credential("")),
        h.dir.path().join("absent.mobileprovision"),
    );
    let results = h.pipeline().run(ImportSource::Direct(request)).await.unwrap();
    assert_eq!(results[0].reason, Some(RejectReason::MissingProfile));
}

#[tokio::test]
async fn default_policy_declines_expired_profiles() {
    let h = Harness::new();
    let pipeline = ImportPipeline::new(h.service.handle())
        .with_toolkit(toolkit())
        .with_item_pause(Duration::ZERO);

    let results = pipeline
        .run(ImportSource::Direct(h.pair("old", "", -1)))
        .await
        .unwrap();
    assert_eq!(results[0].reason, Some(RejectReason::DeclinedByPolicy));
    assert!(h.service.handle().list_certificates().await.unwrap().is_empty());
}

#[tokio::test]
async fn cancellation_stops_scheduling_further_items() {
    let h = Harness::new();
    let pipeline = h.pipeline();
    let cancel = pipeline.cancel_flag();

    // The first item's advisory callback requests cancellation; that item
    // still completes.
    let pipeline = pipeline.with_policy(Arc::new(
        move |_: &str, _: DateTime<Utc>, _: ExpiryAdvisory| {
            cancel.cancel();
            true
        },
    ));

    let batch = vec![
        h.pair("first", "", 10),
        h.pair("second", "", 10),
        h.pair("third", "", 10),
    ];
    let results = pipeline.run(ImportSource::Batch(batch)).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].success);
}

// ---------------------------------------------------------------------------
// Archives
// ---------------------------------------------------------------------------

#[tokio::test]
async fn surplus_credential_in_archive_is_missing_profile() {
    let h = Harness::new();
    let cred_a = credential("");
    let cred_b = credential("");
    let prof = profile(90);
    let zip = h.zip(
        "bundle.zip",
        &[
            ("a.p12", cred_a.as_slice()),
            ("b.p12", cred_b.as_slice()),
            ("a.mobileprovision", prof.as_slice()),
        ],
    );

    let results = h.pipeline().run(archive(zip)).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].identifier, "bundle.zip#1");
    assert!(results[0].success);
    assert_eq!(results[1].identifier, "bundle.zip#2");
    assert_eq!(results[1].reason, Some(RejectReason::MissingProfile));

    let handle = h.service.handle();
    let certs = handle.list_certificates().await.unwrap();
    assert_eq!(certs.len(), 1);
    let on_disk = fs::read_dir(handle.paths().await.unwrap().certificates_root())
        .unwrap()
        .count();
    assert_eq!(on_disk, 1);
}

#[tokio::test]
async fn password_hint_table() {
    let cases: [(&str, bool); 5] = [
        ("kravasign", true),
        ("Kravasign", true),
        ("wrong", false),
        ("", false),
        (" kravasign ", false),
    ];

    for (content, fills) in cases {
        let h = Harness::new();
        let cred = credential("kravasign");
        let prof = profile(90);
        let zip = h.zip(
            "hinted.zip",
            &[
                ("x.p12", cred.as_slice()),
                ("x.mobileprovision", prof.as_slice()),
                ("password.txt", content.as_bytes()),
            ],
        );

        let results = h.pipeline().run(archive(zip)).await.unwrap();
        assert_eq!(results.len(), 1);
        if fills {
            assert!(results[0].success, "{content:?}: {:?}", results[0]);
        } else {
            assert_eq!(
                results[0].reason,
                Some(RejectReason::BadPassword),
                "{content:?}"
            );
        }
    }
}

#[tokio::test]
async fn caller_password_beats_hint() {
    let h = Harness::new();
    let cred = credential("mine");
    let prof = profile(90);
    let zip = h.zip(
        "both.zip",
        &[
            ("x.p12", cred.as_slice()),
            ("x.mobileprovision", prof.as_slice()),
            ("password.txt", b"kravasign".as_slice()),
        ],
    );

    let results = h
        .pipeline()
        .run(ImportSource::Archive(ArchiveImport {
            archive: zip,
            password: Some("mine".into()),
        }))
        .await
        .unwrap();
    assert!(results[0].success);
}

#[tokio::test]
async fn unusable_archives_yield_one_rejection() {
    let h = Harness::new();

    let garbage = h.write("garbage.zip", b"definitely not a zip");
    let results = h.pipeline().run(archive(garbage)).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].reason, Some(RejectReason::CorruptArchive));

    let empty = h.zip("empty.zip", &[("readme.txt", b"hello".as_slice())]);
    let results = h.pipeline().run(archive(empty)).await.unwrap();
    assert_eq!(results[0].reason, Some(RejectReason::NoFilesFound));

    let missing = h.dir.path().join("missing.zip");
    let results = h.pipeline().run(archive(missing)).await.unwrap();
    assert!(matches!(results[0].reason, Some(RejectReason::IoError(_))));
}

#[tokio::test]
async fn resource_fork_entries_are_ignored() {
    let h = Harness::new();
    let cred = credential("");
    let prof = profile(90);
    let zip = h.zip(
        "mac.zip",
        &[
            ("__MACOSX/._x.p12", b"junk".as_slice()),
            ("x.p12", cred.as_slice()),
            ("x.mobileprovision", prof.as_slice()),
        ],
    );
    let results = h.pipeline().run(archive(zip)).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].success);
}

// ---------------------------------------------------------------------------
// Preview
// ---------------------------------------------------------------------------

#[tokio::test]
async fn preview_reports_advisories_and_duplicates() {
    let h = Harness::new();
    let pipeline = h.pipeline();

    let soon = h.pair("soon", "", 3);
    let entries = pipeline
        .preview(ImportSource::Direct(soon.clone()))
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].complete);
    assert_eq!(entries[0].advisory, Some(ExpiryAdvisory::ExpiresWithinWeek));
    assert_eq!(entries[0].duplicate_of, None);

    let committed = pipeline.run(ImportSource::Direct(soon.clone())).await.unwrap();
    let uuid = committed[0].certificate_id.clone();

    let entries = pipeline.preview(ImportSource::Direct(soon)).await.unwrap();
    assert_eq!(entries[0].duplicate_of, uuid);

    // Preview never writes.
    assert_eq!(
        h.service.handle().list_certificates().await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn preview_flags_incomplete_items() {
    let h = Harness::new();
    let lonely = h.write("lonely.mobileprovision", &profile(90));
    let entries = h
        .pipeline()
        .preview(ImportSource::Direct(DirectImport {
            profile: Some(lonely),
            ..DirectImport::default()
        }))
        .await
        .unwrap();
    assert!(!entries[0].complete);
    assert_eq!(entries[0].problem, Some(RejectReason::MissingCredential));
}

// ---------------------------------------------------------------------------
// Scratch space
// ---------------------------------------------------------------------------

fn leftover_scratch(dir: &std::path::Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn scratch_dir_is_removed_after_successful_archive() {
    let h = Harness::new();
    let scratch = h.scratch();
    let cred = credential("secret");
    let prof = profile(90);
    let zip = h.zip(
        "ok.zip",
        [("a.p12", cred.as_slice()), ("a.mobileprovision", prof.as_slice())].as_slice(),
    );

    let results = h
        .pipeline()
        .with_scratch_dir(&scratch)
        .run(ImportSource::Archive(ArchiveImport {
            archive: zip,
            password: Some("secret".into()),
        }))
        .await
        .unwrap();
    assert!(results[0].success, "{:?}", results[0]);
    assert!(leftover_scratch(&scratch).is_empty());
}

#[tokio::test]
async fn scratch_dir_is_removed_after_rejected_archives() {
    let h = Harness::new();
    let scratch = h.scratch();
    let corrupt = h.write("corrupt.zip", b"not a zip at all");
    let empty = h.zip("notes.zip", [("readme.txt", b"hi".as_slice())].as_slice());

    for (path, reason) in [
        (corrupt, RejectReason::CorruptArchive),
        (empty, RejectReason::NoFilesFound),
    ] {
        let results = h
            .pipeline()
            .with_scratch_dir(&scratch)
            .run(archive(path))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].reason, Some(reason));
        assert!(leftover_scratch(&scratch).is_empty());
    }
}

#[tokio::test]
async fn scratch_dir_is_removed_after_cancelled_run() {
    let h = Harness::new();
    let scratch = h.scratch();
    let cred = credential("secret");
    let prof = profile(90);
    let zip = h.zip(
        "cancel.zip",
        [("a.p12", cred.as_slice()), ("a.mobileprovision", prof.as_slice())].as_slice(),
    );

    let pipeline = h.pipeline().with_scratch_dir(&scratch);
    pipeline.cancel_flag().cancel();
    let results = pipeline.run(archive(zip)).await.unwrap();

    assert!(results.is_empty());
    assert!(leftover_scratch(&scratch).is_empty());
    assert!(h.service.handle().list_certificates().await.unwrap().is_empty());
}
