//! The library and its single-writer store worker.
//!
//! [`Library`] bundles the database, the directory layout and the
//! preferences. [`StoreService::spawn`] moves it onto one dedicated thread;
//! every record read or write afterwards is a job sent through a
//! [`StoreHandle`] and executed there in arrival order.

use std::path::Path;
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::{mpsc, oneshot};

use crate::apps::{self, AppKey, AppKind, AppRecord, DeleteOutcome, NewApp};
use crate::categories::{self, CategoryListItem, CategoryRecord, CategoryUpdate};
use crate::certificates::{self, CertificateRecord, NewCertificate};
use crate::db::StoreDb;
use crate::error::StoreError;
use crate::expiration::{self, CleanupReport, ExpirationStats};
use crate::paths::LibraryPaths;
use crate::preferences::LibraryPreferences;
use crate::reconcile::{self, ReconcileReport};

// ---------------------------------------------------------------------------
// Library
// ---------------------------------------------------------------------------

/// An open library: database, directory layout, preferences.
#[derive(Debug)]
pub struct Library {
    db: StoreDb,
    paths: LibraryPaths,
    prefs: LibraryPreferences,
}

impl Library {
    /// Open (or create) the library rooted at `root`.
    ///
    /// Creates the directory layout, opens and migrates `library.db`, and
    /// loads `preferences.json`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Fs`] if the layout cannot be created
    /// - [`StoreError::Database`] / [`StoreError::Migration`] from the database
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        let paths = LibraryPaths::new(root);
        paths.ensure_layout()?;
        let db = StoreDb::open(&paths.database_path())?;
        let prefs = LibraryPreferences::load(root);
        tracing::debug!(root = %root.display(), "library opened");
        Ok(Self { db, paths, prefs })
    }

    #[must_use]
    pub const fn connection(&self) -> &Connection {
        self.db.connection()
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        self.db.connection_mut()
    }

    #[must_use]
    pub const fn paths(&self) -> &LibraryPaths {
        &self.paths
    }

    #[must_use]
    pub const fn preferences(&self) -> &LibraryPreferences {
        &self.prefs
    }

    /// Replace and persist the preferences.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file cannot be written.
    pub fn set_preferences(&mut self, prefs: LibraryPreferences) -> Result<(), StoreError> {
        prefs.save(self.paths.root())?;
        self.prefs = prefs;
        Ok(())
    }

    /// Split borrow: mutable connection alongside the layout.
    fn parts_mut(&mut self) -> (&mut Connection, &LibraryPaths) {
        (self.db.connection_mut(), &self.paths)
    }

    /// The startup hook: evict expired apps, then reconcile.
    ///
    /// # Errors
    ///
    /// See [`expiration::run_cleanup_pass`].
    pub fn run_cleanup_pass(&mut self) -> Result<CleanupReport, StoreError> {
        let (conn, paths) = self.parts_mut();
        expiration::run_cleanup_pass(conn, paths)
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

type Job = Box<dyn FnOnce(&mut Library) + Send>;

/// Owns the store worker thread.
pub struct StoreService {
    handle: StoreHandle,
    worker: JoinHandle<()>,
}

impl StoreService {
    /// Move `library` onto a dedicated worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the thread cannot be spawned.
    pub fn spawn(mut library: Library) -> Result<Self, StoreError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        let worker = std::thread::Builder::new()
            .name("appkeep-store".into())
            .spawn(move || {
                while let Some(job) = rx.blocking_recv() {
                    job(&mut library);
                }
                tracing::debug!("store worker stopped");
            })?;

        Ok(Self {
            handle: StoreHandle { tx },
            worker,
        })
    }

    #[must_use]
    pub fn handle(&self) -> StoreHandle {
        self.handle.clone()
    }

    /// Stop accepting jobs and wait for the worker to drain.
    ///
    /// Jobs already queued still run. The worker exits once every
    /// outstanding [`StoreHandle`] clone is dropped.
    pub async fn shutdown(self) {
        let Self { handle, worker } = self;
        drop(handle);
        let joined = tokio::task::spawn_blocking(move || worker.join()).await;
        if !matches!(joined, Ok(Ok(()))) {
            tracing::warn!("store worker did not shut down cleanly");
        }
    }
}

/// Cloneable sender of jobs to the store worker.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::UnboundedSender<Job>,
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl StoreHandle {
    /// Run `f` on the worker and await its result.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::WorkerStopped`] if the worker is gone, or
    /// whatever `f` returns.
    pub async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Library) -> Result<T, StoreError> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |library| {
            let _ = reply_tx.send(f(library));
        });
        self.tx.send(job).map_err(|_| StoreError::WorkerStopped)?;
        reply_rx.await.map_err(|_| StoreError::WorkerStopped)?
    }

    // -- Library -----------------------------------------------------------

    /// # Errors
    ///
    /// Returns [`StoreError::WorkerStopped`] if the worker is gone.
    pub async fn paths(&self) -> Result<LibraryPaths, StoreError> {
        self.run(|lib| Ok(lib.paths().clone())).await
    }

    /// # Errors
    ///
    /// Returns [`StoreError::WorkerStopped`] if the worker is gone.
    pub async fn preferences(&self) -> Result<LibraryPreferences, StoreError> {
        self.run(|lib| Ok(lib.preferences().clone())).await
    }

    /// # Errors
    ///
    /// See [`Library::set_preferences`].
    pub async fn set_preferences(&self, prefs: LibraryPreferences) -> Result<(), StoreError> {
        self.run(move |lib| lib.set_preferences(prefs)).await
    }

    /// Eviction followed by reconciliation.
    ///
    /// # Errors
    ///
    /// See [`expiration::run_cleanup_pass`].
    pub async fn run_cleanup_pass(&self) -> Result<CleanupReport, StoreError> {
        self.run(Library::run_cleanup_pass).await
    }

    /// # Errors
    ///
    /// See [`reconcile::reconcile`].
    pub async fn reconcile(&self) -> Result<ReconcileReport, StoreError> {
        self.run(|lib| {
            let (conn, paths) = lib.parts_mut();
            reconcile::reconcile(conn, paths)
        })
        .await
    }

    // -- Apps --------------------------------------------------------------

    /// # Errors
    ///
    /// See [`apps::add_app`].
    pub async fn add_app(&self, new: NewApp) -> Result<AppRecord, StoreError> {
        self.run(move |lib| apps::add_app(lib.connection(), lib.paths(), lib.preferences(), new))
            .await
    }

    /// # Errors
    ///
    /// See [`apps::get_app`].
    pub async fn get_app(&self, key: AppKey) -> Result<Option<AppRecord>, StoreError> {
        self.run(move |lib| apps::get_app(lib.connection(), &key)).await
    }

    /// # Errors
    ///
    /// See [`apps::list_apps`].
    pub async fn list_apps(&self, kind: AppKind) -> Result<Vec<AppRecord>, StoreError> {
        self.run(move |lib| apps::list_apps(lib.connection(), kind))
            .await
    }

    /// # Errors
    ///
    /// See [`apps::list_all_apps`].
    pub async fn list_all_apps(&self) -> Result<Vec<AppRecord>, StoreError> {
        self.run(|lib| apps::list_all_apps(lib.connection())).await
    }

    /// # Errors
    ///
    /// See [`apps::delete_app`].
    pub async fn delete_app(&self, key: AppKey) -> Result<DeleteOutcome, StoreError> {
        self.run(move |lib| apps::delete_app(lib.connection(), lib.paths(), &key))
            .await
    }

    /// # Errors
    ///
    /// See [`apps::set_category`].
    pub async fn set_category(
        &self,
        key: AppKey,
        category_id: Option<String>,
    ) -> Result<bool, StoreError> {
        self.run(move |lib| apps::set_category(lib.connection(), &key, category_id.as_deref()))
            .await
    }

    /// # Errors
    ///
    /// See [`apps::get_category`].
    pub async fn get_category(&self, key: AppKey) -> Result<Option<CategoryRecord>, StoreError> {
        self.run(move |lib| apps::get_category(lib.connection(), &key))
            .await
    }

    /// # Errors
    ///
    /// See [`apps::get_certificate`].
    pub async fn get_certificate(
        &self,
        key: AppKey,
    ) -> Result<Option<CertificateRecord>, StoreError> {
        self.run(move |lib| apps::get_certificate(lib.connection(), &key))
            .await
    }

    /// # Errors
    ///
    /// See [`apps::set_expiration_date`].
    pub async fn set_expiration_date(
        &self,
        key: AppKey,
        date: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        self.run(move |lib| apps::set_expiration_date(lib.connection(), &key, date))
            .await
    }

    // -- Categories --------------------------------------------------------

    /// # Errors
    ///
    /// See [`categories::add_category`].
    pub async fn add_category(
        &self,
        name: String,
        icon: Option<String>,
        color: Option<String>,
    ) -> Result<CategoryRecord, StoreError> {
        self.run(move |lib| {
            categories::add_category(lib.connection(), &name, icon.as_deref(), color.as_deref())
        })
        .await
    }

    /// # Errors
    ///
    /// See [`categories::update_category`].
    pub async fn update_category(
        &self,
        uuid: String,
        update: CategoryUpdate,
    ) -> Result<CategoryRecord, StoreError> {
        self.run(move |lib| categories::update_category(lib.connection(), &uuid, &update))
            .await
    }

    /// # Errors
    ///
    /// See [`categories::delete_category`].
    pub async fn delete_category(&self, uuid: String) -> Result<bool, StoreError> {
        self.run(move |lib| categories::delete_category(lib.connection_mut(), &uuid))
            .await
    }

    /// # Errors
    ///
    /// See [`categories::fetch_categories`].
    pub async fn fetch_categories(&self) -> Result<Vec<CategoryRecord>, StoreError> {
        self.run(|lib| categories::fetch_categories(lib.connection()))
            .await
    }

    /// # Errors
    ///
    /// See [`categories::fetch_categories_with_counts`].
    pub async fn fetch_categories_with_counts(&self) -> Result<Vec<CategoryListItem>, StoreError> {
        self.run(|lib| categories::fetch_categories_with_counts(lib.connection()))
            .await
    }

    /// # Errors
    ///
    /// See [`apps::apps_in_category`].
    pub async fn apps_in_category(&self, uuid: String) -> Result<Vec<AppRecord>, StoreError> {
        self.run(move |lib| apps::apps_in_category(lib.connection(), &uuid))
            .await
    }

    // -- Certificates ------------------------------------------------------

    /// # Errors
    ///
    /// See [`certificates::add_certificate`].
    pub async fn add_certificate(
        &self,
        new: NewCertificate,
    ) -> Result<CertificateRecord, StoreError> {
        self.run(move |lib| certificates::add_certificate(lib.connection(), &new))
            .await
    }

    /// # Errors
    ///
    /// See [`certificates::list_certificates`].
    pub async fn list_certificates(&self) -> Result<Vec<CertificateRecord>, StoreError> {
        self.run(|lib| certificates::list_certificates(lib.connection()))
            .await
    }

    /// # Errors
    ///
    /// See [`certificates::get_certificate_record`].
    pub async fn get_certificate_record(
        &self,
        uuid: String,
    ) -> Result<Option<CertificateRecord>, StoreError> {
        self.run(move |lib| certificates::get_certificate_record(lib.connection(), &uuid))
            .await
    }

    /// # Errors
    ///
    /// See [`certificates::find_by_fingerprint`].
    pub async fn find_certificate_by_fingerprint(
        &self,
        fingerprint: String,
    ) -> Result<Option<String>, StoreError> {
        self.run(move |lib| certificates::find_by_fingerprint(lib.connection(), &fingerprint))
            .await
    }

    /// # Errors
    ///
    /// See [`certificates::delete_certificate`].
    pub async fn delete_certificate(&self, uuid: String) -> Result<DeleteOutcome, StoreError> {
        self.run(move |lib| {
            let (conn, paths) = lib.parts_mut();
            certificates::delete_certificate(conn, paths, &uuid)
        })
        .await
    }

    // -- Expiration --------------------------------------------------------

    /// # Errors
    ///
    /// See [`expiration::set_expiration_for_all_apps`].
    pub async fn set_expiration_for_all_apps(
        &self,
        days: i64,
    ) -> Result<(DateTime<Utc>, usize), StoreError> {
        self.run(move |lib| expiration::set_expiration_for_all_apps(lib.connection_mut(), days))
            .await
    }

    /// # Errors
    ///
    /// See [`expiration::clear_all_expirations`].
    pub async fn clear_all_expirations(&self) -> Result<usize, StoreError> {
        self.run(|lib| expiration::clear_all_expirations(lib.connection_mut()))
            .await
    }

    /// # Errors
    ///
    /// See [`expiration::expiration_stats`].
    pub async fn expiration_stats(&self) -> Result<ExpirationStats, StoreError> {
        self.run(|lib| expiration::expiration_stats(lib.connection()))
            .await
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
