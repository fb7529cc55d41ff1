//! Process-wide state: the open library behind its store worker.
//!
//! Every command borrows the [`AppContext`] and talks to the store through
//! short-lived [`StoreHandle`] clones, so [`AppContext::close`] can join the
//! worker once the command has returned.

use std::path::{Path, PathBuf};

use anyhow::Context;

use appkeep_store::{CleanupReport, Library, StoreHandle, StoreService};

/// Default library directory: `{platform data dir}/appkeep`.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("appkeep")
}

pub struct AppContext {
    service: StoreService,
    data_dir: PathBuf,
    /// Print JSON instead of text.
    pub json: bool,
    /// Accept expiry advisories without prompting.
    pub assume_yes: bool,
}

impl AppContext {
    /// Open the library at `data_dir` and start its worker.
    ///
    /// # Errors
    ///
    /// Fails if the library cannot be opened or the worker cannot start.
    pub fn open(data_dir: &Path, json: bool, assume_yes: bool) -> anyhow::Result<Self> {
        let library = Library::open(data_dir)
            .with_context(|| format!("cannot open library at {}", data_dir.display()))?;
        let service = StoreService::spawn(library).context("cannot start store worker")?;
        Ok(Self {
            service,
            data_dir: data_dir.to_path_buf(),
            json,
            assume_yes,
        })
    }

    #[must_use]
    pub fn handle(&self) -> StoreHandle {
        self.service.handle()
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Startup hook: evict expired apps, then reconcile.
    ///
    /// # Errors
    ///
    /// Fails if a record change fails; directory problems are warnings.
    pub async fn startup(&self) -> anyhow::Result<CleanupReport> {
        let report = self
            .handle()
            .run_cleanup_pass()
            .await
            .context("startup cleanup failed")?;
        if report.total_removed() > 0 {
            tracing::info!(
                evicted = report.evicted.len(),
                reconciled = report.reconcile.total_removed(),
                "startup cleanup removed records"
            );
        }
        Ok(report)
    }

    /// Stop the worker after queued jobs finish.
    pub async fn close(self) {
        self.service.shutdown().await;
    }
}
