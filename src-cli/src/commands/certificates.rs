//! Certificate commands: list, import, preview, revoke.
//!
//! Imports never fail as a whole; they print one line per attempted item.
//! Expiry advisories are confirmed on the terminal unless `--yes` is given.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};

use appkeep_store::{
    find_profile_near, AcceptAll, ArchiveImport, CertificateRecord, DeleteOutcome, DirectImport,
    ExpirationInfo, ExpiryAdvisory, ExpiryPolicy, ImportPipeline, ImportResult, ImportSource,
    PreviewEntry,
};

use crate::cli::{ImportArgs, PairArg};
use crate::output::{or_dash, Render};
use crate::state::AppContext;

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

impl Render for CertificateRecord {
    fn render(&self) -> String {
        let info = ExpirationInfo::at(self.expiration_date, Utc::now());
        format!(
            "{}  {}  {}  expires {} ({})",
            self.uuid,
            self.name,
            or_dash(self.team_name.as_deref()),
            self.expiration_date.format("%Y-%m-%d"),
            info.label()
        )
    }
}

impl Render for ImportResult {
    fn render(&self) -> String {
        let status = if self.success { "ok" } else { "failed" };
        format!("[{status}] {}: {}", self.identifier, self.message)
    }
}

impl Render for PreviewEntry {
    fn render(&self) -> String {
        let mut parts = vec![self.identifier.clone()];
        if let Some(date) = self.expiration_date {
            parts.push(format!("expires {}", date.format("%Y-%m-%d")));
        }
        if let Some(advisory) = self.advisory {
            parts.push(format!("profile {advisory}"));
        }
        if let Some(uuid) = &self.duplicate_of {
            parts.push(format!("already imported as {uuid}"));
        }
        if let Some(problem) = &self.problem {
            parts.push(format!("problem: {problem}"));
        }
        parts.join("  ")
    }
}

// ---------------------------------------------------------------------------
// Expiry confirmation
// ---------------------------------------------------------------------------

fn expiry_policy(assume_yes: bool) -> Arc<dyn ExpiryPolicy> {
    if assume_yes {
        return Arc::new(AcceptAll);
    }
    Arc::new(
        |identifier: &str, expiration: DateTime<Utc>, advisory: ExpiryAdvisory| {
            let prompt = format!(
                "{identifier}: profile {advisory} ({}). Import anyway? [y/N] ",
                expiration.format("%Y-%m-%d")
            );
            confirm(&prompt, &mut io::stdin().lock())
        },
    )
}

/// Ask on stderr; anything but `y`/`yes` (including end of input) declines.
fn confirm(prompt: &str, input: &mut impl BufRead) -> bool {
    eprint!("{prompt}");
    let _ = io::stderr().flush();
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) | Err(_) => false,
        Ok(_) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
    }
}

fn pipeline(ctx: &AppContext) -> ImportPipeline {
    ImportPipeline::new(ctx.handle()).with_policy(expiry_policy(ctx.assume_yes))
}

async fn run(ctx: &AppContext, source: ImportSource) -> anyhow::Result<Vec<ImportResult>> {
    let results = pipeline(ctx).run(source).await?;
    let imported = results.iter().filter(|r| r.success).count();
    tracing::info!(imported, attempted = results.len(), "import finished");
    Ok(results)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Certificates by import date.
pub async fn list(ctx: &AppContext) -> anyhow::Result<Vec<CertificateRecord>> {
    Ok(ctx.handle().list_certificates().await?)
}

/// Import one pair; the profile defaults to the one next to the credential.
pub async fn import(ctx: &AppContext, args: ImportArgs) -> anyhow::Result<Vec<ImportResult>> {
    let profile = match args.profile {
        Some(profile) => profile,
        None => find_profile_near(&args.credential).with_context(|| {
            format!("no profile given for {}", args.credential.display())
        })?,
    };
    let request = DirectImport {
        credential: Some(args.credential),
        profile: Some(profile),
        password: args.password,
        nickname: args.nickname,
    };
    run(ctx, ImportSource::Direct(request)).await
}

/// Import several explicit pairs, one after another.
pub async fn import_batch(
    ctx: &AppContext,
    pairs: Vec<PairArg>,
) -> anyhow::Result<Vec<ImportResult>> {
    let requests = pairs
        .into_iter()
        .map(|pair| DirectImport {
            credential: Some(pair.credential),
            profile: Some(pair.profile),
            password: pair.password,
            nickname: None,
        })
        .collect();
    run(ctx, ImportSource::Batch(requests)).await
}

/// Import every pair inside an archive.
pub async fn import_archive(
    ctx: &AppContext,
    archive: PathBuf,
    password: Option<String>,
) -> anyhow::Result<Vec<ImportResult>> {
    run(ctx, ImportSource::Archive(ArchiveImport { archive, password })).await
}

/// Report what an import would do.
pub async fn preview(
    ctx: &AppContext,
    path: PathBuf,
    archive: bool,
    profile: Option<PathBuf>,
    password: Option<String>,
) -> anyhow::Result<Vec<PreviewEntry>> {
    let source = if archive {
        ImportSource::Archive(ArchiveImport {
            archive: path,
            password,
        })
    } else {
        let profile = profile.or_else(|| find_profile_near(&path).ok());
        ImportSource::Direct(DirectImport {
            credential: Some(path),
            profile,
            password,
            nickname: None,
        })
    };
    Ok(ImportPipeline::new(ctx.handle()).preview(source).await?)
}

/// Delete a certificate and its files.
pub async fn revoke(ctx: &AppContext, uuid: String) -> anyhow::Result<DeleteOutcome> {
    let outcome = ctx.handle().delete_certificate(uuid.clone()).await?;
    if !outcome.deleted {
        anyhow::bail!("no certificate {uuid}");
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use appkeep_store::RejectReason;

    #[test]
    fn confirm_accepts_only_yes() {
        for (input, expected) in [
            ("y\n", true),
            ("YES\n", true),
            ("n\n", false),
            ("\n", false),
            ("", false),
        ] {
            assert_eq!(confirm("? ", &mut input.as_bytes()), expected, "{input:?}");
        }
    }

    #[test]
    fn results_render_status() {
        let ok = ImportResult {
            identifier: "a.p12".into(),
            success: true,
            message: "imported as \"a\"".into(),
            reason: None,
            certificate_id: Some("c".into()),
        };
        assert_eq!(ok.render(), "[ok] a.p12: imported as \"a\"");

        let failed = ImportResult {
            identifier: "b.p12".into(),
            success: false,
            message: RejectReason::BadPassword.to_string(),
            reason: Some(RejectReason::BadPassword),
            certificate_id: None,
        };
        assert!(failed.render().starts_with("[failed] b.p12"));
    }
}
