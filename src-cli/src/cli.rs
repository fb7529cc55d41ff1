//! Command-line definitions.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};

use appkeep_store::{AppKey, AppKind};

#[derive(Debug, Parser)]
#[command(name = "appkeep")]
#[command(about = "Manage installed apps, categories and signing certificates", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Library directory (database, app bundles, certificates, logs)
    #[arg(long, global = true, env = "APPKEEP_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Accept expiry advisories without asking
    #[arg(short, long, global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Evict expired apps and drop records whose directories are gone
    Cleanup,

    /// Installed apps
    #[command(subcommand)]
    Apps(AppsCommand),

    /// App categories
    #[command(subcommand)]
    Categories(CategoriesCommand),

    /// Signing certificates
    #[command(subcommand)]
    Certs(CertsCommand),

    /// Expiration settings for all apps
    #[command(subcommand)]
    Expiration(ExpirationCommand),

    /// Library preferences
    #[command(subcommand)]
    Prefs(PrefsCommand),
}

// ---------------------------------------------------------------------------
// Apps
// ---------------------------------------------------------------------------

#[derive(Debug, Subcommand)]
pub enum AppsCommand {
    /// List apps, newest first
    List {
        /// Only this variant (signed, imported)
        #[arg(long)]
        kind: Option<AppKind>,
    },

    /// Register an app and create its bundle directory
    Add(AddAppArgs),

    /// Delete an app and its directory
    Delete {
        /// App as `kind/uuid`
        #[arg(value_parser = parse_app_key)]
        app: AppKey,
    },

    /// File an app under a category, or clear it
    SetCategory {
        #[arg(value_parser = parse_app_key)]
        app: AppKey,
        /// Category uuid; omit to clear
        category: Option<String>,
    },

    /// Set an app's expiration date
    Expire {
        #[arg(value_parser = parse_app_key)]
        app: AppKey,
        /// Days from now
        #[arg(long, conflicts_with = "at", required_unless_present = "at")]
        days: Option<i64>,
        /// Absolute RFC 3339 date
        #[arg(long, value_parser = parse_date)]
        at: Option<DateTime<Utc>>,
    },

    /// Remove an app's expiration date
    ClearExpiration {
        #[arg(value_parser = parse_app_key)]
        app: AppKey,
    },

    /// Show one app with its expiration, category and certificate
    Info {
        #[arg(value_parser = parse_app_key)]
        app: AppKey,
    },
}

#[derive(Debug, Args)]
pub struct AddAppArgs {
    #[arg(long)]
    pub kind: AppKind,
    /// Generated when omitted
    #[arg(long)]
    pub uuid: Option<String>,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub version: Option<String>,
    /// Bundle identifier
    #[arg(long)]
    pub identifier: Option<String>,
    #[arg(long)]
    pub source: Option<String>,
    /// Bundle size in bytes
    #[arg(long)]
    pub size: Option<i64>,
    /// Signing certificate uuid (signed apps only)
    #[arg(long)]
    pub certificate: Option<String>,
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

#[derive(Debug, Subcommand)]
pub enum CategoriesCommand {
    /// List categories with app counts
    List,
    /// Create a category
    Add {
        name: String,
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    /// Change a category's name, icon or color
    Update {
        uuid: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    /// Delete a category; its apps stay, unfiled
    Delete { uuid: String },
    /// Apps filed under a category
    Apps { uuid: String },
}

// ---------------------------------------------------------------------------
// Certificates
// ---------------------------------------------------------------------------

#[derive(Debug, Subcommand)]
pub enum CertsCommand {
    /// List certificates by import date
    List,

    /// Import one credential/profile pair
    Import(ImportArgs),

    /// Import several pairs given as `credential,profile[,password]`
    ImportBatch {
        #[arg(long = "pair", required = true, value_parser = parse_pair)]
        pairs: Vec<PairArg>,
    },

    /// Import every pair inside an archive
    ImportArchive {
        archive: PathBuf,
        /// Overrides a password hint inside the archive
        #[arg(long)]
        password: Option<String>,
    },

    /// Show what an import would do without importing
    Preview {
        /// A credential file, or an archive with `--archive`
        path: PathBuf,
        #[arg(long)]
        archive: bool,
        #[arg(long, conflicts_with = "archive")]
        profile: Option<PathBuf>,
        #[arg(long)]
        password: Option<String>,
    },

    /// Delete a certificate; apps signed with it stay
    Revoke { uuid: String },
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// The `.p12` credential
    pub credential: PathBuf,
    /// The `.mobileprovision`; looked up next to the credential when omitted
    #[arg(long)]
    pub profile: Option<PathBuf>,
    #[arg(long)]
    pub password: Option<String>,
    /// Display name for the certificate
    #[arg(long)]
    pub nickname: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairArg {
    pub credential: PathBuf,
    pub profile: PathBuf,
    pub password: Option<String>,
}

// ---------------------------------------------------------------------------
// Expiration and preferences
// ---------------------------------------------------------------------------

#[derive(Debug, Subcommand)]
pub enum ExpirationCommand {
    /// Make every app expire N days from now
    SetAll { days: i64 },
    /// Remove every app's expiration date
    ClearAll,
    /// Count apps with and without an expiration date
    Stats,
}

#[derive(Debug, Subcommand)]
pub enum PrefsCommand {
    Show,
    Set {
        /// Give new apps an expiration date
        #[arg(long)]
        auto_delete: Option<bool>,
        /// Lifetime of new apps in days (non-positive means 7)
        #[arg(long, allow_negative_numbers = true)]
        auto_delete_days: Option<i64>,
        /// Pause between import items, in milliseconds
        #[arg(long)]
        import_pause_ms: Option<u64>,
    },
}

// ---------------------------------------------------------------------------
// Value parsers
// ---------------------------------------------------------------------------

fn parse_app_key(s: &str) -> Result<AppKey, String> {
    let (kind, uuid) = s
        .split_once('/')
        .ok_or_else(|| format!("expected kind/uuid, got {s:?}"))?;
    let kind = kind.parse::<AppKind>().map_err(|e| e.to_string())?;
    if uuid.is_empty() {
        return Err("uuid is empty".into());
    }
    Ok(AppKey::new(kind, uuid))
}

fn parse_date(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 date: {e}"))
}

fn parse_pair(s: &str) -> Result<PairArg, String> {
    let mut parts = s.splitn(3, ',');
    let credential = parts.next().filter(|p| !p.is_empty());
    let profile = parts.next().filter(|p| !p.is_empty());
    let (Some(credential), Some(profile)) = (credential, profile) else {
        return Err(format!("expected credential,profile[,password], got {s:?}"));
    };
    Ok(PairArg {
        credential: credential.into(),
        profile: profile.into(),
        password: parts.next().map(str::to_string),
    })
}
