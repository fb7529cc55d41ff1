//! App commands.
//!
//! Each command returns a DTO with `#[serde(rename_all = "camelCase")]`.

use anyhow::{bail, Context};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use appkeep_store::{
    get_expiration_info, AppKey, AppKind, AppMetadata, AppRecord, AppVariant, CategoryRecord,
    CertificateRecord, DeleteOutcome, ExpirationSeverity, NewApp,
};

use crate::cli::AddAppArgs;
use crate::output::{or_dash, Render};
use crate::state::AppContext;

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpirationDto {
    pub expiration_date: DateTime<Utc>,
    pub days_remaining: i64,
    pub is_expired: bool,
    pub label: String,
    pub severity: ExpirationSeverity,
    pub show_badge: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDto {
    pub kind: AppKind,
    pub uuid: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    pub installed_at: DateTime<Utc>,
    pub expiration: Option<ExpirationDto>,
    pub category_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfoDto {
    #[serde(flatten)]
    pub app: AppDto,
    pub category: Option<CategoryRecord>,
    pub certificate: Option<CertificateRecord>,
}

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------

pub(crate) fn app_to_dto(app: &AppRecord) -> AppDto {
    AppDto {
        kind: app.kind(),
        uuid: app.uuid.clone(),
        name: app.display_name().to_string(),
        version: app.metadata.version.clone(),
        identifier: app.metadata.identifier.clone(),
        source: app.metadata.source.clone(),
        size: app.metadata.size,
        installed_at: app.installed_at,
        expiration: get_expiration_info(app).map(|info| ExpirationDto {
            expiration_date: info.expiration_date,
            days_remaining: info.days_remaining,
            is_expired: info.is_expired,
            label: info.label(),
            severity: info.severity(),
            show_badge: info.should_show_badge(),
        }),
        category_id: app.category_id.clone(),
        certificate_id: app.variant.certificate_id().map(str::to_string),
    }
}

impl Render for AppDto {
    fn render(&self) -> String {
        let expires = self.expiration.as_ref().map_or_else(
            || "never".to_string(),
            |e| {
                if e.show_badge && !e.is_expired {
                    format!("{} (!)", e.label)
                } else {
                    e.label.clone()
                }
            },
        );
        format!(
            "{}/{}  {}  {}  expires: {}",
            self.kind,
            self.uuid,
            self.name,
            or_dash(self.version.as_deref()),
            expires
        )
    }
}

impl Render for AppInfoDto {
    fn render(&self) -> String {
        let mut lines = vec![self.app.render()];
        lines.push(format!(
            "  installed: {}",
            self.app.installed_at.format("%Y-%m-%d %H:%M")
        ));
        if let Some(e) = &self.app.expiration {
            lines.push(format!(
                "  expiration: {} ({:?})",
                e.expiration_date.format("%Y-%m-%d %H:%M"),
                e.severity
            ));
        }
        lines.push(format!(
            "  category: {}",
            or_dash(self.category.as_ref().map(|c| c.name.as_str()))
        ));
        if self.app.kind == AppKind::Signed {
            lines.push(format!(
                "  certificate: {}",
                or_dash(self.certificate.as_ref().map(|c| c.name.as_str()))
            ));
        }
        lines.join("\n")
    }
}

impl Render for DeleteOutcome {
    fn render(&self) -> String {
        let mut text = if self.deleted { "deleted" } else { "nothing to delete" }.to_string();
        if let Some(w) = &self.warning {
            text.push_str(&format!("\nwarning: {} was not removed: {}", w.path.display(), w.error));
        }
        text
    }
}

async fn fetch(ctx: &AppContext, key: AppKey) -> anyhow::Result<AppRecord> {
    let label = key.to_string();
    ctx.handle()
        .get_app(key)
        .await?
        .with_context(|| format!("no app {label}"))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// List apps of one variant, or both.
pub async fn list(ctx: &AppContext, kind: Option<AppKind>) -> anyhow::Result<Vec<AppDto>> {
    let handle = ctx.handle();
    let apps = match kind {
        Some(kind) => handle.list_apps(kind).await?,
        None => handle.list_all_apps().await?,
    };
    Ok(apps.iter().map(app_to_dto).collect())
}

/// Register a new app.
pub async fn add(ctx: &AppContext, args: AddAppArgs) -> anyhow::Result<AppDto> {
    let variant = match args.kind {
        AppKind::Signed => AppVariant::Signed {
            certificate_id: args.certificate,
        },
        AppKind::Imported => {
            if args.certificate.is_some() {
                bail!("only signed apps carry a certificate");
            }
            AppVariant::Imported
        }
    };
    let new = NewApp {
        uuid: args
            .uuid
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        variant,
        metadata: AppMetadata {
            name: args.name,
            version: args.version,
            identifier: args.identifier,
            icon: None,
            source: args.source,
            size: args.size,
        },
    };
    let record = ctx.handle().add_app(new).await.context("cannot add app")?;
    Ok(app_to_dto(&record))
}

/// Delete an app and its directory.
pub async fn delete(ctx: &AppContext, key: AppKey) -> anyhow::Result<DeleteOutcome> {
    Ok(ctx.handle().delete_app(key).await?)
}

/// File an app under `category`, or clear it.
pub async fn set_category(
    ctx: &AppContext,
    key: AppKey,
    category: Option<String>,
) -> anyhow::Result<AppDto> {
    if !ctx.handle().set_category(key.clone(), category).await? {
        bail!("no app {key}");
    }
    Ok(app_to_dto(&fetch(ctx, key).await?))
}

/// Set one app's expiration date, relative or absolute.
pub async fn expire(
    ctx: &AppContext,
    key: AppKey,
    days: Option<i64>,
    at: Option<DateTime<Utc>>,
) -> anyhow::Result<AppDto> {
    let date = match (days, at) {
        (_, Some(at)) => at,
        (Some(days), None) => TimeDelta::try_days(days)
            .and_then(|delta| Utc::now().checked_add_signed(delta))
            .with_context(|| format!("{days} days is out of range"))?,
        (None, None) => bail!("give --days or --at"),
    };
    if !ctx.handle().set_expiration_date(key.clone(), Some(date)).await? {
        bail!("no app {key}");
    }
    Ok(app_to_dto(&fetch(ctx, key).await?))
}

/// Remove one app's expiration date.
pub async fn clear_expiration(ctx: &AppContext, key: AppKey) -> anyhow::Result<AppDto> {
    if !ctx.handle().set_expiration_date(key.clone(), None).await? {
        bail!("no app {key}");
    }
    Ok(app_to_dto(&fetch(ctx, key).await?))
}

/// One app with its category and certificate.
pub async fn info(ctx: &AppContext, key: AppKey) -> anyhow::Result<AppInfoDto> {
    let app = fetch(ctx, key.clone()).await?;
    let handle = ctx.handle();
    Ok(AppInfoDto {
        app: app_to_dto(&app),
        category: handle.get_category(key.clone()).await?,
        certificate: handle.get_certificate(key).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(expiration_date: Option<DateTime<Utc>>) -> AppRecord {
        AppRecord {
            uuid: "u1".into(),
            variant: AppVariant::Signed {
                certificate_id: Some("c1".into()),
            },
            metadata: AppMetadata {
                identifier: Some("com.example.app".into()),
                ..AppMetadata::default()
            },
            installed_at: Utc::now(),
            expiration_date,
            category_id: None,
        }
    }

    #[test]
    fn dto_falls_back_to_identifier_and_keeps_certificate() {
        let dto = app_to_dto(&record(None));
        assert_eq!(dto.name, "com.example.app");
        assert_eq!(dto.certificate_id.as_deref(), Some("c1"));
        assert!(dto.expiration.is_none());
        assert!(dto.render().ends_with("expires: never"));
    }

    #[test]
    fn dto_carries_expiration_label() {
        let dto = app_to_dto(&record(Some(Utc::now() - TimeDelta::minutes(1))));
        let e = dto.expiration.unwrap();
        assert!(e.is_expired);
        assert_eq!(e.label, "Expired");
    }

    #[test]
    fn json_is_camel_case() {
        let json = serde_json::to_value(app_to_dto(&record(None))).unwrap();
        assert!(json.get("installedAt").is_some());
        assert_eq!(json["certificateId"], "c1");
        assert_eq!(json["kind"], "signed");
    }
}
