//! Bulk expiration commands.

use chrono::{DateTime, Utc};
use serde::Serialize;

use appkeep_store::ExpirationStats;

use crate::output::Render;
use crate::state::AppContext;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkExpirationDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,
    pub apps_updated: usize,
}

impl Render for BulkExpirationDto {
    fn render(&self) -> String {
        match self.expiration_date {
            Some(date) => format!(
                "{} apps now expire on {}",
                self.apps_updated,
                date.format("%Y-%m-%d %H:%M")
            ),
            None => format!("cleared expiration on {} apps", self.apps_updated),
        }
    }
}

impl Render for ExpirationStats {
    fn render(&self) -> String {
        format!(
            "{} apps, {} with an expiration date",
            self.total_apps, self.apps_with_expiration
        )
    }
}

/// Make every app expire `days` days from now.
pub async fn set_all(ctx: &AppContext, days: i64) -> anyhow::Result<BulkExpirationDto> {
    let (date, apps_updated) = ctx.handle().set_expiration_for_all_apps(days).await?;
    Ok(BulkExpirationDto {
        expiration_date: Some(date),
        apps_updated,
    })
}

/// Remove every app's expiration date.
pub async fn clear_all(ctx: &AppContext) -> anyhow::Result<BulkExpirationDto> {
    let apps_updated = ctx.handle().clear_all_expirations().await?;
    Ok(BulkExpirationDto {
        expiration_date: None,
        apps_updated,
    })
}

pub async fn stats(ctx: &AppContext) -> anyhow::Result<ExpirationStats> {
    Ok(ctx.handle().expiration_stats().await?)
}
