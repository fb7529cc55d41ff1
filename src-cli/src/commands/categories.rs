//! Category commands.

use anyhow::Context;
use serde::Serialize;

use appkeep_store::{CategoryListItem, CategoryRecord, CategoryUpdate};

use super::apps::{app_to_dto, AppDto};
use crate::output::Render;
use crate::state::AppContext;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDeletedDto {
    pub uuid: String,
    pub deleted: bool,
}

impl Render for CategoryRecord {
    fn render(&self) -> String {
        format!("{}  {}  [{} {}]", self.uuid, self.name, self.icon, self.color)
    }
}

impl Render for CategoryListItem {
    fn render(&self) -> String {
        let noun = if self.app_count == 1 { "app" } else { "apps" };
        format!("{}  ({} {noun})", self.category.render(), self.app_count)
    }
}

impl Render for CategoryDeletedDto {
    fn render(&self) -> String {
        if self.deleted {
            format!("deleted category {}", self.uuid)
        } else {
            format!("no category {}", self.uuid)
        }
    }
}

/// Categories sorted by name, with app counts.
pub async fn list(ctx: &AppContext) -> anyhow::Result<Vec<CategoryListItem>> {
    Ok(ctx.handle().fetch_categories_with_counts().await?)
}

/// Create a category.
pub async fn add(
    ctx: &AppContext,
    name: String,
    icon: Option<String>,
    color: Option<String>,
) -> anyhow::Result<CategoryRecord> {
    ctx.handle()
        .add_category(name, icon, color)
        .await
        .context("cannot create category")
}

/// Change a category's name, icon or color.
pub async fn update(
    ctx: &AppContext,
    uuid: String,
    name: Option<String>,
    icon: Option<String>,
    color: Option<String>,
) -> anyhow::Result<CategoryRecord> {
    let update = CategoryUpdate { name, icon, color };
    ctx.handle()
        .update_category(uuid, update)
        .await
        .context("cannot update category")
}

/// Delete a category; its apps are unfiled.
pub async fn delete(ctx: &AppContext, uuid: String) -> anyhow::Result<CategoryDeletedDto> {
    let deleted = ctx.handle().delete_category(uuid.clone()).await?;
    Ok(CategoryDeletedDto { uuid, deleted })
}

/// Apps filed under a category, by name.
pub async fn apps(ctx: &AppContext, uuid: String) -> anyhow::Result<Vec<AppDto>> {
    let apps = ctx.handle().apps_in_category(uuid).await?;
    Ok(apps.iter().map(app_to_dto).collect())
}
