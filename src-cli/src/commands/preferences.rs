//! Library preference commands.

use appkeep_store::LibraryPreferences;

use crate::output::Render;
use crate::state::AppContext;

impl Render for LibraryPreferences {
    fn render(&self) -> String {
        format!(
            "auto-delete new apps: {}\nauto-delete after: {} days\nimport pause: {} ms",
            if self.default_auto_delete { "on" } else { "off" },
            self.effective_auto_delete_days(),
            self.import_item_pause_ms
        )
    }
}

pub async fn show(ctx: &AppContext) -> anyhow::Result<LibraryPreferences> {
    Ok(ctx.handle().preferences().await?)
}

/// Change the given fields and persist.
pub async fn set(
    ctx: &AppContext,
    auto_delete: Option<bool>,
    auto_delete_days: Option<i64>,
    import_pause_ms: Option<u64>,
) -> anyhow::Result<LibraryPreferences> {
    let handle = ctx.handle();
    let mut prefs = handle.preferences().await?;
    if let Some(on) = auto_delete {
        prefs.default_auto_delete = on;
    }
    if let Some(days) = auto_delete_days {
        prefs.default_auto_delete_days = days;
    }
    if let Some(ms) = import_pause_ms {
        prefs.import_item_pause_ms = ms;
    }
    handle.set_preferences(prefs.clone()).await?;
    tracing::info!(?prefs, "preferences updated");
    Ok(prefs)
}
