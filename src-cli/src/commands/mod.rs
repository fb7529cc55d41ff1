//! Command handlers.
//!
//! Each handler talks to the store through the context's handle and
//! returns a serializable result; [`dispatch`] prints it.

pub mod apps;
pub mod categories;
pub mod certificates;
pub mod expiration;
pub mod library;
pub mod preferences;

use appkeep_store::CleanupReport;

use crate::cli::{
    AppsCommand, CategoriesCommand, CertsCommand, Command, ExpirationCommand, PrefsCommand,
};
use crate::output::emit;
use crate::state::AppContext;

/// Run `command` and print its result.
///
/// `startup` is the report of the cleanup pass that already ran for this
/// invocation.
///
/// # Errors
///
/// Returns the handler's error.
pub async fn dispatch(
    ctx: &AppContext,
    command: Command,
    startup: CleanupReport,
) -> anyhow::Result<()> {
    let json = ctx.json;
    match command {
        Command::Cleanup => emit(json, &startup),

        Command::Apps(cmd) => match cmd {
            AppsCommand::List { kind } => emit(json, &apps::list(ctx, kind).await?),
            AppsCommand::Add(args) => emit(json, &apps::add(ctx, args).await?),
            AppsCommand::Delete { app } => emit(json, &apps::delete(ctx, app).await?),
            AppsCommand::SetCategory { app, category } => {
                emit(json, &apps::set_category(ctx, app, category).await?)
            }
            AppsCommand::Expire { app, days, at } => {
                emit(json, &apps::expire(ctx, app, days, at).await?)
            }
            AppsCommand::ClearExpiration { app } => {
                emit(json, &apps::clear_expiration(ctx, app).await?)
            }
            AppsCommand::Info { app } => emit(json, &apps::info(ctx, app).await?),
        },

        Command::Categories(cmd) => match cmd {
            CategoriesCommand::List => emit(json, &categories::list(ctx).await?),
            CategoriesCommand::Add { name, icon, color } => {
                emit(json, &categories::add(ctx, name, icon, color).await?)
            }
            CategoriesCommand::Update {
                uuid,
                name,
                icon,
                color,
            } => emit(json, &categories::update(ctx, uuid, name, icon, color).await?),
            CategoriesCommand::Delete { uuid } => emit(json, &categories::delete(ctx, uuid).await?),
            CategoriesCommand::Apps { uuid } => emit(json, &categories::apps(ctx, uuid).await?),
        },

        Command::Certs(cmd) => match cmd {
            CertsCommand::List => emit(json, &certificates::list(ctx).await?),
            CertsCommand::Import(args) => emit(json, &certificates::import(ctx, args).await?),
            CertsCommand::ImportBatch { pairs } => {
                emit(json, &certificates::import_batch(ctx, pairs).await?)
            }
            CertsCommand::ImportArchive { archive, password } => {
                emit(json, &certificates::import_archive(ctx, archive, password).await?)
            }
            CertsCommand::Preview {
                path,
                archive,
                profile,
                password,
            } => emit(
                json,
                &certificates::preview(ctx, path, archive, profile, password).await?,
            ),
            CertsCommand::Revoke { uuid } => emit(json, &certificates::revoke(ctx, uuid).await?),
        },

        Command::Expiration(cmd) => match cmd {
            ExpirationCommand::SetAll { days } => emit(json, &expiration::set_all(ctx, days).await?),
            ExpirationCommand::ClearAll => emit(json, &expiration::clear_all(ctx).await?),
            ExpirationCommand::Stats => emit(json, &expiration::stats(ctx).await?),
        },

        Command::Prefs(cmd) => match cmd {
            PrefsCommand::Show => emit(json, &preferences::show(ctx).await?),
            PrefsCommand::Set {
                auto_delete,
                auto_delete_days,
                import_pause_ms,
            } => emit(
                json,
                &preferences::set(ctx, auto_delete, auto_delete_days, import_pause_ms).await?,
            ),
        },
    }
}
