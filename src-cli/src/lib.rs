//! appkeep command-line shell.
//!
//! Opens the library, runs the startup cleanup hook, dispatches one
//! command, and prints its result.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod cli;
pub mod commands;
pub mod logging;
pub mod output;
pub mod state;

use cli::Cli;
use state::AppContext;

/// Run one invocation.
///
/// # Errors
///
/// Returns the command's error, with context, for `main` to report.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let data_dir = cli.data_dir.clone().unwrap_or_else(state::default_data_dir);
    let _log_guard = logging::init(&data_dir.join("logs"))?;

    let ctx = AppContext::open(&data_dir, cli.json, cli.yes)?;
    let result = async {
        let startup = ctx.startup().await?;
        commands::dispatch(&ctx, cli.command, startup).await
    }
    .await;
    ctx.close().await;

    if let Err(e) = &result {
        tracing::error!("{e:#}");
    }
    result
}
