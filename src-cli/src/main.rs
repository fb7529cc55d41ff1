use clap::Parser;

use appkeep::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    appkeep::run(Cli::parse()).await
}
