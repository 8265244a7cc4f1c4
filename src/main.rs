use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

use sitescore::cli::{Cli, Command};
use sitescore::commands;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    sitescore::logging::init().context("init logging")?;

    let cli = Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        Command::Score(args) => commands::score(args).context("score")?,
        Command::Normalize(args) => commands::normalize(args).context("normalize")?,
        Command::Variants(args) => commands::variants(args).context("variants")?,
        Command::Crawl(args) => commands::crawl(args).await.context("crawl")?,
        Command::Enqueue(args) => commands::enqueue(args).await.context("enqueue")?,
        Command::Worker(args) => commands::worker(args).await.context("worker")?,
    }

    Ok(())
}
