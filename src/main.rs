use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

use epubshelf::cli::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    epubshelf::logging::init(cli.verbose).context("init logging")?;
    tracing::debug!(?cli, "parsed cli");

    let mut stdout = std::io::stdout();
    match cli.command {
        Command::Manifest(args) => {
            epubshelf::manifest::run(args).context("manifest")?;
        }
        Command::Search(args) => {
            epubshelf::browse::search(args, &mut stdout).context("search")?;
        }
        Command::Genres(args) => {
            epubshelf::browse::genres(args, &mut stdout).context("genres")?;
        }
        Command::Show(args) => {
            epubshelf::browse::show(args, &mut stdout).context("show")?;
        }
        Command::Recommend(args) => {
            epubshelf::browse::recommend(args, &mut stdout).context("recommend")?;
        }
        Command::Read(args) => {
            epubshelf::read::run(args, &mut stdout).await.context("read")?;
        }
    }

    Ok(())
}
