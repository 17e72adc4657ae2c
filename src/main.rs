use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    let cli = chapterbind::cli::Cli::parse();
    chapterbind::logging::init(cli.verbose).context("init logging")?;
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        chapterbind::cli::Command::Download(args) => {
            chapterbind::download::run(args).await.context("download")?;
        }
        chapterbind::cli::Command::Status(args) => {
            chapterbind::download::status(args).await.context("status")?;
        }
    }

    Ok(())
}
