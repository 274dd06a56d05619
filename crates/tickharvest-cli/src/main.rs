mod cli;
mod commands;
mod error;

use clap::Parser;
use std::process::ExitCode;

use tickharvest_core::{logging, CancelSignal};

use crate::cli::Cli;
use crate::error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, CliError> {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level, cli.log_dir.as_deref())
        .map_err(|error| CliError::Logging(error.to_string()))?;

    let cancel = CancelSignal::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling outstanding work");
                cancel.cancel();
            }
        });
    }

    let outcome = commands::run(&cli, cancel).await?;
    let rendered = if cli.pretty {
        serde_json::to_string_pretty(&outcome.summary)?
    } else {
        serde_json::to_string(&outcome.summary)?
    };
    println!("{rendered}");

    if !outcome.targets_met {
        return Ok(ExitCode::from(1));
    }
    Ok(ExitCode::SUCCESS)
}
