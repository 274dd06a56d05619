mod fetch;
mod proxies;

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tickharvest_core::{CancelSignal, HttpClient, PipelineConfig, ReqwestHttpClient};

use crate::cli::{Cli, Command, HarvestArgs};
use crate::error::CliError;

/// Printed summary plus whether the run met its targets.
pub struct CommandOutcome {
    pub summary: Value,
    pub targets_met: bool,
}

pub async fn run(cli: &Cli, cancel: CancelSignal) -> Result<CommandOutcome, CliError> {
    let config = load_config(cli.config.as_deref())?;
    let client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());

    match &cli.command {
        Command::Proxies(args) => proxies::run(args, config, client, &cancel).await,
        Command::Fetch(args) => fetch::run(args, config, client, &cancel).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, CliError> {
    match path {
        Some(path) => Ok(PipelineConfig::from_json_file(path)?),
        None => Ok(PipelineConfig::default()),
    }
}

fn apply_harvest_args(config: &mut PipelineConfig, args: &HarvestArgs) {
    if let Some(min_working) = args.min_working {
        config.validator.min_working = min_working;
    }
    if let Some(max_candidates) = args.max_candidates {
        config.validator.max_candidates = max_candidates;
    }
}
