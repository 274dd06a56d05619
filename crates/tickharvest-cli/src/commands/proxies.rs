use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tickharvest_core::pipeline::ProxyPipeline;
use tickharvest_core::{CancelSignal, HttpClient, PipelineConfig};

use crate::cli::ProxiesArgs;
use crate::error::CliError;

use super::{apply_harvest_args, CommandOutcome};

#[derive(Debug, Serialize)]
struct ProxiesSummary {
    output: String,
    count: usize,
    tested: usize,
    success_rate: f64,
    candidates: usize,
    sources: usize,
    healthy_sources: usize,
    early_stopped: bool,
    cancelled: bool,
}

pub async fn run(
    args: &ProxiesArgs,
    mut config: PipelineConfig,
    client: Arc<dyn HttpClient>,
    cancel: &CancelSignal,
) -> Result<CommandOutcome, CliError> {
    if let Some(workers) = args.workers {
        config.validator.concurrency = workers;
    }
    if let Some(timeout_secs) = args.timeout_secs {
        config.validator.timeout = Duration::from_secs(timeout_secs);
    }
    apply_harvest_args(&mut config, &args.harvest);
    config.validate()?;

    let harvest = ProxyPipeline::new(client, &config)
        .build_pool(Some(cancel))
        .await?;
    let artifact = harvest.artifact();
    artifact.save(&args.output)?;

    let summary = ProxiesSummary {
        output: args.output.display().to_string(),
        count: artifact.count,
        tested: artifact.tested,
        success_rate: artifact.success_rate,
        candidates: harvest.aggregation.candidates.len(),
        sources: harvest.aggregation.sources.len(),
        healthy_sources: harvest
            .aggregation
            .sources
            .iter()
            .filter(|report| report.is_ok())
            .count(),
        early_stopped: harvest.validation.early_stopped,
        cancelled: harvest.validation.cancelled,
    };

    Ok(CommandOutcome {
        targets_met: summary.count > 0,
        summary: serde_json::to_value(summary)?,
    })
}
