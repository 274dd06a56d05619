use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tickharvest_core::pipeline::{retrieval_engine, retrieve, ProxyPipeline};
use tickharvest_core::{
    write_report, CancelSignal, HttpClient, PipelineConfig, ProxyArtifact, ProxyPool,
    ReportFormat, RunReport, Symbol, ValidationError,
};

use crate::cli::FetchArgs;
use crate::error::CliError;

use super::{apply_harvest_args, CommandOutcome};

pub async fn run(
    args: &FetchArgs,
    mut config: PipelineConfig,
    client: Arc<dyn HttpClient>,
    cancel: &CancelSignal,
) -> Result<CommandOutcome, CliError> {
    apply_overrides(&mut config, args);
    config.validate()?;

    let symbols = collect_symbols(args)?;
    let format = args
        .output
        .as_deref()
        .map(|path| {
            ReportFormat::from_path(path).ok_or_else(|| {
                CliError::Command(format!(
                    "cannot infer report format from '{}'; use .json or .csv",
                    path.display()
                ))
            })
        })
        .transpose()?;

    let pool = if let Some(path) = &args.proxies {
        let artifact = ProxyArtifact::load(path)?;
        Some(Arc::new(ProxyPool::from_artifact(&artifact, config.pool)))
    } else if args.harvest {
        let harvest = ProxyPipeline::new(Arc::clone(&client), &config)
            .build_pool(Some(cancel))
            .await?;
        Some(harvest.pool)
    } else {
        None
    };

    let mut engine = retrieval_engine(client, &config).with_cancel(cancel.clone());
    if let Some(pool) = pool {
        engine = engine.with_pool(pool);
    }

    let outcome = retrieve(&engine, &symbols).await?;
    let report = RunReport::from_outcome(&outcome, config.sla);
    let targets_met = report.sla.met();

    let summary = match (&args.output, format) {
        (Some(path), Some(format)) => {
            write_report(path, format, &report)?;
            json!({
                "run_id": report.run_id,
                "output": path.display().to_string(),
                "statistics": report.statistics,
                "sla": report.sla,
            })
        }
        _ => serde_json::to_value(&report)?,
    };

    Ok(CommandOutcome {
        summary,
        targets_met,
    })
}

fn apply_overrides(config: &mut PipelineConfig, args: &FetchArgs) {
    if let Some(workers) = args.workers {
        config.retrieval.max_workers = workers;
    }
    if let Some(timeout_secs) = args.timeout_secs {
        config.retrieval.per_attempt_timeout = Duration::from_secs(timeout_secs);
    }
    if let Some(retries) = args.retries {
        config.retrieval.max_retries_per_symbol = retries;
    }
    if let Some(min_success_rate) = args.min_success_rate {
        config.sla.min_success_rate = min_success_rate;
    }
    if let Some(time_budget_secs) = args.time_budget_secs {
        config.sla.max_elapsed_secs = time_budget_secs;
    }
    apply_harvest_args(config, &args.harvest_args);
}

fn collect_symbols(args: &FetchArgs) -> Result<Vec<Symbol>, CliError> {
    let mut symbols = args
        .symbols
        .iter()
        .map(|raw| Symbol::parse(raw))
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(path) = &args.symbols_file {
        let contents = std::fs::read_to_string(path)?;
        symbols.extend(parse_symbol_list(&contents)?);
    }
    Ok(symbols)
}

fn parse_symbol_list(contents: &str) -> Result<Vec<Symbol>, ValidationError> {
    contents
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default())
        .flat_map(|line| line.split(|ch: char| ch == ',' || ch.is_whitespace()))
        .filter(|token| !token.is_empty())
        .map(Symbol::parse)
        .collect()
}
