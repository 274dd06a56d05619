//! Run statistics, SLA verdicts and result sinks.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::retrieval::RunOutcome;
use crate::{CoreError, ErrorKind, FetchResult, UtcDateTime};

/// Aggregate view of one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub total_symbols: usize,
    pub successful: usize,
    pub failed: usize,
    /// Percent of symbols fetched successfully.
    pub success_rate: f64,
    /// Percent of successful results carrying every enrichment field.
    pub quality_rate: f64,
    pub elapsed_seconds: f64,
    pub rate_per_second: f64,
    pub proxied: bool,
}

pub fn compute_statistics(results: &[FetchResult], elapsed: Duration, proxied: bool) -> RunStatistics {
    let total_symbols = results.len();
    let successful = results.iter().filter(|result| result.success).count();
    let enriched = results
        .iter()
        .filter(|result| result.success && result.is_enriched())
        .count();
    let elapsed_seconds = elapsed.as_secs_f64();

    RunStatistics {
        total_symbols,
        successful,
        failed: total_symbols - successful,
        success_rate: percent(successful, total_symbols),
        quality_rate: percent(enriched, successful),
        elapsed_seconds: round2(elapsed_seconds),
        rate_per_second: if elapsed_seconds > 0.0 {
            round2(total_symbols as f64 / elapsed_seconds)
        } else {
            0.0
        },
        proxied,
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round2(part as f64 / whole as f64 * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Targets a run is judged against after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlaTargets {
    pub min_success_rate: f64,
    pub max_elapsed_secs: u64,
}

impl Default for SlaTargets {
    fn default() -> Self {
        Self {
            min_success_rate: 95.0,
            max_elapsed_secs: 180,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlaVerdict {
    pub targets: SlaTargets,
    pub success_rate_met: bool,
    pub time_budget_met: bool,
}

impl SlaVerdict {
    pub fn evaluate(statistics: &RunStatistics, targets: SlaTargets) -> Self {
        Self {
            targets,
            success_rate_met: statistics.success_rate >= targets.min_success_rate,
            time_budget_met: statistics.elapsed_seconds <= targets.max_elapsed_secs as f64,
        }
    }

    pub const fn met(&self) -> bool {
        self.success_rate_met && self.time_budget_met
    }
}

/// Flat per-symbol record shared by the JSON and CSV sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub symbol: String,
    pub success: bool,
    pub current_price: Option<f64>,
    pub volume: Option<u64>,
    pub change_percent: Option<f64>,
    pub previous_close: Option<f64>,
    pub open: Option<f64>,
    pub day_high: Option<f64>,
    pub day_low: Option<f64>,
    pub currency: Option<String>,
    pub market_cap: Option<f64>,
    pub fifty_two_week_high: Option<f64>,
    pub fifty_two_week_low: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub attempts: u32,
    pub latency_ms: u64,
    pub proxy: Option<String>,
}

const CSV_COLUMNS: [&str; 19] = [
    "symbol",
    "success",
    "current_price",
    "volume",
    "change_percent",
    "previous_close",
    "open",
    "day_high",
    "day_low",
    "currency",
    "market_cap",
    "fifty_two_week_high",
    "fifty_two_week_low",
    "pe_ratio",
    "error_kind",
    "error_message",
    "attempts",
    "latency_ms",
    "proxy",
];

impl From<&FetchResult> for ResultRecord {
    fn from(result: &FetchResult) -> Self {
        let payload = result.payload.as_ref();
        Self {
            symbol: result.symbol.to_string(),
            success: result.success,
            current_price: payload.map(|payload| payload.current_price),
            volume: payload.map(|payload| payload.volume),
            change_percent: payload.and_then(|payload| payload.change_percent),
            previous_close: payload.and_then(|payload| payload.previous_close),
            open: payload.and_then(|payload| payload.open),
            day_high: payload.and_then(|payload| payload.day_high),
            day_low: payload.and_then(|payload| payload.day_low),
            currency: payload.and_then(|payload| payload.currency.clone()),
            market_cap: payload.and_then(|payload| payload.market_cap),
            fifty_two_week_high: payload.and_then(|payload| payload.fifty_two_week_high),
            fifty_two_week_low: payload.and_then(|payload| payload.fifty_two_week_low),
            pe_ratio: payload.and_then(|payload| payload.pe_ratio),
            error_kind: result.error_kind,
            error_message: result.error_message.clone(),
            attempts: result.attempts_used,
            latency_ms: result.latency_ms,
            proxy: result.proxy.as_ref().map(ToString::to_string),
        }
    }
}

/// Complete report document for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: UtcDateTime,
    pub finished_at: UtcDateTime,
    pub statistics: RunStatistics,
    pub sla: SlaVerdict,
    pub results: Vec<ResultRecord>,
}

impl RunReport {
    pub fn from_outcome(outcome: &RunOutcome, targets: SlaTargets) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: outcome.started_at,
            finished_at: outcome.finished_at,
            statistics: outcome.statistics.clone(),
            sla: SlaVerdict::evaluate(&outcome.statistics, targets),
            results: outcome.results.iter().map(ResultRecord::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    Json,
    Csv,
}

impl ReportFormat {
    /// Infer the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "json" => Some(Self::Json),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }
}

pub fn write_report(path: &Path, format: ReportFormat, report: &RunReport) -> Result<(), CoreError> {
    match format {
        ReportFormat::Json => {
            let file = File::create(path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, report)?;
            writer.flush()?;
        }
        ReportFormat::Csv => write_csv(path, &report.results)?,
    }

    tracing::info!(
        path = %path.display(),
        ?format,
        rows = report.results.len(),
        "report written"
    );
    Ok(())
}

fn write_csv(path: &Path, records: &[ResultRecord]) -> Result<(), CoreError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "{}", CSV_COLUMNS.join(","))?;
    for record in records {
        let Value::Object(fields) = serde_json::to_value(record)? else {
            continue;
        };
        let row = CSV_COLUMNS
            .iter()
            .map(|column| fields.get(*column).map(csv_cell).unwrap_or_default())
            .collect::<Vec<_>>();
        writeln!(writer, "{}", row.join(","))?;
    }

    writer.flush()?;
    Ok(())
}

fn csv_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => format!("\"{}\"", text.replace('"', "\"\"")),
        _ => String::new(),
    }
}
