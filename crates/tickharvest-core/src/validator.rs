//! Two-stage proxy validation with a soft early stop.
//!
//! Stage 1 is a generic reachability probe through the candidate; only
//! candidates that pass it are sent to the target API (stage 2), where both a
//! 200 status and the configured marker fields are required.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use crate::cancel::CancelSignal;
use crate::http_client::{execute_with_deadline, HttpClient, HttpRequest};
use crate::quote_api::{contains_markers, QuoteEndpoint};
use crate::{FetchError, ProxyAddress, ProxyCandidate, Symbol, ValidatedProxy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Any endpoint that answers 200 quickly.
    pub probe_url: String,
    /// Symbols requested through the candidate during stage 2.
    pub probe_symbols: Vec<Symbol>,
    /// Every marker must appear in the stage-2 body.
    pub markers: Vec<String>,
    #[serde(rename = "timeout_ms", with = "crate::retry::millis")]
    pub timeout: Duration,
    pub concurrency: usize,
    /// Stop dispatching once this many proxies are confirmed; `0` disables
    /// the early stop.
    pub min_working: usize,
    pub max_candidates: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            probe_url: String::from("https://httpbin.org/ip"),
            probe_symbols: Symbol::parse("AAPL").into_iter().collect(),
            markers: vec![String::from("regularMarketPrice")],
            timeout: Duration::from_secs(8),
            concurrency: 50,
            min_working: 20,
            max_candidates: 1_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStage {
    Probe,
    Target,
}

/// Verdict for one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub address: ProxyAddress,
    pub working: bool,
    pub latency_ms: u64,
    pub failed_stage: Option<ValidationStage>,
    pub error: Option<FetchError>,
}

/// Aggregate tallies of a batch validation.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub working: Vec<ValidatedProxy>,
    pub dispatched: usize,
    pub tested: usize,
    pub passed: usize,
    pub failed: usize,
    pub stage1_failures: usize,
    pub stage2_failures: usize,
    pub elapsed: Duration,
    pub early_stopped: bool,
    pub cancelled: bool,
}

impl ValidationReport {
    /// Percentage of tested candidates that passed, rounded to 2 decimals.
    pub fn success_rate(&self) -> f64 {
        if self.tested == 0 {
            return 0.0;
        }
        let rate = self.passed as f64 / self.tested as f64 * 100.0;
        (rate * 100.0).round() / 100.0
    }

    fn record(&mut self, outcome: ValidationOutcome) {
        self.tested += 1;
        if outcome.working {
            self.passed += 1;
            self.working
                .push(ValidatedProxy::new(outcome.address, outcome.latency_ms));
            return;
        }

        self.failed += 1;
        match outcome.failed_stage {
            Some(ValidationStage::Probe) => self.stage1_failures += 1,
            Some(ValidationStage::Target) => self.stage2_failures += 1,
            None => {}
        }
    }
}

#[derive(Clone)]
pub struct ProxyValidator {
    client: Arc<dyn HttpClient>,
    endpoint: QuoteEndpoint,
    config: ValidatorConfig,
}

impl ProxyValidator {
    pub fn new(client: Arc<dyn HttpClient>, endpoint: QuoteEndpoint, config: ValidatorConfig) -> Self {
        Self {
            client,
            endpoint,
            config,
        }
    }

    /// Validate a single candidate through both stages.
    pub async fn validate_one(&self, address: &ProxyAddress) -> ValidationOutcome {
        let started = Instant::now();
        let verdict = match self.probe(address).await {
            Err(error) => Err((ValidationStage::Probe, error)),
            Ok(()) => self
                .check_target(address)
                .await
                .map_err(|error| (ValidationStage::Target, error)),
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        match verdict {
            Ok(()) => {
                tracing::debug!(proxy = %address, latency_ms, "proxy validated");
                ValidationOutcome {
                    address: address.clone(),
                    working: true,
                    latency_ms,
                    failed_stage: None,
                    error: None,
                }
            }
            Err((stage, error)) => {
                tracing::debug!(proxy = %address, ?stage, kind = %error.kind(), "proxy rejected");
                self.client.release_proxy(address);
                ValidationOutcome {
                    address: address.clone(),
                    working: false,
                    latency_ms,
                    failed_stage: Some(stage),
                    error: Some(error),
                }
            }
        }
    }

    async fn probe(&self, address: &ProxyAddress) -> Result<(), FetchError> {
        let request = HttpRequest::get(self.config.probe_url.clone())
            .with_timeout(self.config.timeout)
            .via_proxy(Some(address.clone()));

        match execute_with_deadline(self.client.as_ref(), request).await {
            Ok(response) if response.is_success() => Ok(()),
            Ok(response) => Err(FetchError::probe_failed(format!(
                "probe answered status {}",
                response.status
            ))),
            Err(error) => Err(FetchError::probe_failed(format!(
                "probe failed: {}",
                error.message()
            ))),
        }
    }

    async fn check_target(&self, address: &ProxyAddress) -> Result<(), FetchError> {
        for symbol in &self.config.probe_symbols {
            let request =
                self.endpoint
                    .request_for(symbol, self.config.timeout, Some(address.clone()));
            let response = execute_with_deadline(self.client.as_ref(), request)
                .await
                .map_err(|error| error.into_fetch_error())?;

            if response.status != 200 {
                return Err(FetchError::http_status(response.status));
            }
            if !contains_markers(&response.body, &self.config.markers) {
                return Err(FetchError::malformed(format!(
                    "target response for {symbol} lacks marker fields"
                )));
            }
        }
        Ok(())
    }

    /// Validate candidates with bounded concurrency.
    ///
    /// Dispatch stops once `min_working` proxies are confirmed or `cancel`
    /// fires; validations already in flight always run to completion.
    pub async fn validate_all(
        &self,
        candidates: Vec<ProxyCandidate>,
        cancel: Option<&CancelSignal>,
    ) -> ValidationReport {
        let started = Instant::now();
        let concurrency = self.config.concurrency.max(1);
        let floor = self.config.min_working;
        let mut queue = candidates.into_iter().take(self.config.max_candidates);
        let mut tasks = JoinSet::new();
        let mut report = ValidationReport::default();

        loop {
            while tasks.len() >= concurrency {
                if let Some(joined) = tasks.join_next().await {
                    collect(&mut report, joined);
                }
            }

            if floor > 0 && report.working.len() >= floor {
                report.early_stopped = true;
                break;
            }
            if cancel.is_some_and(CancelSignal::is_cancelled) {
                report.cancelled = true;
                break;
            }

            let Some(candidate) = queue.next() else {
                break;
            };
            let validator = self.clone();
            tasks.spawn(async move { validator.validate_one(&candidate.address).await });
            report.dispatched += 1;
        }

        while let Some(joined) = tasks.join_next().await {
            collect(&mut report, joined);
        }
        report.elapsed = started.elapsed();

        tracing::info!(
            dispatched = report.dispatched,
            tested = report.tested,
            passed = report.passed,
            stage1_failures = report.stage1_failures,
            stage2_failures = report.stage2_failures,
            success_rate = report.success_rate(),
            early_stopped = report.early_stopped,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "proxy validation finished"
        );
        report
    }
}

fn collect(
    report: &mut ValidationReport,
    joined: Result<ValidationOutcome, tokio::task::JoinError>,
) {
    match joined {
        Ok(outcome) => report.record(outcome),
        Err(error) => {
            tracing::warn!(error = %error, "validation task did not complete");
            report.tested += 1;
            report.failed += 1;
        }
    }
}
