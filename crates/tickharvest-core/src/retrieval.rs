//! # Batch Retrieval
//!
//! Bounded worker pool that turns a symbol list into exactly one
//! [`FetchResult`] per distinct symbol.
//!
//! ```text
//! symbols ──dedup──► JoinSet (≤ max_workers permits)
//!                      │  per attempt: pick proxy ─► GET quote ─► parse
//!                      │  failure: report proxy, back off, retry
//!                      ▼
//!                 results (input order) ──► RunStatistics
//! ```
//!
//! Every failure is folded into the symbol's result; a task that panics or
//! never completes is reported as `cancelled` so completeness always holds.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::cancel::CancelSignal;
use crate::http_client::{execute_with_deadline, HttpClient};
use crate::pool::ProxyPool;
use crate::quote_api::{parse_quote, QuoteEndpoint};
use crate::report::{compute_statistics, RunStatistics};
use crate::retry::{Backoff, RetryPolicy};
use crate::throttling::RequestPacer;
use crate::{FetchError, FetchResult, FetchTask, QuotePayload, Symbol, UtcDateTime};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub max_workers: usize,
    /// Total attempts per symbol, including the first.
    pub max_retries_per_symbol: u32,
    #[serde(rename = "per_attempt_timeout_ms", with = "crate::retry::millis")]
    pub per_attempt_timeout: Duration,
    pub backoff: Backoff,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_workers: 32,
            max_retries_per_symbol: 3,
            per_attempt_timeout: Duration::from_secs(8),
            backoff: Backoff::default(),
        }
    }
}

impl RetrievalConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries_per_symbol,
            backoff: self.backoff,
        }
    }
}

/// Results of one batch run, in input order.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub results: Vec<FetchResult>,
    pub statistics: RunStatistics,
    pub started_at: UtcDateTime,
    pub finished_at: UtcDateTime,
}

/// Shared per-run state handed to every symbol task.
struct AttemptContext {
    client: Arc<dyn HttpClient>,
    endpoint: QuoteEndpoint,
    policy: RetryPolicy,
    per_attempt_timeout: Duration,
    pool: Option<Arc<ProxyPool>>,
    pacer: Option<RequestPacer>,
    cancel: Option<CancelSignal>,
}

pub struct RetrievalWorkerPool {
    client: Arc<dyn HttpClient>,
    endpoint: QuoteEndpoint,
    config: RetrievalConfig,
    pool: Option<Arc<ProxyPool>>,
    pacer: Option<RequestPacer>,
    cancel: Option<CancelSignal>,
}

impl RetrievalWorkerPool {
    pub fn new(client: Arc<dyn HttpClient>, endpoint: QuoteEndpoint, config: RetrievalConfig) -> Self {
        Self {
            client,
            endpoint,
            config,
            pool: None,
            pacer: None,
            cancel: None,
        }
    }

    /// Route attempts through `pool`; an empty pool falls back to direct calls.
    pub fn with_pool(mut self, pool: Arc<ProxyPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Pace unproxied attempts.
    pub fn with_pacer(mut self, pacer: RequestPacer) -> Self {
        self.pacer = Some(pacer);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub async fn run(&self, symbols: &[Symbol]) -> RunOutcome {
        let started_at = UtcDateTime::now();
        let started = Instant::now();

        let mut seen = HashSet::with_capacity(symbols.len());
        let symbols = symbols
            .iter()
            .filter(|symbol| seen.insert((*symbol).clone()))
            .cloned()
            .collect::<Vec<_>>();

        tracing::info!(
            symbols = symbols.len(),
            workers = self.config.max_workers,
            proxied = self.pool.is_some(),
            pool_size = self.pool.as_ref().map(|pool| pool.len()).unwrap_or(0),
            "retrieval run started"
        );

        let context = Arc::new(AttemptContext {
            client: Arc::clone(&self.client),
            endpoint: self.endpoint.clone(),
            policy: self.config.retry_policy(),
            per_attempt_timeout: self.config.per_attempt_timeout,
            pool: self.pool.clone(),
            pacer: self.pacer.clone(),
            cancel: self.cancel.clone(),
        });
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut tasks = JoinSet::new();

        for (index, symbol) in symbols.iter().cloned().enumerate() {
            let context = Arc::clone(&context);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = wait_cancelled(context.cancel.as_ref()) => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                let result = match permit {
                    Some(_permit) => fetch_symbol(&context, symbol).await,
                    None => FetchResult::failed(symbol, &FetchError::cancelled(), 0, 0, None),
                };
                (index, result)
            });
        }

        let mut slots: Vec<Option<FetchResult>> = vec![None; symbols.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(error) => tracing::warn!(error = %error, "retrieval task did not complete"),
            }
        }

        let results = slots
            .into_iter()
            .zip(symbols)
            .map(|(slot, symbol)| {
                slot.unwrap_or_else(|| {
                    FetchResult::failed(symbol, &FetchError::cancelled(), 0, 0, None)
                })
            })
            .collect::<Vec<_>>();

        let statistics = compute_statistics(&results, started.elapsed(), self.pool.is_some());
        tracing::info!(
            total = statistics.total_symbols,
            successful = statistics.successful,
            failed = statistics.failed,
            success_rate = statistics.success_rate,
            quality_rate = statistics.quality_rate,
            elapsed_seconds = statistics.elapsed_seconds,
            "retrieval run finished"
        );

        RunOutcome {
            results,
            statistics,
            started_at,
            finished_at: UtcDateTime::now(),
        }
    }
}

async fn wait_cancelled(cancel: Option<&CancelSignal>) {
    match cancel {
        Some(cancel) => cancel.cancelled().await,
        None => std::future::pending().await,
    }
}

async fn fetch_symbol(context: &AttemptContext, symbol: Symbol) -> FetchResult {
    let started = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let task = FetchTask {
            assigned_proxy: context.pool.as_ref().and_then(|pool| pool.pick_one()),
            symbol: symbol.clone(),
            attempt,
        };

        let outcome = tokio::select! {
            biased;
            _ = wait_cancelled(context.cancel.as_ref()) => Err(FetchError::cancelled()),
            outcome = run_attempt(context, &task) => outcome,
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        let error = match outcome {
            Ok(payload) => {
                if let (Some(pool), Some(proxy)) = (&context.pool, &task.assigned_proxy) {
                    pool.report_outcome(proxy, true);
                }
                return FetchResult::succeeded(
                    symbol,
                    payload,
                    attempt,
                    latency_ms,
                    task.assigned_proxy,
                );
            }
            Err(error) => error,
        };

        if let (Some(pool), Some(proxy)) = (&context.pool, &task.assigned_proxy) {
            if error.implicates_proxy() && pool.report_outcome(proxy, false) {
                context.client.release_proxy(proxy);
            }
        }
        tracing::debug!(
            symbol = %symbol,
            attempt,
            proxy = task.assigned_proxy.as_ref().map(ToString::to_string),
            kind = %error.kind(),
            "attempt failed"
        );

        if !context.policy.should_retry(attempt, &error) {
            return FetchResult::failed(symbol, &error, attempt, latency_ms, task.assigned_proxy);
        }

        let delay = context.policy.delay_after_attempt(attempt);
        let interrupted = tokio::select! {
            biased;
            _ = wait_cancelled(context.cancel.as_ref()) => true,
            _ = tokio::time::sleep(delay) => false,
        };
        if interrupted {
            return FetchResult::failed(
                symbol,
                &FetchError::cancelled(),
                attempt,
                started.elapsed().as_millis() as u64,
                task.assigned_proxy,
            );
        }
    }
}

async fn run_attempt(context: &AttemptContext, task: &FetchTask) -> Result<QuotePayload, FetchError> {
    if task.assigned_proxy.is_none() {
        if let Some(pacer) = &context.pacer {
            pacer.ready().await;
        }
    }

    let request = context.endpoint.request_for(
        &task.symbol,
        context.per_attempt_timeout,
        task.assigned_proxy.clone(),
    );
    let response = execute_with_deadline(context.client.as_ref(), request)
        .await
        .map_err(|error| error.into_fetch_error())?;

    if !response.is_success() {
        return Err(FetchError::http_status(response.status));
    }
    parse_quote(&task.symbol, &response.body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::{HttpFuture, HttpRequest, HttpResponse};
    use crate::{ErrorKind, ProxyAddress, ValidatedProxy};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const QUOTE: &str = r#"{"quoteResponse":{"result":[{"regularMarketPrice":10.0,"regularMarketVolume":5}]}}"#;

    struct CountingClient {
        calls: AtomicUsize,
        proxied_calls: AtomicUsize,
        status: u16,
    }

    impl CountingClient {
        fn answering(status: u16) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                proxied_calls: AtomicUsize::new(0),
                status,
            })
        }
    }

    impl HttpClient for CountingClient {
        fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if request.proxy.is_some() {
                    self.proxied_calls.fetch_add(1, Ordering::SeqCst);
                }
                Ok(HttpResponse::new(self.status, QUOTE))
            })
        }
    }

    fn engine(client: Arc<CountingClient>) -> RetrievalWorkerPool {
        RetrievalWorkerPool::new(
            client,
            QuoteEndpoint::new("https://api.test/quote?s={symbol}"),
            RetrievalConfig {
                max_workers: 4,
                max_retries_per_symbol: 3,
                per_attempt_timeout: Duration::from_millis(200),
                backoff: Backoff::Fixed {
                    delay: Duration::from_millis(1),
                },
            },
        )
    }

    fn symbols(raw: &[&str]) -> Vec<Symbol> {
        raw.iter()
            .map(|symbol| Symbol::parse(symbol).expect("valid symbol"))
            .collect()
    }

    #[tokio::test]
    async fn empty_input_yields_empty_outcome() {
        let outcome = engine(CountingClient::answering(200)).run(&[]).await;
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.statistics.total_symbols, 0);
    }

    #[tokio::test]
    async fn duplicate_symbols_are_fetched_once() {
        let client = CountingClient::answering(200);
        let outcome = engine(Arc::clone(&client))
            .run(&symbols(&["AAPL", "MSFT", "aapl"]))
            .await;

        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[0].symbol.as_str(), "AAPL");
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn server_errors_evict_the_proxy_at_threshold() {
        let client = CountingClient::answering(503);
        let pool = Arc::new(ProxyPool::default());
        pool.add(ValidatedProxy::new(
            ProxyAddress::parse("10.0.0.1:8080").expect("valid"),
            5,
        ));

        let outcome = engine(Arc::clone(&client))
            .with_pool(Arc::clone(&pool))
            .run(&symbols(&["AAPL"]))
            .await;

        let result = &outcome.results[0];
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::HttpStatusError));
        assert_eq!(result.attempts_used, 3);
        assert!(pool.is_empty());
        assert_eq!(client.proxied_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn successful_proxied_attempt_records_the_proxy() {
        let pool = Arc::new(ProxyPool::default());
        let address = ProxyAddress::parse("10.0.0.2:3128").expect("valid");
        pool.add(ValidatedProxy::new(address.clone(), 5));

        let outcome = engine(CountingClient::answering(200))
            .with_pool(pool)
            .run(&symbols(&["MSFT"]))
            .await;

        assert_eq!(outcome.results[0].proxy, Some(address));
        assert!(outcome.statistics.proxied);
    }
}
