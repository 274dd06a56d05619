//! # Proxy Source Aggregation
//!
//! Fetches public proxy lists concurrently and folds them into one
//! de-duplicated candidate set.
//!
//! A source that times out, answers non-2xx or yields no entries contributes
//! nothing; it is recorded in its [`SourceReport`] and logged, never raised.
//! There are no retries at this layer.

mod parser;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::http_client::{execute_with_deadline, HttpClient, HttpRequest};
use crate::throttling::RequestPacer;
use crate::{CoreError, FetchError, ProxyAddress, ProxyCandidate};

pub use parser::{parse_body, parse_csv, parse_json, parse_text, SourceFormat};

/// One configured proxy list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub url: String,
    #[serde(default)]
    pub format: SourceFormat,
}

impl SourceSpec {
    pub fn new(url: impl Into<String>, format: SourceFormat) -> Self {
        Self {
            url: url.into(),
            format,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub sources: Vec<SourceSpec>,
    pub concurrency: usize,
    #[serde(rename = "per_source_timeout_ms", with = "crate::retry::millis")]
    pub per_source_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            concurrency: 8,
            per_source_timeout: Duration::from_secs(15),
        }
    }
}

/// Outcome of fetching a single source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceReport {
    pub url: String,
    pub entries: usize,
    pub elapsed_ms: u64,
    pub error: Option<FetchError>,
}

impl SourceReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Union of every source, plus what each source contributed.
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub candidates: Vec<ProxyCandidate>,
    pub sources: Vec<SourceReport>,
}

impl Aggregation {
    pub fn addresses(&self) -> HashSet<ProxyAddress> {
        self.candidates
            .iter()
            .map(|candidate| candidate.address.clone())
            .collect()
    }
}

pub struct ProxySourceAggregator {
    client: Arc<dyn HttpClient>,
    config: AggregatorConfig,
    pacer: Option<RequestPacer>,
}

impl ProxySourceAggregator {
    pub fn new(client: Arc<dyn HttpClient>, config: AggregatorConfig) -> Self {
        Self {
            client,
            config,
            pacer: None,
        }
    }

    pub fn with_pacer(mut self, pacer: RequestPacer) -> Self {
        self.pacer = Some(pacer);
        self
    }

    /// Fetch every configured source and return the de-duplicated union.
    ///
    /// Candidate order is unspecified; callers shuffle before validating.
    pub async fn fetch_all(&self) -> Result<Aggregation, CoreError> {
        if self.config.sources.is_empty() {
            return Err(CoreError::NoSources);
        }

        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (index, source) in self.config.sources.iter().cloned().enumerate() {
            let client = Arc::clone(&self.client);
            let semaphore = Arc::clone(&semaphore);
            let pacer = self.pacer.clone();
            let timeout = self.config.per_source_timeout;

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                if let Some(pacer) = &pacer {
                    pacer.ready().await;
                }
                let (report, addresses) = fetch_source(client.as_ref(), &source, timeout).await;
                (index, report, addresses)
            });
        }

        let mut fetched = Vec::with_capacity(self.config.sources.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(entry) => fetched.push(entry),
                Err(error) => tracing::warn!(error = %error, "source task did not complete"),
            }
        }
        fetched.sort_by_key(|(index, _, _)| *index);

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        let mut sources = Vec::with_capacity(fetched.len());
        for (_, report, addresses) in fetched {
            for address in addresses {
                if seen.insert(address.clone()) {
                    candidates.push(ProxyCandidate::new(address, report.url.clone()));
                }
            }
            sources.push(report);
        }

        tracing::info!(
            sources = sources.len(),
            healthy_sources = sources.iter().filter(|report| report.is_ok()).count(),
            candidates = candidates.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "proxy sources aggregated"
        );

        Ok(Aggregation {
            candidates,
            sources,
        })
    }
}

async fn fetch_source(
    client: &dyn HttpClient,
    source: &SourceSpec,
    timeout: Duration,
) -> (SourceReport, Vec<ProxyAddress>) {
    let started = Instant::now();
    let request = HttpRequest::get(source.url.clone()).with_timeout(timeout);

    let outcome = match execute_with_deadline(client, request).await {
        Err(error) => Err(FetchError::source_unreachable(format!(
            "{}: {}",
            source.url,
            error.message()
        ))),
        Ok(response) if !response.is_success() => Err(FetchError::http_status(response.status)),
        Ok(response) => {
            let addresses = parse_body(&response.body, source.format);
            if addresses.is_empty() {
                Err(FetchError::malformed(format!(
                    "{}: no proxy entries found",
                    source.url
                )))
            } else {
                Ok(addresses)
            }
        }
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match outcome {
        Ok(addresses) => {
            tracing::debug!(url = %source.url, entries = addresses.len(), elapsed_ms, "source fetched");
            (
                SourceReport {
                    url: source.url.clone(),
                    entries: addresses.len(),
                    elapsed_ms,
                    error: None,
                },
                addresses,
            )
        }
        Err(error) => {
            tracing::warn!(url = %source.url, kind = %error.kind(), error = %error, "source skipped");
            (
                SourceReport {
                    url: source.url.clone(),
                    entries: 0,
                    elapsed_ms,
                    error: Some(error),
                },
                Vec::new(),
            )
        }
    }
}
