//! # Tickharvest Core
//!
//! Resilient concurrent acquisition of per-ticker quotes through a
//! self-maintained pool of public HTTP proxies.
//!
//! ## Overview
//!
//! - **Source aggregation** of untrusted public proxy lists (text, CSV, JSON)
//! - **Two-stage validation** of candidates against the real target API, with
//!   a soft early stop once enough proxies are confirmed
//! - **Proxy pool** with shared round-robin selection, failure-threshold and
//!   TTL eviction, and a persisted JSON artifact
//! - **Retrieval engine**: bounded workers, per-attempt timeouts, retries with
//!   backoff, exactly one result per symbol
//! - **Reporting**: success and quality rates, SLA verdicts, JSON/CSV sinks
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cancel`] | Batch-level cancellation signal |
//! | [`config`] | Pipeline configuration and validation |
//! | [`domain`] | Symbols, proxy addresses, quote payloads, results |
//! | [`error`] | Setup errors and the run-time failure taxonomy |
//! | [`http_client`] | HTTP transport seam and reqwest implementation |
//! | [`logging`] | Tracing subscriber setup |
//! | [`pipeline`] | Harvest → validate → pool wiring |
//! | [`pool`] | Thread-safe proxy pool and artifact |
//! | [`quote_api`] | Target API endpoint and response parsing |
//! | [`report`] | Run statistics, SLA verdicts, result sinks |
//! | [`retrieval`] | Batch retrieval worker pool |
//! | [`retry`] | Attempt budget and backoff |
//! | [`sources`] | Proxy list fetching and parsing |
//! | [`throttling`] | Self-imposed request pacing |
//! | [`validator`] | Two-stage proxy validation |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tickharvest_core::{pipeline, PipelineConfig, ReqwestHttpClient, Symbol};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::default();
//!     let client = Arc::new(ReqwestHttpClient::new());
//!
//!     let harvest = pipeline::ProxyPipeline::new(client.clone(), &config)
//!         .build_pool(None)
//!         .await?;
//!     let engine = pipeline::retrieval_engine(client, &config).with_pool(harvest.pool);
//!
//!     let outcome = pipeline::retrieve(&engine, &[Symbol::parse("AAPL")?]).await?;
//!     println!("success rate: {}%", outcome.statistics.success_rate);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   candidates   ┌──────────────────┐
//! │ Source Aggregator│───────────────▶│ Proxy Validator  │
//! └──────────────────┘   (shuffled)   └────────┬─────────┘
//!                                              │ working
//!                                              ▼
//! ┌──────────────────┐   pick/report  ┌──────────────────┐
//! │ Retrieval Engine │◀──────────────▶│ Proxy Pool       │──▶ artifact.json
//! └────────┬─────────┘                └──────────────────┘
//!          │ FetchResult per symbol
//!          ▼
//! ┌──────────────────┐
//! │ Run Reporter     │──▶ report.json / report.csv
//! └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Only configuration problems surface as [`CoreError`], and only before work
//! starts. Everything that fails during a run is classified as a
//! [`FetchError`] and folded into the affected result:
//!
//! ```rust
//! use tickharvest_core::{ErrorKind, FetchError};
//!
//! fn describe(error: &FetchError) -> &'static str {
//!     match error.kind() {
//!         ErrorKind::Timeout | ErrorKind::ConnectionRefusedOrReset => "transport",
//!         ErrorKind::MalformedResponse | ErrorKind::IncompletePayload => "payload",
//!         ErrorKind::Cancelled => "cancelled",
//!         _ => "other",
//!     }
//! }
//!
//! assert_eq!(describe(&FetchError::timeout("slow")), "transport");
//! ```

pub mod cancel;
pub mod config;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod logging;
pub mod pipeline;
pub mod pool;
pub mod quote_api;
pub mod report;
pub mod retrieval;
pub mod retry;
pub mod sources;
pub mod throttling;
pub mod validator;

pub use cancel::CancelSignal;
pub use config::{PacingConfig, PipelineConfig};
pub use domain::{
    FetchResult, FetchTask, ProxyAddress, ProxyCandidate, QuotePayload, Symbol, UtcDateTime,
    ValidatedProxy,
};
pub use error::{CoreError, ErrorKind, FetchError, ValidationError};
pub use http_client::{
    HttpClient, HttpError, HttpErrorKind, HttpFuture, HttpRequest, HttpResponse,
    ReqwestHttpClient,
};
pub use pool::{PoolConfig, ProxyArtifact, ProxyPool};
pub use quote_api::QuoteEndpoint;
pub use report::{
    compute_statistics, write_report, ReportFormat, RunReport, RunStatistics, SlaTargets,
    SlaVerdict,
};
pub use retrieval::{RetrievalConfig, RetrievalWorkerPool, RunOutcome};
pub use retry::{Backoff, RetryPolicy};
pub use sources::{AggregatorConfig, ProxySourceAggregator, SourceFormat, SourceSpec};
pub use throttling::RequestPacer;
pub use validator::{ProxyValidator, ValidationReport, ValidatorConfig};
