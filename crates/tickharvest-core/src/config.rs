//! Pipeline configuration loaded from a single JSON file.
//!
//! Every section and field is optional; omitted values take their defaults.
//!
//! ```json
//! {
//!   "aggregator": { "concurrency": 8, "per_source_timeout_ms": 15000,
//!                   "sources": [{ "url": "https://lists.example/http.txt", "format": "text" }] },
//!   "validator":  { "min_working": 20, "concurrency": 50, "timeout_ms": 8000 },
//!   "pool":       { "failure_threshold": 3, "ttl_secs": 900 },
//!   "retrieval":  { "max_workers": 32, "max_retries_per_symbol": 3,
//!                   "backoff": { "strategy": "fixed", "delay": 250 } },
//!   "sla":        { "min_success_rate": 95.0, "max_elapsed_secs": 180 }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::pool::PoolConfig;
use crate::quote_api::QuoteEndpoint;
use crate::report::SlaTargets;
use crate::retrieval::RetrievalConfig;
use crate::sources::{AggregatorConfig, SourceFormat, SourceSpec};
use crate::validator::ValidatorConfig;
use crate::CoreError;

/// Self-imposed request rates, in requests per second; `0` disables pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Applies to unproxied calls to the target API.
    pub direct_per_second: u32,
    pub sources_per_second: u32,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            direct_per_second: 5,
            sources_per_second: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub aggregator: AggregatorConfig,
    pub validator: ValidatorConfig,
    pub pool: PoolConfig,
    pub retrieval: RetrievalConfig,
    pub target: QuoteEndpoint,
    pub pacing: PacingConfig,
    pub sla: SlaTargets,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            aggregator: AggregatorConfig {
                sources: default_sources(),
                ..AggregatorConfig::default()
            },
            validator: ValidatorConfig::default(),
            pool: PoolConfig::default(),
            retrieval: RetrievalConfig::default(),
            target: QuoteEndpoint::default(),
            pacing: PacingConfig::default(),
            sla: SlaTargets::default(),
        }
    }
}

/// Public HTTP proxy lists used when no sources are configured.
pub fn default_sources() -> Vec<SourceSpec> {
    vec![
        SourceSpec::new(
            "https://raw.githubusercontent.com/TheSpeedX/PROXY-List/master/http.txt",
            SourceFormat::Text,
        ),
        SourceSpec::new(
            "https://raw.githubusercontent.com/monosans/proxy-list/main/proxies/http.txt",
            SourceFormat::Text,
        ),
        SourceSpec::new(
            "https://raw.githubusercontent.com/clarketm/proxy-list/master/proxy-list-raw.txt",
            SourceFormat::Text,
        ),
        SourceSpec::new(
            "https://api.proxyscrape.com/v2/?request=getproxies&protocol=http&timeout=10000&country=all",
            SourceFormat::Text,
        ),
        SourceSpec::new(
            "https://proxylist.geonode.com/api/proxy-list?limit=500&page=1&sort_by=lastChecked&sort_type=desc&protocols=http",
            SourceFormat::Json,
        ),
    ]
}

impl PipelineConfig {
    /// Load and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make a run meaningless before any work
    /// starts.
    pub fn validate(&self) -> Result<(), CoreError> {
        let invalid = |message: &str| Err(CoreError::InvalidConfig(message.to_owned()));

        if self.aggregator.concurrency == 0 {
            return invalid("aggregator.concurrency must be at least 1");
        }
        if self.aggregator.per_source_timeout.is_zero() {
            return invalid("aggregator.per_source_timeout_ms must be positive");
        }
        if self.validator.concurrency == 0 {
            return invalid("validator.concurrency must be at least 1");
        }
        if self.validator.timeout.is_zero() {
            return invalid("validator.timeout_ms must be positive");
        }
        if self.validator.probe_symbols.is_empty() {
            return invalid("validator.probe_symbols must not be empty");
        }
        if self.validator.max_candidates == 0 {
            return invalid("validator.max_candidates must be at least 1");
        }
        if self.pool.failure_threshold == 0 {
            return invalid("pool.failure_threshold must be at least 1");
        }
        if self.retrieval.max_workers == 0 {
            return invalid("retrieval.max_workers must be at least 1");
        }
        if self.retrieval.max_retries_per_symbol == 0 {
            return invalid("retrieval.max_retries_per_symbol must be at least 1");
        }
        if self.retrieval.per_attempt_timeout.is_zero() {
            return invalid("retrieval.per_attempt_timeout_ms must be positive");
        }
        if !self.target.has_placeholder() {
            return invalid("target.url_template must contain {symbol}");
        }
        if !(0.0..=100.0).contains(&self.sla.min_success_rate) {
            return invalid("sla.min_success_rate must be within 0..=100");
        }
        Ok(())
    }
}
