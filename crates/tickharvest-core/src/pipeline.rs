//! End-to-end wiring: harvest → shuffle → validate → pool, and the guarded
//! retrieval entry point.

use std::sync::Arc;

use crate::cancel::CancelSignal;
use crate::config::PipelineConfig;
use crate::http_client::HttpClient;
use crate::pool::{PoolConfig, ProxyArtifact, ProxyPool};
use crate::retrieval::{RetrievalWorkerPool, RunOutcome};
use crate::sources::{Aggregation, ProxySourceAggregator};
use crate::throttling::RequestPacer;
use crate::validator::{ProxyValidator, ValidationReport};
use crate::{CoreError, Symbol};

/// Result of building a proxy pool.
#[derive(Debug)]
pub struct HarvestOutcome {
    pub pool: Arc<ProxyPool>,
    pub aggregation: Aggregation,
    pub validation: ValidationReport,
}

impl HarvestOutcome {
    pub fn artifact(&self) -> ProxyArtifact {
        self.pool
            .to_artifact(self.validation.tested, self.validation.success_rate())
    }
}

pub struct ProxyPipeline {
    aggregator: ProxySourceAggregator,
    validator: ProxyValidator,
    pool_config: PoolConfig,
}

impl ProxyPipeline {
    pub fn new(client: Arc<dyn HttpClient>, config: &PipelineConfig) -> Self {
        let mut aggregator = ProxySourceAggregator::new(Arc::clone(&client), config.aggregator.clone());
        if config.pacing.sources_per_second > 0 {
            aggregator = aggregator.with_pacer(RequestPacer::per_second(config.pacing.sources_per_second));
        }

        Self {
            aggregator,
            validator: ProxyValidator::new(client, config.target.clone(), config.validator.clone()),
            pool_config: config.pool,
        }
    }

    /// Harvest candidates, validate a shuffled sample and load the survivors
    /// into a fresh pool.
    pub async fn build_pool(&self, cancel: Option<&CancelSignal>) -> Result<HarvestOutcome, CoreError> {
        let aggregation = self.aggregator.fetch_all().await?;

        let mut candidates = aggregation.candidates.clone();
        fastrand::shuffle(&mut candidates);

        let validation = self.validator.validate_all(candidates, cancel).await;
        let pool = Arc::new(ProxyPool::new(self.pool_config));
        pool.extend(validation.working.iter().cloned());

        tracing::info!(
            candidates = aggregation.candidates.len(),
            working = pool.len(),
            "proxy pool ready"
        );

        Ok(HarvestOutcome {
            pool,
            aggregation,
            validation,
        })
    }
}

/// Build the retrieval engine described by `config`.
pub fn retrieval_engine(client: Arc<dyn HttpClient>, config: &PipelineConfig) -> RetrievalWorkerPool {
    let engine = RetrievalWorkerPool::new(client, config.target.clone(), config.retrieval.clone());
    if config.pacing.direct_per_second > 0 {
        engine.with_pacer(RequestPacer::per_second(config.pacing.direct_per_second))
    } else {
        engine
    }
}

/// Run a batch, rejecting an empty request before any work starts.
pub async fn retrieve(engine: &RetrievalWorkerPool, symbols: &[Symbol]) -> Result<RunOutcome, CoreError> {
    if symbols.is_empty() {
        return Err(CoreError::NoSymbols);
    }
    Ok(engine.run(symbols).await)
}
