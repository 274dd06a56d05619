use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{CoreError, ProxyAddress, UtcDateTime, ValidatedProxy};

/// Eviction thresholds for the proxy pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Consecutive failures that evict a proxy.
    pub failure_threshold: u32,
    /// Maximum age of `last_success_at`; `None` keeps proxies indefinitely.
    pub ttl_secs: Option<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            ttl_secs: None,
        }
    }
}

impl PoolConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Default)]
struct PoolInner {
    proxies: Vec<ValidatedProxy>,
    cursor: usize,
}

impl PoolInner {
    fn position(&self, address: &ProxyAddress) -> Option<usize> {
        self.proxies
            .iter()
            .position(|proxy| &proxy.address == address)
    }

    fn remove_at(&mut self, index: usize) -> ValidatedProxy {
        if index < self.cursor {
            self.cursor -= 1;
        }
        self.proxies.remove(index)
    }

    fn evict_expired(&mut self, ttl: Duration, now: UtcDateTime) -> usize {
        let before = self.proxies.len();
        let mut index = 0;
        while index < self.proxies.len() {
            if self.proxies[index].last_success_at.elapsed_until(now) >= ttl {
                let evicted = self.remove_at(index);
                tracing::debug!(proxy = %evicted.address, "proxy expired");
            } else {
                index += 1;
            }
        }
        before - self.proxies.len()
    }
}

/// Thread-safe store of validated proxies.
///
/// Selection is shared round-robin: a picked proxy is not reserved, so
/// several concurrent tasks may route through it at once.
#[derive(Debug)]
pub struct ProxyPool {
    config: PoolConfig,
    inner: Mutex<PoolInner>,
}

impl Default for ProxyPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl ProxyPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(PoolInner::default()),
        }
    }

    /// Insert a proxy, replacing the state of an existing entry with the
    /// same address.
    pub fn add(&self, proxy: ValidatedProxy) {
        let mut inner = self.inner.lock().expect("proxy pool lock is not poisoned");
        match inner.position(&proxy.address) {
            Some(index) => inner.proxies[index] = proxy,
            None => inner.proxies.push(proxy),
        }
    }

    pub fn extend(&self, proxies: impl IntoIterator<Item = ValidatedProxy>) {
        for proxy in proxies {
            self.add(proxy);
        }
    }

    /// Next proxy in round-robin order, or `None` when the pool is empty.
    pub fn pick_one(&self) -> Option<ProxyAddress> {
        let mut inner = self.inner.lock().expect("proxy pool lock is not poisoned");
        if let Some(ttl) = self.config.ttl() {
            inner.evict_expired(ttl, UtcDateTime::now());
        }
        if inner.proxies.is_empty() {
            return None;
        }

        let index = inner.cursor % inner.proxies.len();
        inner.cursor = index + 1;
        Some(inner.proxies[index].address.clone())
    }

    /// Record the outcome of a request routed through `address`. Returns
    /// `true` when this report evicted the proxy.
    ///
    /// Addresses no longer in the pool are ignored.
    pub fn report_outcome(&self, address: &ProxyAddress, success: bool) -> bool {
        let mut inner = self.inner.lock().expect("proxy pool lock is not poisoned");
        let Some(index) = inner.position(address) else {
            return false;
        };

        let proxy = &mut inner.proxies[index];
        if success {
            proxy.consecutive_failures = 0;
            proxy.last_success_at = UtcDateTime::now();
            return false;
        }

        proxy.consecutive_failures = proxy.consecutive_failures.saturating_add(1);
        if proxy.consecutive_failures >= self.config.failure_threshold {
            let evicted = inner.remove_at(index);
            tracing::info!(
                proxy = %evicted.address,
                failures = evicted.consecutive_failures,
                remaining = inner.proxies.len(),
                "proxy evicted"
            );
            return true;
        }
        false
    }

    pub fn snapshot(&self) -> Vec<ValidatedProxy> {
        self.inner
            .lock()
            .expect("proxy pool lock is not poisoned")
            .proxies
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("proxy pool lock is not poisoned")
            .proxies
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry whose last success is older than the TTL. Returns the
    /// number evicted.
    pub fn evict_expired(&self) -> usize {
        let Some(ttl) = self.config.ttl() else {
            return 0;
        };
        self.inner
            .lock()
            .expect("proxy pool lock is not poisoned")
            .evict_expired(ttl, UtcDateTime::now())
    }

    pub fn to_artifact(&self, tested: usize, success_rate: f64) -> ProxyArtifact {
        let working_proxies = self
            .snapshot()
            .into_iter()
            .map(|proxy| proxy.address)
            .collect::<Vec<_>>();
        ProxyArtifact {
            count: working_proxies.len(),
            working_proxies,
            tested,
            success_rate,
            validated_at: UtcDateTime::now(),
        }
    }

    /// Rebuild a pool from a persisted artifact. Entries start with a clean
    /// failure count and `last_success_at` equal to the artifact timestamp.
    pub fn from_artifact(artifact: &ProxyArtifact, config: PoolConfig) -> Self {
        let pool = Self::new(config);
        pool.extend(artifact.working_proxies.iter().map(|address| ValidatedProxy {
            address: address.clone(),
            validated_at: artifact.validated_at,
            last_success_at: artifact.validated_at,
            consecutive_failures: 0,
            latency_ms: 0,
        }));
        pool
    }
}

/// Persisted handoff document between proxy harvesting and retrieval runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyArtifact {
    pub working_proxies: Vec<ProxyAddress>,
    pub count: usize,
    pub tested: usize,
    pub success_rate: f64,
    pub validated_at: UtcDateTime,
}

impl ProxyArtifact {
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CoreError> {
        let encoded = serde_json::to_string_pretty(self)?;
        std::fs::write(path, encoded)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
