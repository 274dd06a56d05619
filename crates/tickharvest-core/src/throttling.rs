use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Self-imposed request rate toward a single upstream host.
///
/// Upstreams here never publish their limits, so the pipeline paces itself:
/// proxied calls spread load across many exits, direct calls go through one
/// of these.
#[derive(Clone)]
pub struct RequestPacer {
    limiter: Arc<DirectRateLimiter>,
    per_second: u32,
}

impl std::fmt::Debug for RequestPacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPacer")
            .field("per_second", &self.per_second)
            .finish()
    }
}

impl RequestPacer {
    /// Allow `per_second` requests per second with a burst of the same size.
    pub fn per_second(per_second: u32) -> Self {
        let safe_limit = per_second.max(1);
        Self {
            limiter: Arc::new(RateLimiter::direct(quota_from_window(
                Duration::from_secs(1),
                safe_limit,
            ))),
            per_second: safe_limit,
        }
    }

    /// Wait until the next request is allowed.
    pub async fn ready(&self) {
        self.limiter.until_ready().await;
    }

    /// Non-blocking check; consumes budget when it returns `true`.
    #[cfg(test)]
    fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Quota {
    let burst = NonZeroU32::new(quota_limit.max(1)).unwrap_or(NonZeroU32::MIN);

    let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(burst.get())).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}
