use serde::{Deserialize, Serialize};

use crate::{ErrorKind, FetchError, ProxyAddress, Symbol};

/// Per-symbol quote snapshot returned by the target API.
///
/// `current_price` and `volume` are the minimal record; everything else is
/// best-effort enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotePayload {
    pub current_price: f64,
    pub volume: u64,
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
}

impl QuotePayload {
    pub fn minimal(current_price: f64, volume: u64) -> Self {
        Self {
            current_price,
            volume,
            change_percent: None,
            previous_close: None,
            open: None,
            day_high: None,
            day_low: None,
            currency: None,
            market_cap: None,
            fifty_two_week_high: None,
            fifty_two_week_low: None,
            pe_ratio: None,
        }
    }

    /// True when every enrichment field used by the quality metric is present.
    pub fn is_enriched(&self) -> bool {
        self.market_cap.is_some()
            && self.fifty_two_week_high.is_some()
            && self.fifty_two_week_low.is_some()
            && self.pe_ratio.is_some()
    }
}

/// One attempt at fetching a symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTask {
    pub symbol: Symbol,
    pub attempt: u32,
    /// Route only; the pool keeps ownership of the proxy's state.
    pub assigned_proxy: Option<ProxyAddress>,
}

/// Final outcome for one symbol in a batch run.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub symbol: Symbol,
    pub success: bool,
    pub payload: Option<QuotePayload>,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub http_status: Option<u16>,
    pub latency_ms: u64,
    pub attempts_used: u32,
    pub proxy: Option<ProxyAddress>,
}

impl FetchResult {
    pub fn succeeded(
        symbol: Symbol,
        payload: QuotePayload,
        attempts_used: u32,
        latency_ms: u64,
        proxy: Option<ProxyAddress>,
    ) -> Self {
        Self {
            symbol,
            success: true,
            payload: Some(payload),
            error_kind: None,
            error_message: None,
            http_status: None,
            latency_ms,
            attempts_used,
            proxy,
        }
    }

    pub fn failed(
        symbol: Symbol,
        error: &FetchError,
        attempts_used: u32,
        latency_ms: u64,
        proxy: Option<ProxyAddress>,
    ) -> Self {
        Self {
            symbol,
            success: false,
            payload: None,
            error_kind: Some(error.kind()),
            error_message: Some(error.message().to_owned()),
            http_status: error.status(),
            latency_ms,
            attempts_used,
            proxy,
        }
    }

    pub fn is_enriched(&self) -> bool {
        self.payload
            .as_ref()
            .map(QuotePayload::is_enriched)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enrichment_requires_all_four_fields() {
        let mut payload = QuotePayload::minimal(101.5, 1_000);
        assert!(!payload.is_enriched());

        payload.market_cap = Some(2.5e12);
        payload.fifty_two_week_high = Some(199.0);
        payload.fifty_two_week_low = Some(120.0);
        assert!(!payload.is_enriched());

        payload.pe_ratio = Some(28.4);
        assert!(payload.is_enriched());
    }

    #[test]
    fn failed_result_carries_status_and_kind() {
        let symbol = Symbol::parse("BADTICKER").expect("valid");
        let result = FetchResult::failed(symbol, &FetchError::http_status(404), 3, 42, None);

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::HttpStatusError));
        assert_eq!(result.http_status, Some(404));
        assert!(!result.is_enriched());
    }
}
