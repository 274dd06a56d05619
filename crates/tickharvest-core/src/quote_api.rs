//! Target data API contract: per-symbol endpoint and response parsing.
//!
//! The parser is tagged: bodies that are not the expected JSON document are
//! [`ErrorKind::MalformedResponse`](crate::ErrorKind::MalformedResponse),
//! documents that parse but lack the minimal record are
//! [`ErrorKind::IncompletePayload`](crate::ErrorKind::IncompletePayload).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::http_client::HttpRequest;
use crate::{FetchError, ProxyAddress, QuotePayload, Symbol};

const SYMBOL_PLACEHOLDER: &str = "{symbol}";

/// Per-symbol quote endpoint of the target API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteEndpoint {
    /// URL with a `{symbol}` placeholder.
    pub url_template: String,
    pub referer: Option<String>,
}

impl Default for QuoteEndpoint {
    fn default() -> Self {
        Self {
            url_template: String::from(
                "https://query1.finance.yahoo.com/v7/finance/quote?symbols={symbol}",
            ),
            referer: Some(String::from("https://finance.yahoo.com/")),
        }
    }
}

impl QuoteEndpoint {
    pub fn new(url_template: impl Into<String>) -> Self {
        Self {
            url_template: url_template.into(),
            referer: None,
        }
    }

    pub fn has_placeholder(&self) -> bool {
        self.url_template.contains(SYMBOL_PLACEHOLDER)
    }

    pub fn url_for(&self, symbol: &Symbol) -> String {
        self.url_template
            .replace(SYMBOL_PLACEHOLDER, &urlencoding::encode(symbol.as_str()))
    }

    pub fn request_for(
        &self,
        symbol: &Symbol,
        timeout: Duration,
        proxy: Option<ProxyAddress>,
    ) -> HttpRequest {
        let mut request = HttpRequest::get(self.url_for(symbol))
            .with_timeout(timeout)
            .via_proxy(proxy);
        if let Some(referer) = &self.referer {
            request = request.with_header("referer", referer.clone());
        }
        request
    }
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(rename = "quoteResponse")]
    quote_response: QuoteResponseData,
}

#[derive(Debug, Deserialize)]
struct QuoteResponseData {
    result: Vec<QuoteData>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(default)]
    symbol: Option<String>,
    #[serde(rename = "regularMarketPrice", default)]
    regular_market_price: Option<f64>,
    #[serde(rename = "regularMarketVolume", default)]
    regular_market_volume: Option<f64>,
    #[serde(rename = "regularMarketChangePercent", default)]
    regular_market_change_percent: Option<f64>,
    #[serde(rename = "regularMarketPreviousClose", default)]
    regular_market_previous_close: Option<f64>,
    #[serde(rename = "regularMarketOpen", default)]
    regular_market_open: Option<f64>,
    #[serde(rename = "regularMarketDayHigh", default)]
    regular_market_day_high: Option<f64>,
    #[serde(rename = "regularMarketDayLow", default)]
    regular_market_day_low: Option<f64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(rename = "marketCap", default)]
    market_cap: Option<f64>,
    #[serde(rename = "fiftyTwoWeekHigh", default)]
    fifty_two_week_high: Option<f64>,
    #[serde(rename = "fiftyTwoWeekLow", default)]
    fifty_two_week_low: Option<f64>,
    #[serde(rename = "trailingPE", default)]
    trailing_pe: Option<f64>,
}

/// Parse a quote response body for `symbol`.
pub fn parse_quote(symbol: &Symbol, body: &str) -> Result<QuotePayload, FetchError> {
    let response: QuoteResponse = serde_json::from_str(body)
        .map_err(|error| FetchError::malformed(format!("unexpected quote document: {error}")))?;

    if let Some(error) = response.quote_response.error.filter(|value| !value.is_null()) {
        return Err(FetchError::incomplete(format!("api reported error: {error}")));
    }

    let data = response
        .quote_response
        .result
        .into_iter()
        .find(|entry| {
            entry
                .symbol
                .as_deref()
                .map(|value| value.eq_ignore_ascii_case(symbol.as_str()))
                .unwrap_or(true)
        })
        .ok_or_else(|| FetchError::incomplete(format!("no quote entry for {symbol}")))?;

    let current_price = finite(data.regular_market_price)
        .filter(|price| *price > 0.0)
        .ok_or_else(|| FetchError::incomplete(format!("{symbol}: missing current price")))?;
    let volume = finite(data.regular_market_volume)
        .filter(|volume| *volume >= 0.0)
        .map(|volume| volume.round() as u64)
        .ok_or_else(|| FetchError::incomplete(format!("{symbol}: missing volume")))?;

    Ok(QuotePayload {
        current_price,
        volume,
        change_percent: finite(data.regular_market_change_percent),
        previous_close: finite(data.regular_market_previous_close),
        open: finite(data.regular_market_open),
        day_high: finite(data.regular_market_day_high),
        day_low: finite(data.regular_market_day_low),
        currency: data.currency.filter(|value| !value.trim().is_empty()),
        market_cap: finite(data.market_cap).filter(|value| *value > 0.0),
        fifty_two_week_high: finite(data.fifty_two_week_high),
        fifty_two_week_low: finite(data.fifty_two_week_low),
        pe_ratio: finite(data.trailing_pe),
    })
}

/// Cheap content-shape check used by proxy validation: every marker must
/// occur in the body.
pub fn contains_markers(body: &str, markers: &[String]) -> bool {
    markers.iter().all(|marker| body.contains(marker.as_str()))
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|value| value.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn symbol(raw: &str) -> Symbol {
        Symbol::parse(raw).expect("valid symbol")
    }

    #[test]
    fn parses_full_payload() {
        let body = r#"{"quoteResponse":{"result":[{"symbol":"AAPL","regularMarketPrice":189.5,
            "regularMarketVolume":51234567,"regularMarketChangePercent":-0.42,"currency":"USD",
            "marketCap":2.9e12,"fiftyTwoWeekHigh":199.6,"fiftyTwoWeekLow":164.1,"trailingPE":29.3}],
            "error":null}}"#;

        let payload = parse_quote(&symbol("AAPL"), body).expect("payload should parse");
        assert_eq!(payload.current_price, 189.5);
        assert_eq!(payload.volume, 51_234_567);
        assert_eq!(payload.change_percent, Some(-0.42));
        assert!(payload.is_enriched());
    }

    #[test]
    fn non_json_body_is_malformed() {
        let error = parse_quote(&symbol("AAPL"), "<html>captive portal</html>")
            .expect_err("html must fail");
        assert_eq!(error.kind(), ErrorKind::MalformedResponse);
    }

    #[test]
    fn wrong_document_shape_is_malformed() {
        let error = parse_quote(&symbol("AAPL"), r#"{"origin":"1.2.3.4"}"#).expect_err("must fail");
        assert_eq!(error.kind(), ErrorKind::MalformedResponse);
    }

    #[test]
    fn missing_volume_is_incomplete() {
        let body = r#"{"quoteResponse":{"result":[{"symbol":"MSFT","regularMarketPrice":410.2}]}}"#;
        let error = parse_quote(&symbol("MSFT"), body).expect_err("must fail");
        assert_eq!(error.kind(), ErrorKind::IncompletePayload);
    }

    #[test]
    fn empty_result_and_foreign_symbol_are_incomplete() {
        let empty = r#"{"quoteResponse":{"result":[],"error":null}}"#;
        assert_eq!(
            parse_quote(&symbol("ZZZZ"), empty).expect_err("must fail").kind(),
            ErrorKind::IncompletePayload
        );

        let foreign = r#"{"quoteResponse":{"result":[{"symbol":"MSFT","regularMarketPrice":1.0,"regularMarketVolume":1}]}}"#;
        assert_eq!(
            parse_quote(&symbol("AAPL"), foreign).expect_err("must fail").kind(),
            ErrorKind::IncompletePayload
        );
    }

    #[test]
    fn url_template_encodes_symbol() {
        let endpoint = QuoteEndpoint::new("https://api.test/quote?s={symbol}");
        assert_eq!(endpoint.url_for(&symbol("BRK.B")), "https://api.test/quote?s=BRK.B");
        assert!(endpoint.has_placeholder());
    }

    #[test]
    fn marker_check_requires_every_marker() {
        let markers = vec![String::from("regularMarketPrice"), String::from("quoteResponse")];
        assert!(contains_markers(r#"{"quoteResponse":{"regularMarketPrice":1}}"#, &markers));
        assert!(!contains_markers(r#"{"quoteResponse":{}}"#, &markers));
    }
}
