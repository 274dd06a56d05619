//! Scripted in-memory transport shared by the behaviour tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tickharvest_core::{
    HttpClient, HttpError, HttpFuture, HttpRequest, HttpResponse, ProxyAddress,
};

/// What the fake transport does for one call.
#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16, String),
    Refused,
    /// Sleep, then answer 200 with an empty body.
    Stall(Duration),
    Panic,
}

impl Reply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self::Status(200, body.into())
    }
}

struct Route {
    url_contains: String,
    proxy: Option<ProxyAddress>,
    replies: VecDeque<Reply>,
}

/// Routes match on a URL substring and optionally on the proxy; the first
/// matching route answers. Successive calls consume its replies and the last
/// one repeats. Unmatched calls answer 404.
#[derive(Default)]
pub struct ScriptedHttpClient {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<HttpRequest>>,
    released: Mutex<Vec<ProxyAddress>>,
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, url_contains: &str, replies: Vec<Reply>) -> Self {
        self.push(url_contains, None, replies);
        self
    }

    pub fn route_via(self, proxy: &str, url_contains: &str, replies: Vec<Reply>) -> Self {
        let proxy = ProxyAddress::parse(proxy).expect("valid proxy in test script");
        self.push(url_contains, Some(proxy), replies);
        self
    }

    fn push(&self, url_contains: &str, proxy: Option<ProxyAddress>, replies: Vec<Reply>) {
        self.routes.lock().expect("routes lock").push(Route {
            url_contains: url_contains.to_owned(),
            proxy,
            replies: replies.into(),
        });
    }

    pub fn calls(&self) -> Vec<HttpRequest> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Proxies the caller reported as no longer in use, in order.
    pub fn released(&self) -> Vec<ProxyAddress> {
        self.released.lock().expect("released lock").clone()
    }

    pub fn calls_to(&self, url_contains: &str) -> usize {
        self.calls()
            .iter()
            .filter(|request| request.url.contains(url_contains))
            .count()
    }

    fn next_reply(&self, request: &HttpRequest) -> Reply {
        let mut routes = self.routes.lock().expect("routes lock");
        let route = routes.iter_mut().find(|route| {
            request.url.contains(&route.url_contains)
                && route
                    .proxy
                    .as_ref()
                    .map(|proxy| request.proxy.as_ref() == Some(proxy))
                    .unwrap_or(true)
        });

        match route {
            Some(route) if route.replies.len() > 1 => route
                .replies
                .pop_front()
                .unwrap_or_else(|| Reply::Status(404, String::new())),
            Some(route) => route
                .replies
                .front()
                .cloned()
                .unwrap_or_else(|| Reply::Status(404, String::new())),
            None => Reply::Status(404, String::new()),
        }
    }
}

impl HttpClient for ScriptedHttpClient {
    fn release_proxy(&self, proxy: &ProxyAddress) {
        self.released.lock().expect("released lock").push(proxy.clone());
    }

    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        Box::pin(async move {
            self.calls.lock().expect("calls lock").push(request.clone());
            match self.next_reply(&request) {
                Reply::Status(status, body) => Ok(HttpResponse::new(status, body)),
                Reply::Refused => Err(HttpError::connect("connection refused")),
                Reply::Stall(duration) => {
                    tokio::time::sleep(duration).await;
                    Ok(HttpResponse::ok(""))
                }
                Reply::Panic => panic!("scripted transport panic for {}", request.url),
            }
        })
    }
}

pub const QUOTE_URL: &str = "https://api.test/v7/finance/quote?symbols={symbol}";
pub const PROBE_URL: &str = "https://probe.test/ip";

/// Minimal quote document: price and volume only.
pub fn minimal_quote(symbol: &str, price: f64) -> String {
    format!(
        r#"{{"quoteResponse":{{"result":[{{"symbol":"{symbol}","regularMarketPrice":{price},"regularMarketVolume":1000}}],"error":null}}}}"#
    )
}

/// Quote document with every enrichment field.
pub fn full_quote(symbol: &str, price: f64) -> String {
    format!(
        r#"{{"quoteResponse":{{"result":[{{"symbol":"{symbol}","regularMarketPrice":{price},"regularMarketVolume":52000000,"regularMarketChangePercent":1.25,"regularMarketPreviousClose":{price},"regularMarketOpen":{price},"regularMarketDayHigh":{price},"regularMarketDayLow":{price},"currency":"USD","marketCap":2900000000000,"fiftyTwoWeekHigh":199.62,"fiftyTwoWeekLow":164.08,"trailingPE":29.4}}],"error":null}}}}"#
    )
}
