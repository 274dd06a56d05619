use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use crate::{FetchError, ProxyAddress};

const USER_AGENT: &str = concat!("tickharvest/", env!("CARGO_PKG_VERSION"));

/// GET request envelope used by every pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub timeout_ms: u64,
    /// Route the request through this proxy instead of connecting directly.
    pub proxy: Option<ProxyAddress>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
            timeout_ms: 10_000,
            proxy: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn via_proxy(mut self, proxy: Option<ProxyAddress>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// HTTP response envelope returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Transport failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorKind {
    Timeout,
    Connect,
    Other,
}

/// Transport-level HTTP error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    kind: HttpErrorKind,
    message: String,
}

impl HttpError {
    pub fn new(kind: HttpErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::Timeout, message)
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::Connect, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::Other, message)
    }

    pub const fn kind(&self) -> HttpErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Map onto the pipeline taxonomy. Anything that is not a timeout is a
    /// refused or reset connection from the caller's point of view.
    pub fn into_fetch_error(self) -> FetchError {
        match self.kind {
            HttpErrorKind::Timeout => FetchError::timeout(self.message),
            HttpErrorKind::Connect | HttpErrorKind::Other => FetchError::connection(self.message),
        }
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {}

pub type HttpFuture<'a> = Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>>;

/// Transport contract shared by the aggregator, validator and retrieval engine.
pub trait HttpClient: Send + Sync {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a>;

    /// Drop any per-proxy state held for `proxy` once it is no longer used.
    fn release_proxy(&self, _proxy: &ProxyAddress) {}
}

/// Execute a request with an outer deadline matching its own timeout, so a
/// transport that ignores `timeout_ms` still cannot stall a worker.
pub async fn execute_with_deadline(
    client: &dyn HttpClient,
    request: HttpRequest,
) -> Result<HttpResponse, HttpError> {
    let deadline = request.timeout();
    match tokio::time::timeout(deadline, client.execute(request)).await {
        Ok(result) => result,
        Err(_) => Err(HttpError::timeout(format!(
            "request exceeded {}ms deadline",
            deadline.as_millis()
        ))),
    }
}

/// Production HTTP client using reqwest.
///
/// reqwest binds proxies at client construction, so one client is built per
/// proxy address and reused for the lifetime of this value.
#[derive(Debug)]
pub struct ReqwestHttpClient {
    direct: reqwest::Client,
    proxied: Mutex<HashMap<ProxyAddress, reqwest::Client>>,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self {
            direct: base_builder()
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            proxied: Mutex::new(HashMap::new()),
        }
    }

    fn client_for(&self, proxy: Option<&ProxyAddress>) -> Result<reqwest::Client, HttpError> {
        let Some(proxy) = proxy else {
            return Ok(self.direct.clone());
        };

        let mut proxied = self
            .proxied
            .lock()
            .expect("proxied client cache is not poisoned");
        if let Some(client) = proxied.get(proxy) {
            return Ok(client.clone());
        }

        let route = reqwest::Proxy::all(proxy.proxy_url())
            .map_err(|error| HttpError::other(format!("invalid proxy {proxy}: {error}")))?;
        let client = base_builder()
            .proxy(route)
            .build()
            .map_err(|error| HttpError::other(format!("failed to build client: {error}")))?;
        proxied.insert(proxy.clone(), client.clone());
        Ok(client)
    }

    pub fn cached_proxy_clients(&self) -> usize {
        self.proxied
            .lock()
            .expect("proxied client cache is not poisoned")
            .len()
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

fn base_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .pool_max_idle_per_host(4)
        .connect_timeout(Duration::from_secs(5))
}

impl HttpClient for ReqwestHttpClient {
    fn release_proxy(&self, proxy: &ProxyAddress) {
        self.proxied
            .lock()
            .expect("proxied client cache is not poisoned")
            .remove(proxy);
    }

    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        Box::pin(async move {
            let client = self.client_for(request.proxy.as_ref())?;
            let mut builder = client.get(&request.url).timeout(request.timeout());

            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            let response = builder.send().await.map_err(classify_reqwest_error)?;
            let status = response.status().as_u16();
            let body = response.text().await.map_err(classify_reqwest_error)?;

            Ok(HttpResponse { status, body })
        })
    }
}

fn classify_reqwest_error(error: reqwest::Error) -> HttpError {
    if error.is_timeout() {
        HttpError::timeout(format!("request timeout: {error}"))
    } else if error.is_connect() {
        HttpError::connect(format!("connection failed: {error}"))
    } else {
        HttpError::other(format!("request failed: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    struct StalledClient;

    impl HttpClient for StalledClient {
        fn execute<'a>(&'a self, _request: HttpRequest) -> HttpFuture<'a> {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(HttpResponse::ok("late"))
            })
        }
    }

    #[test]
    fn request_builder_lowercases_headers_and_sets_proxy() {
        let proxy = ProxyAddress::parse("10.0.0.1:8080").expect("valid");
        let request = HttpRequest::get("https://example.test/quote")
            .with_header("Referer", "https://example.test/")
            .with_timeout(Duration::from_millis(1_500))
            .via_proxy(Some(proxy.clone()));

        assert_eq!(
            request.headers.get("referer").map(String::as_str),
            Some("https://example.test/")
        );
        assert_eq!(request.timeout_ms, 1_500);
        assert_eq!(request.proxy, Some(proxy));
    }

    #[test]
    fn transport_errors_map_onto_taxonomy() {
        assert_eq!(
            HttpError::timeout("slow").into_fetch_error().kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            HttpError::connect("refused").into_fetch_error().kind(),
            ErrorKind::ConnectionRefusedOrReset
        );
    }

    #[tokio::test]
    async fn deadline_cuts_off_stalled_transport() {
        let request = HttpRequest::get("https://example.test/").with_timeout(Duration::from_millis(20));
        let error = execute_with_deadline(&StalledClient, request)
            .await
            .expect_err("stalled call must time out");

        assert_eq!(error.kind(), HttpErrorKind::Timeout);
    }

    #[test]
    fn reqwest_client_caches_one_client_per_proxy() {
        let client = ReqwestHttpClient::new();
        let proxy = ProxyAddress::parse("10.0.0.1:8080").expect("valid");

        client.client_for(Some(&proxy)).expect("client should build");
        client.client_for(Some(&proxy)).expect("client should build");
        client.client_for(None).expect("direct client");

        assert_eq!(client.cached_proxy_clients(), 1);
    }

    #[test]
    fn released_proxy_drops_its_cached_client() {
        let client = ReqwestHttpClient::new();
        let kept = ProxyAddress::parse("10.0.0.1:8080").expect("valid");
        let dropped = ProxyAddress::parse("10.0.0.2:8080").expect("valid");
        client.client_for(Some(&kept)).expect("client should build");
        client.client_for(Some(&dropped)).expect("client should build");

        client.release_proxy(&dropped);
        client.release_proxy(&dropped);

        assert_eq!(client.cached_proxy_clients(), 1);
    }
}
