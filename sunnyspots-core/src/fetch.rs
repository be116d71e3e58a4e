//! HTTP fetching with a time-bounded response cache.
//!
//! A stored 2xx response is reused until its revalidation window runs out.
//! There is no de-duplication of identical in-flight requests, no retry and
//! no backoff: two concurrent misses for the same URL both hit the network.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use reqwest::{
    Client, Method,
    header::{self, HeaderMap, HeaderValue},
};
use serde_json::Value;
use tokio::time::Instant;

use crate::{Error, Result};

/// One day.
pub const DEFAULT_REVALIDATE: Duration = Duration::from_secs(86_400);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub cache: CacheStatus,
    /// Reason phrase sent by the upstream when it differs from the canonical one.
    pub reason: Option<String>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Upstream reason phrase, falling back to the canonical one (`"Not Found"`).
    pub fn status_text(&self) -> &str {
        match &self.reason {
            Some(reason) => reason,
            None => reqwest::StatusCode::from_u16(self.status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or(""),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// `None` means [`DEFAULT_REVALIDATE`].
    pub revalidate: Option<Duration>,
    pub method: Option<Method>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl FetchOptions {
    pub fn revalidate(mut self, window: Duration) -> Self {
        self.revalidate = Some(window);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn post_json(mut self, body: &Value) -> Self {
        self.method = Some(Method::POST);
        self.body = Some(body.to_string().into_bytes());
        self.header(header::CONTENT_TYPE.as_str(), "application/json")
    }

    pub fn revalidate_window(&self) -> Duration {
        self.revalidate.unwrap_or(DEFAULT_REVALIDATE)
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &FetchRequest) -> Result<FetchResponse>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_static(concat!("sunnyspots/", env!("CARGO_PKG_VERSION"))),
        );
        let http = Client::builder()
            .use_rustls_tls()
            .default_headers(headers)
            .timeout(timeout)
            .pool_idle_timeout(Some(Duration::from_secs(600)))
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let mut builder = self.http.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let res = builder.send().await?;
        let status = res.status().as_u16();
        let content_type = res
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        // hyper only records a reason phrase that is not the canonical one.
        let reason = res
            .extensions()
            .get::<hyper::ext::ReasonPhrase>()
            .map(|r| String::from_utf8_lossy(r.as_bytes()).into_owned());
        let body = res.bytes().await?.to_vec();

        Ok(FetchResponse { status, content_type, body, cache: CacheStatus::Miss, reason })
    }
}

#[derive(Debug, Clone)]
struct Stored {
    response: FetchResponse,
    fresh_until: Instant,
}

pub struct CachedFetcher<T = ReqwestTransport> {
    transport: T,
    store: Mutex<HashMap<FetchRequest, Stored>>,
}

pub type SharedFetcher = Arc<CachedFetcher<Box<dyn HttpTransport>>>;

#[async_trait]
impl HttpTransport for Box<dyn HttpTransport> {
    async fn send(&self, request: &FetchRequest) -> Result<FetchResponse> {
        (**self).send(request).await
    }
}

impl<T: HttpTransport> CachedFetcher<T> {
    pub fn new(transport: T) -> Self {
        Self { transport, store: Mutex::new(HashMap::new()) }
    }

    pub async fn fetch_cached(&self, url: &str, options: FetchOptions) -> Result<FetchResponse> {
        let window = options.revalidate_window();
        let request = FetchRequest {
            method: options.method.unwrap_or(Method::GET),
            url: url.to_string(),
            headers: options.headers,
            body: options.body,
        };

        if let Some(hit) = self.lookup(&request) {
            log::debug!("cache hit: {} {}", request.method, redact(url));
            return Ok(hit);
        }

        log::debug!("cache miss: {} {}", request.method, redact(url));
        let response = self.transport.send(&request).await?;

        let now = Instant::now();
        let mut store = self.lock_store();
        store.retain(|_, stored| now < stored.fresh_until);
        if response.is_success() && !window.is_zero() {
            store.insert(request, Stored { response: response.clone(), fresh_until: now + window });
        }
        drop(store);

        Ok(response)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetch and parse a JSON body; non-2xx and unparsable bodies are errors.
    pub async fn fetch_json(&self, url: &str, options: FetchOptions) -> Result<Value> {
        let response = self.fetch_cached(url, options).await?;
        if !response.is_success() {
            return Err(Error::UpstreamHttp { url: redact(url).to_string(), status: response.status });
        }
        serde_json::from_slice(&response.body).map_err(|e| Error::UpstreamData(e.to_string()))
    }

    fn lookup(&self, request: &FetchRequest) -> Option<FetchResponse> {
        let mut store = self.lock_store();
        let stored = store.get(request)?;
        if Instant::now() < stored.fresh_until {
            let mut response = stored.response.clone();
            response.cache = CacheStatus::Hit;
            return Some(response);
        }
        store.remove(request);
        None
    }

    fn lock_store(&self) -> std::sync::MutexGuard<'_, HashMap<FetchRequest, Stored>> {
        // A panic while holding the lock leaves a plain map behind; keep using it.
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// URL without its query string, so API keys stay out of logs and errors.
pub fn redact(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}
