//! HTTP transport for the remote API.
//!
//! Uses async reqwest internally with `tokio::time::timeout` bounding every
//! request, but presents a sync interface for compatibility with rayon workers.

use std::sync::LazyLock;
use std::time::Duration;

use crate::error::TransportError;

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default whole-request timeout (headers + body)
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Delete,
}

impl Method {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

/// One remote call, relative to the transport's base URL.
///
/// Path segments are percent-encoded individually, so identifiers such as
/// email addresses can be passed verbatim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: Method,
    pub segments: Vec<String>,
    pub query: Vec<(String, String)>,
    /// Overrides the transport's request timeout
    pub timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn get<S: Into<String>>(segments: impl IntoIterator<Item = S>) -> Self {
        Self {
            method: Method::Get,
            segments: segments.into_iter().map(Into::into).collect(),
            query: Vec::new(),
            timeout: None,
        }
    }

    pub fn delete<S: Into<String>>(segments: impl IntoIterator<Item = S>) -> Self {
        Self {
            method: Method::Delete,
            ..Self::get(segments)
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Lookup a query parameter (used by fakes in tests)
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// `GET campaigns/42` style label for logs
    pub fn label(&self) -> String {
        let verb = match self.method {
            Method::Get => "GET",
            Method::Delete => "DELETE",
        };
        format!("{verb} {}", self.segments.join("/"))
    }
}

/// Fully-read response of one attempt
#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub status: u16,
    /// Server-advised wait from `Retry-After`, if present and parseable
    pub retry_after: Option<Duration>,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }

    pub fn with_retry_after(mut self, wait: Duration) -> Self {
        self.retry_after = Some(wait);
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// Parse a `Retry-After` header given in (possibly fractional) seconds.
///
/// HTTP-date values are not used by the API and yield `None`.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
}

/// Sends one request attempt. Implementations must be shareable across workers.
pub trait Transport: Send + Sync {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        (**self).send(request)
    }
}

/// reqwest-backed transport with HTTP Basic auth (empty user, key as password)
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: reqwest::Url,
    api_key: String,
    timeout: Duration,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    pub fn new(base_url: &str, api_key: String, timeout: Duration) -> Result<Self, TransportError> {
        let base_url = reqwest::Url::parse(base_url)
            .map_err(|e| TransportError::Invalid(format!("base URL {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::Invalid(format!(
                "base URL {base_url} cannot carry a path"
            )));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_max_idle_per_host(8)
            .build()
            .map_err(TransportError::from_reqwest)?;
        Ok(Self {
            client,
            base_url,
            api_key,
            timeout,
        })
    }

    fn url_for(&self, request: &ApiRequest) -> reqwest::Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(&request.segments);
        }
        url
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.url_for(request);
        let timeout = request.timeout.unwrap_or(self.timeout);
        let builder = self
            .client
            .request(request.method.as_reqwest(), url)
            .query(&request.query)
            .basic_auth("", Some(&self.api_key));

        SHARED_RUNTIME.handle().block_on(async {
            let attempt = async {
                let resp = builder.send().await?;
                let status = resp.status().as_u16();
                let retry_after = resp
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after);
                let body = resp.text().await?;
                Ok::<_, reqwest::Error>(ApiResponse {
                    status,
                    retry_after,
                    body,
                })
            };

            match tokio::time::timeout(timeout, attempt).await {
                Ok(result) => result.map_err(TransportError::from_reqwest),
                Err(_) => Err(TransportError::Timeout(timeout)),
            }
        })
    }
}
