//! Network fetch seam.
//! The cache manager talks to the network through the `Fetch` trait so tests
//! can substitute a scripted fetcher; `HttpFetcher` is the real
//! reqwest-backed implementation.

use std::future::Future;
use std::time::Duration;

/// An outbound resource request as seen by the interception layer.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: String,
    pub url: String,
    /// `Accept` header, used for navigation-request detection.
    pub accept: Option<String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            accept: None,
        }
    }

    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

/// A fully buffered response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    /// Same-origin response; only these are eligible for caching.
    pub basic: bool,
}

impl FetchedResponse {
    /// Cacheable per policy: HTTP 200 and same-origin.
    pub fn ok_basic(&self) -> bool {
        self.status == 200 && self.basic
    }
}

#[derive(Debug)]
pub enum FetchError {
    Network(String),
    Timeout,
    InvalidUrl(String),
    /// The cache service shut down before answering.
    ServiceClosed,
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Network(msg) => write!(f, "network error: {msg}"),
            FetchError::Timeout => write!(f, "fetch timeout"),
            FetchError::InvalidUrl(url) => write!(f, "invalid url: {url}"),
            FetchError::ServiceClosed => write!(f, "cache service closed"),
        }
    }
}

/// Network access trait for the cache manager.
pub trait Fetch: Send + Sync + 'static {
    fn fetch(
        &self,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<FetchedResponse, FetchError>> + Send;
}

/// reqwest-backed fetcher resolving app-relative paths against the
/// configured origin.
pub struct HttpFetcher {
    http: reqwest::Client,
    origin: String,
}

impl HttpFetcher {
    /// Build a pooled client. `origin` is the application origin used to
    /// resolve relative paths and classify same-origin responses.
    pub fn new(origin: impl Into<String>) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            http,
            origin: origin.into(),
        })
    }

    fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}{}", self.origin.trim_end_matches('/'), url)
        }
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedResponse, FetchError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| FetchError::InvalidUrl(format!("bad method {}", request.method)))?;
        let url = self.resolve(&request.url);
        let basic = url.starts_with(self.origin.trim_end_matches('/'));

        let mut builder = self.http.request(method, &url);
        if let Some(ref accept) = request.accept {
            builder = builder.header("Accept", accept.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?
            .to_vec();

        Ok(FetchedResponse {
            status,
            content_type,
            body,
            basic,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_detection_is_case_insensitive() {
        assert!(FetchRequest::get("/x").is_get());
        let mut post = FetchRequest::get("/x");
        post.method = "post".to_string();
        assert!(!post.is_get());
    }

    #[test]
    fn relative_urls_resolve_against_origin() {
        let fetcher = HttpFetcher::new("https://translator.example/").expect("client");
        assert_eq!(
            fetcher.resolve("/data/x.json"),
            "https://translator.example/data/x.json"
        );
        assert_eq!(
            fetcher.resolve("https://other.example/y"),
            "https://other.example/y"
        );
    }

    #[test]
    fn ok_basic_requires_both_conditions() {
        let mut resp = FetchedResponse {
            status: 200,
            content_type: None,
            body: Vec::new(),
            basic: true,
        };
        assert!(resp.ok_basic());
        resp.status = 304;
        assert!(!resp.ok_basic());
        resp.status = 200;
        resp.basic = false;
        assert!(!resp.ok_basic());
    }
}
