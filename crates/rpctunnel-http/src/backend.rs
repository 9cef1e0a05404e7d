//! [`ProxyBackend`] that forwards to a real upstream over HTTP.

use std::time::Duration;

use bytes::Bytes;
use url::Url;

use crate::proxy::{BackendFuture, BackendResponse, ProxyBackend};
use crate::types::{HttpMethod, ProxyRequest, BASE_ORIGIN};

/// Headers the HTTP client sets itself.
const SKIPPED_REQUEST_HEADERS: &[&str] = &["host", "content-length", "connection"];

/// Errors building a [`ReqwestBackend`].
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("upstream must be an http(s) URL: {0}")]
    InvalidUpstream(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Upstream client configuration.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Per-request timeout; `None` waits as long as the upstream does.
    pub timeout: Option<Duration>,
    pub user_agent: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            user_agent: format!("rpctunnel/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl BackendConfig {
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Forwards proxy requests to `upstream`, keeping method, path and query,
/// headers and body.
#[derive(Debug, Clone)]
pub struct ReqwestBackend {
    client: reqwest::Client,
    upstream: Url,
}

impl ReqwestBackend {
    pub fn new(upstream: Url) -> Result<Self, BackendError> {
        Self::with_config(upstream, BackendConfig::default())
    }

    pub fn with_config(upstream: Url, config: BackendConfig) -> Result<Self, BackendError> {
        if !matches!(upstream.scheme(), "http" | "https")
            || upstream.cannot_be_a_base()
            || upstream.fragment().is_some()
        {
            return Err(BackendError::InvalidUpstream(upstream.to_string()));
        }

        let mut builder = reqwest::Client::builder().user_agent(config.user_agent);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            upstream,
        })
    }

    pub fn upstream(&self) -> &Url {
        &self.upstream
    }

    /// Upstream URL for a proxied path.
    ///
    /// The upstream's path prefix is kept and the proxied path appended to it.
    /// Query strings from both are kept, upstream first.
    pub fn target_url(&self, path: &str) -> Result<Url, url::ParseError> {
        let proxied = Url::parse(BASE_ORIGIN)?.join(path)?;

        let mut url = self.upstream.clone();
        let prefix = self.upstream.path().trim_end_matches('/');
        url.set_path(&format!("{prefix}{}", proxied.path()));

        let query = [self.upstream.query(), proxied.query()]
            .into_iter()
            .flatten()
            .filter(|q| !q.is_empty())
            .collect::<Vec<_>>()
            .join("&");
        url.set_query((!query.is_empty()).then_some(query.as_str()));
        url.set_fragment(None);
        Ok(url)
    }

    async fn send(&self, request: ProxyRequest) -> Result<BackendResponse, reqwest::Error> {
        let url = match self.target_url(&request.path) {
            Ok(url) => url,
            Err(err) => {
                tracing::warn!(path = %request.path, error = %err, "unroutable proxy path");
                return Ok(BackendResponse {
                    status: 400,
                    headers: Vec::new(),
                    body: Bytes::from(format!("invalid path: {err}")),
                });
            }
        };

        let mut builder = self.client.request(method(request.method), url);
        for (name, value) in &request.headers {
            if SKIPPED_REQUEST_HEADERS
                .iter()
                .any(|skipped| name.eq_ignore_ascii_case(skipped))
            {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await?;

        Ok(BackendResponse {
            status,
            headers,
            body,
        })
    }
}

impl ProxyBackend for ReqwestBackend {
    fn forward(&self, request: ProxyRequest) -> BackendFuture<'_> {
        Box::pin(async move { self.send(request).await.map_err(Into::into) })
    }
}

fn method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}
