//! Client half of the tunnel: a fetch-style call mapped onto `http.proxy`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use http::HeaderMap;
use rpctunnel_rpc::{RequestOptions, RpcClient, RpcError};
use url::Url;

use crate::error::{FetchError, Result};
use crate::response::FetchResponse;
use crate::types::{HttpMethod, ProxyRequest, BASE_ORIGIN, PROXY_METHOD};

/// What to fetch: a path, a path with query, an absolute URL string, or a
/// parsed [`Url`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchTarget {
    Path(String),
    Url(Url),
}

impl From<&str> for FetchTarget {
    fn from(target: &str) -> Self {
        Self::Path(target.to_string())
    }
}

impl From<String> for FetchTarget {
    fn from(target: String) -> Self {
        Self::Path(target)
    }
}

impl From<Url> for FetchTarget {
    fn from(url: Url) -> Self {
        Self::Url(url)
    }
}

impl From<&Url> for FetchTarget {
    fn from(url: &Url) -> Self {
        Self::Url(url.clone())
    }
}

/// Request headers in any of the shapes callers tend to have at hand.
#[derive(Debug, Clone)]
pub enum HeadersInit {
    /// Names come out lower-cased; repeated values are joined with `", "`.
    Map(HeaderMap),
    /// Names keep the caller's case; a later duplicate replaces an earlier one.
    Pairs(Vec<(String, String)>),
    /// Names keep the caller's case.
    Object(BTreeMap<String, String>),
}

impl From<HeaderMap> for HeadersInit {
    fn from(map: HeaderMap) -> Self {
        Self::Map(map)
    }
}

impl<K, V> From<Vec<(K, V)>> for HeadersInit
where
    K: Into<String>,
    V: Into<String>,
{
    fn from(pairs: Vec<(K, V)>) -> Self {
        Self::Pairs(
            pairs
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

impl From<BTreeMap<String, String>> for HeadersInit {
    fn from(object: BTreeMap<String, String>) -> Self {
        Self::Object(object)
    }
}

impl From<HashMap<String, String>> for HeadersInit {
    fn from(object: HashMap<String, String>) -> Self {
        Self::Object(object.into_iter().collect())
    }
}

/// Request body. Everything is sent as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Text(String),
    /// Decoded as UTF-8; invalid sequences are replaced.
    Bytes(Bytes),
    /// A non-text value already rendered through `Display`.
    Other(String),
}

impl RequestBody {
    /// Render any displayable value as a body.
    pub fn display(value: impl fmt::Display) -> Self {
        Self::Other(value.to_string())
    }

    /// The text that goes on the wire.
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) | Self::Other(text) => text,
            Self::Bytes(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        }
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<&[u8]> for RequestBody {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(Bytes::copy_from_slice(bytes))
    }
}

macro_rules! display_body {
    ($($ty:ty),*) => {
        $(impl From<$ty> for RequestBody {
            fn from(value: $ty) -> Self {
                Self::display(value)
            }
        })*
    };
}

display_body!(i32, i64, u32, u64, f64, bool);

impl From<serde_json::Value> for RequestBody {
    /// Strings go as-is; other JSON values as their JSON text.
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(text) => Self::Text(text),
            other => Self::Other(other.to_string()),
        }
    }
}

/// Options for one fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchInit {
    /// Defaults to GET.
    pub method: Option<String>,
    pub headers: Option<HeadersInit>,
    pub body: Option<RequestBody>,
    /// Timeout and cancellation for the underlying RPC call.
    pub rpc: RequestOptions,
}

impl FetchInit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_headers(mut self, headers: impl Into<HeadersInit>) -> Self {
        self.headers = Some(headers.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.rpc = self.rpc.with_timeout(timeout);
        self
    }

    pub fn with_rpc_options(mut self, options: RequestOptions) -> Self {
        self.rpc = options;
        self
    }
}

/// Fetch-style HTTP client that tunnels every request through one RPC call.
#[derive(Debug, Clone)]
pub struct HttpFetch {
    rpc: RpcClient,
}

impl HttpFetch {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    /// Perform one request.
    ///
    /// Validation of method and target happens before anything is sent.
    /// Exactly one `http.proxy` call is made per fetch.
    pub async fn fetch(
        &self,
        input: impl Into<FetchTarget>,
        init: FetchInit,
    ) -> Result<FetchResponse> {
        let FetchInit {
            method,
            headers,
            body,
            rpc,
        } = init;
        let request = build_request(input.into(), method.as_deref(), headers, body)?;
        tracing::debug!(method = %request.method, path = %request.path, "tunnelling fetch");

        let params = serde_json::to_value(&request).map_err(RpcError::from)?;
        let result = self
            .rpc
            .request_with(PROXY_METHOD, Some(params), rpc)
            .await?;
        FetchResponse::from_proxy_result(&result)
    }
}

/// Assemble the wire request for a fetch.
pub fn build_request(
    target: FetchTarget,
    method: Option<&str>,
    headers: Option<HeadersInit>,
    body: Option<RequestBody>,
) -> Result<ProxyRequest> {
    Ok(ProxyRequest {
        method: normalize_method(method)?,
        path: extract_path(&target)?,
        headers: normalize_headers(headers),
        body: body.map(RequestBody::into_text),
    })
}

/// Upper-case and check the method; absent means GET.
pub fn normalize_method(method: Option<&str>) -> Result<HttpMethod> {
    match method {
        None => Ok(HttpMethod::Get),
        Some(name) => {
            HttpMethod::parse(name).ok_or_else(|| FetchError::UnsupportedMethod(name.to_string()))
        }
    }
}

/// Reduce a target to `pathname + search`, resolved against [`BASE_ORIGIN`].
pub fn extract_path(target: &FetchTarget) -> Result<String> {
    let resolved = match target {
        FetchTarget::Url(url) => url.clone(),
        FetchTarget::Path(raw) => {
            let invalid = |reason: String| FetchError::InvalidTarget {
                target: raw.clone(),
                reason,
            };
            Url::parse(BASE_ORIGIN)
                .map_err(|err| invalid(err.to_string()))?
                .join(raw)
                .map_err(|err| invalid(err.to_string()))?
        }
    };

    let mut path = resolved.path().to_string();
    if let Some(query) = resolved.query() {
        path.push('?');
        path.push_str(query);
    }
    Ok(path)
}

/// Flatten any header shape into one map. Absent headers give an empty map.
pub fn normalize_headers(headers: Option<HeadersInit>) -> BTreeMap<String, String> {
    match headers {
        None => BTreeMap::new(),
        Some(HeadersInit::Object(object)) => object,
        Some(HeadersInit::Pairs(pairs)) => pairs.into_iter().collect(),
        Some(HeadersInit::Map(map)) => {
            let mut flat = BTreeMap::new();
            for name in map.keys() {
                let joined = map
                    .get_all(name)
                    .iter()
                    .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
                    .collect::<Vec<_>>()
                    .join(", ");
                flat.insert(name.as_str().to_string(), joined);
            }
            flat
        }
    }
}
