//! HTTP requests tunnelled through JSON-RPC.
//!
//! The client side ([`HttpFetch`]) turns a fetch-style call into one
//! `http.proxy` request and rebuilds the response, rejecting anything that
//! is not exactly a proxy response. The host side ([`register_proxy`])
//! answers `http.proxy` by forwarding to a [`ProxyBackend`]; with the
//! `reqwest` feature, [`ReqwestBackend`] forwards to a real upstream.
//!
//! Response bodies that are not UTF-8 travel base64-encoded. Request bodies
//! are always text.

pub mod error;
pub mod fetch;
pub mod proxy;
pub mod response;
pub mod types;

#[cfg(feature = "reqwest")]
pub mod backend;

pub use error::{FetchError, Result};
pub use fetch::{
    build_request, extract_path, normalize_headers, normalize_method, FetchInit, FetchTarget,
    HeadersInit, HttpFetch, RequestBody,
};
pub use proxy::{register_proxy, BackendFuture, BackendResponse, ProxyBackend};
pub use response::{validate_proxy_result, FetchResponse};
pub use types::{BodyEncoding, HttpMethod, ProxyRequest, ProxyResponse, BASE_ORIGIN, PROXY_METHOD};

#[cfg(feature = "reqwest")]
pub use backend::{BackendConfig, BackendError, ReqwestBackend};
