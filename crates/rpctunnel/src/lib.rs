//! JSON-RPC and HTTP tunnelling over postMessage-style channels.
//!
//! rpctunnel lets a sandboxed host with no network access make HTTP-shaped
//! requests by tunnelling them through a bidirectional message channel.
//!
//! # Crate Structure
//!
//! - [`channel`] — message channel abstraction, in-memory pairs, framed streams
//! - [`rpc`] — JSON-RPC 2.0 correlator, dispatcher and error codec
//! - [`http`] — fetch-style client and `http.proxy` host handler
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rpctunnel::channel::MemoryChannel;
//! use rpctunnel::http::{FetchInit, HttpFetch};
//! use rpctunnel::rpc::RpcClient;
//!
//! # async fn demo() -> Result<(), rpctunnel::http::FetchError> {
//! let (webview, _host) = MemoryChannel::pair();
//! let fetch = HttpFetch::new(RpcClient::connect(Arc::new(webview)));
//! let response = fetch.fetch("/api/tables", FetchInit::new()).await?;
//! println!("{} {}", response.status(), response.text());
//! # Ok(())
//! # }
//! ```

/// Re-export channel types.
pub mod channel {
    pub use rpctunnel_channel::*;
}

/// Re-export RPC types.
pub mod rpc {
    pub use rpctunnel_rpc::*;
}

/// Re-export HTTP tunnel types.
pub mod http {
    pub use rpctunnel_http::*;
}
