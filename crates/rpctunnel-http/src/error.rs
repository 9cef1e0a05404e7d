use rpctunnel_rpc::RpcError;

/// Errors returned by [`crate::HttpFetch::fetch`].
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The method is not one of GET, POST, PUT or DELETE. Raised before any
    /// RPC traffic.
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// The request target could not be resolved to a path.
    #[error("invalid request target {target}: {reason}")]
    InvalidTarget { target: String, reason: String },

    /// The host answered with something that is not a proxy response.
    #[error("invalid proxy response")]
    InvalidProxyResponse,

    /// The RPC call itself failed.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// The response body is not the JSON the caller asked for.
    #[error("response body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FetchError>;
