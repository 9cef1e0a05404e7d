use crate::structured::StructuredError;

/// Errors a client sees when a request does not produce a result.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The remote handler failed, or the method does not exist.
    #[error("{0}")]
    Remote(StructuredError),

    /// No response arrived within the requested timeout.
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The request was cancelled by the caller.
    #[error("request cancelled")]
    Cancelled,

    /// The client was closed, or its channel ended, before a response arrived.
    #[error("rpc client closed")]
    Closed,

    /// Params or result could not be (de)serialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RpcError {
    /// The structured error behind a remote failure.
    pub fn as_remote(&self) -> Option<&StructuredError> {
        match self {
            RpcError::Remote(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StructuredError> for RpcError {
    fn from(err: StructuredError) -> Self {
        RpcError::Remote(err)
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
