//! Host half of the tunnel: the `http.proxy` handler.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use rpctunnel_rpc::{HandlerError, MethodTable, StructuredError};
use serde_json::Value;

use crate::types::{ProxyRequest, ProxyResponse, PROXY_METHOD};

/// What an upstream returned for one proxied request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendResponse {
    pub status: u16,
    /// In arrival order; repeated names are allowed.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl From<BackendResponse> for ProxyResponse {
    fn from(response: BackendResponse) -> Self {
        ProxyResponse::from_backend(response.status, response.headers, &response.body)
    }
}

pub type BackendFuture<'a> =
    Pin<Box<dyn Future<Output = Result<BackendResponse, HandlerError>> + Send + 'a>>;

/// Performs proxied requests for the host.
pub trait ProxyBackend: Send + Sync + 'static {
    fn forward(&self, request: ProxyRequest) -> BackendFuture<'_>;
}

/// Install the `http.proxy` handler backed by `backend`.
///
/// Params that are not a well-formed proxy request are answered with
/// `INVALID_PARAMS`; backend failures go through the usual error codec.
pub fn register_proxy<B: ProxyBackend>(table: MethodTable, backend: B) -> MethodTable {
    let backend: Arc<dyn ProxyBackend> = Arc::new(backend);
    table.method(PROXY_METHOD, move |params: Value| {
        proxy(Arc::clone(&backend), params)
    })
}

async fn proxy(backend: Arc<dyn ProxyBackend>, params: Value) -> Result<Value, HandlerError> {
    let request: ProxyRequest =
        serde_json::from_value(params).map_err(StructuredError::invalid_params)?;
    tracing::debug!(method = %request.method, path = %request.path, "forwarding proxy request");

    let response = ProxyResponse::from(backend.forward(request).await?);
    tracing::debug!(status = response.status, "proxy request completed");
    Ok(serde_json::to_value(response)?)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use rpctunnel_rpc::{MethodResolver, INVALID_PARAMS};
    use serde_json::json;

    use super::*;
    use crate::types::HttpMethod;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<ProxyRequest>>,
    }

    impl ProxyBackend for Arc<Recorder> {
        fn forward(&self, request: ProxyRequest) -> BackendFuture<'_> {
            Box::pin(async move {
                let body = format!("{} {}", request.method, request.path);
                self.seen.lock().unwrap().push(request);
                Ok(BackendResponse {
                    status: 201,
                    headers: vec![("content-type".into(), "text/plain".into())],
                    body: Bytes::from(body),
                })
            })
        }
    }

    async fn invoke(table: &MethodTable, params: Value) -> Result<Value, HandlerError> {
        let handler = table.resolve(PROXY_METHOD).expect("proxy registered");
        handler(params).await
    }

    #[tokio::test]
    async fn forwards_and_encodes_response() {
        let recorder = Arc::new(Recorder::default());
        let table = register_proxy(MethodTable::new(), Arc::clone(&recorder));

        let result = invoke(
            &table,
            json!({"method": "POST", "path": "/rows?x=1", "headers": {"a": "b"}, "body": "{}"}),
        )
        .await
        .unwrap();

        assert_eq!(
            result,
            json!({
                "status": 201,
                "headers": {"content-type": "text/plain"},
                "body": "POST /rows?x=1",
                "bodyEncoding": "utf8"
            })
        );
        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen[0].method, HttpMethod::Post);
        assert_eq!(seen[0].headers["a"], "b");
        assert_eq!(seen[0].body.as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn malformed_params_are_invalid_params() {
        let recorder = Arc::new(Recorder::default());
        let table = register_proxy(MethodTable::new(), Arc::clone(&recorder));

        let cases = [
            json!([]),
            json!({"method": "PATCH", "path": "/", "headers": {}}),
            json!({"method": "GET", "headers": {}}),
            json!({"method": "GET", "path": "/"}),
            json!({"method": "GET", "path": "/", "headers": {"n": 1}}),
        ];
        for params in cases {
            let err = invoke(&table, params).await.unwrap_err();
            let structured = rpctunnel_rpc::to_structured_error(&*err);
            assert_eq!(structured.code, INVALID_PARAMS);
        }
        assert!(recorder.seen.lock().unwrap().is_empty());
    }
}
