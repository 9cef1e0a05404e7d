//! Method dispatcher.
//!
//! `RpcServer` listens for request envelopes on a channel, resolves each
//! method through a [`MethodResolver`], runs the handler on its own task and
//! replies with the result or a structured error. Handlers run concurrently;
//! a handler that needs exclusive access to shared state brings its own lock.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rpctunnel_channel::{MessageChannel, Subscription};
use serde_json::Value;
use tokio::runtime::Handle;

use crate::envelope::{Envelope, RequestEnvelope, ResponseEnvelope};
use crate::structured::{to_structured_error, HandlerError, StructuredError};

/// Boxed future returned by a [`Handler`].
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, HandlerError>> + Send>>;

/// An async method implementation: params in, result or failure out.
pub type Handler = Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

/// Wrap an async function as a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    Arc::new(move |params| Box::pin(f(params)))
}

/// Maps a method name to its handler.
pub trait MethodResolver: Send + Sync + 'static {
    fn resolve(&self, method: &str) -> Option<Handler>;
}

/// Static method table.
#[derive(Clone, Default)]
pub struct MethodTable {
    handlers: HashMap<String, Handler>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration.
    pub fn method<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.insert(name, handler(f));
        self
    }

    /// Register a handler, replacing any previous one with the same name.
    pub fn insert(&mut self, name: impl Into<String>, handler: Handler) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered method names, sorted.
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodTable")
            .field("methods", &self.method_names())
            .finish()
    }
}

impl MethodResolver for MethodTable {
    fn resolve(&self, method: &str) -> Option<Handler> {
        self.handlers.get(method).cloned()
    }
}

/// Dynamic resolver backed by a closure.
pub struct ResolverFn<F>(pub F);

impl<F> MethodResolver for ResolverFn<F>
where
    F: Fn(&str) -> Option<Handler> + Send + Sync + 'static,
{
    fn resolve(&self, method: &str) -> Option<Handler> {
        (self.0)(method)
    }
}

/// Dispatcher configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// Largest encoded response the channel can carry, in bytes.
    ///
    /// A result that encodes larger than this is answered with
    /// `INTERNAL_ERROR` instead, so the caller is not left waiting on a
    /// response the transport would drop. `None` disables the check.
    pub max_response_size: Option<usize>,
}

impl ServerConfig {
    pub fn with_max_response_size(mut self, max: usize) -> Self {
        self.max_response_size = Some(max);
        self
    }
}

/// A running dispatcher. Dropping it stops dispatching new requests;
/// handlers already running still reply.
pub struct RpcServer {
    subscription: Subscription,
}

impl RpcServer {
    /// Start serving `resolver` on `channel`.
    ///
    /// Must be called from within a tokio runtime; handlers are spawned on it.
    pub fn serve<R: MethodResolver>(channel: Arc<dyn MessageChannel>, resolver: R) -> Self {
        Self::serve_with_config(channel, resolver, ServerConfig::default())
    }

    /// Start serving with explicit configuration.
    pub fn serve_with_config<R: MethodResolver>(
        channel: Arc<dyn MessageChannel>,
        resolver: R,
        config: ServerConfig,
    ) -> Self {
        let resolver: Arc<dyn MethodResolver> = Arc::new(resolver);
        let runtime = Handle::current();
        let replier = Replier {
            channel: Arc::clone(&channel),
            max_size: config.max_response_size,
        };

        let subscription = channel.on_message(Arc::new(move |message: &Value| {
            let Some(Envelope::Request(request)) = Envelope::decode(message) else {
                return;
            };
            dispatch(&runtime, resolver.as_ref(), replier.clone(), request);
        }));

        Self { subscription }
    }

    /// Stop dispatching. Idempotent.
    pub fn stop(&self) {
        self.subscription.unsubscribe();
    }

    pub fn is_serving(&self) -> bool {
        self.subscription.is_active()
    }
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for RpcServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcServer")
            .field("serving", &self.is_serving())
            .finish()
    }
}

fn dispatch(
    runtime: &Handle,
    resolver: &dyn MethodResolver,
    replier: Replier,
    request: RequestEnvelope,
) {
    let RequestEnvelope {
        id, method, params, ..
    } = request;

    let Some(handler) = resolver.resolve(&method) else {
        tracing::debug!(id, method = %method, "method not found");
        replier.reply(ResponseEnvelope::failure(
            id,
            StructuredError::method_not_found(&method),
        ));
        return;
    };

    let params = params.unwrap_or_else(|| Value::Array(Vec::new()));
    tracing::debug!(id, method = %method, "dispatching rpc request");

    let task_runtime = runtime.clone();
    runtime.spawn(async move {
        // The handler runs on its own task so a panic surfaces as a JoinError.
        let outcome = task_runtime
            .spawn(async move { handler(params).await })
            .await;
        let response = match outcome {
            Ok(Ok(result)) => ResponseEnvelope::success(id, result),
            Ok(Err(err)) => {
                let structured = to_structured_error(&*err);
                tracing::debug!(
                    id,
                    method = %method,
                    code = structured.code,
                    error = %structured,
                    "handler failed"
                );
                ResponseEnvelope::failure(id, structured)
            }
            Err(join) => {
                tracing::error!(id, method = %method, error = %join, "handler panicked");
                ResponseEnvelope::failure(
                    id,
                    StructuredError::internal(format!("handler for {method} panicked")),
                )
            }
        };
        replier.reply(response);
    });
}

#[derive(Clone)]
struct Replier {
    channel: Arc<dyn MessageChannel>,
    max_size: Option<usize>,
}

impl Replier {
    fn reply(&self, response: ResponseEnvelope) {
        let id = response.id;
        let message = match Envelope::from(response).to_value() {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(id, error = %err, "failed to encode rpc response");
                return;
            }
        };

        if let Some(max) = self.max_size {
            let size = encoded_len(&message);
            if size > max {
                tracing::warn!(id, size, max, "rpc response too large; replying with an error");
                let fallback = ResponseEnvelope::failure(
                    id,
                    StructuredError::internal(format!(
                        "response too large ({size} bytes, max {max})"
                    )),
                );
                match Envelope::from(fallback).to_value() {
                    Ok(message) => self.channel.send(message),
                    Err(err) => tracing::warn!(id, error = %err, "failed to encode rpc response"),
                }
                return;
            }
        }
        self.channel.send(message);
    }
}

fn encoded_len(message: &Value) -> usize {
    serde_json::to_vec(message).map_or(usize::MAX, |bytes| bytes.len())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use rpctunnel_channel::{MemoryChannel, MessageHandler};
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::envelope::JSONRPC_VERSION;
    use crate::structured::{make_error, DEFAULT_ERROR_CODE, INTERNAL_ERROR, METHOD_NOT_FOUND};

    async fn echo(params: Value) -> Result<Value, HandlerError> {
        Ok(params)
    }

    async fn fail(_params: Value) -> Result<Value, HandlerError> {
        Err(make_error("denied", Some(json!("read only")), Some(-32010)).into())
    }

    async fn explode(_params: Value) -> Result<Value, HandlerError> {
        panic!("handler blew up");
    }

    /// Serve `resolver` on one end; return the other end plus a response feed.
    fn harness<R: MethodResolver>(
        resolver: R,
    ) -> (RpcServer, Arc<MemoryChannel>, mpsc::UnboundedReceiver<ResponseEnvelope>) {
        let (server_end, client_end) = MemoryChannel::pair();
        let client_end = Arc::new(client_end);
        let (tx, rx) = mpsc::unbounded_channel();
        let forward: MessageHandler = Arc::new(move |msg: &Value| {
            if let Some(Envelope::Response(resp)) = Envelope::decode(msg) {
                let _ = tx.send(resp);
            }
        });
        let _sub = client_end.on_message(forward);
        let server = RpcServer::serve(Arc::new(server_end), resolver);
        (server, client_end, rx)
    }

    fn send_request(client: &MemoryChannel, id: u64, method: &str, params: Option<Value>) {
        let msg = Envelope::from(RequestEnvelope::new(id, method, params))
            .to_value()
            .unwrap();
        client.send(msg);
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<ResponseEnvelope>) -> ResponseEnvelope {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("response should arrive")
            .expect("channel open")
    }

    #[tokio::test]
    async fn success_replies_with_result() {
        let table = MethodTable::new().method("echo", echo);
        let (_server, client, mut rx) = harness(table);

        send_request(&client, 5, "echo", Some(json!({"a": [1, 2]})));
        let resp = next(&mut rx).await;
        assert_eq!(resp.id, 5);
        assert_eq!(resp.jsonrpc, JSONRPC_VERSION);
        assert_eq!(resp.into_outcome().unwrap(), json!({"a": [1, 2]}));
    }

    #[tokio::test]
    async fn missing_params_default_to_empty_array() {
        let table = MethodTable::new().method("echo", echo);
        let (_server, client, mut rx) = harness(table);

        send_request(&client, 1, "echo", None);
        assert_eq!(next(&mut rx).await.into_outcome().unwrap(), json!([]));
    }

    #[tokio::test]
    async fn unknown_method_replies_not_found_without_invoking() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = ResolverFn({
            let calls = Arc::clone(&calls);
            move |_name: &str| -> Option<Handler> {
                calls.fetch_add(1, Ordering::SeqCst);
                None
            }
        });
        let (_server, client, mut rx) = harness(resolver);

        send_request(&client, 42, "missing.method", None);
        let resp = next(&mut rx).await;
        assert_eq!(resp.id, 42);
        let err = resp.into_outcome().unwrap_err();
        assert_eq!(err.code, METHOD_NOT_FOUND);
        assert!(err.message.contains("missing.method"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_errors_become_structured_replies() {
        let table = MethodTable::new().method("fail", fail);
        let (_server, client, mut rx) = harness(table);

        send_request(&client, 2, "fail", None);
        let err = next(&mut rx).await.into_outcome().unwrap_err();
        assert_eq!(err.code, -32010);
        assert_eq!(err.message, "denied");
        assert_eq!(err.description(), Some("read only"));
    }

    #[tokio::test]
    async fn plain_errors_get_default_code() {
        let table = MethodTable::new().method("io", |_params: Value| async {
            let err = std::io::Error::other("disk on fire");
            Err::<Value, HandlerError>(err.into())
        });
        let (_server, client, mut rx) = harness(table);

        send_request(&client, 3, "io", None);
        let err = next(&mut rx).await.into_outcome().unwrap_err();
        assert_eq!(err.code, DEFAULT_ERROR_CODE);
        assert_eq!(err.message, "disk on fire");
    }

    #[tokio::test]
    async fn panicking_handler_does_not_stop_dispatcher() {
        let table = MethodTable::new()
            .method("explode", explode)
            .method("echo", echo);
        let (_server, client, mut rx) = harness(table);

        send_request(&client, 1, "explode", None);
        let err = next(&mut rx).await.into_outcome().unwrap_err();
        assert_eq!(err.code, INTERNAL_ERROR);

        send_request(&client, 2, "echo", Some(json!("still alive")));
        assert_eq!(
            next(&mut rx).await.into_outcome().unwrap(),
            json!("still alive")
        );
    }

    #[tokio::test]
    async fn handlers_run_concurrently() {
        let (release_tx, release_rx) = tokio::sync::watch::channel(false);
        let table = MethodTable::new()
            .method("block", move |_params: Value| {
                let mut release = release_rx.clone();
                async move {
                    let _ = release.wait_for(|released| *released).await;
                    Ok::<Value, HandlerError>(json!("unblocked"))
                }
            })
            .method("echo", echo);
        let (_server, client, mut rx) = harness(table);

        send_request(&client, 1, "block", None);
        send_request(&client, 2, "echo", Some(json!("fast")));

        let first = next(&mut rx).await;
        assert_eq!(first.id, 2);

        release_tx.send(true).unwrap();
        let second = next(&mut rx).await;
        assert_eq!(second.id, 1);
        assert_eq!(second.into_outcome().unwrap(), json!("unblocked"));
    }

    #[tokio::test]
    async fn responses_and_foreign_messages_are_ignored() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = ResolverFn({
            let calls = Arc::clone(&calls);
            move |_name: &str| -> Option<Handler> {
                calls.fetch_add(1, Ordering::SeqCst);
                Some(handler(echo))
            }
        });
        let (_server, client, mut rx) = harness(resolver);

        client.send(json!({"type": "resize", "width": 10}));
        client.send(
            Envelope::from(ResponseEnvelope::success(9, json!(1)))
                .to_value()
                .unwrap(),
        );
        send_request(&client, 10, "echo", Some(json!(true)));

        let resp = next(&mut rx).await;
        assert_eq!(resp.id, 10);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn oversized_result_is_answered_with_an_error() {
        let table = MethodTable::new().method("echo", echo);
        let (server_end, client_end) = MemoryChannel::pair();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = client_end.on_message(Arc::new(move |msg: &Value| {
            if let Some(Envelope::Response(resp)) = Envelope::decode(msg) {
                let _ = tx.send(resp);
            }
        }));
        let _server = RpcServer::serve_with_config(
            Arc::new(server_end),
            table,
            ServerConfig::default().with_max_response_size(256),
        );

        send_request(&client_end, 7, "echo", Some(json!("x".repeat(1024))));
        let resp = next(&mut rx).await;
        assert_eq!(resp.id, 7);
        let err = resp.into_outcome().unwrap_err();
        assert_eq!(err.code, INTERNAL_ERROR);
        assert!(err.message.contains("too large"), "{}", err.message);

        send_request(&client_end, 8, "echo", Some(json!("small")));
        assert_eq!(next(&mut rx).await.into_outcome().unwrap(), json!("small"));
    }

    #[tokio::test]
    async fn stop_ends_dispatch() {
        let table = MethodTable::new().method("echo", echo);
        let (server, client, mut rx) = harness(table);

        server.stop();
        server.stop();
        assert!(!server.is_serving());

        send_request(&client, 1, "echo", None);
        let waited = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(waited.is_err());
    }

    #[test]
    fn method_table_introspection() {
        let table = MethodTable::new()
            .method("b.second", echo)
            .method("a.first", echo);
        assert_eq!(table.method_names(), vec!["a.first", "b.second"]);
        assert!(table.contains("a.first"));
        assert!(!table.contains("c"));
        assert_eq!(table.len(), 2);
        assert!(table.resolve("a.first").is_some());
    }
}
