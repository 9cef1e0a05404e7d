use std::sync::{Arc, Mutex};

use bytes::Bytes;
use rpctunnel_channel::{MemoryChannel, MessageChannel};
use rpctunnel_http::{
    register_proxy, BackendFuture, BackendResponse, FetchError, FetchInit, HttpFetch,
    ProxyBackend, ProxyRequest, PROXY_METHOD,
};
use rpctunnel_rpc::{
    Envelope, HandlerError, MethodTable, RpcClient, RpcServer, METHOD_NOT_FOUND,
};
use serde_json::{json, Value};

/// Backend that answers from a fixed route table and records what it saw.
#[derive(Default)]
struct FakeUpstream {
    seen: Mutex<Vec<ProxyRequest>>,
}

/// Local newtype so the shared fake can implement the foreign trait (orphan rule).
struct SharedUpstream(Arc<FakeUpstream>);

impl ProxyBackend for SharedUpstream {
    fn forward(&self, request: ProxyRequest) -> BackendFuture<'_> {
        Box::pin(async move {
            self.0.seen.lock().unwrap().push(request.clone());
            let response = match request.path.as_str() {
                "/hello" => BackendResponse {
                    status: 200,
                    headers: vec![("Content-Type".into(), "text/plain".into())],
                    body: Bytes::from_static(b"Hello, World!"),
                },
                "/blob" => BackendResponse {
                    status: 200,
                    headers: vec![("content-type".into(), "application/octet-stream".into())],
                    body: Bytes::from_static(&[0x00, 0xff, 0xfe, 0x10]),
                },
                "/empty" => BackendResponse {
                    status: 204,
                    ..Default::default()
                },
                "/echo" => BackendResponse {
                    status: 200,
                    headers: Vec::new(),
                    body: Bytes::from(request.body.unwrap_or_default()),
                },
                _ => return Err(HandlerError::from("upstream unreachable")),
            };
            Ok(response)
        })
    }
}

struct Tunnel {
    fetch: HttpFetch,
    upstream: Arc<FakeUpstream>,
    client_end: Arc<MemoryChannel>,
    _server: RpcServer,
}

fn tunnel() -> Tunnel {
    let (client_end, host_end) = MemoryChannel::pair();
    let client_end = Arc::new(client_end);
    let upstream = Arc::new(FakeUpstream::default());
    let server = RpcServer::serve(
        Arc::new(host_end),
        register_proxy(MethodTable::new(), SharedUpstream(Arc::clone(&upstream))),
    );
    let rpc = RpcClient::connect(client_end.clone());
    Tunnel {
        fetch: HttpFetch::new(rpc),
        upstream,
        client_end,
        _server: server,
    }
}

#[tokio::test]
async fn text_response_round_trips() {
    let t = tunnel();
    let response = t
        .fetch
        .fetch("http://ignored.example/hello", FetchInit::new())
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text(), "Hello, World!");
    assert_eq!(response.header("content-type"), Some("text/plain"));
}

#[tokio::test]
async fn binary_response_survives_the_tunnel() {
    let t = tunnel();
    let response = t.fetch.fetch("/blob", FetchInit::new()).await.unwrap();
    assert_eq!(
        response.bytes(),
        Bytes::from_static(&[0x00, 0xff, 0xfe, 0x10])
    );
}

#[tokio::test]
async fn no_content_has_empty_text() {
    let t = tunnel();
    let response = t.fetch.fetch("/empty", FetchInit::new()).await.unwrap();
    assert_eq!(response.status(), 204);
    assert!(!response.has_body());
    assert_eq!(response.text(), "");
}

#[tokio::test]
async fn request_shape_reaches_the_host() {
    let t = tunnel();
    let init = FetchInit::new()
        .with_method("post")
        .with_headers(vec![("Content-Type", "application/json")])
        .with_body(json!({"name": "x"}));
    let response = t.fetch.fetch("/echo", init).await.unwrap();
    assert_eq!(response.json::<Value>().unwrap(), json!({"name": "x"}));

    let seen = t.upstream.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].path, "/echo");
    assert_eq!(seen[0].headers["Content-Type"], "application/json");
    assert_eq!(seen[0].body.as_deref(), Some("{\"name\":\"x\"}"));
}

#[tokio::test]
async fn wire_request_omits_absent_body() {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let (client_end, host_end) = MemoryChannel::pair();
    let _capture = host_end.on_message({
        let captured = Arc::clone(&captured);
        Arc::new(move |msg: &Value| {
            if let Some(Envelope::Request(req)) = Envelope::decode(msg) {
                captured.lock().unwrap().push(req);
            }
        })
    });
    let fetch = HttpFetch::new(RpcClient::connect(Arc::new(client_end)));
    let pending = tokio::spawn(async move { fetch.fetch("/rows?page=2", FetchInit::new()).await });

    for _ in 0..100 {
        if !captured.lock().unwrap().is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }
    pending.abort();

    let captured = captured.lock().unwrap();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].method, PROXY_METHOD);
    assert_eq!(
        captured[0].params,
        Some(json!({"method": "GET", "path": "/rows?page=2", "headers": {}}))
    );
}

#[tokio::test]
async fn unsupported_method_sends_nothing() {
    let t = tunnel();
    let err = t
        .fetch
        .fetch("/hello", FetchInit::new().with_method("PATCH"))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::UnsupportedMethod(_)));
    assert_eq!(t.client_end.sent_count(), 0);
    assert!(t.upstream.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn host_without_proxy_reports_method_not_found() {
    let (client_end, host_end) = MemoryChannel::pair();
    let _server = RpcServer::serve(Arc::new(host_end), MethodTable::new());
    let fetch = HttpFetch::new(RpcClient::connect(Arc::new(client_end)));

    let err = fetch.fetch("/hello", FetchInit::new()).await.unwrap_err();
    let FetchError::Rpc(rpc) = &err else {
        panic!("expected rpc error, got {err:?}");
    };
    assert_eq!(rpc.as_remote().map(|e| e.code), Some(METHOD_NOT_FOUND));
}

#[tokio::test]
async fn misbehaving_host_is_rejected() {
    let (client_end, host_end) = MemoryChannel::pair();
    let table = MethodTable::new().method(PROXY_METHOD, |_params: Value| async {
        Ok::<Value, HandlerError>(json!({"status": 200, "headers": {}, "body": 7}))
    });
    let _server = RpcServer::serve(Arc::new(host_end), table);
    let fetch = HttpFetch::new(RpcClient::connect(Arc::new(client_end)));

    let err = fetch.fetch("/anything", FetchInit::new()).await.unwrap_err();
    assert_eq!(err.to_string(), "invalid proxy response");
}
