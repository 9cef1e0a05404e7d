use std::sync::Arc;

use rpctunnel::channel::MemoryChannel;
use rpctunnel::http::{
    register_proxy, BackendFuture, BackendResponse, FetchInit, HttpFetch, ProxyBackend,
    ProxyRequest,
};
use rpctunnel::rpc::{MethodTable, RpcClient, RpcServer};

struct Static;

impl ProxyBackend for Static {
    fn forward(&self, request: ProxyRequest) -> BackendFuture<'_> {
        Box::pin(async move {
            Ok(BackendResponse {
                status: 200,
                headers: vec![("x-path".to_string(), request.path)],
                body: "ok".into(),
            })
        })
    }
}

#[tokio::test]
async fn facade_wires_a_complete_tunnel() {
    let (webview, host) = MemoryChannel::pair();
    let _server = RpcServer::serve(Arc::new(host), register_proxy(MethodTable::new(), Static));
    let fetch = HttpFetch::new(RpcClient::connect(Arc::new(webview)));

    let response = fetch.fetch("/tables?limit=1", FetchInit::new()).await.unwrap();
    assert_eq!(response.text(), "ok");
    assert_eq!(response.header("X-Path"), Some("/tables?limit=1"));
}
