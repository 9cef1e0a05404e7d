use std::sync::Arc;

use rpctunnel_channel::{ChannelConfig, StreamChannel};
use rpctunnel_http::{register_proxy, BackendConfig, BackendError, ReqwestBackend};
use rpctunnel_rpc::{HandlerError, MethodTable, RpcServer, ServerConfig};
use serde_json::{json, Value};
use url::Url;

use crate::cmd::{block_on, parse_duration, ServeArgs};
use crate::exit::{CliError, CliResult, INTERNAL, SUCCESS, USAGE};

pub fn run(args: ServeArgs) -> CliResult<i32> {
    let upstream = Url::parse(&args.upstream)
        .map_err(|err| CliError::new(USAGE, format!("invalid --upstream: {err}")))?;
    let timeout = parse_duration(&args.upstream_timeout)?;
    let backend = ReqwestBackend::with_config(
        upstream,
        BackendConfig::default().with_timeout(Some(timeout)),
    )
    .map_err(|err| match err {
        BackendError::InvalidUpstream(_) => CliError::new(USAGE, err.to_string()),
        other => CliError::new(INTERNAL, other.to_string()),
    })?;

    block_on(async move {
        let config = ChannelConfig::default();
        let server_config =
            ServerConfig::default().with_max_response_size(config.max_payload_size);
        let channel = Arc::new(StreamChannel::spawn_with_config(
            tokio::io::stdin(),
            tokio::io::stdout(),
            config,
        ));
        tracing::info!(upstream = %backend.upstream(), "serving on stdio");
        let server =
            RpcServer::serve_with_config(channel.clone(), host_methods(backend), server_config);

        tokio::select! {
            _ = channel.closed() => tracing::info!("stdin closed; shutting down"),
            _ = tokio::signal::ctrl_c() => tracing::info!("interrupted; shutting down"),
        }
        server.stop();
        Ok(SUCCESS)
    })
}

/// Methods exposed by `serve`: the proxy plus two introspection helpers.
pub fn host_methods(backend: ReqwestBackend) -> MethodTable {
    let table = register_proxy(MethodTable::new(), backend).method("rpc.ping", ping);

    let mut names = table.method_names();
    names.push("rpc.methods".to_string());
    names.sort();
    table.method("rpc.methods", move |_params: Value| {
        let names = names.clone();
        async move { Ok::<Value, HandlerError>(json!(names)) }
    })
}

async fn ping(_params: Value) -> Result<Value, HandlerError> {
    Ok(json!({ "pong": true, "version": env!("CARGO_PKG_VERSION") }))
}

#[cfg(test)]
mod tests {
    use rpctunnel_rpc::MethodResolver;

    use super::*;

    fn table() -> MethodTable {
        let backend = ReqwestBackend::new(Url::parse("http://127.0.0.1:9").unwrap()).unwrap();
        host_methods(backend)
    }

    #[test]
    fn exposes_proxy_and_introspection() {
        assert_eq!(
            table().method_names(),
            vec!["http.proxy", "rpc.methods", "rpc.ping"]
        );
    }

    #[tokio::test]
    async fn introspection_methods_answer() {
        let table = table();
        let methods = table.resolve("rpc.methods").unwrap();
        assert_eq!(
            methods(json!([])).await.unwrap(),
            json!(["http.proxy", "rpc.methods", "rpc.ping"])
        );

        let ping = table.resolve("rpc.ping").unwrap();
        assert_eq!(ping(Value::Null).await.unwrap()["pong"], true);
    }
}
