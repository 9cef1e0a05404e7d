use rpctunnel_rpc::RequestOptions;
use serde_json::Value;

use crate::cmd::host::HostSession;
use crate::cmd::{block_on, parse_duration, CallArgs};
use crate::exit::{rpc_error, CliError, CliResult, SUCCESS};
use crate::output::{print_result, OutputFormat};

pub fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let params = parse_params(args.params.as_deref())?;

    block_on(async move {
        let host = HostSession::spawn(&args.host)?;
        let options = RequestOptions::default().with_timeout(timeout);
        let outcome = host
            .client()
            .request_with(&args.method, params, options)
            .await;
        host.shutdown().await;

        let result = outcome.map_err(|err| rpc_error("call failed", err))?;
        print_result(&args.method, &result, format);
        Ok(SUCCESS)
    })
}

fn parse_params(raw: Option<&str>) -> CliResult<Option<Value>> {
    raw.map(|text| {
        serde_json::from_str(text)
            .map_err(|err| CliError::usage(format!("--params is not valid JSON: {err}")))
    })
    .transpose()
}
