use rpctunnel_http::{normalize_method, FetchInit, HttpFetch};

use crate::cmd::host::HostSession;
use crate::cmd::{block_on, parse_duration, FetchArgs};
use crate::exit::{fetch_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_response, OutputFormat};

pub fn run(args: FetchArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    // Reject bad methods before a host is started.
    normalize_method(Some(&args.method)).map_err(|err| fetch_error("fetch failed", err))?;
    let headers = parse_headers(&args.headers)?;

    let mut init = FetchInit::new()
        .with_method(args.method.as_str())
        .with_headers(headers)
        .with_timeout(timeout);
    if let Some(data) = args.data {
        init = init.with_body(data);
    }

    block_on(async move {
        let host = HostSession::spawn(&args.host)?;
        let fetch = HttpFetch::new(host.client().clone());
        let outcome = fetch.fetch(args.path.as_str(), init).await;
        drop(fetch);
        host.shutdown().await;

        let response = outcome.map_err(|err| fetch_error("fetch failed", err))?;
        print_response(&response, format);
        if args.fail && !response.ok() {
            return Ok(FAILURE);
        }
        Ok(SUCCESS)
    })
}

fn parse_headers(raw: &[String]) -> CliResult<Vec<(String, String)>> {
    raw.iter()
        .map(|header| {
            let (name, value) = header.split_once(':').ok_or_else(|| {
                CliError::usage(format!("header must be NAME:VALUE, got {header:?}"))
            })?;
            let name = name.trim();
            if name.is_empty() {
                return Err(CliError::usage(format!("header name is empty in {header:?}")));
            }
            Ok((name.to_string(), value.trim().to_string()))
        })
        .collect()
}
