use std::future::Future;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod call;
pub mod fetch;
pub mod host;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Answer http.proxy requests on stdin/stdout by forwarding to an upstream.
    Serve(ServeArgs),
    /// Tunnel one HTTP request through a host command.
    Fetch(FetchArgs),
    /// Make one raw RPC call against a host command.
    Call(CallArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args),
        Command::Fetch(args) => fetch::run(args, format),
        Command::Call(args) => call::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Base URL that proxied paths are appended to.
    #[arg(long, env = "RPCTUNNEL_UPSTREAM")]
    pub upstream: String,
    /// Per-request upstream timeout (e.g. 30s, 500ms).
    #[arg(long, default_value = "30s")]
    pub upstream_timeout: String,
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Path and query, or an absolute URL whose path and query are used.
    pub path: String,
    /// HTTP method: GET, POST, PUT or DELETE.
    #[arg(long, short = 'X', default_value = "GET")]
    pub method: String,
    /// Request header as NAME:VALUE. Repeatable.
    #[arg(long = "header", short = 'H', value_name = "NAME:VALUE")]
    pub headers: Vec<String>,
    /// Request body.
    #[arg(long, short = 'd')]
    pub data: Option<String>,
    /// Maximum time to wait for the response (e.g. 5s, 500ms).
    #[arg(long, default_value = "30s")]
    pub timeout: String,
    /// Exit with failure when the status is not 2xx.
    #[arg(long)]
    pub fail: bool,
    /// Host command that serves the tunnel on its stdio.
    #[arg(last = true, required = true, value_name = "HOST_COMMAND")]
    pub host: Vec<String>,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Method name.
    pub method: String,
    /// JSON params.
    #[arg(long)]
    pub params: Option<String>,
    /// Maximum time to wait for the response (e.g. 5s, 500ms).
    #[arg(long, default_value = "30s")]
    pub timeout: String,
    /// Host command that serves the tunnel on its stdio.
    #[arg(last = true, required = true, value_name = "HOST_COMMAND")]
    pub host: Vec<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Run `future` on a fresh multi-threaded runtime.
///
/// Blocking stdin readers are abandoned on return instead of awaited.
pub fn block_on<F>(future: F) -> CliResult<i32>
where
    F: Future<Output = CliResult<i32>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start runtime", err))?;
    let result = runtime.block_on(future);
    runtime.shutdown_background();
    result
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}
