//! A host command whose stdio carries the tunnel.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use rpctunnel_channel::StreamChannel;
use rpctunnel_rpc::RpcClient;
use tokio::process::{Child, Command};

use crate::exit::{io_error, CliError, CliResult, INTERNAL};

const EXIT_GRACE: Duration = Duration::from_secs(2);

pub struct HostSession {
    program: String,
    child: Child,
    channel: Arc<StreamChannel>,
    client: RpcClient,
}

impl HostSession {
    /// Start `command` with piped stdin/stdout; its stderr passes through.
    pub fn spawn(command: &[String]) -> CliResult<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| CliError::usage("missing host command after --"))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| io_error(&format!("failed to start host {program}"), err))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CliError::new(INTERNAL, "host stdin was not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CliError::new(INTERNAL, "host stdout was not captured"))?;

        let channel = Arc::new(StreamChannel::spawn(stdout, stdin));
        let client = RpcClient::connect(channel.clone());
        // A host that exits or hangs up fails whatever is still in flight.
        client.close_on(channel.close_signal());
        tracing::debug!(host = %program, pid = child.id(), "host started");

        Ok(Self {
            program: program.clone(),
            child,
            channel,
            client,
        })
    }

    pub fn client(&self) -> &RpcClient {
        &self.client
    }

    /// Close the host's stdin and give it a moment to exit on its own.
    pub async fn shutdown(self) {
        let Self {
            program,
            mut child,
            channel,
            client,
        } = self;
        drop(client);
        drop(channel);

        match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
            Ok(Ok(status)) => tracing::debug!(host = %program, %status, "host exited"),
            Ok(Err(err)) => tracing::warn!(host = %program, error = %err, "failed to reap host"),
            Err(_) => {
                tracing::debug!(host = %program, "host still running; killing it");
                let _ = child.kill().await;
            }
        }
    }
}
