use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::channel::{Listeners, MessageChannel, MessageHandler, Subscription};
use crate::codec::{ChannelConfig, MessageCodec};
use crate::error::ChannelError;

/// A message channel over an async byte stream pair.
///
/// Outbound messages are queued and written by a background task, so
/// [`MessageChannel::send`] never blocks. A second task reads frames and fans
/// them out to listeners. Frames whose payload is not JSON are skipped; a
/// corrupted stream (bad magic, oversized frame) or EOF ends the reader and
/// marks the channel closed.
///
/// An outbound message that cannot be framed (too large, not serializable) is
/// logged and dropped; only a write error on the stream closes the channel.
/// Dropping the channel stops the reader and lets the writer flush what is
/// already queued.
///
/// Both tasks are spawned on the current tokio runtime.
#[derive(Debug)]
pub struct StreamChannel {
    outbound: mpsc::UnboundedSender<Value>,
    listeners: Listeners,
    closed: CancellationToken,
}

impl StreamChannel {
    /// Spawn reader and writer tasks with default configuration.
    pub fn spawn<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::spawn_with_config(reader, writer, ChannelConfig::default())
    }

    /// Spawn reader and writer tasks with explicit configuration.
    pub fn spawn_with_config<R, W>(reader: R, writer: W, config: ChannelConfig) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, rx) = mpsc::unbounded_channel();
        let listeners = Listeners::new();
        let closed = CancellationToken::new();

        tokio::spawn(write_loop(
            FramedWrite::new(writer, MessageCodec::new(config.clone())),
            rx,
            closed.clone(),
        ));
        tokio::spawn(read_loop(
            FramedRead::new(reader, MessageCodec::new(config)),
            listeners.clone(),
            closed.clone(),
        ));

        Self {
            outbound,
            listeners,
            closed,
        }
    }

    /// Wait until the inbound side of the stream has ended.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// A token cancelled when this channel closes.
    ///
    /// Cancelling the returned token does not close the channel.
    pub fn close_signal(&self) -> CancellationToken {
        self.closed.child_token()
    }
}

impl Drop for StreamChannel {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

impl MessageChannel for StreamChannel {
    fn send(&self, message: Value) {
        if self.outbound.send(message).is_err() {
            tracing::warn!("stream channel writer has stopped; dropping outbound message");
        }
    }

    fn on_message(&self, handler: MessageHandler) -> Subscription {
        self.listeners.add(handler)
    }
}

async fn write_loop<W>(
    mut sink: FramedWrite<W, MessageCodec>,
    mut rx: mpsc::UnboundedReceiver<Value>,
    closed: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        match sink.send(message).await {
            Ok(()) => {}
            // Rejected before any byte reached the stream.
            Err(err @ (ChannelError::PayloadTooLarge { .. } | ChannelError::Json(_))) => {
                tracing::warn!(error = %err, "dropping outbound message");
            }
            Err(err) => {
                tracing::warn!(error = %err, "stream channel write failed; closing channel");
                closed.cancel();
                break;
            }
        }
    }
}

async fn read_loop<R>(
    mut frames: FramedRead<R, MessageCodec>,
    listeners: Listeners,
    closed: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            next = frames.next() => next,
        };
        match next {
            Some(Ok(payload)) => match serde_json::from_slice::<Value>(&payload) {
                Ok(message) => listeners.dispatch(&message),
                Err(err) => {
                    tracing::debug!(
                        error = %err,
                        size = payload.len(),
                        "ignoring frame with non-JSON payload"
                    );
                }
            },
            Some(Err(err)) => {
                tracing::warn!(error = %err, "stream channel read failed; closing channel");
                break;
            }
            None => {
                tracing::debug!("stream channel reached end of input");
                break;
            }
        }
    }
    closed.cancel();
}
