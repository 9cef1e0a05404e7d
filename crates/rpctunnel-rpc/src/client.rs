use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use rpctunnel_channel::{MessageChannel, Subscription};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::envelope::{Envelope, RequestEnvelope};
use crate::error::{Result, RpcError};
use crate::structured::StructuredError;

type Outcome = std::result::Result<Value, StructuredError>;

/// Per-request options.
///
/// The default waits forever: a request with no matching response stays
/// pending for as long as the client is subscribed.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Give up after this long and fail with [`RpcError::Timeout`].
    pub timeout: Option<Duration>,
    /// Give up when this token is cancelled and fail with [`RpcError::Cancelled`].
    pub cancel: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Request/response correlator over a message channel.
///
/// Cheap to clone; clones share one pending table and one subscription.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    channel: Arc<dyn MessageChannel>,
    pending: Arc<PendingTable>,
    next_id: AtomicU64,
    subscription: Subscription,
    dropped: CancellationToken,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
        self.dropped.cancel();
    }
}

impl RpcClient {
    /// Subscribe to `channel` and start correlating responses.
    pub fn connect(channel: Arc<dyn MessageChannel>) -> Self {
        let pending = Arc::new(PendingTable::default());
        let weak = Arc::downgrade(&pending);
        let subscription = channel.on_message(Arc::new(move |message: &Value| {
            on_inbound(&weak, message);
        }));

        Self {
            inner: Arc::new(ClientInner {
                channel,
                pending,
                next_id: AtomicU64::new(1),
                subscription,
                dropped: CancellationToken::new(),
            }),
        }
    }

    /// Call `method` and wait for its result with no timeout.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.request_with(method, params, RequestOptions::default())
            .await
    }

    /// Call `method` with explicit timeout/cancellation options.
    ///
    /// The pending entry is removed when the call completes, times out, is
    /// cancelled, or the returned future is dropped. A response that arrives
    /// after that is ignored.
    pub async fn request_with(
        &self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> Result<Value> {
        let (id, rx) = self.register()?;
        let _guard = PendingGuard {
            table: &self.inner.pending,
            id,
        };

        let message = Envelope::from(RequestEnvelope::new(id, method, params)).to_value()?;
        tracing::trace!(id, method, "sending rpc request");
        self.inner.channel.send(message);

        let deadline = async {
            match options.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };
        let cancelled = async {
            match &options.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            outcome = rx => match outcome {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(err)) => Err(RpcError::Remote(err)),
                Err(_) => Err(RpcError::Closed),
            },
            _ = deadline => {
                tracing::debug!(id, method, "rpc request timed out");
                Err(RpcError::Timeout(options.timeout.unwrap_or_default()))
            }
            _ = cancelled => {
                tracing::debug!(id, method, "rpc request cancelled");
                Err(RpcError::Cancelled)
            }
        }
    }

    /// Typed convenience over [`RpcClient::request`].
    pub async fn call<P, R>(&self, method: &str, params: &P) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params)?;
        let result = self.request(method, Some(params)).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Stop listening for responses.
    ///
    /// Outstanding requests are not failed; they stay pending until their
    /// futures are dropped or their own timeout fires.
    pub fn disconnect(&self) {
        self.inner.subscription.unsubscribe();
    }

    /// Stop listening and fail every outstanding request with
    /// [`RpcError::Closed`]. Later requests fail the same way. Idempotent.
    pub fn close(&self) {
        self.inner.subscription.unsubscribe();
        let drained = self.inner.pending.close();
        if drained > 0 {
            tracing::debug!(outstanding = drained, "rpc client closed with requests pending");
        }
    }

    /// Close the client once `signal` is cancelled, typically the close
    /// signal of the channel it talks over.
    ///
    /// Must be called from within a tokio runtime. The watcher ends when the
    /// signal fires or the last clone of this client is dropped.
    pub fn close_on(&self, signal: CancellationToken) {
        let inner = Arc::downgrade(&self.inner);
        let dropped = self.inner.dropped.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = signal.cancelled() => {}
                _ = dropped.cancelled() => return,
            }
            if let Some(inner) = inner.upgrade() {
                RpcClient { inner }.close();
            }
        });
    }

    pub fn is_closed(&self) -> bool {
        self.inner.pending.is_closed()
    }

    /// Whether the client is still listening on its channel.
    pub fn is_connected(&self) -> bool {
        self.inner.subscription.is_active()
    }

    /// Number of requests currently awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    fn register(&self) -> Result<(u64, oneshot::Receiver<Outcome>)> {
        let (tx, rx) = oneshot::channel();
        let mut entries = self.inner.pending.lock();
        if self.inner.pending.is_closed() {
            return Err(RpcError::Closed);
        }
        loop {
            let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
            if let Entry::Vacant(slot) = entries.entry(id) {
                slot.insert(tx);
                return Ok((id, rx));
            }
        }
    }
}

impl fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcClient")
            .field("pending", &self.pending_count())
            .field("connected", &self.is_connected())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn on_inbound(pending: &Weak<PendingTable>, message: &Value) {
    let Some(Envelope::Response(response)) = Envelope::decode(message) else {
        return;
    };
    let Some(pending) = pending.upgrade() else {
        return;
    };
    let id = response.id;
    match pending.take(id) {
        Some(tx) => {
            // The receiver is gone if the caller stopped waiting.
            let _ = tx.send(response.into_outcome());
        }
        None => tracing::debug!(id, "ignoring response with no pending request"),
    }
}

#[derive(Default)]
struct PendingTable {
    entries: Mutex<HashMap<u64, oneshot::Sender<Outcome>>>,
    closed: AtomicBool,
}

impl PendingTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<Outcome>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take(&self, id: u64) -> Option<oneshot::Sender<Outcome>> {
        self.lock().remove(&id)
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    /// Refuse new entries and drop every sender; waiting receivers see the
    /// sender gone. Returns how many requests were outstanding.
    fn close(&self) -> usize {
        let mut entries = self.lock();
        self.closed.store(true, Ordering::Release);
        let drained = entries.len();
        entries.clear();
        drained
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

struct PendingGuard<'a> {
    table: &'a PendingTable,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.table.take(self.id);
    }
}
