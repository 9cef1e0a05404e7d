use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

use crate::channel::{Listeners, MessageChannel, MessageHandler, Subscription};

/// One endpoint of an in-process channel pair.
///
/// Delivery is synchronous: `send` runs the peer's listeners before it
/// returns, which keeps send order intact.
#[derive(Debug)]
pub struct MemoryChannel {
    local: Listeners,
    remote: Listeners,
    sent: AtomicU64,
}

impl MemoryChannel {
    /// Create two connected endpoints.
    pub fn pair() -> (Self, Self) {
        let left = Listeners::new();
        let right = Listeners::new();
        (
            Self {
                local: left.clone(),
                remote: right.clone(),
                sent: AtomicU64::new(0),
            },
            Self {
                local: right,
                remote: left,
                sent: AtomicU64::new(0),
            },
        )
    }

    /// Number of messages sent from this endpoint.
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Number of listeners registered on this endpoint.
    pub fn listener_count(&self) -> usize {
        self.local.len()
    }
}

impl MessageChannel for MemoryChannel {
    fn send(&self, message: Value) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        if self.remote.is_empty() {
            tracing::trace!("memory channel: message sent with no remote listener");
        }
        self.remote.dispatch(&message);
    }

    fn on_message(&self, handler: MessageHandler) -> Subscription {
        self.local.add(handler)
    }
}
