use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;

/// Listener invoked once per inbound message.
pub type MessageHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// A bidirectional, unacknowledged message channel.
///
/// Messages sent on one endpoint are delivered to the listeners of the other
/// endpoint in send order. Nothing is guaranteed beyond that: no delivery
/// receipt, no retry, no error for messages nobody listens to.
pub trait MessageChannel: Send + Sync {
    /// Enqueue a message for the remote side.
    fn send(&self, message: Value);

    /// Register a listener for inbound messages.
    fn on_message(&self, handler: MessageHandler) -> Subscription;
}

/// Handle returned by [`MessageChannel::on_message`].
///
/// Dropping a subscription leaves the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    table: Weak<Mutex<ListenerTable>>,
    id: u64,
    active: AtomicBool,
}

impl Subscription {
    /// Remove the listener. Calling this more than once is a no-op.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(table) = self.table.upgrade() {
            lock(&table).entries.retain(|(id, _)| *id != self.id);
        }
    }

    /// Whether the listener is still registered.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire) && self.table.strong_count() > 0
    }
}

#[derive(Default)]
struct ListenerTable {
    next_id: u64,
    entries: Vec<(u64, MessageHandler)>,
}

impl std::fmt::Debug for ListenerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerTable")
            .field("listeners", &self.entries.len())
            .finish()
    }
}

/// Listener registry shared by the channel implementations.
///
/// Dispatch snapshots the registered listeners before invoking them, so a
/// listener may send, subscribe or unsubscribe from inside its callback.
#[derive(Debug, Clone, Default)]
pub struct Listeners {
    table: Arc<Mutex<ListenerTable>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener.
    pub fn add(&self, handler: MessageHandler) -> Subscription {
        let mut table = lock(&self.table);
        table.next_id += 1;
        let id = table.next_id;
        table.entries.push((id, handler));
        Subscription {
            table: Arc::downgrade(&self.table),
            id,
            active: AtomicBool::new(true),
        }
    }

    /// Deliver one message to every registered listener.
    pub fn dispatch(&self, message: &Value) {
        let snapshot: Vec<MessageHandler> = lock(&self.table)
            .entries
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in snapshot {
            handler(message);
        }
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        lock(&self.table).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock(table: &Mutex<ListenerTable>) -> MutexGuard<'_, ListenerTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}
