//! Event dispatch registry.
//!
//! Routes every decoded inbound message to its subscribers: scoped handlers
//! matched by correlation id first, then type-level handlers, then wildcard
//! handlers. Handlers are keyed by stable identity (the `Arc` pointer), so
//! subscribing the identical handler twice is a no-op and cancelling twice
//! is always safe.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};

use crate::client::ConnectionStatus;
use crate::message::ServerEvent;

/// Reserved subscription key receiving every decoded message.
pub const WILDCARD: &str = "*";

/// Callback invoked with each decoded inbound message.
pub type EventHandler = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

/// Callback invoked on connection status changes.
pub type StatusHandler = Arc<dyn Fn(&ConnectionStatus) + Send + Sync>;

/// Pass-through callback for binary frames.
pub type BinaryHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

fn handler_id<T: ?Sized>(handler: &Arc<T>) -> usize {
    Arc::as_ptr(handler) as *const () as usize
}

#[derive(Default)]
struct RegistryShared {
    /// message-type (or wildcard) → handlers, insertion-ordered
    by_type: Mutex<HashMap<String, Vec<(usize, EventHandler)>>>,
    /// correlation id → single handler
    scoped: Mutex<HashMap<String, EventHandler>>,
    status: Mutex<Vec<(usize, StatusHandler)>>,
    binary: Mutex<Option<BinaryHandler>>,
}

/// Subscription table mapping message types and correlation ids to handlers.
///
/// Cheap to clone; clones share the same tables.
#[derive(Clone, Default)]
pub struct DispatchRegistry {
    shared: Arc<RegistryShared>,
}

impl DispatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for a message type (or [`WILDCARD`]).
    ///
    /// Re-registering the identical handler under the same key does not
    /// duplicate it; the returned subscription cancels the original entry.
    pub fn subscribe(&self, message_type: &str, handler: EventHandler) -> Subscription {
        let id = handler_id(&handler);
        let mut by_type = lock(&self.shared.by_type);
        let handlers = by_type.entry(message_type.to_string()).or_default();
        if !handlers.iter().any(|(existing, _)| *existing == id) {
            handlers.push((id, handler));
        }
        Subscription {
            registry: Arc::downgrade(&self.shared),
            key: SubscriptionKey::Type(message_type.to_string()),
            id,
        }
    }

    /// Register `handler` for every decoded message.
    pub fn subscribe_all(&self, handler: EventHandler) -> Subscription {
        self.subscribe(WILDCARD, handler)
    }

    /// Register a handler for one correlation id (task, project or content
    /// id). At most one handler per id; re-registering replaces it.
    pub fn subscribe_scoped(&self, correlation_id: &str, handler: EventHandler) -> Subscription {
        let id = handler_id(&handler);
        lock(&self.shared.scoped).insert(correlation_id.to_string(), handler);
        Subscription {
            registry: Arc::downgrade(&self.shared),
            key: SubscriptionKey::Scoped(correlation_id.to_string()),
            id,
        }
    }

    /// Register a connection-status handler.
    pub fn subscribe_status(&self, handler: StatusHandler) -> Subscription {
        let id = handler_id(&handler);
        let mut status = lock(&self.shared.status);
        if !status.iter().any(|(existing, _)| *existing == id) {
            status.push((id, handler));
        }
        Subscription {
            registry: Arc::downgrade(&self.shared),
            key: SubscriptionKey::Status,
            id,
        }
    }

    /// Install the pass-through handler for binary frames.
    pub fn set_binary_handler(&self, handler: BinaryHandler) {
        *lock(&self.shared.binary) = Some(handler);
    }

    /// Route a decoded message to all matching handlers.
    ///
    /// Tiers run in order: scoped, type-level, wildcard. Handlers are
    /// cloned out of the tables before invocation so a handler may
    /// subscribe or cancel reentrantly, and a panicking handler never
    /// prevents the remaining handlers from running.
    pub fn dispatch(&self, event: &ServerEvent) {
        let mut batch: Vec<EventHandler> = Vec::new();

        {
            let scoped = lock(&self.shared.scoped);
            for correlation_id in event.correlation_ids() {
                if let Some(handler) = scoped.get(correlation_id) {
                    batch.push(handler.clone());
                }
            }
        }
        {
            let by_type = lock(&self.shared.by_type);
            if let Some(handlers) = by_type.get(event.message_type()) {
                batch.extend(handlers.iter().map(|(_, h)| h.clone()));
            }
            if let Some(handlers) = by_type.get(WILDCARD) {
                batch.extend(handlers.iter().map(|(_, h)| h.clone()));
            }
        }

        for handler in batch {
            invoke(|| handler(event));
        }
    }

    /// Notify status subscribers.
    pub fn dispatch_status(&self, status: &ConnectionStatus) {
        let batch: Vec<StatusHandler> = lock(&self.shared.status)
            .iter()
            .map(|(_, h)| h.clone())
            .collect();
        for handler in batch {
            invoke(|| handler(status));
        }
    }

    /// Hand a binary frame to the registered pass-through handler, if any.
    pub fn dispatch_binary(&self, data: &[u8]) {
        let handler = lock(&self.shared.binary).clone();
        match handler {
            Some(handler) => invoke(|| handler(data)),
            None => tracing::debug!(len = data.len(), "Dropping binary frame, no handler"),
        }
    }
}

fn invoke(f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!("Subscriber panicked while handling an event");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

enum SubscriptionKey {
    Type(String),
    Scoped(String),
    Status,
}

/// Handle for removing a registered handler.
///
/// `cancel` is idempotent: calling it on an already-removed handler is a
/// no-op. Dropping the handle does not unsubscribe.
pub struct Subscription {
    registry: Weak<RegistryShared>,
    key: SubscriptionKey,
    id: usize,
}

impl Subscription {
    /// Remove the handler this subscription registered.
    pub fn cancel(&self) {
        let Some(shared) = self.registry.upgrade() else {
            return;
        };
        match &self.key {
            SubscriptionKey::Type(message_type) => {
                let mut by_type = lock(&shared.by_type);
                if let Some(handlers) = by_type.get_mut(message_type) {
                    handlers.retain(|(id, _)| *id != self.id);
                    if handlers.is_empty() {
                        by_type.remove(message_type);
                    }
                }
            }
            SubscriptionKey::Scoped(correlation_id) => {
                let mut scoped = lock(&shared.scoped);
                // Only remove if this subscription's handler is still the
                // registered one; a replacement must survive a stale cancel.
                if scoped
                    .get(correlation_id)
                    .is_some_and(|h| handler_id(h) == self.id)
                {
                    scoped.remove(correlation_id);
                }
            }
            SubscriptionKey::Status => {
                lock(&shared.status).retain(|(id, _)| *id != self.id);
            }
        }
    }
}
