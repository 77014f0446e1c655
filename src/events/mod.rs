//! In-process event fan-out.
//!
//! Providers emit named events; subscribers register callbacks, optionally
//! with a parameter filter that must match the event data. Callbacks run
//! synchronously in registration order under a panic guard, so one broken
//! subscriber cannot stop delivery to the rest.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

/// Callback invoked with the event data.
pub type EventCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// One registered listener.
pub struct Subscription {
    id: String,
    subscriber_id: String,
    filter: HashMap<String, Value>,
    callback: EventCallback,
}

impl Subscription {
    fn matches(&self, data: &Value) -> bool {
        self.filter
            .iter()
            .all(|(key, expected)| data.get(key) == Some(expected))
    }
}

/// Registry of event subscriptions keyed by event id.
#[derive(Default)]
pub struct EventEmitter {
    subscriptions: RwLock<HashMap<String, Vec<Arc<Subscription>>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for an event. Returns the subscription id used
    /// to unsubscribe.
    pub fn subscribe(
        &self,
        event_id: impl Into<String>,
        subscriber_id: impl Into<String>,
        callback: EventCallback,
    ) -> String {
        self.subscribe_filtered(event_id, subscriber_id, HashMap::new(), callback)
    }

    /// Register a callback that only fires when every filter entry matches
    /// the corresponding field of the event data.
    pub fn subscribe_filtered(
        &self,
        event_id: impl Into<String>,
        subscriber_id: impl Into<String>,
        filter: HashMap<String, Value>,
        callback: EventCallback,
    ) -> String {
        let event_id = event_id.into();
        let subscription = Arc::new(Subscription {
            id: Uuid::new_v4().to_string(),
            subscriber_id: subscriber_id.into(),
            filter,
            callback,
        });
        let id = subscription.id.clone();
        self.subscriptions
            .write()
            .entry(event_id)
            .or_default()
            .push(subscription);
        id
    }

    /// Remove one subscription by id.
    pub fn unsubscribe(&self, subscription_id: &str) {
        let mut subscriptions = self.subscriptions.write();
        for listeners in subscriptions.values_mut() {
            listeners.retain(|s| s.id != subscription_id);
        }
        subscriptions.retain(|_, listeners| !listeners.is_empty());
    }

    /// Remove every subscription a subscriber registered, across all events.
    pub fn unsubscribe_all(&self, subscriber_id: &str) {
        let mut subscriptions = self.subscriptions.write();
        for listeners in subscriptions.values_mut() {
            listeners.retain(|s| s.subscriber_id != subscriber_id);
        }
        subscriptions.retain(|_, listeners| !listeners.is_empty());
    }

    /// Deliver an event to all matching subscribers.
    ///
    /// Works on a snapshot of the listener list, so callbacks may subscribe
    /// or unsubscribe without deadlocking.
    pub fn emit(&self, event_id: &str, data: &Value) {
        let listeners: Vec<Arc<Subscription>> = match self.subscriptions.read().get(event_id) {
            Some(listeners) => listeners.clone(),
            None => return,
        };

        let mut delivered = 0usize;
        for subscription in &listeners {
            if !subscription.matches(data) {
                continue;
            }
            let result = catch_unwind(AssertUnwindSafe(|| (subscription.callback)(data)));
            if result.is_err() {
                tracing::error!(
                    event_id,
                    subscriber_id = %subscription.subscriber_id,
                    "event callback panicked"
                );
            }
            delivered += 1;
        }
        tracing::trace!(event_id, delivered, "event emitted");
    }

    /// Number of live subscriptions for an event id.
    pub fn subscription_count(&self, event_id: &str) -> usize {
        self.subscriptions
            .read()
            .get(event_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        self.subscriptions.write().clear();
    }
}
