//! Forwards in-process events to connected gateways as `event` frames.

use std::sync::Arc;

use serde_json::json;

use crate::events::EventEmitter;
use crate::gateway::codec::MessageCodec;
use crate::gateway::message::{message_type, EventPayload, MessageFrame};
use crate::gateway::session::SessionManager;

/// Subscriber id used for bridge subscriptions, so they can be dropped as
/// a group via `unsubscribe_all`.
pub const BRIDGE_SUBSCRIBER: &str = "gateway-bridge";

/// Bridges the [`EventEmitter`] to the session layer: each forwarded event
/// id gets a subscription that pushes the event data to every
/// authenticated session.
pub struct EventBridge {
    emitter: Arc<EventEmitter>,
    sessions: Arc<SessionManager>,
    codec: MessageCodec,
}

impl EventBridge {
    pub fn new(
        emitter: Arc<EventEmitter>,
        sessions: Arc<SessionManager>,
        codec: MessageCodec,
    ) -> Self {
        Self {
            emitter,
            sessions,
            codec,
        }
    }

    /// Start forwarding an event id to authenticated sessions. Returns the
    /// subscription id.
    ///
    /// Delivery happens on a spawned task; emitters are never blocked on
    /// session I/O.
    pub fn forward(&self, event_id: &str) -> String {
        let sessions = Arc::clone(&self.sessions);
        let codec = self.codec;
        let event_id_owned = event_id.to_string();

        self.emitter.subscribe(
            event_id,
            BRIDGE_SUBSCRIBER,
            Arc::new(move |data| {
                let payload = EventPayload {
                    event_id: event_id_owned.clone(),
                    event_data: data.clone(),
                };
                let frame = MessageFrame::new(message_type::EVENT, json!(payload));
                let sessions = Arc::clone(&sessions);
                tokio::spawn(async move {
                    sessions.broadcast_event(&codec, &frame).await;
                });
            }),
        )
    }

    /// Stop forwarding everything this bridge subscribed.
    pub fn stop(&self) {
        self.emitter.unsubscribe_all(BRIDGE_SUBSCRIBER);
    }
}
