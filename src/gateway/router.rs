//! Frame dispatch and the per-type message handlers.
//!
//! Every inbound frame is routed by its type discriminator to a registered
//! handler. Handlers run on their own task with a panic guard, so a
//! misbehaving handler never takes the connection loop down.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use serde_json::json;

use crate::config::GatewayConfig;
use crate::core::execution::{CallerInfo, CapabilityRequest, CapabilityResponse, ExecutionEngine};
use crate::core::registry::CapabilityRegistry;
use crate::errors::HostlinkError;
use crate::gateway::auth::AuthHandler;
use crate::gateway::codec::MessageCodec;
use crate::gateway::heartbeat::HeartbeatHandler;
use crate::gateway::message::{
    message_type, AuthRequest, AuthResponse, HeartbeatAck, MessageFrame, SessionConfig,
};
use crate::gateway::session::{close_code, GatewaySession, SessionManager};

/// A handler for one frame type.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// The type discriminator this handler consumes.
    fn message_type(&self) -> &'static str;

    async fn handle(&self, session: Arc<GatewaySession>, frame: MessageFrame);
}

/// Routes frames to handlers by type.
#[derive(Default)]
pub struct MessageRouter {
    handlers: HashMap<&'static str, Arc<dyn MessageHandler>>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn MessageHandler>) {
        self.handlers.insert(handler.message_type(), handler);
    }

    /// Dispatch one frame. Records activity on the session, then runs the
    /// matching handler on a fresh task.
    pub fn route(&self, session: Arc<GatewaySession>, frame: MessageFrame) {
        session.touch();

        let handler = match self.handlers.get(frame.message_type.as_str()) {
            Some(handler) => Arc::clone(handler),
            None => {
                tracing::warn!(
                    session_id = %session.id(),
                    message_type = %frame.message_type,
                    "no handler for message type"
                );
                return;
            }
        };

        tokio::spawn(async move {
            let message_type = frame.message_type.clone();
            let session_id = session.id().to_string();
            let result = std::panic::AssertUnwindSafe(handler.handle(session, frame))
                .catch_unwind()
                .await;
            if result.is_err() {
                tracing::error!(
                    session_id = %session_id,
                    message_type = %message_type,
                    "message handler panicked"
                );
            }
        });
    }
}

/// Handles `auth` frames: validates the token, promotes the session, and
/// replies with the capability catalog and connection tuning.
pub struct AuthMessageHandler {
    auth: AuthHandler,
    sessions: Arc<SessionManager>,
    registry: Arc<CapabilityRegistry>,
    codec: MessageCodec,
    config: GatewayConfig,
}

impl AuthMessageHandler {
    pub fn new(
        auth: AuthHandler,
        sessions: Arc<SessionManager>,
        registry: Arc<CapabilityRegistry>,
        codec: MessageCodec,
        config: GatewayConfig,
    ) -> Self {
        Self {
            auth,
            sessions,
            registry,
            codec,
            config,
        }
    }
}

#[async_trait]
impl MessageHandler for AuthMessageHandler {
    fn message_type(&self) -> &'static str {
        message_type::AUTH
    }

    async fn handle(&self, session: Arc<GatewaySession>, frame: MessageFrame) {
        let request: AuthRequest = match frame.payload_as() {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(session_id = %session.id(), error = %err, "malformed auth payload");
                return;
            }
        };

        if session.is_authenticated() {
            tracing::warn!(
                session_id = %session.id(),
                gateway_id = %request.gateway_id,
                "ignoring auth on already authenticated session"
            );
            return;
        }

        let result = self.auth.authenticate(&request.gateway_id, &request.token);

        if result.success {
            session.authenticate(&request.gateway_id, result.permissions.iter().cloned().collect());
            self.sessions.mark_authenticated(session.id());

            let response = AuthResponse {
                success: true,
                gateway_id: request.gateway_id,
                session_id: Some(session.id().to_string()),
                server_info: Some(self.config.server_info.clone()),
                permissions: result.permissions,
                capabilities: self.registry.list_capabilities(),
                config: Some(SessionConfig {
                    heartbeat_interval: self.config.heartbeat_interval_secs,
                    reconnect_delay: self.config.reconnect_delay_secs,
                    max_retries: self.config.max_retries,
                }),
                reason: None,
            };
            let reply = MessageFrame::reply(message_type::AUTH_RESPONSE, &frame.id, json!(response));
            if let Err(err) = session.send_frame(&self.codec, &reply).await {
                tracing::warn!(session_id = %session.id(), error = %err, "failed to send auth ack");
            }
        } else {
            let response = AuthResponse {
                success: false,
                gateway_id: request.gateway_id,
                session_id: None,
                server_info: None,
                permissions: Vec::new(),
                capabilities: Vec::new(),
                config: None,
                reason: result.reason,
            };
            let reply = MessageFrame::reply(message_type::AUTH_RESPONSE, &frame.id, json!(response));
            let _ = session.send_frame(&self.codec, &reply).await;
            session
                .close(close_code::AUTH_FAILED, "authentication failed")
                .await;
            self.sessions.remove(session.id());
        }
    }
}

/// Answers client-originated `heartbeat` frames with a `heartbeat_ack`.
pub struct HeartbeatMessageHandler {
    codec: MessageCodec,
    config: GatewayConfig,
}

impl HeartbeatMessageHandler {
    pub fn new(codec: MessageCodec, config: GatewayConfig) -> Self {
        Self { codec, config }
    }
}

#[async_trait]
impl MessageHandler for HeartbeatMessageHandler {
    fn message_type(&self) -> &'static str {
        message_type::HEARTBEAT
    }

    async fn handle(&self, session: Arc<GatewaySession>, frame: MessageFrame) {
        let ack = HeartbeatAck {
            agent_id: self.config.server_info.server_id.clone(),
            timestamp: Utc::now(),
        };
        let reply = MessageFrame::reply(message_type::HEARTBEAT_ACK, &frame.id, json!(ack));
        if let Err(err) = session.send_frame(&self.codec, &reply).await {
            tracing::warn!(session_id = %session.id(), error = %err, "failed to ack heartbeat");
        }
    }
}

/// Consumes `heartbeat_ack` frames answering server probes.
pub struct HeartbeatAckMessageHandler {
    heartbeat: Arc<HeartbeatHandler>,
}

impl HeartbeatAckMessageHandler {
    pub fn new(heartbeat: Arc<HeartbeatHandler>) -> Self {
        Self { heartbeat }
    }
}

#[async_trait]
impl MessageHandler for HeartbeatAckMessageHandler {
    fn message_type(&self) -> &'static str {
        message_type::HEARTBEAT_ACK
    }

    async fn handle(&self, session: Arc<GatewaySession>, _frame: MessageFrame) {
        self.heartbeat.on_heartbeat_ack(session.id());
    }
}

/// Handles `request` frames: builds caller identity from the session and
/// runs the invocation through the execution engine.
pub struct RequestMessageHandler {
    engine: Arc<ExecutionEngine>,
    codec: MessageCodec,
}

impl RequestMessageHandler {
    pub fn new(engine: Arc<ExecutionEngine>, codec: MessageCodec) -> Self {
        Self { engine, codec }
    }

    async fn respond(&self, session: &GatewaySession, frame_id: &str, response: CapabilityResponse) {
        let reply = MessageFrame::reply(message_type::RESPONSE, frame_id, json!(response));
        if let Err(err) = session.send_frame(&self.codec, &reply).await {
            tracing::warn!(session_id = %session.id(), error = %err, "failed to send response");
        }
    }
}

#[async_trait]
impl MessageHandler for RequestMessageHandler {
    fn message_type(&self) -> &'static str {
        message_type::REQUEST
    }

    async fn handle(&self, session: Arc<GatewaySession>, frame: MessageFrame) {
        if !session.is_authenticated() {
            let err = HostlinkError::AuthFailed("session not authenticated".to_string());
            self.respond(&session, &frame.id, CapabilityResponse::error(&err))
                .await;
            return;
        }

        let request: CapabilityRequest = match frame.payload_as() {
            Ok(request) => request,
            Err(err) => {
                self.respond(&session, &frame.id, CapabilityResponse::error(&err))
                    .await;
                return;
            }
        };

        let caller_id = request
            .caller_id
            .clone()
            .or_else(|| session.gateway_id())
            .unwrap_or_else(|| session.id().to_string());
        let caller = CallerInfo::new(caller_id).with_permissions(session.permissions());

        let response = self.engine.execute(request, caller).await;
        self.respond(&session, &frame.id, response).await;
    }
}
