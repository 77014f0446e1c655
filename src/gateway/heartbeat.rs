//! Server-initiated heartbeat probes and timeout enforcement.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use crate::config::GatewayConfig;
use crate::gateway::codec::MessageCodec;
use crate::gateway::message::{message_type, AgentStatus, HeartbeatPayload, MessageFrame};
use crate::gateway::session::{close_code, SessionManager};

/// Drives the probe loop: sends heartbeats to authenticated sessions and
/// closes the ones that have gone quiet past the configured timeout.
pub struct HeartbeatHandler {
    sessions: Arc<SessionManager>,
    codec: MessageCodec,
    config: GatewayConfig,
}

impl HeartbeatHandler {
    pub fn new(sessions: Arc<SessionManager>, codec: MessageCodec, config: GatewayConfig) -> Self {
        Self {
            sessions,
            codec,
            config,
        }
    }

    /// Spawn the probe loop.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = self.config.heartbeat_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.tick().await;
            }
        })
    }

    /// One probe round over all authenticated sessions.
    pub async fn tick(&self) {
        let timeout = self.config.heartbeat_timeout();
        let connected = self.sessions.stats().authenticated;

        for session in self.sessions.authenticated_sessions() {
            if session.idle_for() > timeout {
                tracing::warn!(
                    session_id = %session.id(),
                    idle_secs = session.idle_for().as_secs(),
                    "heartbeat timeout, closing session"
                );
                session
                    .close(close_code::HEARTBEAT_TIMEOUT, "heartbeat timeout")
                    .await;
                self.sessions.remove(session.id());
                continue;
            }

            let payload = HeartbeatPayload {
                agent_id: self.config.server_info.server_id.clone(),
                timestamp: Utc::now(),
                status: Some(AgentStatus {
                    healthy: true,
                    connected_gateways: connected,
                }),
            };
            let frame = MessageFrame::new(
                message_type::HEARTBEAT,
                json!(payload),
            );
            if let Err(err) = session.send_frame(&self.codec, &frame).await {
                tracing::warn!(
                    session_id = %session.id(),
                    error = %err,
                    "failed to send heartbeat probe"
                );
            }
        }
    }

    /// A gateway acknowledged a probe; reset its idle clock.
    pub fn on_heartbeat_ack(&self, session_id: &str) {
        if let Some(session) = self.sessions.get(session_id) {
            session.touch();
            tracing::trace!(session_id, "heartbeat ack");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::session::tests::RecordingConnection;
    use crate::gateway::session::GatewaySession;
    use std::collections::HashSet;

    fn handler(config: GatewayConfig) -> (Arc<SessionManager>, HeartbeatHandler) {
        let sessions = Arc::new(SessionManager::new());
        let handler = HeartbeatHandler::new(sessions.clone(), MessageCodec::new(), config);
        (sessions, handler)
    }

    #[tokio::test]
    async fn test_tick_probes_authenticated_sessions() {
        let (sessions, handler) = handler(GatewayConfig::default());
        let conn = RecordingConnection::new();
        let session = Arc::new(GatewaySession::new(conn.clone()));
        session.authenticate("gw-1", HashSet::new());
        sessions.add(session.clone());
        sessions.mark_authenticated(session.id());

        handler.tick().await;

        let sent = conn.sent.lock();
        assert_eq!(sent.len(), 1);
        let frame: MessageFrame = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(frame.message_type, message_type::HEARTBEAT);
        let payload: HeartbeatPayload = frame.payload_as().unwrap();
        assert!(payload.status.unwrap().healthy);
    }

    #[tokio::test]
    async fn test_tick_skips_unauthenticated_sessions() {
        let (sessions, handler) = handler(GatewayConfig::default());
        let conn = RecordingConnection::new();
        let session = Arc::new(GatewaySession::new(conn.clone()));
        sessions.add(session);

        handler.tick().await;
        assert!(conn.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_timed_out_session_is_closed_and_removed() {
        let config = GatewayConfig {
            heartbeat_timeout_secs: 0,
            ..GatewayConfig::default()
        };
        let (sessions, handler) = handler(config);
        let conn = RecordingConnection::new();
        let session = Arc::new(GatewaySession::new(conn.clone()));
        session.authenticate("gw-1", HashSet::new());
        sessions.add(session.clone());
        sessions.mark_authenticated(session.id());

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        handler.tick().await;

        assert!(sessions.get(session.id()).is_none());
        assert_eq!(
            conn.closed_with.lock().as_ref().map(|c| c.0),
            Some(close_code::HEARTBEAT_TIMEOUT)
        );
    }

    #[tokio::test]
    async fn test_ack_resets_idle_clock() {
        let (sessions, handler) = handler(GatewayConfig::default());
        let session = Arc::new(GatewaySession::new(RecordingConnection::new()));
        sessions.add(session.clone());

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let before = session.idle_for();
        handler.on_heartbeat_ack(session.id());
        assert!(session.idle_for() < before);
    }
}
