//! Gateway session state and the session manager.
//!
//! A session wraps one live connection. It carries the authentication
//! state, the granted permission set, and the last-activity clock used by
//! the heartbeat and idle sweepers. The manager tracks all sessions and
//! keeps a separate index of authenticated ones.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::HostlinkError;
use crate::gateway::codec::MessageCodec;
use crate::gateway::message::MessageFrame;

/// Application close codes sent when the server terminates a connection.
pub mod close_code {
    pub const SHUTDOWN: u16 = 4000;
    pub const KICKED: u16 = 4001;
    pub const HEARTBEAT_TIMEOUT: u16 = 4002;
    pub const AUTH_FAILED: u16 = 4003;
}

/// Transport-level hooks a session needs from its connection.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn send(&self, text: String) -> Result<(), HostlinkError>;
    async fn close(&self, code: u16, reason: &str);
}

/// One connected gateway.
pub struct GatewaySession {
    id: String,
    gateway_id: RwLock<Option<String>>,
    authenticated: AtomicBool,
    closed: AtomicBool,
    permissions: RwLock<HashSet<String>>,
    last_activity: RwLock<Instant>,
    connection: Arc<dyn Connection>,
}

impl GatewaySession {
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            gateway_id: RwLock::new(None),
            authenticated: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            permissions: RwLock::new(HashSet::new()),
            last_activity: RwLock::new(Instant::now()),
            connection,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn gateway_id(&self) -> Option<String> {
        self.gateway_id.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn permissions(&self) -> HashSet<String> {
        self.permissions.read().clone()
    }

    /// Mark the session authenticated, recording the gateway identity and
    /// its granted permissions.
    pub fn authenticate(&self, gateway_id: impl Into<String>, permissions: HashSet<String>) {
        *self.gateway_id.write() = Some(gateway_id.into());
        *self.permissions.write() = permissions;
        self.authenticated.store(true, Ordering::Release);
        self.touch();
    }

    /// Record activity; resets the idle clock.
    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    /// How long since the last recorded activity.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.read().elapsed()
    }

    /// Send raw text. Silently drops the message if the session is closed.
    pub async fn send(&self, text: String) -> Result<(), HostlinkError> {
        if self.is_closed() {
            tracing::debug!(session_id = %self.id, "dropping message for closed session");
            return Ok(());
        }
        self.connection.send(text).await
    }

    /// Encode and send a frame.
    pub async fn send_frame(
        &self,
        codec: &MessageCodec,
        frame: &MessageFrame,
    ) -> Result<(), HostlinkError> {
        let wire = codec.encode(frame)?;
        self.send(wire).await
    }

    /// Close the underlying connection. Idempotent.
    pub async fn close(&self, code: u16, reason: &str) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!(session_id = %self.id, code, reason, "closing session");
        self.connection.close(code, reason).await;
    }
}

/// Point-in-time session counts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub total: usize,
    pub authenticated: usize,
}

/// Tracks every live session plus an index of authenticated ones.
#[derive(Default)]
pub struct SessionManager {
    sessions: DashMap<String, Arc<GatewaySession>>,
    authenticated: DashSet<String>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, session: Arc<GatewaySession>) {
        tracing::debug!(session_id = %session.id(), "session added");
        self.sessions.insert(session.id().to_string(), session);
    }

    /// Drop a session from tracking. Does not close the connection.
    pub fn remove(&self, session_id: &str) {
        self.authenticated.remove(session_id);
        if self.sessions.remove(session_id).is_some() {
            tracing::debug!(session_id, "session removed");
        }
    }

    pub fn mark_authenticated(&self, session_id: &str) {
        if self.sessions.contains_key(session_id) {
            self.authenticated.insert(session_id.to_string());
        }
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<GatewaySession>> {
        self.sessions.get(session_id).map(|s| s.value().clone())
    }

    pub fn all_sessions(&self) -> Vec<Arc<GatewaySession>> {
        self.sessions.iter().map(|s| s.value().clone()).collect()
    }

    pub fn authenticated_sessions(&self) -> Vec<Arc<GatewaySession>> {
        self.authenticated
            .iter()
            .filter_map(|id| self.get(id.key()))
            .collect()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            total: self.sessions.len(),
            authenticated: self.authenticated.len(),
        }
    }

    /// Forcefully close and remove a session.
    pub async fn kick(&self, session_id: &str, reason: &str) {
        if let Some(session) = self.get(session_id) {
            session.close(close_code::KICKED, reason).await;
        }
        self.remove(session_id);
    }

    /// Close every session with the shutdown code and clear tracking.
    pub async fn shutdown(&self) {
        for session in self.all_sessions() {
            session.close(close_code::SHUTDOWN, "server shutting down").await;
        }
        self.sessions.clear();
        self.authenticated.clear();
    }

    /// Push an event frame to every authenticated session. Send failures
    /// are logged and skipped.
    pub async fn broadcast_event(&self, codec: &MessageCodec, frame: &MessageFrame) {
        for session in self.authenticated_sessions() {
            if let Err(err) = session.send_frame(codec, frame).await {
                tracing::warn!(
                    session_id = %session.id(),
                    error = %err,
                    "failed to push event to session"
                );
            }
        }
    }

    /// Background task that drops sessions idle past `idle_timeout`.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        idle_timeout: Duration,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let manager = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                for session in manager.all_sessions() {
                    if session.idle_for() > idle_timeout {
                        tracing::info!(
                            session_id = %session.id(),
                            idle_secs = session.idle_for().as_secs(),
                            "sweeping idle session"
                        );
                        session
                            .close(close_code::HEARTBEAT_TIMEOUT, "session idle timeout")
                            .await;
                        manager.remove(session.id());
                    }
                }
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    pub(crate) struct RecordingConnection {
        pub sent: Mutex<Vec<String>>,
        pub closed_with: Mutex<Option<(u16, String)>>,
        pub fail_sends: bool,
    }

    impl RecordingConnection {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                closed_with: Mutex::new(None),
                fail_sends: false,
            })
        }
    }

    #[async_trait]
    impl Connection for RecordingConnection {
        async fn send(&self, text: String) -> Result<(), HostlinkError> {
            if self.fail_sends {
                return Err(HostlinkError::Internal("send failed".to_string()));
            }
            self.sent.lock().push(text);
            Ok(())
        }

        async fn close(&self, code: u16, reason: &str) {
            *self.closed_with.lock() = Some((code, reason.to_string()));
        }
    }

    #[tokio::test]
    async fn test_authenticate_sets_identity_and_permissions() {
        let session = GatewaySession::new(RecordingConnection::new());
        assert!(!session.is_authenticated());
        assert!(session.gateway_id().is_none());

        session.authenticate("gw-1", HashSet::from(["*".to_string()]));
        assert!(session.is_authenticated());
        assert_eq!(session.gateway_id().as_deref(), Some("gw-1"));
        assert!(session.permissions().contains("*"));
    }

    #[tokio::test]
    async fn test_send_after_close_is_dropped() {
        let conn = RecordingConnection::new();
        let session = GatewaySession::new(conn.clone());
        session.close(close_code::KICKED, "bye").await;

        session.send("late".to_string()).await.unwrap();
        assert!(conn.sent.lock().is_empty());
        assert_eq!(
            *conn.closed_with.lock(),
            Some((close_code::KICKED, "bye".to_string()))
        );
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let conn = RecordingConnection::new();
        let session = GatewaySession::new(conn.clone());
        session.close(close_code::SHUTDOWN, "first").await;
        session.close(close_code::KICKED, "second").await;
        assert_eq!(
            *conn.closed_with.lock(),
            Some((close_code::SHUTDOWN, "first".to_string()))
        );
    }

    #[tokio::test]
    async fn test_manager_stats_track_auth_state() {
        let manager = SessionManager::new();
        let a = Arc::new(GatewaySession::new(RecordingConnection::new()));
        let b = Arc::new(GatewaySession::new(RecordingConnection::new()));
        manager.add(a.clone());
        manager.add(b.clone());
        manager.mark_authenticated(a.id());

        let stats = manager.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.authenticated, 1);

        manager.remove(a.id());
        let stats = manager.stats();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.authenticated, 0);
    }

    #[tokio::test]
    async fn test_kick_closes_and_removes() {
        let manager = SessionManager::new();
        let conn = RecordingConnection::new();
        let session = Arc::new(GatewaySession::new(conn.clone()));
        let id = session.id().to_string();
        manager.add(session);

        manager.kick(&id, "operator request").await;
        assert!(manager.get(&id).is_none());
        assert_eq!(conn.closed_with.lock().as_ref().map(|c| c.0), Some(close_code::KICKED));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_only_authenticated() {
        let manager = SessionManager::new();
        let authed_conn = RecordingConnection::new();
        let anon_conn = RecordingConnection::new();

        let authed = Arc::new(GatewaySession::new(authed_conn.clone()));
        authed.authenticate("gw-1", HashSet::new());
        let anon = Arc::new(GatewaySession::new(anon_conn.clone()));

        manager.add(authed.clone());
        manager.add(anon);
        manager.mark_authenticated(authed.id());

        let codec = MessageCodec::new();
        let frame = MessageFrame::new(
            crate::gateway::message::message_type::EVENT,
            json!({"eventId": "world.tick", "eventData": {}}),
        );
        manager.broadcast_event(&codec, &frame).await;

        assert_eq!(authed_conn.sent.lock().len(), 1);
        assert!(anon_conn.sent.lock().is_empty());
    }
}
