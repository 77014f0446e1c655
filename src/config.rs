//! Process-wide configuration.
//!
//! Built once at startup (from defaults plus `HOSTLINK_*` environment
//! overrides) and passed explicitly to the components that need it. Nothing
//! in this crate reads configuration through globals.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::HostlinkError;

/// Identity of the host server, pushed to gateways in the auth ack.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    /// Stable identifier of this host instance.
    pub server_id: String,
    /// Human-readable name.
    pub server_name: String,
    /// Host application version string.
    pub server_version: String,
    /// Deployment environment label ("development", "production", ...).
    pub environment: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            server_id: "hostlink".to_string(),
            server_name: "hostlink".to_string(),
            server_version: crate::VERSION.to_string(),
            environment: "development".to_string(),
        }
    }
}

/// Gateway server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Bind address for the WebSocket + HTTP listener.
    pub bind_addr: String,
    /// Shared secret for the auth handshake. `None` or empty accepts any
    /// token (development mode); production deployments must set it.
    pub auth_token: Option<String>,
    /// Seconds between heartbeat probes to authenticated sessions.
    pub heartbeat_interval_secs: u64,
    /// Seconds without observed activity before a session is expired.
    /// Must exceed `heartbeat_interval_secs`.
    pub heartbeat_timeout_secs: u64,
    /// Seconds between idle-session sweeps.
    pub session_sweep_interval_secs: u64,
    /// Seconds of inactivity before the sweep removes a session.
    pub session_idle_timeout_secs: u64,
    /// Reconnect delay advertised to gateways in the auth ack.
    pub reconnect_delay_secs: u64,
    /// Retry budget advertised to gateways in the auth ack.
    pub max_retries: u32,
    /// Host identity pushed to gateways.
    pub server_info: ServerInfo,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8765".to_string(),
            auth_token: None,
            heartbeat_interval_secs: 15,
            heartbeat_timeout_secs: 45,
            session_sweep_interval_secs: 60,
            session_idle_timeout_secs: 300,
            reconnect_delay_secs: 5,
            max_retries: 5,
            server_info: ServerInfo::default(),
        }
    }
}

impl GatewayConfig {
    /// Build a configuration from defaults plus environment overrides.
    ///
    /// Recognized variables: `HOSTLINK_BIND_ADDR`, `HOSTLINK_AUTH_TOKEN`,
    /// `HOSTLINK_HEARTBEAT_INTERVAL`, `HOSTLINK_HEARTBEAT_TIMEOUT`,
    /// `HOSTLINK_SERVER_ID`, `HOSTLINK_SERVER_NAME`, `HOSTLINK_ENVIRONMENT`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var("HOSTLINK_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(token) = std::env::var("HOSTLINK_AUTH_TOKEN") {
            if !token.is_empty() {
                config.auth_token = Some(token);
            }
        }
        if let Some(secs) = env_u64("HOSTLINK_HEARTBEAT_INTERVAL") {
            config.heartbeat_interval_secs = secs;
        }
        if let Some(secs) = env_u64("HOSTLINK_HEARTBEAT_TIMEOUT") {
            config.heartbeat_timeout_secs = secs;
        }
        if let Ok(id) = std::env::var("HOSTLINK_SERVER_ID") {
            config.server_info.server_id = id;
        }
        if let Ok(name) = std::env::var("HOSTLINK_SERVER_NAME") {
            config.server_info.server_name = name;
        }
        if let Ok(env) = std::env::var("HOSTLINK_ENVIRONMENT") {
            config.server_info.environment = env;
        }
        config
    }

    /// Check the invariants liveness depends on.
    ///
    /// The heartbeat timeout must exceed the probe interval, otherwise every
    /// session would expire before a single probe cycle completes.
    pub fn validate(&self) -> Result<(), HostlinkError> {
        if self.heartbeat_interval_secs == 0 {
            return Err(HostlinkError::Internal(
                "heartbeat interval must be non-zero".to_string(),
            ));
        }
        if self.heartbeat_timeout_secs <= self.heartbeat_interval_secs {
            return Err(HostlinkError::Internal(format!(
                "heartbeat timeout ({}s) must exceed the heartbeat interval ({}s)",
                self.heartbeat_timeout_secs, self.heartbeat_interval_secs
            )));
        }
        if self.session_sweep_interval_secs == 0 {
            return Err(HostlinkError::Internal(
                "session sweep interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Heartbeat probe interval as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Heartbeat expiry threshold as a [`Duration`].
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    /// Idle-session sweep interval as a [`Duration`].
    pub fn session_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session_sweep_interval_secs)
    }

    /// Idle-session expiry threshold as a [`Duration`].
    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
