//! Wire message envelope and typed payloads.
//!
//! Every frame on the gateway protocol is a JSON envelope
//! `{id, type, timestamp?, correlationId?, payload}`. The protocol layer
//! owns envelope construction and serialization; message handlers only
//! read and produce payload data through the typed structs below.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::ServerInfo;
use crate::core::capability::CapabilityManifest;
use crate::errors::HostlinkError;

/// Message type discriminators.
pub mod message_type {
    pub const AUTH: &str = "auth";
    pub const AUTH_RESPONSE: &str = "auth_response";
    pub const REQUEST: &str = "request";
    pub const RESPONSE: &str = "response";
    pub const HEARTBEAT: &str = "heartbeat";
    pub const HEARTBEAT_ACK: &str = "heartbeat_ack";
    pub const EVENT: &str = "event";
}

/// The outer envelope for all gateway frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageFrame {
    /// Unique message id; responses reference it via `correlation_id`.
    pub id: String,
    /// Type discriminator, one of [`message_type`].
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Id of the frame this one answers, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

impl MessageFrame {
    /// New frame with a fresh id and the current timestamp.
    pub fn new(message_type: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message_type: message_type.into(),
            timestamp: Some(Utc::now()),
            correlation_id: None,
            payload,
        }
    }

    /// New frame answering another; carries its id as the correlation id.
    pub fn reply(message_type: impl Into<String>, correlation_id: impl Into<String>, payload: Value) -> Self {
        let mut frame = Self::new(message_type, payload);
        frame.correlation_id = Some(correlation_id.into());
        frame
    }

    /// Deserialize the payload into a typed struct.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, HostlinkError> {
        serde_json::from_value(self.payload.clone()).map_err(|err| {
            HostlinkError::Codec(format!(
                "invalid {} payload: {err}",
                self.message_type
            ))
        })
    }
}

/// `auth` payload sent by a gateway to open a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    pub gateway_id: String,
    pub token: String,
}

/// Connection tuning pushed to the gateway in a successful auth ack.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Seconds between server heartbeat probes.
    pub heartbeat_interval: u64,
    /// Seconds the gateway should wait before reconnecting.
    pub reconnect_delay: u64,
    /// Reconnect attempts before giving up.
    pub max_retries: u32,
}

/// `auth_response` payload: acceptance with catalog and server metadata,
/// or rejection with a reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub success: bool,
    pub gateway_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_info: Option<ServerInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<CapabilityManifest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<SessionConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Health snapshot carried inside heartbeat probes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    pub healthy: bool,
    pub connected_gateways: usize,
}

/// `heartbeat` payload; sent by the server as a probe and accepted from
/// gateways as client-originated liveness signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPayload {
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AgentStatus>,
}

/// `heartbeat_ack` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatAck {
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
}

/// `event` payload pushed server-to-gateway without a matching request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub event_id: String,
    pub event_data: Value,
}
