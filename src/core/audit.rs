//! Audit trail for capability execution and registry lifecycle.
//!
//! Every invocation produces an `INVOKE` event when it starts and exactly
//! one terminal event (`COMPLETED`, `FAILED`, or `PERMISSION_DENIED`) when
//! it ends, in that order. Recording must never fail the invocation:
//! sinks are infallible by contract and swallow their own problems.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::core::capability::RiskLevel;
use crate::core::execution::{ExecutionContext, ExecutionInterceptor};
use crate::errors::{ErrorCode, HostlinkError};

/// Lifecycle points that produce an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    Invoke,
    Completed,
    Failed,
    PermissionDenied,
    RateLimited,
    SnapshotCreated,
    Rollback,
    ProviderRegistered,
    ProviderUnregistered,
}

/// Immutable record of one lifecycle point.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub capability_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    /// Redacted view of the request parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<Value>,
    /// Redacted view of the response data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditEvent {
    /// Start a new event of the given type for a capability.
    pub fn new(event_type: AuditEventType, capability_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            capability_id: capability_id.into(),
            caller_id: None,
            risk_level: None,
            request: None,
            response: None,
            metadata: HashMap::new(),
            success: true,
            error: None,
        }
    }

    /// Provider lifecycle event (registration / unregistration).
    pub fn provider(event_type: AuditEventType, provider_id: &str, capability_count: usize) -> Self {
        let mut event = Self::new(event_type, format!("provider:{provider_id}"));
        event.metadata.insert(
            "capabilityCount".to_string(),
            Value::from(capability_count),
        );
        event
    }
}

/// Destination for audit events.
///
/// Implementations must be infallible: a sink that cannot persist an event
/// reports the problem itself (e.g. to the log) and returns normally.
pub trait AuditSink: Send + Sync {
    /// Record one event.
    fn record(&self, event: AuditEvent);
}

/// Sink that writes audit events to the tracing log.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    pub fn new() -> Self {
        Self
    }
}

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        if event.success {
            tracing::info!(
                event_type = ?event.event_type,
                capability_id = %event.capability_id,
                caller_id = event.caller_id.as_deref().unwrap_or("-"),
                "audit"
            );
        } else {
            tracing::warn!(
                event_type = ?event.event_type,
                capability_id = %event.capability_id,
                caller_id = event.caller_id.as_deref().unwrap_or("-"),
                error = event.error.as_deref().unwrap_or("-"),
                "audit"
            );
        }
    }
}

/// In-memory sink, used by tests and the status surface.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: parking_lot::Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events, in recording order.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    /// Drop all recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}

/// Keys whose values are masked before an audit event is recorded.
const REDACTED_KEYS: &[&str] = &["token", "password", "secret", "apikey", "api_key"];

/// Recursively mask secret-bearing keys in a JSON value.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, val) in map {
                let lowered = key.to_lowercase();
                if REDACTED_KEYS.iter().any(|k| lowered.contains(k)) {
                    out.insert(key.clone(), Value::String("[REDACTED]".to_string()));
                } else {
                    out.insert(key.clone(), redact(val));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

/// Interceptor that records the audit trail for every invocation.
///
/// Runs after the permission check so denied calls surface as
/// `PERMISSION_DENIED` terminal events without a preceding `INVOKE`.
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
}

impl AuditLogger {
    /// Audit logger order value; after [`PermissionChecker`]'s 100.
    ///
    /// [`PermissionChecker`]: crate::core::permission::PermissionChecker
    pub const ORDER: i32 = 200;

    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    fn base_event(&self, event_type: AuditEventType, ctx: &ExecutionContext) -> AuditEvent {
        let mut event = AuditEvent::new(event_type, ctx.capability.id.clone());
        event.caller_id = Some(ctx.caller.id.clone());
        event.risk_level = Some(ctx.capability.risk_level);
        event
    }
}

#[async_trait]
impl ExecutionInterceptor for AuditLogger {
    fn order(&self) -> i32 {
        Self::ORDER
    }

    async fn pre_handle(&self, ctx: &mut ExecutionContext) -> Result<(), HostlinkError> {
        let mut event = self.base_event(AuditEventType::Invoke, ctx);
        event.request = Some(redact(&ctx.parameters));
        self.sink.record(event);
        Ok(())
    }

    async fn post_handle(&self, ctx: &ExecutionContext, result: &Value) {
        let mut event = self.base_event(AuditEventType::Completed, ctx);
        event.response = Some(redact(result));
        self.sink.record(event);
    }

    async fn on_error(&self, ctx: &ExecutionContext, error: &HostlinkError) {
        let event_type = if error.code() == ErrorCode::PermissionDenied {
            AuditEventType::PermissionDenied
        } else {
            AuditEventType::Failed
        };
        let mut event = self.base_event(event_type, ctx);
        event.success = false;
        event.error = Some(error.to_string());
        event.request = Some(redact(&ctx.parameters));
        self.sink.record(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redact_masks_secret_keys() {
        let value = json!({
            "token": "abc123",
            "apiKey": "xyz",
            "nested": {"password": "hunter2", "count": 5},
            "list": [{"secret": "s"}],
            "plain": "visible"
        });
        let redacted = redact(&value);
        assert_eq!(redacted["token"], "[REDACTED]");
        assert_eq!(redacted["apiKey"], "[REDACTED]");
        assert_eq!(redacted["nested"]["password"], "[REDACTED]");
        assert_eq!(redacted["nested"]["count"], 5);
        assert_eq!(redacted["list"][0]["secret"], "[REDACTED]");
        assert_eq!(redacted["plain"], "visible");
    }

    #[test]
    fn test_memory_sink_preserves_order() {
        let sink = MemoryAuditSink::new();
        sink.record(AuditEvent::new(AuditEventType::Invoke, "a"));
        sink.record(AuditEvent::new(AuditEventType::Completed, "a"));
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, AuditEventType::Invoke);
        assert_eq!(events[1].event_type, AuditEventType::Completed);
    }

    #[test]
    fn test_provider_event_carries_count() {
        let event = AuditEvent::provider(AuditEventType::ProviderRegistered, "world", 3);
        assert_eq!(event.capability_id, "provider:world");
        assert_eq!(event.metadata["capabilityCount"], 3);
    }
}
