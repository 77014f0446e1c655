//! HTTP surface for tool discovery and invocation.
//!
//! A stateless alternative to the WebSocket gateway: agents that only need
//! request/response access can list tools and call them over plain HTTP.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::GatewayConfig;
use crate::core::execution::{CallerInfo, CapabilityRequest, ExecutionEngine};
use crate::core::registry::CapabilityRegistry;
use crate::gateway::session::SessionManager;
use crate::mcp::tool::{decorate_all, to_tool_result, McpToolResult};

/// Shared state for the HTTP endpoints.
#[derive(Clone)]
pub struct McpState {
    pub registry: Arc<CapabilityRegistry>,
    pub engine: Arc<ExecutionEngine>,
    pub sessions: Arc<SessionManager>,
    pub config: GatewayConfig,
}

/// Router exposing health, status, and the tool endpoints.
pub fn mcp_router(state: McpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/tools", get(list_tools))
        .route("/tools/call", post(call_tool))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "hostlink",
        "version": crate::VERSION,
    }))
}

async fn status(State(state): State<McpState>) -> Json<Value> {
    let sessions = state.sessions.stats();
    Json(json!({
        "serverInfo": state.config.server_info,
        "sessions": sessions,
        "capabilityCount": state.registry.len(),
        "providerCount": state.registry.list_providers().len(),
    }))
}

async fn list_tools(State(state): State<McpState>) -> Json<Value> {
    let tools = decorate_all(&state.registry.list_capabilities());
    Json(json!({ "tools": tools }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolCallBody {
    name: String,
    #[serde(default)]
    arguments: Value,
    #[serde(default)]
    caller_id: Option<String>,
}

async fn call_tool(
    State(state): State<McpState>,
    Json(body): Json<ToolCallBody>,
) -> (StatusCode, Json<McpToolResult>) {
    let caller_id = body.caller_id.unwrap_or_else(|| "mcp".to_string());
    let caller = CallerInfo::new(caller_id).with_permissions(["*".to_string()]);

    let arguments = if body.arguments.is_null() {
        json!({})
    } else {
        body.arguments
    };
    let request = CapabilityRequest::new(body.name, arguments);
    let response = state.engine.execute(request, caller).await;
    let result = to_tool_result(&response);

    (StatusCode::OK, Json(result))
}
