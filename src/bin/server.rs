//! hostlink gateway server binary.
//!
//! Serves the WebSocket gateway endpoint and the MCP-style HTTP tool
//! transport from a single listener.
//!
//! # Environment Variables
//!
//! - `HOSTLINK_BIND_ADDR` — listen address (default: 0.0.0.0:8765)
//! - `HOSTLINK_AUTH_TOKEN` — shared auth secret (unset accepts any token)
//! - `HOSTLINK_HEARTBEAT_INTERVAL` — probe interval, seconds (default: 15)
//! - `HOSTLINK_HEARTBEAT_TIMEOUT` — liveness timeout, seconds (default: 45)
//! - `HOSTLINK_SERVER_ID`, `HOSTLINK_SERVER_NAME`, `HOSTLINK_ENVIRONMENT`
//!   — server identity pushed to gateways
//! - `RUST_LOG` — tracing filter (default: "info")
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin server
//! ```

use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::CorsLayer;

use hostlink::core::{CapabilityRegistry, ExecutionEngine, TracingAuditSink};
use hostlink::gateway::{
    gateway_router, AuthHandler, AuthMessageHandler, GatewayState, HeartbeatAckMessageHandler,
    HeartbeatHandler, HeartbeatMessageHandler, MessageCodec, MessageRouter, RequestMessageHandler,
    SessionManager,
};
use hostlink::mcp::{mcp_router, McpState};
use hostlink::GatewayConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hostlink=debug".into()),
        )
        .init();

    let config = GatewayConfig::from_env();
    config.validate().context("invalid configuration")?;

    let audit = Arc::new(TracingAuditSink::new());
    let registry = Arc::new(CapabilityRegistry::new(audit.clone()));
    let engine = Arc::new(ExecutionEngine::with_defaults(registry.clone(), audit));

    let sessions = Arc::new(SessionManager::new());
    let codec = MessageCodec::new();

    let heartbeat = Arc::new(HeartbeatHandler::new(
        sessions.clone(),
        codec,
        config.clone(),
    ));
    heartbeat.clone().spawn();
    sessions
        .clone()
        .spawn_sweeper(config.session_idle_timeout(), config.session_sweep_interval());

    let mut router = MessageRouter::new();
    router.register(Arc::new(AuthMessageHandler::new(
        AuthHandler::new(config.clone()),
        sessions.clone(),
        registry.clone(),
        codec,
        config.clone(),
    )));
    router.register(Arc::new(HeartbeatMessageHandler::new(codec, config.clone())));
    router.register(Arc::new(HeartbeatAckMessageHandler::new(heartbeat)));
    router.register(Arc::new(RequestMessageHandler::new(engine.clone(), codec)));

    let gateway_state = GatewayState {
        sessions: sessions.clone(),
        router: Arc::new(router),
        codec,
    };
    let mcp_state = McpState {
        registry,
        engine,
        sessions,
        config: config.clone(),
    };

    let app = gateway_router(gateway_state)
        .merge(mcp_router(mcp_state))
        .layer(CorsLayer::permissive());

    tracing::info!("hostlink gateway starting on {}", config.bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /gateway    — WebSocket gateway upgrade");
    tracing::info!("  GET  /health     — liveness probe");
    tracing::info!("  GET  /status     — server and session status");
    tracing::info!("  GET  /tools      — tool catalog");
    tracing::info!("  POST /tools/call — tool invocation");

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}
